use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection as SqliteConnection};

use crate::error::{AppError, Result};
use crate::models::{Article, DefaultView, FilterSpec, QueryPage, ReadSelector, Scope};

use super::repository::{article_from_row, Repository, ARTICLE_COLUMNS};

/// Suffix for scratch table names; every query gets its own table.
static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// A `WHERE` clause with positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Predicate {
    pub sql: String,
    pub params: Vec<Value>,
}

pub(crate) fn build_predicate(spec: &FilterSpec) -> Predicate {
    let mut clauses = vec!["show = 1".to_string()];
    let mut params: Vec<Value> = Vec::new();

    match &spec.scope {
        Some(Scope::Feed(id)) => {
            clauses.push("feed_id = ?".to_string());
            params.push(Value::Integer(*id));
        }
        Some(Scope::Tag(tag)) => {
            clauses.push(
                "EXISTS (SELECT 1 FROM json_each(articles.tags) WHERE json_each.value = ?)"
                    .to_string(),
            );
            params.push(Value::Text(tag.clone()));
        }
        None => {}
    }

    let read_clause = match spec.read {
        ReadSelector::Read => Some("read = 1"),
        ReadSelector::Unread => Some("read = 0"),
        ReadSelector::All => None,
        ReadSelector::Default => match spec.default_view {
            DefaultView::UnreadOrMarked => Some("(read = 0 OR marked = 1)"),
            DefaultView::Unread => Some("read = 0"),
            DefaultView::All => None,
        },
    };
    if let Some(clause) = read_clause {
        clauses.push(clause.to_string());
    }

    if let Some(marked) = spec.marked {
        clauses.push("marked = ?".to_string());
        params.push(Value::Integer(marked as i64));
    }
    if let Some(starred) = spec.starred {
        clauses.push("starred = ?".to_string());
        params.push(Value::Integer(starred as i64));
    }

    Predicate {
        sql: clauses.join(" AND "),
        params,
    }
}

impl Repository {
    /// Run a filtered, sorted, paginated query over the corpus.
    ///
    /// The full match set is written in sort order to a temporary table
    /// (spilled to disk), the requested window is read back, and the table
    /// is dropped again, all within one store call.
    pub async fn query_articles(&self, spec: FilterSpec) -> Result<QueryPage> {
        let predicate = build_predicate(&spec);
        let scratch = format!("scratch_{}", SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed));
        let direction = if spec.reversed { "ASC" } else { "DESC" };
        let order = format!("{} {}, id {}", spec.sort.column(), direction, direction);
        if spec.limit == 0 {
            return Err(AppError::Query("limit must be at least 1".to_string()));
        }
        let limit = spec.limit as i64;
        let offset = spec.offset() as i64;

        let (results, total) = self
            .conn
            .call(move |conn| {
                conn.execute(
                    &format!(
                        "CREATE TEMP TABLE {} AS
                         SELECT ROW_NUMBER() OVER (ORDER BY {}) AS position, {}
                         FROM articles WHERE {}",
                        scratch, order, ARTICLE_COLUMNS, predicate.sql
                    ),
                    params_from_iter(predicate.params.iter()),
                )?;
                let window = read_window(conn, &scratch, limit, offset);
                conn.execute(&format!("DROP TABLE IF EXISTS temp.{}", scratch), [])?;
                Ok(window?)
            })
            .await?;

        let total = total as u64;
        let limit = limit as u64;
        Ok(QueryPage {
            size: results.len(),
            results,
            total,
            pages: total.div_ceil(limit),
            spec,
        })
    }
}

fn read_window(
    conn: &SqliteConnection,
    scratch: &str,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<(Vec<Article>, i64)> {
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM temp.{}", scratch),
        [],
        |row| row.get(0),
    )?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM temp.{} ORDER BY position LIMIT ?1 OFFSET ?2",
        ARTICLE_COLUMNS, scratch
    ))?;
    let results = stmt
        .query_map(params![limit, offset], article_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((results, total))
}
