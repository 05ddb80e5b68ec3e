use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection as SqliteConnection, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    unique_tags, Article, CorpusStats, Counters, Feed, Flag, Flags, NewArticle, NewFeed,
    StagedArticle, Tag, Target,
};

use super::schema::{PRAGMAS, SCHEMA};

pub(crate) const FEED_COLUMNS: &str = "id, title, url, description, tags, active, total_articles, \
     visible_articles, unread_articles, marked_articles, starred_articles, last_update";

pub(crate) const ARTICLE_COLUMNS: &str = "id, feed_id, feed_name, title, link, content, text, \
     author, language, subtitle, tags, date, downloaded, show, read, marked, starred";

const TAG_COLUMNS: &str = "id, title, feeds, total_articles, visible_articles, unread_articles, \
     marked_articles, starred_articles";

const STAGED_COLUMNS: &str =
    "id, feed_id, feed_name, title, link, content, text, author, language, subtitle, date, staged_at";

/// Outcome of one staging pass over a feed's normalized entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    pub staged: usize,
    /// Already in the corpus.
    pub known: usize,
    /// Already waiting in the staging buffer.
    pub duplicates: usize,
    pub failed: usize,
}

pub struct Repository {
    pub(crate) conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Feed operations

    pub async fn insert_feed(&self, feed: NewFeed) -> Result<i64> {
        let tags = serde_json::to_string(&unique_tags(feed.tags.iter().cloned()))?;
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO feeds (title, url, description, tags) VALUES (?1, ?2, ?3, ?4)",
                    params![feed.title, feed.url, feed.description, tags],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn get_all_feeds(&self) -> Result<Vec<Feed>> {
        self.query_feeds("1 = 1").await
    }

    pub async fn get_active_feeds(&self) -> Result<Vec<Feed>> {
        self.query_feeds("active = 1").await
    }

    pub async fn feeds_without_articles(&self) -> Result<Vec<Feed>> {
        self.query_feeds("NOT EXISTS (SELECT 1 FROM articles a WHERE a.feed_id = feeds.id)")
            .await
    }

    async fn query_feeds(&self, predicate: &'static str) -> Result<Vec<Feed>> {
        let feeds = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {} FROM feeds WHERE {} ORDER BY title",
                    FEED_COLUMNS, predicate
                );
                let mut stmt = conn.prepare(&sql)?;
                let feeds = stmt
                    .query_map([], feed_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(feeds)
            })
            .await?;
        Ok(feeds)
    }

    pub async fn find_feed(&self, target: &Target) -> Result<Option<Feed>> {
        let target = target.clone();
        let feed = self
            .conn
            .call(move |conn| Ok(find_feed_sync(conn, &target)?))
            .await?;
        Ok(feed)
    }

    pub async fn get_feed(&self, id: i64) -> Result<Option<Feed>> {
        self.find_feed(&Target::Id(id)).await
    }

    pub async fn set_feed_active(&self, id: i64, active: bool) -> Result<bool> {
        let changed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "UPDATE feeds SET active = ?1 WHERE id = ?2 AND active != ?1",
                    params![active, id],
                )?;
                Ok(n > 0)
            })
            .await?;
        Ok(changed)
    }

    pub async fn touch_feed(&self, id: i64, at: DateTime<Utc>) -> Result<()> {
        let at = format_datetime(&at);
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE feeds SET last_update = ?1 WHERE id = ?2",
                    params![at, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Delete a feed together with its articles and staged entries.
    pub async fn delete_feed(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM staged_articles WHERE feed_id = ?1", params![id])?;
                // articles go with the feed through ON DELETE CASCADE
                let n = tx.execute("DELETE FROM feeds WHERE id = ?1", params![id])?;
                tx.commit()?;
                Ok(n > 0)
            })
            .await?;
        Ok(deleted)
    }

    pub async fn add_feed_counters(&self, id: i64, delta: Counters) -> Result<()> {
        self.conn
            .call(move |conn| {
                add_counters_sync(conn, "feeds", "id = ?6", id, &delta)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Recount a feed's articles and overwrite its counters.
    pub async fn recompute_feed_counters(&self, id: i64) -> Result<Counters> {
        let counters = self
            .conn
            .call(move |conn| {
                let counters = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(show), 0), COALESCE(SUM(show AND NOT read), 0),
                            COALESCE(SUM(show AND marked), 0), COALESCE(SUM(show AND starred), 0)
                     FROM articles WHERE feed_id = ?1",
                    params![id],
                    counters_from_row,
                )?;
                set_counters_sync(conn, "feeds", "id = ?6", id, &counters)?;
                Ok(counters)
            })
            .await?;
        Ok(counters)
    }

    // Tag operations

    pub async fn get_all_tags(&self) -> Result<Vec<Tag>> {
        let tags = self
            .conn
            .call(|conn| {
                let sql = format!("SELECT {} FROM tags ORDER BY title", TAG_COLUMNS);
                let mut stmt = conn.prepare(&sql)?;
                let tags = stmt
                    .query_map([], tag_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(tags)
            })
            .await?;
        Ok(tags)
    }

    pub async fn find_tag(&self, target: &Target) -> Result<Option<Tag>> {
        let target = target.clone();
        let tag = self
            .conn
            .call(move |conn| {
                let (predicate, value): (&str, rusqlite::types::Value) = match target {
                    Target::All => return Ok(None),
                    Target::Title(title) => ("title = ?1", title.into()),
                    Target::Id(id) => ("id = ?1", id.into()),
                };
                let sql = format!("SELECT {} FROM tags WHERE {}", TAG_COLUMNS, predicate);
                let tag = conn
                    .query_row(&sql, params![value], tag_from_row)
                    .optional()?;
                Ok(tag)
            })
            .await?;
        Ok(tag)
    }

    /// Feeds whose tag set currently contains `title`.
    pub async fn feeds_referencing_tag(&self, title: &str) -> Result<Vec<i64>> {
        let title = title.to_string();
        let ids = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id FROM feeds
                     WHERE EXISTS (SELECT 1 FROM json_each(feeds.tags) WHERE json_each.value = ?1)
                     ORDER BY id",
                )?;
                let ids = stmt
                    .query_map(params![title], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<i64>, _>>()?;
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    pub async fn insert_tag(&self, title: &str, feeds: &[i64]) -> Result<i64> {
        let title = title.to_string();
        let feeds = serde_json::to_string(feeds)?;
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO tags (title, feeds) VALUES (?1, ?2)
                     ON CONFLICT(title) DO UPDATE SET feeds = excluded.feeds",
                    params![title, feeds],
                )?;
                let id = conn.query_row(
                    "SELECT id FROM tags WHERE title = ?1",
                    params![title],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    pub async fn set_tag_feeds(&self, id: i64, feeds: &[i64]) -> Result<()> {
        let feeds = serde_json::to_string(feeds)?;
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE tags SET feeds = ?1 WHERE id = ?2",
                    params![feeds, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn delete_tag(&self, id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM tags WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn add_tag_counters(&self, title: &str, delta: Counters) -> Result<()> {
        let title = title.to_string();
        self.conn
            .call(move |conn| {
                add_counters_sync(conn, "tags", "title = ?6", title, &delta)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn recompute_tag_counters(&self, title: &str) -> Result<Counters> {
        let title = title.to_string();
        let counters = self
            .conn
            .call(move |conn| {
                let counters = conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(show), 0), COALESCE(SUM(show AND NOT read), 0),
                            COALESCE(SUM(show AND marked), 0), COALESCE(SUM(show AND starred), 0)
                     FROM articles
                     WHERE EXISTS (SELECT 1 FROM json_each(articles.tags) WHERE json_each.value = ?1)",
                    params![title],
                    counters_from_row,
                )?;
                set_counters_sync(conn, "tags", "title = ?6", title, &counters)?;
                Ok(counters)
            })
            .await?;
        Ok(counters)
    }

    // Staging operations

    /// Stage entries that are neither in the corpus nor already staged.
    ///
    /// Each row is inserted on its own; a conflict or failure on one entry
    /// does not keep the others out.
    pub async fn stage_articles(&self, entries: Vec<StagedArticle>) -> Result<StageReport> {
        let report = self
            .conn
            .call(move |conn| {
                let mut report = StageReport::default();
                for entry in entries {
                    let known: bool = conn.query_row(
                        "SELECT EXISTS (SELECT 1 FROM articles WHERE id = ?1)",
                        params![entry.id],
                        |row| row.get(0),
                    )?;
                    if known {
                        report.known += 1;
                        continue;
                    }
                    match insert_staged_sync(conn, &entry) {
                        Ok(true) => report.staged += 1,
                        Ok(false) => report.duplicates += 1,
                        Err(e) => {
                            tracing::warn!("Failed to stage '{}': {}", entry.article.title, e);
                            report.failed += 1;
                        }
                    }
                }
                Ok(report)
            })
            .await?;
        Ok(report)
    }

    pub async fn get_staged_articles(&self) -> Result<Vec<StagedArticle>> {
        let staged = self
            .conn
            .call(|conn| {
                let sql = format!(
                    "SELECT {} FROM staged_articles ORDER BY staged_at",
                    STAGED_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let staged = stmt
                    .query_map([], staged_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(staged)
            })
            .await?;
        Ok(staged)
    }

    pub async fn remove_staged(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM staged_articles WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn expire_staged(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let cutoff = format_datetime(&older_than);
        let n = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    "DELETE FROM staged_articles WHERE staged_at < ?1",
                    params![cutoff],
                )?;
                Ok(n)
            })
            .await?;
        Ok(n)
    }

    pub async fn staged_count(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM staged_articles").await
    }

    // Article operations

    /// Insert into the corpus. Returns `false` when the id already exists.
    pub async fn insert_article(&self, article: Article) -> Result<bool> {
        let tags = serde_json::to_string(&article.tags)?;
        let inserted = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "INSERT INTO articles ({}) VALUES
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                    ARTICLE_COLUMNS
                );
                let result = conn.execute(
                    &sql,
                    params![
                        article.id,
                        article.feed_id,
                        article.feed_name,
                        article.title,
                        article.link,
                        article.content,
                        article.text,
                        article.author,
                        article.language,
                        article.subtitle,
                        tags,
                        format_datetime(&article.date),
                        format_datetime(&article.downloaded),
                        article.flags.show,
                        article.flags.read,
                        article.flags.marked,
                        article.flags.starred,
                    ],
                );
                match result {
                    Ok(_) => Ok(true),
                    Err(e) if is_constraint_violation(&e) => Ok(false),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        Ok(inserted)
    }

    pub async fn get_article(&self, id: &str) -> Result<Option<Article>> {
        let id = id.to_string();
        let article = self
            .conn
            .call(move |conn| {
                let sql = format!("SELECT {} FROM articles WHERE id = ?1", ARTICLE_COLUMNS);
                let article = conn
                    .query_row(&sql, params![id], article_from_row)
                    .optional()?;
                Ok(article)
            })
            .await?;
        Ok(article)
    }

    pub async fn article_exists(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        let exists = self
            .conn
            .call(move |conn| {
                let exists = conn.query_row(
                    "SELECT EXISTS (SELECT 1 FROM articles WHERE id = ?1)",
                    params![id],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await?;
        Ok(exists)
    }

    /// Toggle a flag and fold the change into the feed and tag counters.
    ///
    /// Returns `None` for an unknown article, `Some(false)` when the flag
    /// already had the requested value.
    pub async fn set_article_flag(&self, id: &str, flag: Flag, value: bool) -> Result<Option<bool>> {
        let id = id.to_string();
        let changed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let sql = format!("SELECT {} FROM articles WHERE id = ?1", ARTICLE_COLUMNS);
                let Some(article) = tx.query_row(&sql, params![id], article_from_row).optional()?
                else {
                    return Ok(None);
                };
                if article.flags.get(flag) == value {
                    return Ok(Some(false));
                }

                let after = article.flags.with(flag, value);
                let delta = Counters::of(&after) - Counters::of(&article.flags);

                let sql = format!("UPDATE articles SET {} = ?1 WHERE id = ?2", flag.column());
                tx.execute(&sql, params![value, id])?;
                add_counters_sync(&tx, "feeds", "id = ?6", article.feed_id, &delta)?;
                for tag in &article.tags {
                    add_counters_sync(&tx, "tags", "title = ?6", tag, &delta)?;
                }
                tx.commit()?;
                Ok(Some(true))
            })
            .await?;
        Ok(changed)
    }

    pub async fn statistics(&self) -> Result<CorpusStats> {
        let stats = self
            .conn
            .call(|conn| {
                let count = |sql: &str| -> rusqlite::Result<i64> {
                    conn.query_row(sql, [], |row| row.get(0))
                };
                let last_update: Option<String> =
                    conn.query_row("SELECT MAX(last_update) FROM feeds", [], |row| row.get(0))?;
                let articles = count("SELECT COUNT(*) FROM articles")?;
                let visible = count("SELECT COUNT(*) FROM articles WHERE show = 1")?;
                Ok(CorpusStats {
                    feeds: count("SELECT COUNT(*) FROM feeds")?,
                    inactive_feeds: count("SELECT COUNT(*) FROM feeds WHERE active = 0")?,
                    articles,
                    tags: count("SELECT COUNT(*) FROM tags")?,
                    visible_articles: visible,
                    hidden_articles: articles - visible,
                    unread_articles: count(
                        "SELECT COUNT(*) FROM articles WHERE show = 1 AND read = 0",
                    )?,
                    marked_articles: count(
                        "SELECT COUNT(*) FROM articles WHERE show = 1 AND marked = 1",
                    )?,
                    starred_articles: count(
                        "SELECT COUNT(*) FROM articles WHERE show = 1 AND starred = 1",
                    )?,
                    staged_articles: count("SELECT COUNT(*) FROM staged_articles")?,
                    last_update: last_update.as_deref().and_then(parse_datetime),
                })
            })
            .await?;
        Ok(stats)
    }

    async fn count(&self, sql: &'static str) -> Result<i64> {
        let n = self
            .conn
            .call(move |conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))
            .await?;
        Ok(n)
    }
}

fn find_feed_sync(conn: &SqliteConnection, target: &Target) -> rusqlite::Result<Option<Feed>> {
    match target {
        Target::All => Ok(None),
        Target::Title(title) => conn
            .query_row(
                &format!("SELECT {} FROM feeds WHERE title = ?1", FEED_COLUMNS),
                params![title],
                feed_from_row,
            )
            .optional(),
        Target::Id(id) => conn
            .query_row(
                &format!("SELECT {} FROM feeds WHERE id = ?1", FEED_COLUMNS),
                params![id],
                feed_from_row,
            )
            .optional(),
    }
}

fn insert_staged_sync(conn: &SqliteConnection, entry: &StagedArticle) -> rusqlite::Result<bool> {
    let sql = format!(
        "INSERT OR IGNORE INTO staged_articles ({}) VALUES
         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        STAGED_COLUMNS
    );
    let a = &entry.article;
    let n = conn.execute(
        &sql,
        params![
            entry.id,
            entry.feed_id,
            entry.feed_name,
            a.title,
            a.link,
            a.content,
            a.text,
            a.author,
            a.language,
            a.subtitle,
            format_datetime(&a.date),
            format_datetime(&entry.staged_at),
        ],
    )?;
    Ok(n > 0)
}

/// Atomic `counter = counter + delta` on one row of `feeds` or `tags`.
fn add_counters_sync<K: rusqlite::ToSql>(
    conn: &SqliteConnection,
    table: &'static str,
    predicate: &'static str,
    key: K,
    delta: &Counters,
) -> rusqlite::Result<usize> {
    let sql = format!(
        "UPDATE {} SET total_articles = total_articles + ?1,
                       visible_articles = visible_articles + ?2,
                       unread_articles = unread_articles + ?3,
                       marked_articles = marked_articles + ?4,
                       starred_articles = starred_articles + ?5
         WHERE {}",
        table, predicate
    );
    conn.execute(
        &sql,
        params![
            delta.total,
            delta.visible,
            delta.unread,
            delta.marked,
            delta.starred,
            key
        ],
    )
}

fn set_counters_sync<K: rusqlite::ToSql>(
    conn: &SqliteConnection,
    table: &'static str,
    predicate: &'static str,
    key: K,
    counters: &Counters,
) -> rusqlite::Result<usize> {
    let sql = format!(
        "UPDATE {} SET total_articles = ?1, visible_articles = ?2, unread_articles = ?3,
                       marked_articles = ?4, starred_articles = ?5
         WHERE {}",
        table, predicate
    );
    conn.execute(
        &sql,
        params![
            counters.total,
            counters.visible,
            counters.unread,
            counters.marked,
            counters.starred,
            key
        ],
    )
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first (e.g., "2026-01-11T12:34:56.000Z")
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format (e.g., "2026-01-11 12:34:56")
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn datetime_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_datetime(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp '{}'", raw).into(),
        )
    })
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn counters_from_row(row: &Row) -> rusqlite::Result<Counters> {
    counters_at(row, 0)
}

fn counters_at(row: &Row, start: usize) -> rusqlite::Result<Counters> {
    Ok(Counters {
        total: row.get(start)?,
        visible: row.get(start + 1)?,
        unread: row.get(start + 2)?,
        marked: row.get(start + 3)?,
        starred: row.get(start + 4)?,
    })
}

fn feed_from_row(row: &Row) -> rusqlite::Result<Feed> {
    Ok(Feed {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        description: row.get(3)?,
        tags: json_column(row, 4)?,
        active: row.get(5)?,
        counters: counters_at(row, 6)?,
        last_update: row
            .get::<_, Option<String>>(11)?
            .and_then(|s| parse_datetime(&s)),
    })
}

fn tag_from_row(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        title: row.get(1)?,
        feeds: json_column(row, 2)?,
        counters: counters_at(row, 3)?,
    })
}

pub(crate) fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        feed_id: row.get(1)?,
        feed_name: row.get(2)?,
        title: row.get(3)?,
        link: row.get(4)?,
        content: row.get(5)?,
        text: row.get(6)?,
        author: row.get(7)?,
        language: row.get(8)?,
        subtitle: row.get(9)?,
        tags: json_column(row, 10)?,
        date: datetime_column(row, 11)?,
        downloaded: datetime_column(row, 12)?,
        flags: Flags {
            show: row.get(13)?,
            read: row.get(14)?,
            marked: row.get(15)?,
            starred: row.get(16)?,
        },
    })
}

fn staged_from_row(row: &Row) -> rusqlite::Result<StagedArticle> {
    Ok(StagedArticle {
        id: row.get(0)?,
        feed_id: row.get(1)?,
        feed_name: row.get(2)?,
        article: NewArticle {
            title: row.get(3)?,
            link: row.get(4)?,
            content: row.get(5)?,
            text: row.get(6)?,
            author: row.get(7)?,
            language: row.get(8)?,
            subtitle: row.get(9)?,
            date: datetime_column(row, 10)?,
        },
        staged_at: datetime_column(row, 11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(title: &str) -> NewArticle {
        NewArticle {
            title: title.to_string(),
            link: Some(format!("https://example.org/{}", title)),
            content: "<p>body</p>".to_string(),
            text: "body".to_string(),
            author: None,
            language: Some("en".to_string()),
            subtitle: None,
            date: Utc::now() - Duration::hours(1),
        }
    }

    async fn repo_with_feed() -> (Repository, i64) {
        let repo = Repository::open_in_memory().await.unwrap();
        let id = repo
            .insert_feed(NewFeed::new("Feed", "https://example.org/rss").with_tags(["news"]))
            .await
            .unwrap();
        (repo, id)
    }

    #[tokio::test]
    async fn feed_round_trips_tags_and_defaults() {
        let (repo, id) = repo_with_feed().await;
        let feed = repo.get_feed(id).await.unwrap().unwrap();
        assert_eq!(feed.tags, vec!["news".to_string()]);
        assert!(feed.active);
        assert!(feed.counters.is_zero());
        assert!(feed.last_update.is_none());

        let by_title = repo
            .find_feed(&Target::Title("Feed".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_title.id, id);
        assert!(repo.find_feed(&Target::All).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inactive_feeds_are_not_listed_as_active() {
        let (repo, id) = repo_with_feed().await;
        assert!(repo.set_feed_active(id, false).await.unwrap());
        assert!(!repo.set_feed_active(id, false).await.unwrap());
        assert!(repo.get_active_feeds().await.unwrap().is_empty());
        assert_eq!(repo.get_all_feeds().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn staging_skips_known_and_duplicate_entries() {
        let (repo, id) = repo_with_feed().await;
        let known = StagedArticle::new(id, "Feed", entry("known"));
        repo.insert_article(known.clone().into_article(vec![], Utc::now()))
            .await
            .unwrap();

        let report = repo
            .stage_articles(vec![
                known,
                StagedArticle::new(id, "Feed", entry("fresh")),
                StagedArticle::new(id, "Feed", entry("fresh")),
            ])
            .await
            .unwrap();

        assert_eq!(report.staged, 1);
        assert_eq!(report.known, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(repo.staged_count().await.unwrap(), 1);

        let staged = repo.get_staged_articles().await.unwrap();
        assert_eq!(staged[0].article.title, "fresh");
        assert_eq!(staged[0].id, crate::models::article_id(id, "fresh"));
    }

    #[tokio::test]
    async fn duplicate_insert_is_signalled_not_raised() {
        let (repo, id) = repo_with_feed().await;
        let article = StagedArticle::new(id, "Feed", entry("a")).into_article(vec![], Utc::now());
        assert!(repo.insert_article(article.clone()).await.unwrap());
        assert!(!repo.insert_article(article).await.unwrap());
    }

    #[tokio::test]
    async fn expired_staging_rows_are_dropped() {
        let (repo, id) = repo_with_feed().await;
        let mut old = StagedArticle::new(id, "Feed", entry("old"));
        old.staged_at = Utc::now() - Duration::hours(48);
        repo.stage_articles(vec![old, StagedArticle::new(id, "Feed", entry("new"))])
            .await
            .unwrap();

        let expired = repo
            .expire_staged(Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(expired, 1);
        assert_eq!(repo.staged_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn flag_toggle_adjusts_feed_and_tag_counters() {
        let (repo, id) = repo_with_feed().await;
        repo.insert_tag("news", &[id]).await.unwrap();
        let article = StagedArticle::new(id, "Feed", entry("a"))
            .into_article(vec!["news".to_string()], Utc::now());
        let article_id = article.id.clone();
        repo.insert_article(article).await.unwrap();
        repo.recompute_feed_counters(id).await.unwrap();
        repo.recompute_tag_counters("news").await.unwrap();

        assert_eq!(
            repo.set_article_flag(&article_id, Flag::Read, true).await.unwrap(),
            Some(true)
        );
        assert_eq!(
            repo.set_article_flag(&article_id, Flag::Read, true).await.unwrap(),
            Some(false)
        );
        assert_eq!(
            repo.set_article_flag("missing", Flag::Read, true).await.unwrap(),
            None
        );
        repo.set_article_flag(&article_id, Flag::Starred, true)
            .await
            .unwrap();

        let feed = repo.get_feed(id).await.unwrap().unwrap();
        assert_eq!(feed.counters.unread, 0);
        assert_eq!(feed.counters.starred, 1);
        assert_eq!(feed.counters.total, 1);

        let tag = repo
            .find_tag(&Target::Title("news".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tag.counters, feed.counters);

        // incremental bookkeeping agrees with a full recount
        assert_eq!(repo.recompute_feed_counters(id).await.unwrap(), feed.counters);
    }

    #[tokio::test]
    async fn deleting_a_feed_cascades_to_articles() {
        let (repo, id) = repo_with_feed().await;
        let article = StagedArticle::new(id, "Feed", entry("a")).into_article(vec![], Utc::now());
        let article_id = article.id.clone();
        repo.insert_article(article).await.unwrap();
        repo.stage_articles(vec![StagedArticle::new(id, "Feed", entry("b"))])
            .await
            .unwrap();

        assert!(repo.delete_feed(id).await.unwrap());
        assert!(!repo.article_exists(&article_id).await.unwrap());
        assert_eq!(repo.staged_count().await.unwrap(), 0);
        assert!(!repo.delete_feed(id).await.unwrap());
    }

    #[tokio::test]
    async fn statistics_counts_visibility() {
        let (repo, id) = repo_with_feed().await;
        for title in ["a", "b", "c"] {
            let article =
                StagedArticle::new(id, "Feed", entry(title)).into_article(vec![], Utc::now());
            repo.insert_article(article).await.unwrap();
        }
        let hidden = crate::models::article_id(id, "c");
        repo.set_article_flag(&hidden, Flag::Show, false).await.unwrap();
        repo.touch_feed(id, Utc::now()).await.unwrap();

        let stats = repo.statistics().await.unwrap();
        assert_eq!(stats.feeds, 1);
        assert_eq!(stats.articles, 3);
        assert_eq!(stats.visible_articles, 2);
        assert_eq!(stats.hidden_articles, 1);
        assert_eq!(stats.unread_articles, 2);
        assert!(stats.last_update.is_some());
    }
}
