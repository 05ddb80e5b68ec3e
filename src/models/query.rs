use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::article::Article;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Date,
    Downloaded,
    Title,
    FeedName,
    Author,
}

impl SortKey {
    /// Column name; only ever one of these fixed identifiers reaches SQL.
    pub fn column(&self) -> &'static str {
        match self {
            SortKey::Date => "date",
            SortKey::Downloaded => "downloaded",
            SortKey::Title => "title",
            SortKey::FeedName => "feed_name",
            SortKey::Author => "author",
        }
    }
}

impl FromStr for SortKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "date" => Ok(SortKey::Date),
            "downloaded" => Ok(SortKey::Downloaded),
            "title" => Ok(SortKey::Title),
            "feed-name" | "feed_name" => Ok(SortKey::FeedName),
            "author" => Ok(SortKey::Author),
            other => Err(AppError::Query(format!("unknown sort key '{}'", other))),
        }
    }
}

/// What an unqualified view (no read/unread/all parameter) shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultView {
    /// Unread articles plus anything marked, whatever its read state.
    #[default]
    UnreadOrMarked,
    Unread,
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadSelector {
    #[default]
    Default,
    Read,
    Unread,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Feed(i64),
    Tag(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub scope: Option<Scope>,
    pub read: ReadSelector,
    pub marked: Option<bool>,
    pub starred: Option<bool>,
    pub default_view: DefaultView,
    pub sort: SortKey,
    pub reversed: bool,
    pub page: u32,
    pub limit: u32,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            scope: None,
            read: ReadSelector::Default,
            marked: None,
            starred: None,
            default_view: DefaultView::UnreadOrMarked,
            sort: SortKey::Date,
            reversed: false,
            page: 1,
            limit: 100,
        }
    }
}

impl FilterSpec {
    /// Translate a request parameter bag into a filter spec.
    ///
    /// Selectors are presence flags (`?unread&starred`); `read` wins over
    /// `unread` which wins over `all`, mirroring how the views link to them.
    pub fn from_params(
        params: &HashMap<String, String>,
        default_limit: u32,
        default_sort: SortKey,
        default_view: DefaultView,
    ) -> Result<Self> {
        let page = match params.get("page") {
            Some(p) => p
                .parse::<u32>()
                .map_err(|_| AppError::Query(format!("invalid page '{}'", p)))?
                .max(1),
            None => 1,
        };
        let limit = match params.get("limit") {
            Some(l) => l
                .parse::<u32>()
                .ok()
                .filter(|l| *l > 0)
                .ok_or_else(|| AppError::Query(format!("invalid limit '{}'", l)))?,
            None => default_limit.max(1),
        };
        let sort = match params.get("sort") {
            Some(s) => s.parse()?,
            None => default_sort,
        };

        let read = if params.contains_key("read") {
            ReadSelector::Read
        } else if params.contains_key("unread") {
            ReadSelector::Unread
        } else if params.contains_key("all") {
            ReadSelector::All
        } else {
            ReadSelector::Default
        };

        let marked = if params.contains_key("marked") {
            Some(true)
        } else if params.contains_key("unmarked") {
            Some(false)
        } else {
            None
        };

        let starred = if params.contains_key("starred") {
            Some(true)
        } else if params.contains_key("unstarred") {
            Some(false)
        } else {
            None
        };

        let scope = if let Some(feed) = params.get("feed") {
            let id = feed
                .parse::<i64>()
                .map_err(|_| AppError::Query(format!("invalid feed id '{}'", feed)))?;
            Some(Scope::Feed(id))
        } else {
            params.get("tag").map(|t| Scope::Tag(t.clone()))
        };

        Ok(Self {
            scope,
            read,
            marked,
            starred,
            default_view,
            sort,
            reversed: params.contains_key("reversed"),
            page,
            limit,
        })
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1) * self.limit as u64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryPage {
    pub results: Vec<Article>,
    pub total: u64,
    pub pages: u64,
    pub size: usize,
    pub spec: FilterSpec,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CorpusStats {
    pub feeds: i64,
    pub inactive_feeds: i64,
    pub articles: i64,
    pub tags: i64,
    pub visible_articles: i64,
    pub hidden_articles: i64,
    pub unread_articles: i64,
    pub marked_articles: i64,
    pub starred_articles: i64,
    pub staged_articles: i64,
    pub last_update: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn parse(pairs: &[(&str, &str)]) -> Result<FilterSpec> {
        FilterSpec::from_params(&params(pairs), 100, SortKey::Date, DefaultView::UnreadOrMarked)
    }

    #[test]
    fn empty_bag_uses_defaults() {
        let spec = parse(&[]).unwrap();
        assert_eq!(spec.read, ReadSelector::Default);
        assert_eq!(spec.page, 1);
        assert_eq!(spec.limit, 100);
        assert_eq!(spec.sort, SortKey::Date);
        assert!(!spec.reversed);
        assert_eq!(spec.offset(), 0);
    }

    #[test]
    fn selectors_and_paging() {
        let spec = parse(&[
            ("page", "3"),
            ("limit", "20"),
            ("sort", "feed-name"),
            ("reversed", ""),
            ("all", ""),
            ("unmarked", ""),
            ("starred", ""),
            ("tag", "science"),
        ])
        .unwrap();
        assert_eq!(spec.read, ReadSelector::All);
        assert_eq!(spec.marked, Some(false));
        assert_eq!(spec.starred, Some(true));
        assert_eq!(spec.sort, SortKey::FeedName);
        assert!(spec.reversed);
        assert_eq!(spec.offset(), 40);
        assert_eq!(spec.scope, Some(Scope::Tag("science".to_string())));
    }

    #[test]
    fn read_takes_precedence_over_unread() {
        let spec = parse(&[("read", ""), ("unread", "")]).unwrap();
        assert_eq!(spec.read, ReadSelector::Read);
    }

    #[test]
    fn page_zero_is_first_page() {
        assert_eq!(parse(&[("page", "0")]).unwrap().page, 1);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&[("limit", "0")]).is_err());
        assert!(parse(&[("page", "x")]).is_err());
        assert!(parse(&[("sort", "id; DROP TABLE articles")]).is_err());
        assert!(parse(&[("feed", "abc")]).is_err());
    }
}
