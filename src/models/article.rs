use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable article identity: SHA-256 of `"<feed-id> - <title>"`, hex encoded.
///
/// Staging and commit both derive ids through this function, so the same
/// (feed, title) pair always lands on the same row.
pub fn article_id(feed_id: i64, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{} - {}", feed_id, title).as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    pub show: bool,
    pub read: bool,
    pub marked: bool,
    pub starred: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            show: true,
            read: false,
            marked: false,
            starred: false,
        }
    }
}

impl Flags {
    pub fn with(mut self, flag: Flag, value: bool) -> Self {
        match flag {
            Flag::Show => self.show = value,
            Flag::Read => self.read = value,
            Flag::Marked => self.marked = value,
            Flag::Starred => self.starred = value,
        }
        self
    }

    pub fn get(&self, flag: Flag) -> bool {
        match flag {
            Flag::Show => self.show,
            Flag::Read => self.read,
            Flag::Marked => self.marked,
            Flag::Starred => self.starred,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    Show,
    Read,
    Marked,
    Starred,
}

impl Flag {
    pub fn column(&self) -> &'static str {
        match self {
            Flag::Show => "show",
            Flag::Read => "read",
            Flag::Marked => "marked",
            Flag::Starred => "starred",
        }
    }
}

/// A committed corpus entry. Only the flags change after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub feed_id: i64,
    pub feed_name: String,
    pub title: String,
    pub link: Option<String>,
    pub content: String,
    pub text: String,
    pub author: Option<String>,
    pub language: Option<String>,
    pub subtitle: Option<String>,
    pub tags: Vec<String>,
    pub date: DateTime<Utc>,
    pub downloaded: DateTime<Utc>,
    pub flags: Flags,
}

/// Normalized entry straight out of the parser, no identity or feed yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewArticle {
    pub title: String,
    pub link: Option<String>,
    pub content: String,
    pub text: String,
    pub author: Option<String>,
    pub language: Option<String>,
    pub subtitle: Option<String>,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StagedArticle {
    pub id: String,
    pub feed_id: i64,
    pub feed_name: String,
    pub article: NewArticle,
    pub staged_at: DateTime<Utc>,
}

impl StagedArticle {
    pub fn new(feed_id: i64, feed_name: &str, article: NewArticle) -> Self {
        Self {
            id: article_id(feed_id, &article.title),
            feed_id,
            feed_name: feed_name.to_string(),
            article,
            staged_at: Utc::now(),
        }
    }

    /// Turn the staged twin into a corpus article with default flags,
    /// clamping any future publish date to `now`.
    pub fn into_article(self, tags: Vec<String>, now: DateTime<Utc>) -> Article {
        let date = if self.article.date > now {
            now
        } else {
            self.article.date
        };

        Article {
            id: self.id,
            feed_id: self.feed_id,
            feed_name: self.feed_name,
            title: self.article.title,
            link: self.article.link,
            content: self.article.content,
            text: self.article.text,
            author: self.article.author,
            language: self.article.language,
            subtitle: self.article.subtitle,
            tags,
            date,
            downloaded: now,
            flags: Flags::default(),
        }
    }
}
