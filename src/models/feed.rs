use std::ops::{Add, AddAssign, Sub};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::article::Flags;

/// Derived article counts kept on feeds and tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub total: i64,
    pub visible: i64,
    pub unread: i64,
    pub marked: i64,
    pub starred: i64,
}

impl Counters {
    /// Contribution of a single article with the given flags.
    pub fn of(flags: &Flags) -> Self {
        let visible = flags.show as i64;
        Self {
            total: 1,
            visible,
            unread: visible * (!flags.read as i64),
            marked: visible * (flags.marked as i64),
            starred: visible * (flags.starred as i64),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl Add for Counters {
    type Output = Counters;

    fn add(self, rhs: Counters) -> Counters {
        Counters {
            total: self.total + rhs.total,
            visible: self.visible + rhs.visible,
            unread: self.unread + rhs.unread,
            marked: self.marked + rhs.marked,
            starred: self.starred + rhs.starred,
        }
    }
}

impl AddAssign for Counters {
    fn add_assign(&mut self, rhs: Counters) {
        *self = *self + rhs;
    }
}

impl Sub for Counters {
    type Output = Counters;

    fn sub(self, rhs: Counters) -> Counters {
        Counters {
            total: self.total - rhs.total,
            visible: self.visible - rhs.visible,
            unread: self.unread - rhs.unread,
            marked: self.marked - rhs.marked,
            starred: self.starred - rhs.starred,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub description: String,
    pub tags: Vec<String>,
    pub active: bool,
    pub counters: Counters,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewFeed {
    pub title: String,
    pub url: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl NewFeed {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            description: String::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = unique_tags(tags.into_iter().map(Into::into));
        self
    }
}

/// Trimmed, non-empty tag titles in first-seen order, each listed once.
pub fn unique_tags<I: IntoIterator<Item = String>>(tags: I) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !unique.iter().any(|t| t == tag) {
            unique.push(tag.to_string());
        }
    }
    unique
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub title: String,
    pub feeds: Vec<i64>,
    pub counters: Counters,
}

/// Selects which feeds or tags an entry point acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Target {
    #[default]
    All,
    Title(String),
    Id(i64),
}
