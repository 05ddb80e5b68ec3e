use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;

use crate::models::NewArticle;

/// Line width handed to html2text; wide enough that paragraphs stay on one line.
const TEXT_WIDTH: usize = 10_000;

/// Parse a raw feed payload into normalized entries.
///
/// A payload that is not a feed yields no entries; entries without a title
/// are skipped since no identity can be derived for them.
pub fn parse_entries(payload: &[u8], now: DateTime<Utc>) -> Vec<NewArticle> {
    let feed = match parser::parse(payload) {
        Ok(feed) => feed,
        Err(e) => {
            tracing::debug!("Failed to parse feed payload: {}", e);
            return Vec::new();
        }
    };

    let feed_language = feed.language.clone();

    feed.entries
        .into_iter()
        .filter_map(|entry| normalize_entry(entry, feed_language.as_deref(), now))
        .collect()
}

fn normalize_entry(entry: Entry, feed_language: Option<&str>, now: DateTime<Utc>) -> Option<NewArticle> {
    let title = entry
        .title
        .map(|t| t.content.trim().to_string())
        .filter(|t| !t.is_empty())?;

    let summary = entry.summary.map(|s| s.content);

    // Try content first, then fall back to summary
    let (content, subtitle) = match entry.content.and_then(|c| c.body) {
        Some(body) => (body, summary),
        None => (summary.unwrap_or_default(), None),
    };
    let content = content.trim().to_string();

    let subtitle = subtitle
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && *s != title);

    let text = if content.is_empty() {
        String::new()
    } else {
        html2text::from_read(content.as_bytes(), TEXT_WIDTH)
            .map(|t| t.trim().to_string())
            .unwrap_or_default()
    };

    Some(NewArticle {
        link: entry.links.first().map(|l| l.href.clone()),
        author: entry
            .authors
            .first()
            .map(|a| a.name.trim().to_string())
            .filter(|a| !a.is_empty()),
        language: entry.language.or_else(|| feed_language.map(str::to_string)),
        date: entry_date(entry.published.or(entry.updated), now),
        title,
        content,
        text,
        subtitle,
    })
}

/// Published, else updated, else ingestion time. Pre-epoch values are
/// treated as parse garbage and also fall back to ingestion time.
fn entry_date(date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    date.filter(|d| d.timestamp() >= 0).unwrap_or(now)
}
