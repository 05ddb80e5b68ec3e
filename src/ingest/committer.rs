use std::collections::HashMap;

use chrono::{Duration, Utc};

use crate::db::Repository;
use crate::error::Result;
use crate::models::{unique_tags, Counters, Feed};

/// Outcome of one pass over the staging buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitReport {
    /// Staged rows consumed, whether or not they made it into the corpus.
    pub processed: usize,
    /// Rows that were new to the corpus.
    pub pushed: usize,
    /// Counter contribution of the pushed articles, per feed id.
    pub deltas: HashMap<i64, Counters>,
}

/// Drain the staging buffer into the corpus, one row at a time.
///
/// Rows older than `staging_ttl` are dropped first. Each remaining row is
/// removed from staging whatever the insert outcome, so a row is consumed
/// exactly once even when another pass committed the same article.
pub async fn commit_staged(repo: &Repository, staging_ttl: Duration) -> Result<CommitReport> {
    let expired = repo.expire_staged(Utc::now() - staging_ttl).await?;
    if expired > 0 {
        tracing::info!("Dropped {} expired staged articles", expired);
    }

    let mut report = CommitReport::default();
    let mut feeds: HashMap<i64, Option<Feed>> = HashMap::new();

    for staged in repo.get_staged_articles().await? {
        let feed = match feeds.get(&staged.feed_id) {
            Some(feed) => feed.clone(),
            None => {
                let feed = repo.get_feed(staged.feed_id).await?;
                feeds.insert(staged.feed_id, feed.clone());
                feed
            }
        };

        let id = staged.id.clone();
        report.processed += 1;

        let Some(feed) = feed else {
            tracing::debug!("Dropping staged '{}' of missing feed {}", id, staged.feed_id);
            repo.remove_staged(&id).await?;
            continue;
        };

        let mut article = staged.into_article(unique_tags(feed.tags.iter().cloned()), Utc::now());
        article.feed_name = feed.title.clone();
        let contribution = Counters::of(&article.flags);

        if repo.insert_article(article).await? {
            report.pushed += 1;
            *report.deltas.entry(feed.id).or_default() += contribution;
        } else {
            tracing::debug!("Article {} was committed elsewhere", id);
        }

        repo.remove_staged(&id).await?;
    }

    let now = Utc::now();
    for feed in feeds.values().flatten() {
        repo.touch_feed(feed.id, now).await?;
    }

    Ok(report)
}
