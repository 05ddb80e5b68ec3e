mod committer;
mod jobs;
mod metadata;
mod stager;

use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::feed::{select_feeds, FeedFetcher, FetchTarget, FetchedFeed, SelectionMethod};
use crate::models::{Feed, NewFeed, Target};

pub use committer::{commit_staged, CommitReport};
pub use jobs::{Job, JobQueue};
pub use metadata::{apply_incremental, reconcile, sync_tags, update_feed_metadata, update_tag_metadata, TagSync};
pub use stager::stage_fetched;

/// Entry points of the ingestion pipeline.
pub struct Ingestor {
    repo: Arc<Repository>,
    fetcher: FeedFetcher,
    config: Config,
    cancel: Mutex<CancellationToken>,
}

impl Ingestor {
    pub fn new(repo: Arc<Repository>, config: Config) -> Result<Self> {
        let fetcher = FeedFetcher::new(&config)?;
        Ok(Self {
            repo,
            fetcher,
            config,
            cancel: Mutex::new(CancellationToken::new()),
        })
    }

    pub fn repository(&self) -> &Arc<Repository> {
        &self.repo
    }

    /// Cancel every fetch currently in flight. Entries already fetched are
    /// still staged and committed by their cycle.
    pub fn cancel_fetches(&self) {
        let mut token = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        token.cancel();
        *token = CancellationToken::new();
    }

    fn cycle_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .child_token()
    }

    /// Run a full cycle and return the number of newly pushed articles.
    pub async fn update(&self, target: &Target, method: Option<SelectionMethod>) -> Result<usize> {
        let fetched = self.fetch(target, method).await?;
        let entries: usize = fetched.iter().map(|f| f.entries.len()).sum();
        let feeds = fetched.len();

        let staged = stage_fetched(&self.repo, fetched).await?;
        let pushed = self.process().await?;

        tracing::info!(
            "Cycle done: {} feeds, {} entries, {} staged, {} pushed",
            feeds,
            entries,
            staged.staged,
            pushed
        );
        Ok(pushed)
    }

    /// Fetch and stage without committing. Returns the fetched entry count.
    pub async fn download(&self, target: &Target) -> Result<usize> {
        let fetched = self.fetch(target, None).await?;
        let entries: usize = fetched.iter().map(|f| f.entries.len()).sum();
        let staged = stage_fetched(&self.repo, fetched).await?;
        tracing::info!("Downloaded {} entries, staged {}", entries, staged.staged);
        Ok(entries)
    }

    /// Commit the staging buffer and fold the result into the counters.
    pub async fn process(&self) -> Result<usize> {
        let ttl = chrono::Duration::hours(self.config.staging_ttl_hours);
        let report = commit_staged(&self.repo, ttl).await?;
        // incremental first, so tags created by the sync are backfilled once
        apply_incremental(&self.repo, &report.deltas).await?;
        sync_tags(&self.repo).await?;

        tracing::info!(
            "Processed {} staged articles, pushed {}",
            report.processed,
            report.pushed
        );
        Ok(report.pushed)
    }

    pub async fn update_feed_metadata(&self, target: &Target) -> Result<usize> {
        update_feed_metadata(&self.repo, target).await
    }

    pub async fn update_tag_metadata(&self, target: &Target) -> Result<usize> {
        update_tag_metadata(&self.repo, target).await
    }

    pub async fn reconcile(&self) -> Result<()> {
        reconcile(&self.repo).await
    }

    /// Register a feed and create any tags it introduces.
    pub async fn add_feed(&self, feed: NewFeed) -> Result<i64> {
        let id = self.repo.insert_feed(feed).await?;
        sync_tags(&self.repo).await?;
        Ok(id)
    }

    /// Delete a feed with its articles, then drop or recount its tags.
    pub async fn delete_feed(&self, id: i64) -> Result<bool> {
        let Some(feed) = self.repo.get_feed(id).await? else {
            return Ok(false);
        };
        if !self.repo.delete_feed(id).await? {
            return Ok(false);
        }

        sync_tags(&self.repo).await?;
        for tag in &feed.tags {
            self.repo.recompute_tag_counters(tag).await?;
        }
        tracing::info!("Deleted feed {}", feed.title);
        Ok(true)
    }

    async fn select(&self, target: &Target, method: Option<SelectionMethod>) -> Result<Vec<Feed>> {
        match target {
            Target::All => {
                let active = self.repo.get_active_feeds().await?;
                let method = method.unwrap_or(self.config.selection);
                let mut rng = rand::rng();
                select_feeds(&active, method, self.config.batch_size, &mut rng)
            }
            other => match self.repo.find_feed(other).await? {
                Some(feed) => Ok(vec![feed]),
                None => Err(AppError::NotFound(format!("feed {:?}", other))),
            },
        }
    }

    async fn fetch(&self, target: &Target, method: Option<SelectionMethod>) -> Result<Vec<FetchedFeed>> {
        let feeds = self.select(target, method).await?;
        if feeds.is_empty() {
            return Ok(Vec::new());
        }

        self.fetcher.check_connectivity().await?;

        let targets: Vec<FetchTarget> = feeds.iter().map(FetchTarget::from).collect();
        let token = self.cycle_token();
        let deadline = self.config.cycle_deadline();
        let timer = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                tracing::warn!("Cycle deadline of {:?} reached, cancelling fetches", deadline);
                token.cancel();
            })
        };

        let fetched = self.fetcher.fetch_all(targets, &token).await;
        timer.abort();

        tracing::debug!("Fetched {} of {} feeds", fetched.len(), feeds.len());
        Ok(fetched)
    }
}
