use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::ingest::{Ingestor, Job, JobQueue};
use crate::models::{CorpusStats, Feed, FilterSpec, NewFeed, QueryPage};

pub struct App {
    pub config: Config,
    pub repository: Arc<Repository>,
    ingestor: Arc<Ingestor>,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Arc::new(Repository::new(&config.db_path).await?);
        Self::with_repository(config, repository)
    }

    pub fn with_repository(config: &Config, repository: Arc<Repository>) -> Result<Self> {
        let ingestor = Arc::new(Ingestor::new(Arc::clone(&repository), config.clone())?);
        Ok(Self {
            config: config.clone(),
            repository,
            ingestor,
        })
    }

    pub fn ingestor(&self) -> &Arc<Ingestor> {
        &self.ingestor
    }

    pub async fn add_feed(&self, title: &str, url: &str, tags: &[String]) -> Result<i64> {
        url::Url::parse(url).map_err(|e| anyhow::anyhow!("invalid feed url {}: {}", url, e))?;
        let feed = NewFeed::new(title, url).with_tags(tags.iter().cloned());
        self.ingestor.add_feed(feed).await
    }

    /// Serve one page of the corpus from a request-style parameter bag.
    pub async fn query(&self, params: &HashMap<String, String>) -> Result<QueryPage> {
        let spec = FilterSpec::from_params(
            params,
            self.config.page_limit,
            self.config.default_sort,
            self.config.default_view,
        )?;
        self.repository.query_articles(spec).await
    }

    pub async fn stats(&self) -> Result<CorpusStats> {
        self.repository.statistics().await
    }

    pub async fn feeds_without_articles(&self) -> Result<Vec<Feed>> {
        self.repository.feeds_without_articles().await
    }

    /// Enqueue a refresh every `refresh_interval_minutes` and a full
    /// reconcile every `reconcile_every` refreshes, until ctrl-c.
    pub async fn run_daemon(&self) -> Result<()> {
        let queue = JobQueue::start(Arc::clone(&self.ingestor), self.config.workers);
        let period = Duration::from_secs(u64::from(self.config.refresh_interval_minutes.max(1)) * 60);
        let mut interval = tokio::time::interval(period);
        let mut cycles: u32 = 0;

        tracing::info!(
            "Scheduler started: refresh every {:?} with {} workers",
            period,
            self.config.workers
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    queue.enqueue(Job::Update {
                        target: Default::default(),
                        method: None,
                    })?;
                    cycles += 1;
                    if self.config.reconcile_every > 0 && cycles % self.config.reconcile_every == 0 {
                        queue.enqueue(Job::Reconcile)?;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down scheduler");
                    break;
                }
            }
        }

        self.ingestor.cancel_fetches();
        queue.shutdown().await;
        Ok(())
    }
}
