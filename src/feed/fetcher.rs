use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Feed, NewArticle};

use super::parser::parse_entries;

/// One feed to pull in a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    pub feed_id: i64,
    pub title: String,
    pub url: String,
}

impl From<&Feed> for FetchTarget {
    fn from(feed: &Feed) -> Self {
        Self {
            feed_id: feed.id,
            title: feed.title.clone(),
            url: feed.url.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedFeed {
    pub target: FetchTarget,
    pub entries: Vec<NewArticle>,
}

pub struct FeedFetcher {
    client: Client,
    concurrency: usize,
    probe_url: String,
}

impl FeedFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            concurrency: config.concurrency.max(1),
            probe_url: config.probe_url.clone(),
        })
    }

    /// Make sure the network is reachable before a batch. Any HTTP response
    /// counts as reachable, only transport failures fail the probe.
    pub async fn check_connectivity(&self) -> Result<()> {
        match self.client.get(&self.probe_url).send().await {
            Ok(response) => {
                tracing::debug!("Connectivity probe answered with {}", response.status());
                Ok(())
            }
            Err(e) => Err(AppError::Connectivity(format!("{}: {}", self.probe_url, e))),
        }
    }

    pub async fn fetch_payload(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }

    /// Fetch and normalize one feed. Every transport or HTTP failure
    /// degrades to an empty list.
    pub async fn fetch_feed(&self, target: &FetchTarget) -> Vec<NewArticle> {
        match self.fetch_payload(&target.url).await {
            Ok(payload) => {
                let entries = parse_entries(&payload, Utc::now());
                tracing::debug!("Fetched {} articles from {}", entries.len(), target.title);
                entries
            }
            Err(e) => {
                tracing::debug!("Failed to fetch {}: {}", target.url, e);
                Vec::new()
            }
        }
    }

    /// Fetch all targets concurrently, at most `concurrency` at a time.
    ///
    /// Results come back in completion order. Targets still pending when
    /// `cancel` fires are left out of the result.
    pub async fn fetch_all(
        &self,
        targets: Vec<FetchTarget>,
        cancel: &CancellationToken,
    ) -> Vec<FetchedFeed> {
        stream::iter(targets)
            .map(|target| async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("Fetch of {} cancelled", target.title);
                        None
                    }
                    entries = self.fetch_feed(&target) => Some(FetchedFeed { target, entries }),
                }
            })
            .buffer_unordered(self.concurrency)
            .filter_map(|r| async { r })
            .collect()
            .await
    }
}
