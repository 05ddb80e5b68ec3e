use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::feed::SelectionMethod;
use crate::models::Target;

use super::Ingestor;

/// A unit of background work. Every job is safe to run more than once.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Update {
        target: Target,
        method: Option<SelectionMethod>,
    },
    Download {
        target: Target,
    },
    Process,
    UpdateFeedMetadata {
        target: Target,
    },
    UpdateTagMetadata {
        target: Target,
    },
    Reconcile,
}

/// Fixed pool of workers draining a shared job channel.
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl JobQueue {
    pub fn start(ingestor: Arc<Ingestor>, workers: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..workers.max(1))
            .map(|n| {
                let ingestor = Arc::clone(&ingestor);
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        let job = rx.lock().await.recv().await;
                        let Some(job) = job else {
                            break;
                        };
                        tracing::debug!("Worker {} running {:?}", n, job);
                        if let Err(e) = run_job(&ingestor, &job).await {
                            tracing::error!("Job {:?} failed: {}", job, e);
                        }
                    }
                })
            })
            .collect();

        Self { tx, workers }
    }

    /// Queue a job and return without waiting for it.
    pub fn enqueue(&self, job: Job) -> Result<()> {
        self.tx
            .send(job)
            .map_err(|e| AppError::Other(anyhow::anyhow!("job queue closed, dropped {:?}", e.0)))
    }

    /// Stop accepting jobs, let the workers finish what is queued, and wait
    /// for them.
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!("Worker panicked: {}", e);
            }
        }
    }
}

async fn run_job(ingestor: &Ingestor, job: &Job) -> Result<()> {
    match job {
        Job::Update { target, method } => {
            ingestor.update(target, *method).await?;
        }
        Job::Download { target } => {
            ingestor.download(target).await?;
        }
        Job::Process => {
            ingestor.process().await?;
        }
        Job::UpdateFeedMetadata { target } => {
            ingestor.update_feed_metadata(target).await?;
        }
        Job::UpdateTagMetadata { target } => {
            ingestor.update_tag_metadata(target).await?;
        }
        Job::Reconcile => ingestor.reconcile().await?,
    }
    Ok(())
}
