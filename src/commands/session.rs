use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::JsonCatalog;
use crate::config::Config;
use crate::job::TaskCompleteInfo;
use crate::notify::ChannelSink;
use crate::queue::WorkQueue;
use crate::service::ImageService;
use crate::tracker::UploadTracker;
use crate::worker::QueueWorker;

/// Outcome of waiting for a batch of queued photos
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub interrupted: bool,
}

/// A running ingestion host: catalog, queue, one worker and the tracker sweeper
pub struct IngestSession {
    pub config: Arc<Config>,
    pub service: Arc<ImageService>,
    completions: UnboundedReceiver<TaskCompleteInfo>,
    cancel: CancellationToken,
    worker: JoinHandle<usize>,
    sweeper: JoinHandle<()>,
}

impl IngestSession {
    pub fn start(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let store = Arc::new(JsonCatalog::open(&config.catalog_path)?);
        let tracker = Arc::new(UploadTracker::new(config.upload_max_age()));
        let (sink, completions) = ChannelSink::channel();

        let service = Arc::new(ImageService::new(
            config.clone(),
            Arc::new(WorkQueue::new()),
            tracker.clone(),
            store,
            Arc::new(sink),
        ));

        let cancel = CancellationToken::new();
        let worker = QueueWorker::new("worker-1", service.clone()).spawn(cancel.clone());
        let sweeper = tracker.spawn_sweeper(config.sweep_interval(), cancel.clone());

        Ok(Self {
            config,
            service,
            completions,
            cancel,
            worker,
            sweeper,
        })
    }

    /// Wait for `expected` completions, or until Ctrl-C
    pub async fn wait_for(&mut self, expected: usize) -> Result<SessionSummary> {
        let mut summary = SessionSummary::default();
        if expected == 0 {
            return Ok(summary);
        }

        let progress = ProgressBar::new(expected as u64);
        progress.set_style(
            ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );

        tokio::pin! {
            let shutdown_signal = signal::ctrl_c();
        }

        while summary.succeeded + summary.failed < expected {
            tokio::select! {
                _ = &mut shutdown_signal => {
                    info!("🛑 Shutdown signal received. Exiting gracefully.");
                    self.cancel.cancel();
                    summary.interrupted = true;
                    break;
                }

                received = self.completions.recv() => {
                    let Some(done) = received else {
                        return Err(anyhow!("Completion channel closed unexpectedly"));
                    };
                    if done.success {
                        summary.succeeded += 1;
                    } else {
                        summary.failed += 1;
                    }
                    progress.set_message(
                        done.path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                    );
                    progress.inc(1);
                }
            }
        }

        progress.finish_and_clear();
        Ok(summary)
    }

    /// Stop the worker and the sweeper
    pub async fn shutdown(self) -> Result<usize> {
        self.cancel.cancel();
        let processed = self.worker.await?;
        self.sweeper.await?;

        let left = self.service.queue().len();
        if left > 0 {
            warn!("{} queued items were not processed", left);
        }
        Ok(processed)
    }
}
