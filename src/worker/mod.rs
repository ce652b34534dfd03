use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::queue::{QueueError, WorkQueue};
use crate::service::ImageService;

/// The consumer side of the work queue.
///
/// Items are executed one at a time in dequeue order. Running more than one
/// worker against the same queue is safe; the image service serializes
/// duplicate content itself.
pub struct QueueWorker {
    pub id: String,
    queue: Arc<WorkQueue>,
    service: Arc<ImageService>,
}

impl QueueWorker {
    pub fn new(id: impl Into<String>, service: Arc<ImageService>) -> Self {
        Self {
            id: id.into(),
            queue: Arc::clone(service.queue()),
            service,
        }
    }

    /// Drain the queue until the token fires. Returns the number of items run.
    pub async fn run(&self, cancel: CancellationToken) -> usize {
        info!("✅ Worker {} started", self.id);
        let mut processed = 0;

        loop {
            let item = match self.queue.dequeue(&cancel).await {
                Ok(item) => item,
                Err(QueueError::Cancelled) => {
                    info!("🛑 Worker {} shutting down after {} items", self.id, processed);
                    break;
                }
            };

            info!(
                "➡️ Worker {} picked up {} for {}: {:?}",
                self.id, item.kind, item.username, item.source
            );
            self.service.execute(item, &cancel).await;
            processed += 1;
        }

        processed
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<usize> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
