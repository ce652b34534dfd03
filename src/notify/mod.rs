use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::job::TaskCompleteInfo;

/// Receives the one completion report emitted per executed work item
pub trait CompletionSink: Send + Sync {
    fn notify(&self, info: TaskCompleteInfo);
}

/// Writes completions to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl CompletionSink for LogSink {
    fn notify(&self, info: TaskCompleteInfo) {
        if info.success {
            info!("✅ {} finished for {}: {:?}", info.kind, info.username, info.path);
        } else {
            warn!("❌ {} FAILED for {}: {:?}", info.kind, info.username, info.path);
        }
    }
}

/// Forwards completions over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<TaskCompleteInfo>,
}

impl ChannelSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TaskCompleteInfo>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl CompletionSink for ChannelSink {
    fn notify(&self, info: TaskCompleteInfo) {
        LogSink.notify(info.clone());
        if self.sender.send(info).is_err() {
            debug!("Completion receiver dropped");
        }
    }
}
