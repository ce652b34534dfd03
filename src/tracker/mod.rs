use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long an upload may stay pending before the sweep gives up on it
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(15 * 60);

/// How often the sweeper runs
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct UploadInfo {
    username: String,
    queued_at: Instant,
}

/// Pending and completed uploads for one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserUploadCounters {
    pub pending: usize,
    pub completed: usize,
}

#[derive(Default)]
struct TrackerState {
    uploads: HashMap<PathBuf, UploadInfo>,
    /// Lives as long as the process. Users whose counters are both zero are
    /// pruned by the sweep.
    counters: HashMap<String, UserUploadCounters>,
}

/// Per-user view of in-flight uploads.
///
/// Written from request handlers, the queue consumer and the sweeper, so all
/// state sits behind one mutex. Counts are a liveness signal, not an audit
/// trail.
pub struct UploadTracker {
    state: Mutex<TrackerState>,
    max_age: Duration,
}

impl Default for UploadTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE)
    }
}

impl UploadTracker {
    pub fn new(max_age: Duration) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            max_age,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_upload(&self, username: &str, file_path: &Path) {
        let mut state = self.lock();
        let previous = state.uploads.insert(
            file_path.to_path_buf(),
            UploadInfo {
                username: username.to_string(),
                queued_at: Instant::now(),
            },
        );

        // Re-adding a tracked path refreshes it instead of counting it twice
        if previous.is_none() {
            state.counters.entry(username.to_string()).or_default().pending += 1;
        }
        debug!("Tracking upload {:?} for {}", file_path, username);
    }

    /// Mark a tracked file as finished. Unknown paths are ignored.
    pub fn remove_upload(&self, file_path: &Path) {
        let mut state = self.lock();
        let Some(info) = state.uploads.remove(file_path) else {
            debug!("Upload {:?} is not tracked", file_path);
            return;
        };

        let counters = state.counters.entry(info.username).or_default();
        counters.pending = counters.pending.saturating_sub(1);
        counters.completed += 1;
    }

    /// True when the user has nothing pending, including users never seen
    pub fn is_processing_done(&self, username: &str) -> bool {
        self.lock()
            .counters
            .get(username)
            .map(|c| c.pending == 0)
            .unwrap_or(true)
    }

    /// Number of uploads completed for the user
    pub fn upload_count(&self, username: &str) -> usize {
        self.snapshot(username).completed
    }

    pub fn snapshot(&self, username: &str) -> UserUploadCounters {
        self.lock()
            .counters
            .get(username)
            .copied()
            .unwrap_or_default()
    }

    /// Drop uploads queued before `now - max_age` and reset their owners'
    /// pending counters. Returns the number of uploads dropped.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut state = self.lock();
        let max_age = self.max_age;

        let stale: Vec<PathBuf> = state
            .uploads
            .iter()
            .filter(|(_, info)| now.saturating_duration_since(info.queued_at) > max_age)
            .map(|(path, _)| path.clone())
            .collect();

        for path in &stale {
            if let Some(info) = state.uploads.remove(path) {
                warn!(
                    "⏰ Upload {:?} for {} never completed, dropping it",
                    path, info.username
                );
                if let Some(counters) = state.counters.get_mut(&info.username) {
                    counters.pending = 0;
                }
            }
        }

        state
            .counters
            .retain(|_, c| *c != UserUploadCounters::default());

        stale.len()
    }

    /// Number of users with counters on record
    pub fn tracked_users(&self) -> usize {
        self.lock().counters.len()
    }

    /// Run [`sweep`](Self::sweep) on a fixed interval until the token fires
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Upload sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let dropped = tracker.sweep(Instant::now());
                        if dropped > 0 {
                            info!("🧹 Swept {} stale uploads", dropped);
                        }
                    }
                }
            }
        })
    }
}
