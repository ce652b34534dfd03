use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::cache::CachePath;

/// Where a source image came from
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskKind {
    /// Uploaded from a client; the original is moved under the mobile root
    MobileResize,
    /// Discovered by an index scan; the original stays under the index root
    IndexResize,
}

impl TaskKind {
    pub fn is_mobile(&self) -> bool {
        matches!(self, TaskKind::MobileResize)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::MobileResize => write!(f, "mobile-resize"),
            TaskKind::IndexResize => write!(f, "index-resize"),
        }
    }
}

/// One deferred unit of ingestion work.
///
/// Created by the image service, executed exactly once by the queue consumer.
/// It is plain data so queued work can be inspected without running it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItem {
    pub id: String,
    pub kind: TaskKind,
    pub username: String,
    pub source: PathBuf,
    pub cache_path: CachePath,
    pub checksum: String,
    pub tags: Vec<String>,
}

impl WorkItem {
    pub fn new(
        kind: TaskKind,
        username: &str,
        source: &Path,
        cache_path: CachePath,
        checksum: String,
        tags: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            username: username.to_string(),
            source: source.to_path_buf(),
            cache_path,
            checksum,
            tags,
        }
    }

    /// File name of the source as it was handed to us
    pub fn original_name(&self) -> String {
        self.source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// One-shot report emitted after a work item ran
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskCompleteInfo {
    pub kind: TaskKind,
    pub username: String,
    pub success: bool,
    pub path: PathBuf,
}

impl TaskCompleteInfo {
    pub fn succeeded(item: &WorkItem) -> Self {
        Self::from_item(item, true)
    }

    pub fn failed(item: &WorkItem) -> Self {
        Self::from_item(item, false)
    }

    fn from_item(item: &WorkItem, success: bool) -> Self {
        Self {
            kind: item.kind,
            username: item.username.clone(),
            success,
            path: item.source.clone(),
        }
    }
}
