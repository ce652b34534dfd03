//! The image service: deduplicates incoming photos, queues their processing
//! and runs the deferred ingestion pipeline.
//!
//! The synchronous half ([`ImageService::queue_mobile_resize`] and
//! [`ImageService::queue_index_resize`]) hashes the source, short-circuits on
//! known content and otherwise hands out the cache path the photo will live
//! at. The deferred half ([`ImageService::execute`]) is driven by the queue
//! worker and never lets a failure escape: every outcome becomes a
//! [`TaskCompleteInfo`].
//!
//! Identical content uploaded twice before the first pipeline finishes is
//! caught by an in-flight map keyed by checksum. The catalog lookup happens
//! under the same lock, and entries are only cleared once the photo row
//! exists, so there is no window where both checks miss.

use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDateTime};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{CachePath, VariantSize};
use crate::catalog::{Photo, PhotoStore};
use crate::config::Config;
use crate::files::{FileSystem, LocalFileSystem};
use crate::imaging::{ImageTransform, Layout, RustImageTransform};
use crate::job::{TaskCompleteInfo, TaskKind, WorkItem};
use crate::metadata::{ExifMetadataReader, MetadataDirectories, MetadataReader};
use crate::notify::CompletionSink;
use crate::queue::WorkQueue;
use crate::tracker::UploadTracker;

/// Result of handing a photo to the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub cache_path: CachePath,
    /// False when the content was already cataloged or already queued
    pub queued: bool,
}

/// How a single execution of a work item ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed { photo_id: i64 },
    Failed,
    /// Shutdown was requested; nothing was reported and the item is gone
    Abandoned,
}

pub struct ImageService {
    config: Arc<Config>,
    queue: Arc<WorkQueue>,
    tracker: Arc<UploadTracker>,
    store: Arc<dyn PhotoStore>,
    sink: Arc<dyn CompletionSink>,
    files: Arc<dyn FileSystem>,
    transform: Arc<dyn ImageTransform>,
    metadata: Arc<dyn MetadataReader>,
    in_flight: Mutex<HashMap<String, CachePath>>,
}

impl ImageService {
    /// Create a service using the local disk, the `image` codecs and `rexif`
    pub fn new(
        config: Arc<Config>,
        queue: Arc<WorkQueue>,
        tracker: Arc<UploadTracker>,
        store: Arc<dyn PhotoStore>,
        sink: Arc<dyn CompletionSink>,
    ) -> Self {
        Self {
            config,
            queue,
            tracker,
            store,
            sink,
            files: Arc::new(LocalFileSystem),
            transform: Arc::new(RustImageTransform),
            metadata: Arc::new(ExifMetadataReader),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_file_system(mut self, files: Arc<dyn FileSystem>) -> Self {
        self.files = files;
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn ImageTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_metadata(mut self, metadata: Arc<dyn MetadataReader>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn tracker(&self) -> &Arc<UploadTracker> {
        &self.tracker
    }

    pub fn store(&self) -> &Arc<dyn PhotoStore> {
        &self.store
    }

    /// Queue an uploaded photo for processing and return its cache path.
    ///
    /// Known content returns the existing path without queueing anything. The
    /// returned path is valid for the eventual photo even though its files
    /// may not exist yet. Errors reading the source are returned directly.
    pub fn queue_mobile_resize(
        &self,
        username: &str,
        source: &Path,
        tags: &[String],
    ) -> Result<CachePath> {
        Ok(self.submit(TaskKind::MobileResize, username, source, tags)?.cache_path)
    }

    /// Same as [`queue_mobile_resize`](Self::queue_mobile_resize) for a file
    /// found by an index scan. The file is cataloged where it lies.
    pub fn queue_index_resize(
        &self,
        username: &str,
        source: &Path,
        tags: &[String],
    ) -> Result<CachePath> {
        Ok(self.submit(TaskKind::IndexResize, username, source, tags)?.cache_path)
    }

    /// Queue a photo of either kind, reporting whether work was queued
    pub fn submit(
        &self,
        kind: TaskKind,
        username: &str,
        source: &Path,
        tags: &[String],
    ) -> Result<Submission> {
        let checksum = self.files.checksum(source)?;
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .ok_or_else(|| anyhow!("Source has no file extension: {:?}", source))?;

        let cache_path = {
            let mut in_flight = self.lock_in_flight();

            if let Some(existing) = self.store.find_by_checksum(&checksum)? {
                debug!("Already cataloged {:?} as photo {}", source, existing.id);
                return Ok(Submission {
                    cache_path: existing.cache_path(),
                    queued: false,
                });
            }

            if let Some(pending) = in_flight.get(&checksum) {
                debug!("Identical content for {:?} is already queued", source);
                return Ok(Submission {
                    cache_path: pending.clone(),
                    queued: false,
                });
            }

            let cache_path = CachePath::allocate(&checksum, &extension);
            in_flight.insert(checksum.clone(), cache_path.clone());
            cache_path
        };

        self.tracker.add_upload(username, source);
        self.queue.enqueue(WorkItem::new(
            kind,
            username,
            source,
            cache_path.clone(),
            checksum,
            tags.to_vec(),
        ));

        info!("➕ Queued {} for {}: {:?} -> {}", kind, username, source, cache_path);
        Ok(Submission {
            cache_path,
            queued: true,
        })
    }

    /// Run the ingestion pipeline for one work item.
    ///
    /// Emits exactly one completion unless shutdown was requested, in which
    /// case the item is dropped silently.
    pub async fn execute(&self, item: WorkItem, cancel: &CancellationToken) -> PipelineOutcome {
        let outcome = match self.run_pipeline(&item, cancel).await {
            Ok(Some(photo_id)) => PipelineOutcome::Completed { photo_id },
            Ok(None) => {
                warn!("🛑 Shutdown requested, dropping {:?}", item.source);
                PipelineOutcome::Abandoned
            }
            Err(e) => {
                error!("❌ Processing FAILED for {:?}: {:#}", item.source, e);
                PipelineOutcome::Failed
            }
        };

        // Listeners may query the tracker as soon as they hear back
        self.lock_in_flight().remove(&item.checksum);
        match outcome {
            PipelineOutcome::Completed { .. } => {
                self.tracker.remove_upload(&item.source);
                self.sink.notify(TaskCompleteInfo::succeeded(&item));
            }
            PipelineOutcome::Failed => {
                self.tracker.remove_upload(&item.source);
                self.sink.notify(TaskCompleteInfo::failed(&item));
            }
            PipelineOutcome::Abandoned => {}
        }
        outcome
    }

    /// Returns `Ok(None)` when a cancellation checkpoint was hit
    async fn run_pipeline(&self, item: &WorkItem, cancel: &CancellationToken) -> Result<Option<i64>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }

        info!("🚀 Processing {:?}", item.source);
        let metadata = self.read_metadata(&item.source).await;

        let full = item
            .cache_path
            .variant_path(&self.config.cache_root, VariantSize::Full);
        let small = item
            .cache_path
            .variant_path(&self.config.cache_root, VariantSize::Small);
        let thumb = item
            .cache_path
            .variant_path(&self.config.cache_root, VariantSize::Thumb);

        // A failure here leaves whatever part of the full variant was written;
        // nothing downstream (move, catalog, tags) has happened yet.
        let mut layout = self
            .resize(&item.source, &full, self.config.full_size)
            .await
            .context("Full size variant")?;

        if let Some(degrees) = metadata.rotation() {
            layout = self.orient(&full, degrees).await?;
        }

        self.resize(&full, &small, self.config.small_size)
            .await
            .context("Small variant")?;
        self.resize(&small, &thumb, self.config.thumb_size)
            .await
            .context("Thumbnail variant")?;

        if cancel.is_cancelled() {
            return Ok(None);
        }

        let taken_at = metadata.taken_at();
        let directory_tags = self.files.directory_tags(&item.source);
        let source_folder = self.relocate(item, taken_at).await?;

        let photo = Photo {
            id: 0,
            checksum: item.checksum.clone(),
            cache_folder: item.cache_path.shard.clone(),
            file_name: item.cache_path.file_name.clone(),
            original_name: item.original_name(),
            source_folder,
            date_taken: taken_at,
            width: layout.width,
            height: layout.height,
            mobile_upload: item.kind.is_mobile(),
            reprocess: false,
            camera_model: metadata.camera_model.clone(),
        };
        let tags = merge_tags(&directory_tags, &item.tags, &self.config);

        let store = Arc::clone(&self.store);
        let photo_id = blocking(move || {
            let photo_id = store.save(&photo).context("Saving photo")?;
            store
                .associate_tags(photo_id, &tags)
                .context("Tagging photo")?;
            Ok(photo_id)
        })
        .await?;

        info!("📷 Cataloged {:?} as photo {}", item.source, photo_id);
        Ok(Some(photo_id))
    }

    async fn read_metadata(&self, source: &Path) -> MetadataDirectories {
        let reader = Arc::clone(&self.metadata);
        let path = source.to_path_buf();
        match blocking(move || reader.read_directories(&path)).await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Unreadable metadata in {:?}: {:#}", source, e);
                MetadataDirectories::default()
            }
        }
    }

    async fn resize(&self, src: &Path, dst: &Path, max_edge: u32) -> Result<Layout> {
        let transform = Arc::clone(&self.transform);
        let (src, dst) = (src.to_path_buf(), dst.to_path_buf());
        blocking(move || transform.resize_by_greatest_dimension(&src, &dst, max_edge)).await
    }

    /// Rotate the full variant upright and drop its orientation tag
    async fn orient(&self, full: &Path, degrees: u32) -> Result<Layout> {
        let transform = Arc::clone(&self.transform);
        let path = full.to_path_buf();
        let (before, after) = blocking(move || {
            let sizes = transform.rotate(&path, degrees)?;
            transform.strip_orientation_metadata(&path)?;
            Ok(sizes)
        })
        .await
        .context("Orientation correction")?;

        debug!(
            "Rotated {:?} by {} degrees: {}x{} -> {}x{}",
            full, degrees, before.width, before.height, after.width, after.height
        );
        Ok(after)
    }

    /// Put the original where it belongs and return its folder relative to
    /// the matching root
    async fn relocate(&self, item: &WorkItem, taken_at: Option<NaiveDateTime>) -> Result<String> {
        match item.kind {
            TaskKind::IndexResize => {
                let parent = item.source.parent().unwrap_or_else(|| Path::new(""));
                let relative = parent.strip_prefix(&self.config.index_root).unwrap_or(parent);
                Ok(to_folder_string(relative))
            }
            TaskKind::MobileResize => {
                let month = taken_at
                    .unwrap_or_else(|| Local::now().naive_local())
                    .format("%Y-%m")
                    .to_string();
                let folder = self.config.mobile_root.join(&month);

                let files = Arc::clone(&self.files);
                let source = item.source.clone();
                let original_name = item.original_name();
                blocking(move || {
                    files.create_directory(&folder)?;
                    let destination = free_destination(&folder, &original_name);
                    files.move_file(&source, &destination, false)
                })
                .await
                .context("Moving original into storage")?;

                Ok(month)
            }
        }
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachePath>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| anyhow!("Background task panicked: {}", e))?
}

/// `folder/name`, or `folder/stem-xxxxxxxx.ext` when that name is taken
fn free_destination(folder: &Path, original_name: &str) -> PathBuf {
    let candidate = folder.join(original_name);
    if !candidate.exists() {
        return candidate;
    }

    let name = Path::new(original_name);
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = &Uuid::new_v4().simple().to_string()[..8];
    let renamed = match name.extension() {
        Some(ext) => format!("{}-{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}-{}", stem, suffix),
    };
    folder.join(renamed)
}

fn to_folder_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|c| c != "/" && c != "\\")
        .collect::<Vec<_>>()
        .join("/")
}

/// Folder tags first, then the caller's. Blank, noise and case-insensitive
/// duplicates are dropped.
pub fn merge_tags(directory_tags: &[String], explicit: &[String], config: &Config) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for tag in directory_tags.iter().chain(explicit) {
        let tag = tag.trim();
        if tag.is_empty() || config.is_noise_tag(tag) {
            continue;
        }
        if merged.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            continue;
        }
        merged.push(tag.to_string());
    }
    merged
}
