use anyhow::Result;
use image::{Rgb, RgbImage};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use serial_test::serial;
use shoebox::cache::VariantSize;
use shoebox::catalog::{JsonCatalog, PhotoStore};
use shoebox::commands::ingest::IngestCommand;
use shoebox::config::Config;
use shoebox::files::{FileSystem, LocalFileSystem};
use shoebox::imaging::{ImageTransform, LayoutKind, RustImageTransform};
use shoebox::job::{TaskCompleteInfo, TaskKind};
use shoebox::notify::ChannelSink;
use shoebox::queue::WorkQueue;
use shoebox::service::ImageService;
use shoebox::tracker::UploadTracker;
use shoebox::worker::QueueWorker;

/// Local disk, but every file hashes to the same fixed digest
struct FixedChecksum(&'static str);

impl FileSystem for FixedChecksum {
    fn checksum(&self, path: &Path) -> Result<String> {
        LocalFileSystem.checksum(path)?;
        Ok(self.0.to_string())
    }

    fn directory_tags(&self, path: &Path) -> Vec<String> {
        LocalFileSystem.directory_tags(path)
    }

    fn move_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<()> {
        LocalFileSystem.move_file(src, dst, overwrite)
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        LocalFileSystem.create_directory(path)
    }
}

fn small_config(base: &Path) -> Config {
    let mut config = Config::rooted_at(base);
    config.full_size = 800;
    config.small_size = 320;
    config.thumb_size = 96;
    config
}

fn write_photo(path: &Path, width: u32, height: u32) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
    .save(path)
    .unwrap();
}

fn service_with(
    config: Config,
    files: Arc<dyn FileSystem>,
) -> (Arc<ImageService>, UnboundedReceiver<TaskCompleteInfo>) {
    let (sink, completions) = ChannelSink::channel();
    let service = ImageService::new(
        Arc::new(config),
        Arc::new(WorkQueue::new()),
        Arc::new(UploadTracker::default()),
        Arc::new(JsonCatalog::in_memory()),
        Arc::new(sink),
    )
    .with_file_system(files);
    (Arc::new(service), completions)
}

async fn next_completion(completions: &mut UnboundedReceiver<TaskCompleteInfo>) -> TaskCompleteInfo {
    tokio::time::timeout(Duration::from_secs(30), completions.recv())
        .await
        .expect("pipeline did not finish in time")
        .expect("completion channel closed")
}

/// Upload vacation.jpg, let the worker process it, then upload the same bytes again
#[tokio::test]
async fn test_vacation_upload_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let config = small_config(temp_dir.path());
    let cache_root = config.cache_root.clone();
    let (service, mut completions) =
        service_with(config, Arc::new(FixedChecksum("abc123")));

    let upload = temp_dir.path().join("uploads/Holidays/vacation.jpg");
    write_photo(&upload, 1600, 1200);
    let duplicate = temp_dir.path().join("uploads/other/IMG_0001.jpg");
    fs::create_dir_all(duplicate.parent().unwrap()).unwrap();
    fs::copy(&upload, &duplicate).unwrap();

    let path = service.queue_mobile_resize("alice", &upload, &[]).unwrap();
    let pattern = Regex::new(r"^a[1-9]/[0-9a-f-]{36}\.jpg$").unwrap();
    assert!(pattern.is_match(&path.to_string()), "got {}", path);
    assert!(!service.tracker().is_processing_done("alice"));

    let cancel = CancellationToken::new();
    let worker = QueueWorker::new("test", service.clone()).spawn(cancel.clone());

    let done = next_completion(&mut completions).await;
    assert!(done.success);
    assert_eq!(done.kind, TaskKind::MobileResize);
    assert_eq!(done.username, "alice");

    let transform = RustImageTransform;
    let mut previous: Option<(u32, u32)> = None;
    for size in [VariantSize::Full, VariantSize::Small, VariantSize::Thumb] {
        let file = path.variant_path(&cache_root, size);
        let layout = transform.layout_info(&file).unwrap();
        assert_eq!(layout.kind(), LayoutKind::Landscape);
        if let Some((w, h)) = previous {
            assert!(layout.width <= w && layout.height <= h);
        }
        previous = Some((layout.width, layout.height));
    }
    let full = transform
        .layout_info(&path.variant_path(&cache_root, VariantSize::Full))
        .unwrap();
    assert!(full.width <= 800);

    let photo = service.store().find_by_checksum("abc123").unwrap().unwrap();
    assert_eq!(photo.cache_path(), path);
    assert_eq!(photo.original_name, "vacation.jpg");
    assert!(service
        .store()
        .tags_for(photo.id)
        .unwrap()
        .contains(&"Holidays".to_string()));
    assert!(service.tracker().is_processing_done("alice"));
    assert_eq!(service.tracker().upload_count("alice"), 1);

    // Same bytes under a different name
    let again = service.queue_mobile_resize("alice", &duplicate, &[]).unwrap();
    assert_eq!(again, path);
    assert!(service.queue().is_empty());
    assert!(duplicate.exists());
    assert!(completions.try_recv().is_err());

    cancel.cancel();
    assert_eq!(worker.await.unwrap(), 1);
    assert_eq!(service.store().all().unwrap().len(), 1);
}

/// Many request threads uploading the same new content queue it once
#[tokio::test]
async fn test_concurrent_duplicate_uploads_queue_once() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _completions) =
        service_with(small_config(temp_dir.path()), Arc::new(LocalFileSystem));

    let original = temp_dir.path().join("uploads/a.jpg");
    write_photo(&original, 64, 64);
    let copies: Vec<PathBuf> = (0..8)
        .map(|n| {
            let copy = temp_dir.path().join(format!("uploads/copy-{}.jpg", n));
            fs::copy(&original, &copy).unwrap();
            copy
        })
        .collect();

    let paths: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = copies
            .iter()
            .map(|copy| {
                let service = &service;
                scope.spawn(move || service.queue_mobile_resize("bob", copy, &[]).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(service.queue().len(), 1);
    assert!(paths.iter().all(|p| p == &paths[0]));
}

/// Two workers share one queue and still produce one photo per checksum
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_two_workers_share_queue() {
    let temp_dir = TempDir::new().unwrap();
    let (service, mut completions) =
        service_with(small_config(temp_dir.path()), Arc::new(LocalFileSystem));

    let mut queued = 0;
    for n in 0..4u32 {
        let file = temp_dir.path().join(format!("uploads/Day{}/p{}.jpg", n, n));
        write_photo(&file, 100 + n * 10, 80);
        service.queue_mobile_resize("carol", &file, &[]).unwrap();
        queued += 1;
    }

    let cancel = CancellationToken::new();
    let first = QueueWorker::new("w1", service.clone()).spawn(cancel.clone());
    let second = QueueWorker::new("w2", service.clone()).spawn(cancel.clone());

    for _ in 0..queued {
        assert!(next_completion(&mut completions).await.success);
    }
    cancel.cancel();

    let processed = first.await.unwrap() + second.await.unwrap();
    assert_eq!(processed, queued);
    assert_eq!(service.store().all().unwrap().len(), 4);
    assert_eq!(service.tracker().upload_count("carol"), 4);
}

/// The catalog file makes dedup survive across runs
#[tokio::test]
async fn test_ingest_command_dedups_across_runs() {
    let temp_dir = TempDir::new().unwrap();
    let config = small_config(temp_dir.path());

    let first = temp_dir.path().join("inbox/Birthday/cake.jpg");
    write_photo(&first, 200, 300);
    let second = temp_dir.path().join("inbox/later/cake-copy.jpg");
    fs::create_dir_all(second.parent().unwrap()).unwrap();
    fs::copy(&first, &second).unwrap();

    let summary = IngestCommand::new(
        vec![first.clone()],
        "dana".to_string(),
        vec!["party".to_string()],
        config.clone(),
    )
    .execute()
    .await
    .unwrap();
    assert_eq!(summary.succeeded, 1);
    assert!(!first.exists());

    let summary = IngestCommand::new(vec![second.clone()], "dana".to_string(), Vec::new(), config.clone())
        .execute()
        .await
        .unwrap();
    assert_eq!(summary.succeeded + summary.failed, 0);
    assert!(second.exists());

    let catalog = JsonCatalog::open(&config.catalog_path).unwrap();
    let photos = catalog.all().unwrap();
    assert_eq!(photos.len(), 1);
    assert_eq!((photos[0].width, photos[0].height), (200, 300));
    assert_eq!(
        catalog.tags_for(photos[0].id).unwrap(),
        vec!["Birthday", "inbox", "party"]
    );
}

/// Test help commands work
#[test]
#[serial]
fn test_help_commands() {
    let help_output = Command::new(env!("CARGO_BIN_EXE_shoebox"))
        .arg("--help")
        .output()
        .expect("Failed to execute help command");

    assert!(help_output.status.success(), "Help command failed");

    let help_stdout = String::from_utf8_lossy(&help_output.stdout);
    assert!(help_stdout.contains("shoebox"), "Help should contain program name");
    assert!(help_stdout.contains("ingest"), "Help should list ingest command");
    assert!(help_stdout.contains("index"), "Help should list index command");
    assert!(help_stdout.contains("status"), "Help should list status command");
}

/// Test the complete ingest -> status workflow through the binary
#[test]
#[serial]
fn test_ingest_and_status_workflow() {
    let temp_dir = TempDir::new().unwrap();
    let base = temp_dir.path();
    let config_path = base.join("shoebox.json");
    fs::write(
        &config_path,
        serde_json::to_string(&small_config(base)).unwrap(),
    )
    .unwrap();

    let photo = base.join("camera/Beach/sunset.jpg");
    write_photo(&photo, 300, 200);

    let ingest_output = Command::new(env!("CARGO_BIN_EXE_shoebox"))
        .args(["--config", config_path.to_str().unwrap()])
        .args(["ingest", "--user", "erin", photo.to_str().unwrap()])
        .output()
        .expect("Failed to execute ingest command");
    assert!(
        ingest_output.status.success(),
        "Ingest failed: {}",
        String::from_utf8_lossy(&ingest_output.stderr)
    );
    assert!(!photo.exists());

    let status_output = Command::new(env!("CARGO_BIN_EXE_shoebox"))
        .args(["--config", config_path.to_str().unwrap(), "status"])
        .output()
        .expect("Failed to execute status command");
    assert!(status_output.status.success(), "Status command failed");

    let status_stdout = String::from_utf8_lossy(&status_output.stdout);
    assert!(status_stdout.contains("Photos:         1"), "got: {status_stdout}");
    assert!(status_stdout.contains("Beach"), "got: {status_stdout}");
}

/// Test that invalid paths are handled gracefully
#[test]
#[serial]
fn test_invalid_paths() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("shoebox.json");
    fs::write(
        &config_path,
        serde_json::to_string(&Config::rooted_at(temp_dir.path())).unwrap(),
    )
    .unwrap();
    let config_arg = config_path.to_str().unwrap();

    let ingest_output = Command::new(env!("CARGO_BIN_EXE_shoebox"))
        .args(["--config", config_arg, "ingest", "--user", "x", "/non/existent/a.jpg"])
        .output()
        .expect("Failed to execute ingest command");
    assert!(!ingest_output.status.success(), "Ingest should fail with invalid path");

    let index_output = Command::new(env!("CARGO_BIN_EXE_shoebox"))
        .args(["--config", config_arg, "index", "--user", "x", "--root", "/non/existent/path"])
        .output()
        .expect("Failed to execute index command");
    assert!(!index_output.status.success(), "Index should fail with invalid path");

    let status_output = Command::new(env!("CARGO_BIN_EXE_shoebox"))
        .args(["--config", config_arg, "status"])
        .output()
        .expect("Failed to execute status command");
    assert!(!status_output.status.success(), "Status should fail without a catalog");
}
