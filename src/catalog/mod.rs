use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::cache::CachePath;

/// A cataloged photo
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Photo {
    pub id: i64,
    pub checksum: String,
    pub cache_folder: String,
    pub file_name: String,
    pub original_name: String,
    pub source_folder: String,
    pub date_taken: Option<NaiveDateTime>,
    pub width: u32,
    pub height: u32,
    pub mobile_upload: bool,
    pub reprocess: bool,
    #[serde(default)]
    pub camera_model: Option<String>,
}

impl Photo {
    pub fn cache_path(&self) -> CachePath {
        CachePath::from_parts(&self.cache_folder, &self.file_name)
    }
}

/// Photo and tag persistence as seen by the ingestion pipeline
pub trait PhotoStore: Send + Sync {
    fn find_by_checksum(&self, checksum: &str) -> Result<Option<Photo>>;

    /// Insert a photo and return its id. The `id` field of the argument is ignored.
    fn save(&self, photo: &Photo) -> Result<i64>;

    fn associate_tag(&self, photo_id: i64, tag: &str) -> Result<()>;

    /// Associate several tags at once. Stores that persist on every write
    /// override this to persist once.
    fn associate_tags(&self, photo_id: i64, tags: &[String]) -> Result<()> {
        for tag in tags {
            self.associate_tag(photo_id, tag)?;
        }
        Ok(())
    }

    fn tags_for(&self, photo_id: i64) -> Result<Vec<String>>;

    fn all(&self) -> Result<Vec<Photo>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogData {
    next_id: i64,
    photos: BTreeMap<i64, Photo>,
    tags: BTreeMap<i64, BTreeSet<String>>,
}

/// In-memory catalog, optionally mirrored to a JSON file after every write
pub struct JsonCatalog {
    data: Mutex<CatalogData>,
    path: Option<PathBuf>,
}

impl JsonCatalog {
    /// Catalog that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            data: Mutex::new(CatalogData::default()),
            path: None,
        }
    }

    /// Open a catalog file, starting empty if it does not exist yet
    pub fn open(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read catalog {:?}", path))?;
            let data: CatalogData = serde_json::from_str(&content)
                .with_context(|| format!("Corrupt catalog {:?}", path))?;
            info!("📚 Loaded catalog with {} photos", data.photos.len());
            data
        } else {
            debug!("Starting new catalog at {:?}", path);
            CatalogData::default()
        };

        Ok(Self {
            data: Mutex::new(data),
            path: Some(path.to_path_buf()),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CatalogData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn flush(&self, data: &CatalogData) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write then rename so a crash never leaves a half-written catalog
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(data)?)?;
        fs::rename(&tmp, path).with_context(|| format!("Failed to write catalog {:?}", path))?;
        Ok(())
    }
}

impl PhotoStore for JsonCatalog {
    fn find_by_checksum(&self, checksum: &str) -> Result<Option<Photo>> {
        Ok(self
            .lock()
            .photos
            .values()
            .find(|p| p.checksum == checksum)
            .cloned())
    }

    fn save(&self, photo: &Photo) -> Result<i64> {
        let mut data = self.lock();
        if data.photos.values().any(|p| p.checksum == photo.checksum) {
            return Err(anyhow!("Photo with checksum {} already exists", photo.checksum));
        }

        let id = data.next_id + 1;
        data.photos.insert(id, Photo { id, ..photo.clone() });
        data.next_id = id;

        // Memory never holds a row the file does not
        if let Err(e) = self.flush(&data) {
            data.photos.remove(&id);
            data.next_id = id - 1;
            return Err(e);
        }
        Ok(id)
    }

    fn associate_tag(&self, photo_id: i64, tag: &str) -> Result<()> {
        self.associate_tags(photo_id, &[tag.to_string()])
    }

    fn associate_tags(&self, photo_id: i64, tags: &[String]) -> Result<()> {
        let mut data = self.lock();
        if !data.photos.contains_key(&photo_id) {
            return Err(anyhow!("No photo with id {}", photo_id));
        }

        let entry = data.tags.entry(photo_id).or_default();
        let added: Vec<String> = tags
            .iter()
            .filter(|tag| entry.insert(tag.to_string()))
            .cloned()
            .collect();
        if added.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.flush(&data) {
            if let Some(entry) = data.tags.get_mut(&photo_id) {
                for tag in &added {
                    entry.remove(tag);
                }
                if entry.is_empty() {
                    data.tags.remove(&photo_id);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    fn tags_for(&self, photo_id: i64) -> Result<Vec<String>> {
        Ok(self
            .lock()
            .tags
            .get(&photo_id)
            .map(|tags| tags.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn all(&self) -> Result<Vec<Photo>> {
        Ok(self.lock().photos.values().cloned().collect())
    }
}
