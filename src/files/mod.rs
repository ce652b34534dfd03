use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Disk primitives the ingestion pipeline relies on
pub trait FileSystem: Send + Sync {
    /// Lowercase hex digest of the file's bytes
    fn checksum(&self, path: &Path) -> Result<String>;

    /// Up to two tags taken from the names of the parent and grandparent folders
    fn directory_tags(&self, path: &Path) -> Vec<String>;

    fn move_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<()>;

    fn create_directory(&self, path: &Path) -> Result<()>;
}

/// [`FileSystem`] backed by the local disk, hashing with SHA-256
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl FileSystem for LocalFileSystem {
    fn checksum(&self, path: &Path) -> Result<String> {
        let mut file =
            fs::File::open(path).with_context(|| format!("Cannot open {:?} for hashing", path))?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 64 * 1024];

        loop {
            let read = file.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    fn directory_tags(&self, path: &Path) -> Vec<String> {
        let mut tags = Vec::with_capacity(2);
        let mut ancestors = path.ancestors().skip(1);

        let parent = ancestors.next().and_then(folder_name);
        let grandparent = ancestors.next().and_then(folder_name);

        if let Some(parent) = parent {
            tags.push(parent);
        }
        if let Some(grandparent) = grandparent {
            if !tags.iter().any(|t| t.eq_ignore_ascii_case(&grandparent)) {
                tags.push(grandparent);
            }
        }
        tags
    }

    fn move_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<()> {
        if dst.exists() {
            if !overwrite {
                return Err(anyhow!("Destination already exists: {:?}", dst));
            }
            fs::remove_file(dst)?;
        }

        if let Err(rename_err) = fs::rename(src, dst) {
            // Rename cannot cross mount points; fall back to copy + delete
            fs::copy(src, dst).map_err(|e| {
                anyhow!(
                    "Failed to move {:?} to {:?}: {} (copy: {})",
                    src,
                    dst,
                    rename_err,
                    e
                )
            })?;
            fs::remove_file(src)?;
        }
        debug!("Moved {:?} -> {:?}", src, dst);
        Ok(())
    }

    fn create_directory(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("Cannot create directory {:?}", path))
    }
}

fn folder_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?.trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
