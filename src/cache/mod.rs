use anyhow::{anyhow, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Size class of a cached variant, also the name of its directory under the shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantSize {
    Thumb,
    Small,
    Full,
}

impl VariantSize {
    pub const ALL: [VariantSize; 3] = [VariantSize::Thumb, VariantSize::Small, VariantSize::Full];

    pub fn dir_name(&self) -> &'static str {
        match self {
            VariantSize::Thumb => "thumb",
            VariantSize::Small => "small",
            VariantSize::Full => "full",
        }
    }
}

/// Relative location of a photo's cached variants: `{shard}/{uuid}.{ext}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CachePath {
    pub shard: String,
    pub file_name: String,
}

impl CachePath {
    /// Allocate a cache path for newly seen content.
    ///
    /// The shard is the first character of the checksum followed by a random
    /// digit in `1..=9`. It only bounds directory fan-out, so collisions between
    /// checksums are harmless. The file name is a fresh v4 UUID and carries no
    /// relation to the content.
    pub fn allocate(checksum: &str, extension: &str) -> Self {
        let lead = checksum.chars().next().unwrap_or('0');
        let digit: u8 = rand::thread_rng().gen_range(1..=9);
        let extension = extension.trim_start_matches('.').to_lowercase();

        Self {
            shard: format!("{}{}", lead, digit),
            file_name: format!("{}.{}", Uuid::new_v4(), extension),
        }
    }

    /// Rebuild a cache path from an existing record
    pub fn from_parts(shard: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            shard: shard.into(),
            file_name: file_name.into(),
        }
    }

    /// Parse the `{shard}/{file}` form handed out to callers
    pub fn parse(value: &str) -> Result<Self> {
        let (shard, file_name) = value
            .split_once('/')
            .ok_or_else(|| anyhow!("Cache path has no shard separator: {}", value))?;

        if shard.is_empty() || file_name.is_empty() || file_name.contains('/') {
            return Err(anyhow!("Malformed cache path: {}", value));
        }

        Ok(Self::from_parts(shard, file_name))
    }

    /// On-disk location of one variant: `{root}/{shard}/{size}/{file}`
    pub fn variant_path(&self, cache_root: &Path, size: VariantSize) -> PathBuf {
        cache_root
            .join(&self.shard)
            .join(size.dir_name())
            .join(&self.file_name)
    }

    /// Extension of the generated file, without the dot
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.file_name).extension()?.to_str()
    }
}

impl fmt::Display for CachePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.shard, self.file_name)
    }
}
