use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use regex::Regex;
use rexif::{ExifData, ExifTag, TagValue};
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, trace};

/// EXIF-style fields the pipeline cares about, as readable text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataDirectories {
    pub capture_time: Option<String>,
    pub orientation: Option<String>,
    pub camera_model: Option<String>,
}

impl MetadataDirectories {
    /// Capture time, if present and parsable
    pub fn taken_at(&self) -> Option<NaiveDateTime> {
        self.capture_time.as_deref().and_then(parse_capture_time)
    }

    /// Clockwise rotation needed to display the image upright
    pub fn rotation(&self) -> Option<u32> {
        self.orientation.as_deref().and_then(parse_rotation)
    }
}

pub trait MetadataReader: Send + Sync {
    /// Read metadata from an image. Files without metadata yield empty fields.
    fn read_directories(&self, path: &Path) -> Result<MetadataDirectories>;
}

static ROTATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*rotate\s+(\d+)(?:\s*cw)?\s*$").expect("rotation pattern is valid")
});

/// Parse an orientation description such as `Rotate 90 CW`.
///
/// Only pure rotations by a quarter turn match; mirrored orientations and
/// anything else yield `None`.
pub fn parse_rotation(description: &str) -> Option<u32> {
    let caps = ROTATE_PATTERN.captures(description)?;
    let degrees: u32 = caps.get(1)?.as_str().parse().ok()?;
    match degrees {
        90 | 180 | 270 => Some(degrees),
        _ => None,
    }
}

const CAPTURE_TIME_FORMATS: &[&str] = &["%Y:%m:%d %H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

pub fn parse_capture_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim().trim_end_matches('\0');
    CAPTURE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Textual form of the numeric EXIF orientation tag
pub fn describe_orientation(code: u16) -> Option<&'static str> {
    match code {
        1 => Some("Top, left side (Horizontal / normal)"),
        2 => Some("Top, right side (Mirror horizontal)"),
        3 => Some("Rotate 180"),
        4 => Some("Bottom, left side (Mirror vertical)"),
        5 => Some("Mirror horizontal and rotate 270 CW"),
        6 => Some("Rotate 90 CW"),
        7 => Some("Mirror horizontal and rotate 90 CW"),
        8 => Some("Rotate 270 CW"),
        _ => None,
    }
}

/// [`MetadataReader`] backed by `rexif`
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifMetadataReader;

impl MetadataReader for ExifMetadataReader {
    fn read_directories(&self, path: &Path) -> Result<MetadataDirectories> {
        let bytes = std::fs::read(path).with_context(|| format!("Cannot read {:?}", path))?;

        let (parsed, warnings) = rexif::parse_buffer_quiet(&bytes);
        for warning in warnings {
            trace!("EXIF warning in {:?}: {}", path, warning);
        }

        let exif = match parsed {
            Ok(exif) => exif,
            Err(e) => {
                debug!("No EXIF data in {:?}: {}", path, e);
                return Ok(MetadataDirectories::default());
            }
        };

        Ok(MetadataDirectories {
            capture_time: exif_text(&exif, ExifTag::DateTimeOriginal)
                .or_else(|| exif_text(&exif, ExifTag::DateTime)),
            orientation: exif_orientation(&exif)
                .and_then(describe_orientation)
                .map(str::to_string),
            camera_model: exif_text(&exif, ExifTag::Model),
        })
    }
}

fn exif_text(exif: &ExifData, tag: ExifTag) -> Option<String> {
    exif.entries
        .iter()
        .find(|entry| entry.tag == tag)
        .and_then(|entry| {
            let value = entry.value_more_readable.trim();
            if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            }
        })
}

fn exif_orientation(exif: &ExifData) -> Option<u16> {
    exif.entries
        .iter()
        .find(|entry| entry.tag == ExifTag::Orientation)
        .and_then(|entry| match &entry.value {
            TagValue::U16(values) => values.first().copied(),
            TagValue::U8(values) => values.first().copied().map(u16::from),
            TagValue::U32(values) => values.first().and_then(|v| u16::try_from(*v).ok()),
            _ => None,
        })
}
