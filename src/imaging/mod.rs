//! Pixel operations used by the ingestion pipeline.
//!
//! [`ImageTransform`] is the seam the pipeline talks to; [`RustImageTransform`]
//! implements it on top of the `image` crate. Every operation here is
//! CPU-bound and synchronous, so callers on an async runtime run them through
//! `spawn_blocking`.

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Extensions the compiled-in decoders can read
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp"];

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    Landscape,
    Portrait,
}

/// Pixel dimensions of an image and the layout they imply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub width: u32,
    pub height: u32,
}

impl Layout {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }

    /// Square images count as landscape
    pub fn kind(&self) -> LayoutKind {
        if self.width >= self.height {
            LayoutKind::Landscape
        } else {
            LayoutKind::Portrait
        }
    }
}

pub trait ImageTransform: Send + Sync {
    /// Write `src` to `dst` with its greatest dimension bounded by `max_edge`.
    /// Returns the layout of the written image.
    fn resize_by_greatest_dimension(&self, src: &Path, dst: &Path, max_edge: u32)
        -> Result<Layout>;

    /// Rotate the image at `path` clockwise in place.
    /// Returns the layout before and after.
    fn rotate(&self, path: &Path, degrees: u32) -> Result<(Layout, Layout)>;

    fn layout_info(&self, path: &Path) -> Result<Layout>;

    /// Remove any orientation tag so viewers do not rotate a second time
    fn strip_orientation_metadata(&self, path: &Path) -> Result<()>;
}

/// Target dimensions for a resize bounded by the greatest dimension.
///
/// Landscape images are bounded by width, portrait images by height. Images
/// already inside the bound keep their size.
pub fn bounded_dimensions(layout: Layout, max_edge: u32) -> Layout {
    let (long, short) = match layout.kind() {
        LayoutKind::Landscape => (layout.width, layout.height),
        LayoutKind::Portrait => (layout.height, layout.width),
    };

    if long <= max_edge || long == 0 {
        return layout;
    }

    let scaled_short = ((short as f64 * max_edge as f64) / long as f64).round().max(1.0) as u32;
    match layout.kind() {
        LayoutKind::Landscape => Layout::new(max_edge, scaled_short),
        LayoutKind::Portrait => Layout::new(scaled_short, max_edge),
    }
}

/// [`ImageTransform`] on the pure Rust `image` codecs.
///
/// The `image` encoders never write EXIF blocks, so every file this backend
/// produces is already free of orientation tags.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustImageTransform;

impl RustImageTransform {
    fn open(path: &Path) -> Result<DynamicImage> {
        ImageReader::open(path)
            .with_context(|| format!("Cannot open image {:?}", path))?
            .with_guessed_format()?
            .decode()
            .with_context(|| format!("Cannot decode image {:?}", path))
    }

    fn save(image: DynamicImage, path: &Path) -> Result<()> {
        let format = ImageFormat::from_path(path)
            .map_err(|_| anyhow!("Unsupported output format for {:?}", path))?;

        // JPEG has no alpha channel
        let image = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
            _ => image,
        };

        image
            .save_with_format(path, format)
            .with_context(|| format!("Cannot write image {:?}", path))
    }
}

impl ImageTransform for RustImageTransform {
    fn resize_by_greatest_dimension(
        &self,
        src: &Path,
        dst: &Path,
        max_edge: u32,
    ) -> Result<Layout> {
        let image = Self::open(src)?;
        let source = Layout::new(image.width(), image.height());
        let target = bounded_dimensions(source, max_edge);

        let resized = if target == source {
            image
        } else {
            image.resize_exact(target.width, target.height, FilterType::Lanczos3)
        };

        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::save(resized, dst)?;

        debug!(
            "Resized {:?} {}x{} -> {}x{}",
            src, source.width, source.height, target.width, target.height
        );
        Ok(target)
    }

    fn rotate(&self, path: &Path, degrees: u32) -> Result<(Layout, Layout)> {
        let image = Self::open(path)?;
        let before = Layout::new(image.width(), image.height());

        let rotated = match degrees % 360 {
            0 => return Ok((before, before)),
            90 => image.rotate90(),
            180 => image.rotate180(),
            270 => image.rotate270(),
            other => return Err(anyhow!("Unsupported rotation: {} degrees", other)),
        };

        let after = Layout::new(rotated.width(), rotated.height());
        Self::save(rotated, path)?;
        Ok((before, after))
    }

    fn layout_info(&self, path: &Path) -> Result<Layout> {
        let (width, height) = image::image_dimensions(path)
            .with_context(|| format!("Cannot read dimensions of {:?}", path))?;
        Ok(Layout::new(width, height))
    }

    fn strip_orientation_metadata(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(anyhow!("Cannot strip metadata, file missing: {:?}", path));
        }
        Ok(())
    }
}
