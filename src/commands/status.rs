use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::catalog::{JsonCatalog, PhotoStore};

/// Summary of what the catalog holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogReport {
    pub photos: usize,
    pub mobile_uploads: usize,
    pub indexed: usize,
    pub undated: usize,
    /// Most used tags, highest count first
    pub top_tags: Vec<(String, usize)>,
}

/// Command to report on the photo catalog
pub struct StatusCommand {
    catalog_path: PathBuf,
}

impl StatusCommand {
    pub fn new(catalog_path: PathBuf) -> Self {
        Self { catalog_path }
    }

    pub fn execute(&self) -> Result<CatalogReport> {
        if !self.catalog_path.exists() {
            return Err(anyhow!("Catalog does not exist: {:?}", self.catalog_path));
        }

        let catalog = JsonCatalog::open(&self.catalog_path)?;
        let photos = catalog.all()?;

        let mut tag_counts: HashMap<String, usize> = HashMap::new();
        for photo in &photos {
            for tag in catalog.tags_for(photo.id)? {
                *tag_counts.entry(tag).or_default() += 1;
            }
        }

        let mut top_tags: Vec<(String, usize)> = tag_counts.into_iter().collect();
        top_tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_tags.truncate(10);

        let mobile_uploads = photos.iter().filter(|p| p.mobile_upload).count();
        Ok(CatalogReport {
            photos: photos.len(),
            mobile_uploads,
            indexed: photos.len() - mobile_uploads,
            undated: photos.iter().filter(|p| p.date_taken.is_none()).count(),
            top_tags,
        })
    }

    pub fn print_report(&self, report: &CatalogReport) {
        println!("📚 Catalog: {}", self.catalog_path.display());
        println!("   Photos:         {}", report.photos);
        println!("   Mobile uploads: {}", report.mobile_uploads);
        println!("   Indexed:        {}", report.indexed);
        println!("   Without date:   {}", report.undated);

        if !report.top_tags.is_empty() {
            println!("   Top tags:");
            for (tag, count) in &report.top_tags {
                println!("     {:<20} {}", tag, count);
            }
        }
    }
}
