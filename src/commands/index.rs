use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::ignore::SkipFilter;
use crate::imaging::is_supported_image;
use crate::job::TaskKind;

use super::session::{IngestSession, SessionSummary};

/// Command to catalog every image under the index root
pub struct IndexCommand {
    username: String,
    config: Config,
}

impl IndexCommand {
    pub fn new(username: String, config: Config) -> Self {
        Self { username, config }
    }

    /// Supported images under the index root, minus skipped paths, in walk order
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        let root = &self.config.index_root;
        let filter = SkipFilter::new(root.clone(), &self.config.index_skip_patterns)?;

        let files = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !filter.should_skip(entry.path()))
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file() && is_supported_image(entry.path()))
            .map(|entry| entry.into_path())
            .collect();

        Ok(files)
    }

    pub async fn execute(&self) -> Result<SessionSummary> {
        let root = &self.config.index_root;
        if !root.exists() {
            return Err(anyhow!("Index directory does not exist: {:?}", root));
        }
        if !root.is_dir() {
            return Err(anyhow!("Path is not a directory: {:?}", root));
        }

        info!("🔎 Scanning directory: {:?}", root);
        let files = self.discover()?;
        info!("Found {} images. Now queueing...", files.len());

        let mut session = IngestSession::start(self.config.clone())?;
        let mut queued = 0;

        for file in &files {
            match session
                .service
                .submit(TaskKind::IndexResize, &self.username, file, &[])
            {
                Ok(submission) if submission.queued => queued += 1,
                Ok(_) => debug!("Already cataloged: {:?}", file),
                Err(e) => warn!("⚠️ SKIPPING: {:?}: {:#}", file, e),
            }
        }

        let summary = session.wait_for(queued).await?;
        session.shutdown().await?;

        info!(
            "✅ Index complete. Added {} photos ({} failed).",
            summary.succeeded, summary.failed
        );
        Ok(summary)
    }
}
