use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::Config;
use crate::imaging::is_supported_image;
use crate::job::TaskKind;
use crate::service::ImageService;

use super::session::{IngestSession, SessionSummary};

/// Command to ingest individual files as uploads for a user
pub struct IngestCommand {
    files: Vec<PathBuf>,
    username: String,
    tags: Vec<String>,
    config: Config,
}

impl IngestCommand {
    pub fn new(files: Vec<PathBuf>, username: String, tags: Vec<String>, config: Config) -> Self {
        Self {
            files,
            username,
            tags,
            config,
        }
    }

    pub async fn execute(&self) -> Result<SessionSummary> {
        if self.files.is_empty() {
            return Err(anyhow!("No files given"));
        }

        for file in &self.files {
            if !file.is_file() {
                return Err(anyhow!("File does not exist: {:?}", file));
            }
        }

        let mut session = IngestSession::start(self.config.clone())?;
        let (queued, known) = self.submit_all(&session.service);

        info!("Queued {} files, {} already known. Processing...", queued, known);
        let summary = session.wait_for(queued).await?;
        session.shutdown().await?;

        info!(
            "✅ Ingest complete. {} succeeded, {} failed.",
            summary.succeeded, summary.failed
        );
        Ok(summary)
    }

    /// Submit every supported file, returning how many were queued and how
    /// many were already known. Files that cannot be submitted are skipped so
    /// that earlier submissions still get processed.
    pub fn submit_all(&self, service: &ImageService) -> (usize, usize) {
        let mut queued = 0;
        let mut known = 0;

        for file in &self.files {
            if !is_supported_image(file) {
                warn!("⚠️ SKIPPING: Not a supported image: {:?}", file);
                continue;
            }

            match service.submit(TaskKind::MobileResize, &self.username, file, &self.tags) {
                Ok(submission) if submission.queued => queued += 1,
                Ok(submission) => {
                    info!("🔁 Already in library: {:?} -> {}", file, submission.cache_path);
                    known += 1;
                }
                Err(e) => warn!("⚠️ SKIPPING: {:?}: {:#}", file, e),
            }
        }

        (queued, known)
    }
}
