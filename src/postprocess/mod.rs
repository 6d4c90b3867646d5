//! Post-transfer pipeline: cleanup, extraction, classification, placement.

pub mod archive;
pub mod cleanup;
pub mod organize;

use std::path::{Path, PathBuf};

use crate::config::{EngineConfig, MediaConfig, ToolConfig};
use crate::media::{self, MediaClassifier, MediaInfo};

pub use archive::{Archive, ArchiveKind, Extractor, find_archives};
pub use cleanup::cleanup;
pub use organize::{Placement, organize};

/// Pipeline step being entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    CleaningUp,
    Extracting { index: usize, total: usize, name: String },
    Classifying,
    Organizing,
}

impl Stage {
    /// Human readable progress description.
    #[must_use]
    pub fn action(&self) -> String {
        match self {
            Self::CleaningUp => "Cleaning up".to_string(),
            Self::Extracting { index, total, name } => format!("Extracting archive ({index}/{total}): {name}"),
            Self::Classifying => "Classifying".to_string(),
            Self::Organizing => "Organizing".to_string(),
        }
    }
}

/// Receives a notification whenever the pipeline enters a step.
pub trait StageListener: Send + Sync {
    fn on_stage(&self, stage: &Stage);

    /// Called once the classification is known.
    fn on_classified(&self, _info: &MediaInfo) {}
}

/// Outcome of post-processing one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostReport {
    pub removed: usize,
    pub extracted: usize,
    pub failed_archives: Vec<String>,
    pub media: MediaInfo,
    pub placement: Placement,
}

/// Runs the post-transfer steps for one job directory.
#[derive(Debug, Clone)]
pub struct Pipeline {
    extract_archives: bool,
    extractor: Extractor,
    media: MediaConfig,
    downloads_root: PathBuf,
}

impl Pipeline {
    #[must_use]
    pub fn new(engine: &EngineConfig, tools: &ToolConfig, media: MediaConfig, downloads_root: PathBuf) -> Self {
        Self {
            extract_archives: engine.extract_archives,
            extractor: Extractor::new(tools, engine.remove_archives),
            media,
            downloads_root,
        }
    }

    /// Processes `work_dir`, classifying the job by `title`.
    ///
    /// Failures of single steps are logged and never stop the pipeline; a
    /// failed move leaves the job where it is.
    pub async fn run(
        &self,
        work_dir: &Path,
        title: &str,
        classifier: &dyn MediaClassifier,
        listener: &dyn StageListener,
    ) -> PostReport {
        listener.on_stage(&Stage::CleaningUp);
        let dir = work_dir.to_path_buf();
        let removed = tokio::task::spawn_blocking(move || cleanup(&dir))
            .await
            .unwrap_or_else(|e| {
                log::error!("Cleanup task failed: {e}");
                0
            });
        log::info!("Cleanup removed {removed} item(s)");

        let (extracted, failed_archives) = if self.extract_archives {
            self.extract_all(work_dir, listener).await
        } else {
            log::info!("Archive extraction disabled");
            (0, Vec::new())
        };

        listener.on_stage(&Stage::Classifying);
        let media = media::classify(classifier, title).await;
        listener.on_classified(&media);

        listener.on_stage(&Stage::Organizing);
        let placement = match organize(work_dir, &self.downloads_root, &self.media, &media) {
            Ok(placement) => placement,
            Err(e) => {
                log::error!("Could not organize {}: {e}", work_dir.display());
                Placement::Unchanged(work_dir.to_path_buf())
            }
        };

        PostReport {
            removed,
            extracted,
            failed_archives,
            media,
            placement,
        }
    }

    async fn extract_all(&self, work_dir: &Path, listener: &dyn StageListener) -> (usize, Vec<String>) {
        let dir = work_dir.to_path_buf();
        let archives = tokio::task::spawn_blocking(move || find_archives(&dir))
            .await
            .unwrap_or_default();
        if archives.is_empty() {
            log::info!("No archives in {}", work_dir.display());
            return (0, Vec::new());
        }

        let total = archives.len();
        let mut extracted = 0;
        let mut failed = Vec::new();
        for (i, archive) in archives.into_iter().enumerate() {
            let name = archive.file_name();
            listener.on_stage(&Stage::Extracting {
                index: i + 1,
                total,
                name: name.clone(),
            });
            log::info!("Extracting ({}/{total}) {name}", i + 1);

            let extractor = self.extractor.clone();
            let result = tokio::task::spawn_blocking(move || extractor.extract(&archive)).await;
            match result {
                Ok(Ok(())) => extracted += 1,
                Ok(Err(e)) => {
                    log::error!("Extraction of {name} failed: {e}");
                    failed.push(name);
                }
                Err(e) => {
                    log::error!("Extraction task for {name} failed: {e}");
                    failed.push(name);
                }
            }
        }
        (extracted, failed)
    }
}
