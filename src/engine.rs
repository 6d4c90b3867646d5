//! The download engine: one owner for configuration, passwords, the
//! descriptor library and the currently running job.
//!
//! Only one job runs at a time. Starting while busy is rejected.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::descriptor::{self, Descriptor};
use crate::error::{Error, Result};
use crate::library::Library;
use crate::media::{self, MediaClassifier, MediaInfo, NoClassifier, TmdbClassifier};
use crate::passwords::PasswordList;
use crate::postprocess::organize::folder_name;
use crate::postprocess::{Pipeline, PostReport, Stage, StageListener};
use crate::session::{DownloadSession, TransferReport};
use crate::status::{EngineStatus, StatusPublisher, StatusSnapshot};
use crate::transfer::{DownloadProgress, FileTransport, FtpTransport, NoProgress, Orchestrator};

/// Clears the busy flag when dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Result of a fully processed descriptor.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub title: String,
    pub transfer: TransferReport,
    pub post: PostReport,
    /// Where the descriptor was archived, if that succeeded.
    pub archived: Option<PathBuf>,
}

/// Outcome of one descriptor from the queue.
#[derive(Debug)]
pub struct JobOutcome {
    pub source: PathBuf,
    pub result: Result<JobSummary>,
}

impl JobOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Publishes pipeline stages as status snapshots.
struct StageStatus<'a> {
    engine: &'a Engine,
    title: &'a str,
    media: Mutex<MediaInfo>,
}

impl StageListener for StageStatus<'_> {
    fn on_stage(&self, stage: &Stage) {
        let media = self.media.lock().unwrap_or_else(PoisonError::into_inner).clone();
        self.engine.publish(
            StatusSnapshot::new(EngineStatus::Running, stage.action(), self.title).with_media(&media),
        );
    }

    fn on_classified(&self, info: &MediaInfo) {
        *self.media.lock().unwrap_or_else(PoisonError::into_inner) = info.clone();
    }
}

/// Processes queued descriptors and exposes start, status and busy checks.
pub struct Engine {
    config: AppConfig,
    passwords: PasswordList,
    library: Library,
    status: StatusPublisher,
    transport: Arc<dyn FileTransport>,
    progress: Arc<dyn DownloadProgress>,
    classifier: Arc<dyn MediaClassifier>,
    busy: AtomicBool,
    session: Mutex<Option<Arc<DownloadSession>>>,
    cancel: Mutex<CancellationToken>,
}

impl Engine {
    /// Creates an engine from loaded configuration.
    ///
    /// A TMDB classifier is used when an API key is configured.
    #[must_use]
    pub fn new(config: AppConfig, passwords: PasswordList) -> Self {
        let classifier: Arc<dyn MediaClassifier> = match config.media.tmdb_api_key.as_deref() {
            Some(key) if !key.is_empty() => match TmdbClassifier::new(key, config.media.language.as_str()) {
                Ok(tmdb) => Arc::new(tmdb),
                Err(e) => {
                    log::warn!("Media classification disabled: {e}");
                    Arc::new(NoClassifier)
                }
            },
            _ => Arc::new(NoClassifier),
        };
        let transport = FtpTransport::new(Duration::from_secs(config.engine.connect_timeout_secs));

        Self {
            library: Library::new(config.paths.files_dir.clone()),
            status: StatusPublisher::new(config.paths.status_file.clone()),
            config,
            passwords,
            transport: Arc::new(transport),
            progress: Arc::new(NoProgress),
            classifier,
            busy: AtomicBool::new(false),
            session: Mutex::new(None),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn MediaClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn FileTransport>) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn DownloadProgress>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub const fn library(&self) -> &Library {
        &self.library
    }

    fn session_slot(&self) -> MutexGuard<'_, Option<Arc<DownloadSession>>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cancel_slot(&self) -> MutexGuard<'_, CancellationToken> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, snapshot: StatusSnapshot) {
        self.status.publish(snapshot);
    }

    /// Whether a job is running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Latest status, with live transfer counters when a job is active.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        let snapshot = self.status.current();
        match self.session_slot().as_ref() {
            Some(session) => snapshot.with_session(&session.progress()),
            None => snapshot,
        }
    }

    /// Asks the running queue to stop. File transfers in progress finish;
    /// no further files or descriptors are started.
    pub fn cancel(&self) {
        log::info!("Cancellation requested");
        self.cancel_slot().cancel();
    }

    /// Processes the queue in the background. Returns `false` when busy.
    pub fn start(self: &Arc<Self>) -> bool {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::info!("Start rejected: a job is already running");
            return false;
        }
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = BusyGuard(&engine.busy);
            let outcomes = engine.process_queue().await;
            log::info!("Queue finished: {} descriptor(s) processed", outcomes.len());
        });
        true
    }

    /// Processes every pending descriptor once, in name order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] if a job is already running.
    pub async fn run(&self) -> Result<Vec<JobOutcome>> {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            return Err(Error::Busy);
        };
        Ok(self.process_queue().await)
    }

    async fn process_queue(&self) -> Vec<JobOutcome> {
        let token = CancellationToken::new();
        *self.cancel_slot() = token.clone();

        let pending = match self.library.pending() {
            Ok(pending) => pending,
            Err(e) => {
                log::error!("Cannot read {}: {e}", self.library.dir().display());
                self.publish(StatusSnapshot::new(EngineStatus::Error, format!("Error: {e}"), ""));
                return Vec::new();
            }
        };
        log::info!("Found {} descriptor(s) in {}", pending.len(), self.library.dir().display());
        if pending.is_empty() {
            self.publish(StatusSnapshot::new(EngineStatus::Idle, "done", ""));
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        for path in pending {
            if token.is_cancelled() {
                log::info!("Queue cancelled before {}", path.display());
                break;
            }
            outcomes.push(self.process(&path, &token).await);
        }
        outcomes
    }

    async fn process(&self, path: &Path, token: &CancellationToken) -> JobOutcome {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        log::info!("Processing {file_name}");
        self.publish(StatusSnapshot::new(EngineStatus::Running, format!("Parsing {file_name}"), ""));

        let result = self.process_descriptor(path, token).await;
        *self.session_slot() = None;

        match &result {
            Ok(summary) => {
                log::info!("Finished {}", summary.title);
                self.publish(StatusSnapshot::new(EngineStatus::Done, "done", "").with_media(&summary.post.media));
            }
            Err(e) => {
                log::error!("Skipping {file_name}: {e}");
                self.publish(StatusSnapshot::new(EngineStatus::Error, format!("Error: {e}"), ""));
            }
        }
        JobOutcome {
            source: path.to_path_buf(),
            result,
        }
    }

    async fn process_descriptor(&self, path: &Path, token: &CancellationToken) -> Result<JobSummary> {
        let descriptor = descriptor::parse(path, &self.passwords)?;
        let title = descriptor.name.clone();
        let work_dir = self.config.paths.downloads_dir.join(folder_name(&title));

        let transfer = self.transfer(&descriptor, &work_dir, token).await?;

        let listener = StageStatus {
            engine: self,
            title: &title,
            media: Mutex::new(MediaInfo::Unknown),
        };
        let pipeline = Pipeline::new(
            &self.config.engine,
            &self.config.tools,
            self.config.media.clone(),
            self.config.paths.downloads_dir.clone(),
        );
        let post = pipeline
            .run(&work_dir, &title, self.classifier.as_ref(), &listener)
            .await;

        let file_name = descriptor.file_name();
        if let Err(e) = self.library.record(&file_name, &post.media) {
            log::warn!("Could not record classification of {file_name}: {e}");
        }
        let archived = match self.library.archive(path) {
            Ok(target) => Some(target),
            Err(e) => {
                log::warn!("Could not archive {file_name}: {e}");
                None
            }
        };

        Ok(JobSummary {
            title,
            transfer,
            post,
            archived,
        })
    }

    async fn transfer(
        &self,
        descriptor: &Descriptor,
        work_dir: &Path,
        token: &CancellationToken,
    ) -> Result<TransferReport> {
        let session = Arc::new(DownloadSession::new(token.child_token()));
        *self.session_slot() = Some(Arc::clone(&session));
        let title = descriptor.name.as_str();
        let action = format!("Downloading {title}");
        self.publish(StatusSnapshot::new(EngineStatus::Running, action.as_str(), title));

        let orchestrator = Orchestrator::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.progress),
            self.config.engine.clone(),
            self.config.tools.clone(),
        );
        let stop = CancellationToken::new();
        let download = async {
            let report = orchestrator.download(descriptor, work_dir, &session).await;
            stop.cancel();
            report
        };
        let ticker = self.tick_status(&session, &action, title, &stop);
        let (report, ()) = tokio::join!(download, ticker);

        let report = report?;
        self.publish(StatusSnapshot::new(EngineStatus::Running, action, title).with_session(&session.progress()));
        Ok(report)
    }

    /// Rewrites the status file from the session until `stop` fires.
    async fn tick_status(&self, session: &DownloadSession, action: &str, title: &str, stop: &CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.engine.status_interval_ms.max(1)));
        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                _ = ticker.tick() => {
                    self.publish(
                        StatusSnapshot::new(EngineStatus::Running, action, title)
                            .with_session(&session.progress()),
                    );
                }
            }
        }
    }

    /// Stores an uploaded descriptor and records its classification.
    ///
    /// The title comes from the parsed descriptor, or from the file name when
    /// it cannot be parsed yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] for unsafe names, or an I/O error.
    pub async fn import(&self, name: &str, contents: &[u8]) -> Result<(PathBuf, MediaInfo)> {
        let path = self.library.import(name, contents)?;
        let title = match descriptor::parse(&path, &self.passwords) {
            Ok(descriptor) => descriptor.name,
            Err(e) => {
                log::warn!("Classifying {} by file name: {e}", path.display());
                path.file_stem()
                    .map(|s| s.to_string_lossy().replace(['.', '_'], " "))
                    .unwrap_or_default()
            }
        };
        let media = media::classify(self.classifier.as_ref(), &title).await;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.library.record(&file_name, &media)?;
        Ok((path, media))
    }
}
