mod error;
mod executor;
mod format;
mod merge;
mod organizer;
mod registry;
mod relay;
mod task;

pub use error::EngineError;
pub use organizer::list_files;
pub use task::{DownloadRequest, Task};

use crate::media::{probe, Extractor, ProbeOutcome, Transcoder};
use format::SourceResolution;
use merge::MergeOutcome;
use organizer::OutputLayout;
use registry::TaskRegistry;
use relay::ProgressRelay;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use task::FinalOutput;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub output_dir: PathBuf,
    /// Upper bound on pipelines running at once. 0 means unbounded.
    pub max_concurrent: usize,
}

/// Orchestrates probing and download tasks. Cheap to clone; clones share
/// the same registry and tools.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

struct Inner {
    extractor: Arc<dyn Extractor>,
    transcoder: Arc<dyn Transcoder>,
    registry: TaskRegistry,
    layout: OutputLayout,
    permits: Option<Arc<Semaphore>>,
}

impl Engine {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        transcoder: Arc<dyn Transcoder>,
        options: EngineOptions,
    ) -> Self {
        let permits = match options.max_concurrent {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };

        Self {
            inner: Arc::new(Inner {
                extractor,
                transcoder,
                registry: TaskRegistry::new(),
                layout: OutputLayout::new(options.output_dir),
                permits,
            }),
        }
    }

    pub fn output_root(&self) -> &Path {
        self.inner.layout.root()
    }

    /// Creates the output root and clears scratch directories a previous
    /// run left behind.
    pub async fn prepare_storage(&self) -> anyhow::Result<()> {
        let removed = self.inner.layout.sweep_scratch().await.map_err(|e| {
            anyhow::anyhow!(
                "Failed to prepare output directory {}: {}",
                self.output_root().display(),
                e
            )
        })?;
        if removed > 0 {
            info!("Removed {} stale scratch directories", removed);
        }
        Ok(())
    }

    pub async fn probe(&self, url: &str) -> ProbeOutcome {
        probe::probe(self.inner.extractor.as_ref(), url.trim()).await
    }

    /// Registers a task and dispatches its pipeline in the background.
    pub fn begin_task(&self, request: DownloadRequest) -> Result<String, EngineError> {
        request.validate().map_err(EngineError::InvalidRequest)?;

        let task_id = self.inner.registry.create();
        info!(
            "Queued task {} for {} ({} tracked)",
            task_id,
            request.url,
            self.inner.registry.len()
        );

        let engine = self.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            engine.run_task(id, request).await;
        });

        Ok(task_id)
    }

    pub fn get_status(&self, task_id: &str) -> Option<Task> {
        self.inner.registry.get(task_id)
    }

    pub async fn resolve_output_path(&self, id: &str) -> Option<PathBuf> {
        self.inner.layout.resolve(id).await
    }

    async fn run_task(&self, task_id: String, request: DownloadRequest) {
        let _permit = match &self.inner.permits {
            Some(permits) => match permits.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(e) => {
                    error!("Task {} could not be scheduled: {}", task_id, e);
                    self.inner.registry.fail(&task_id, "Task could not be scheduled");
                    return;
                }
            },
            None => None,
        };

        if !self.inner.registry.start(&task_id) {
            warn!("Task {} is no longer queued", task_id);
            return;
        }

        match self.pipeline(&task_id, &request).await {
            Ok(output) => {
                info!(
                    "Task {} completed with {} file(s)",
                    task_id,
                    output.files.len()
                );
                self.inner.registry.complete(&task_id, output);
            }
            Err(e) => {
                error!("Task {} failed ({:?}): {}", task_id, e.kind(), e);
                self.cleanup_scratch(&task_id).await;
                self.inner.registry.fail(&task_id, e.to_string());
            }
        }
    }

    async fn pipeline(
        &self,
        task_id: &str,
        request: &DownloadRequest,
    ) -> Result<FinalOutput, EngineError> {
        let inner = &self.inner;
        let scratch_dir = inner
            .layout
            .prepare_scratch(task_id)
            .await
            .map_err(EngineError::Scratch)?;

        let transcoder_available = inner.transcoder.is_available();
        let source = if format::needs_source_probe(request, transcoder_available) {
            self.source_resolution(&request.url).await
        } else {
            SourceResolution::Unknown
        };
        let plan = format::resolve(request, transcoder_available, source);
        info!(
            "Task {} plan: {:?} (source {:?}, playlist {:?})",
            task_id, plan.mode, source, plan.playlist
        );

        let relay = ProgressRelay::new(inner.registry.clone(), task_id);
        executor::execute(
            inner.extractor.as_ref(),
            &request.url,
            &scratch_dir,
            &plan,
            &relay,
        )
        .await?;

        let artifacts = organizer::list_artifacts(&scratch_dir)
            .await
            .map_err(|e| EngineError::organization("Failed to list downloaded files", e))?;
        if artifacts.is_empty() {
            return Err(EngineError::NoArtifacts);
        }

        let artifacts = if request.playlist_mode() {
            artifacts
        } else {
            match merge::reconcile(&scratch_dir, artifacts, inner.transcoder.as_ref()).await {
                MergeOutcome::Degraded { artifacts, reason } => {
                    warn!(
                        "Task {} keeps {} unmerged file(s): {}",
                        task_id,
                        artifacts.len(),
                        reason
                    );
                    artifacts
                }
                outcome => outcome.into_artifacts(),
            }
        };

        organizer::finalize(&inner.layout, task_id, &scratch_dir, request, &artifacts).await
    }

    async fn source_resolution(&self, url: &str) -> SourceResolution {
        match probe::probe_raw(self.inner.extractor.as_ref(), url.trim()).await {
            Ok(raw) => probe::best_source_height(&raw)
                .map(SourceResolution::Known)
                .unwrap_or(SourceResolution::Unknown),
            Err(e) => {
                warn!("Source resolution probe failed for {}: {:#}", url, e);
                SourceResolution::ProbeFailed
            }
        }
    }

    async fn cleanup_scratch(&self, task_id: &str) {
        let dir = self.inner.layout.scratch_dir(task_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => info!("Removed scratch directory {}", dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!("Failed to remove scratch directory {}: {}", dir.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::task::{MediaType, OutputType, TaskStatus};
    use super::*;
    use crate::media::{
        FetchConfig, FetchReport, MediaInfo, PlaylistSelection, ProgressCallback, ProgressEvent,
        ProgressPhase,
    };
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Writes the configured files into the fetch directory.
    struct FakeExtractor {
        files: Vec<&'static str>,
        success: bool,
        metadata: Option<Value>,
        configs: Mutex<Vec<FetchConfig>>,
    }

    impl FakeExtractor {
        fn new(files: &[&'static str]) -> Self {
            Self {
                files: files.to_vec(),
                success: true,
                metadata: Some(json!({
                    "id": "abc",
                    "title": "Clip",
                    "duration": 10.0,
                    "formats": [
                        {"format_id": "22", "ext": "mp4", "vcodec": "avc1", "acodec": "none", "height": 720}
                    ]
                })),
                configs: Mutex::new(Vec::new()),
            }
        }

        fn last_config(&self) -> FetchConfig {
            self.configs.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn probe_metadata(&self, _url: &str) -> Result<Value> {
            self.metadata
                .clone()
                .ok_or_else(|| anyhow::anyhow!("network unreachable"))
        }

        async fn fetch(
            &self,
            config: &FetchConfig,
            on_progress: &ProgressCallback,
        ) -> Result<FetchReport> {
            self.configs.lock().unwrap().push(config.clone());
            for name in &self.files {
                on_progress(ProgressEvent {
                    phase: ProgressPhase::Downloading,
                    percent: Some(50.0),
                    filename: Some(config.output_dir.join(name).display().to_string()),
                    ..Default::default()
                });
                tokio::fs::write(config.output_dir.join(name), name.as_bytes()).await?;
                on_progress(ProgressEvent {
                    phase: ProgressPhase::Finished,
                    ..Default::default()
                });
            }
            Ok(FetchReport {
                success: self.success,
                diagnostic: if self.success {
                    String::new()
                } else {
                    "ERROR: Unable to download".to_string()
                },
            })
        }
    }

    struct FakeTranscoder {
        available: bool,
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        fn is_available(&self) -> bool {
            self.available
        }

        async fn merge(&self, _video: &Path, _audio: &Path, output: &Path) -> Result<()> {
            tokio::fs::write(output, b"merged").await?;
            Ok(())
        }
    }

    fn engine(extractor: Arc<FakeExtractor>, root: &Path, transcoder: bool) -> Engine {
        Engine::new(
            extractor,
            Arc::new(FakeTranscoder {
                available: transcoder,
            }),
            EngineOptions {
                output_dir: root.to_path_buf(),
                max_concurrent: 2,
            },
        )
    }

    fn request(media_type: MediaType, quality: &str) -> DownloadRequest {
        DownloadRequest {
            url: "https://example.com/watch?v=abc".to_string(),
            platform: "youtube".to_string(),
            media_type,
            quality: quality.to_string(),
            is_playlist: false,
            playlist_start: None,
            playlist_end: None,
            title: None,
        }
    }

    async fn wait_for_terminal(engine: &Engine, id: &str) -> Task {
        for _ in 0..200 {
            let task = engine.get_status(id).unwrap();
            if task.status.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {id} did not finish");
    }

    #[tokio::test]
    async fn test_single_item_is_merged_and_moved() {
        let root = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::new(&["video.mp4", "audio.m4a"]));
        let engine = engine(extractor.clone(), root.path(), true);

        let id = engine
            .begin_task(request(MediaType::Video, "2160"))
            .unwrap();
        let task = wait_for_terminal(&engine, &id).await;

        assert_eq!(task.status, TaskStatus::Completed, "{:?}", task.error);
        assert_eq!(task.output_type, Some(OutputType::File));
        assert_eq!(task.file_id.as_deref(), Some("video.mp4"));
        assert_eq!(task.files, vec!["video.mp4"]);
        assert_eq!(task.progress, 100.0);
        assert_eq!(
            tokio::fs::read(root.path().join("video.mp4")).await.unwrap(),
            b"merged"
        );
        assert!(!root.path().join("audio.m4a").exists());
        assert!(!root.path().join(".tasks").join(&id).exists());

        // Source is 720p, so 2160 is an upscale.
        let config = extractor.last_config();
        assert_eq!(config.format, "bestvideo+bestaudio");
        assert!(config
            .merge_output_args
            .contains(&"scale=-2:2160:flags=lanczos".to_string()));
        assert_eq!(config.playlist, PlaylistSelection::Single);

        let resolved = engine.resolve_output_path("video.mp4").await.unwrap();
        assert_eq!(resolved, root.path().join("video.mp4"));
    }

    #[tokio::test]
    async fn test_playlist_lands_in_named_folder() {
        let root = tempfile::tempdir().unwrap();
        let extractor = Arc::new(FakeExtractor::new(&["one.mp3", "two.mp3"]));
        let engine = engine(extractor.clone(), root.path(), true);

        let mut req = request(MediaType::Audio, "128");
        req.is_playlist = true;
        req.playlist_start = Some(5);
        req.playlist_end = Some(10);
        req.title = Some("Road/Trip".to_string());

        let id = engine.begin_task(req).unwrap();
        let task = wait_for_terminal(&engine, &id).await;

        assert_eq!(task.status, TaskStatus::Completed, "{:?}", task.error);
        assert_eq!(task.output_type, Some(OutputType::Folder));
        assert_eq!(task.file_id.as_deref(), Some("Road_Trip"));
        assert_eq!(task.files, vec!["one.mp3", "two.mp3"]);
        assert_eq!(
            list_files(&root.path().join("Road_Trip")).await.unwrap(),
            task.files
        );
        assert_eq!(
            extractor.last_config().playlist.items_spec().as_deref(),
            Some("5-10")
        );
        assert!(engine.resolve_output_path("Road_Trip/one.mp3").await.is_some());
    }

    #[tokio::test]
    async fn test_failed_fetch_cleans_scratch() {
        let root = tempfile::tempdir().unwrap();
        let mut fake = FakeExtractor::new(&["partial.mp4"]);
        fake.success = false;
        let engine = engine(Arc::new(fake), root.path(), true);

        let id = engine.begin_task(request(MediaType::Video, "720")).unwrap();
        let task = wait_for_terminal(&engine, &id).await;

        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.error.unwrap().contains("Unable to download"));
        assert!(task.file_id.is_none());
        assert!(!root.path().join(".tasks").join(&id).exists());
        assert!(!root.path().join("partial.mp4").exists());
    }

    #[tokio::test]
    async fn test_failed_finalize_cleans_scratch() {
        let root = tempfile::tempdir().unwrap();
        // A directory occupying the artifact's name cannot be replaced.
        let blocker = root.path().join("clip.mp4");
        tokio::fs::create_dir_all(&blocker).await.unwrap();
        tokio::fs::write(blocker.join("keep.txt"), b"x").await.unwrap();
        let engine = engine(Arc::new(FakeExtractor::new(&["clip.mp4"])), root.path(), false);

        let id = engine.begin_task(request(MediaType::Video, "720")).unwrap();
        let task = wait_for_terminal(&engine, &id).await;

        assert_eq!(task.status, TaskStatus::Error);
        assert!(task.error.unwrap().contains("Failed to move clip.mp4"));
        assert!(task.file_id.is_none());
        assert!(!root.path().join(".tasks").join(&id).exists());
        assert!(blocker.join("keep.txt").exists());
    }

    #[tokio::test]
    async fn test_no_artifacts_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(Arc::new(FakeExtractor::new(&[])), root.path(), false);

        let id = engine.begin_task(request(MediaType::Video, "720")).unwrap();
        let task = wait_for_terminal(&engine, &id).await;

        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.error.as_deref(), Some("No files were downloaded"));
        assert!(!root.path().join(".tasks").join(&id).exists());
    }

    #[tokio::test]
    async fn test_probe_failure_falls_back_to_combined_or_upscale() {
        let root = tempfile::tempdir().unwrap();
        let mut fake = FakeExtractor::new(&["clip.mp4"]);
        fake.metadata = None;
        let extractor = Arc::new(fake);

        let without_ffmpeg = engine(extractor.clone(), root.path(), false);
        let id = without_ffmpeg
            .begin_task(request(MediaType::Video, "1080"))
            .unwrap();
        wait_for_terminal(&without_ffmpeg, &id).await;
        assert_eq!(extractor.last_config().format, "best");

        let with_ffmpeg = engine(extractor.clone(), root.path(), true);
        let id = with_ffmpeg
            .begin_task(request(MediaType::Video, "1440"))
            .unwrap();
        let task = wait_for_terminal(&with_ffmpeg, &id).await;
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(extractor.last_config().format, "bestvideo+bestaudio");

        let outcome = with_ffmpeg.probe("https://example.com/v").await;
        assert!(matches!(outcome, ProbeOutcome::Degraded { .. }));
        assert!(matches!(outcome.into_info(), MediaInfo::Single(s) if s.title.is_empty()));
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let engine = engine(Arc::new(FakeExtractor::new(&[])), root.path(), true);

        let mut req = request(MediaType::Video, "720");
        req.url = "file:///etc/passwd".to_string();
        assert!(matches!(
            engine.begin_task(req),
            Err(EngineError::InvalidRequest(_))
        ));
        assert!(engine.get_status("unknown").is_none());
    }

    #[tokio::test]
    async fn test_prepare_storage_sweeps_stale_scratch() {
        let root = tempfile::tempdir().unwrap();
        let stale = root.path().join(".tasks").join("old");
        tokio::fs::create_dir_all(&stale).await.unwrap();
        tokio::fs::write(stale.join("x.part"), b"x").await.unwrap();

        let engine = engine(Arc::new(FakeExtractor::new(&[])), root.path(), true);
        engine.prepare_storage().await.unwrap();
        assert!(!stale.exists());
    }
}
