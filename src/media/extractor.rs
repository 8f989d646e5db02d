use super::progress::ProgressEvent;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

pub type ProgressCallback = dyn Fn(ProgressEvent) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mp3,
    Mp4,
}

impl Container {
    pub fn as_str(&self) -> &'static str {
        match self {
            Container::Mp3 => "mp3",
            Container::Mp4 => "mp4",
        }
    }
}

/// Which items of a collection URL to fetch. Indices are 1-based and
/// inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistSelection {
    /// Only the item the URL points at, even if it sits in a collection.
    Single,
    All,
    Range { start: u32, end: Option<u32> },
}

impl PlaylistSelection {
    /// Item selector in yt-dlp's `--playlist-items` syntax.
    pub fn items_spec(&self) -> Option<String> {
        match self {
            PlaylistSelection::Range {
                start,
                end: Some(end),
            } => Some(format!("{start}-{end}")),
            PlaylistSelection::Range { start, end: None } => Some(format!("{start}:")),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioExtraction {
    pub codec: Container,
    pub bitrate_kbps: u32,
}

/// Fully resolved configuration for one fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    pub url: String,
    pub output_dir: PathBuf,
    /// Extractor naming template, relative to `output_dir`.
    pub filename_template: String,
    pub format: String,
    pub merge_container: Option<Container>,
    pub audio_extraction: Option<AudioExtraction>,
    /// Extra ffmpeg output arguments applied when streams are merged.
    pub merge_output_args: Vec<String>,
    pub playlist: PlaylistSelection,
    /// Keep going when a single playlist item fails.
    pub ignore_errors: bool,
    pub restrict_filenames: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchReport {
    pub success: bool,
    /// Tail of the tool's error output, for diagnostics.
    pub diagnostic: String,
}

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Human-readable name of the extractor
    fn name(&self) -> &'static str;

    /// Metadata only, no media is downloaded.
    async fn probe_metadata(&self, url: &str) -> Result<Value>;

    /// Fetches media into `config.output_dir`, reporting progress as it
    /// goes. `Err` means the tool could not be run at all; a run that
    /// failed is reported through [`FetchReport::success`].
    async fn fetch(&self, config: &FetchConfig, on_progress: &ProgressCallback)
        -> Result<FetchReport>;

    /// Test if this extractor is available on the system
    async fn test_availability(&self) -> bool {
        true
    }
}
