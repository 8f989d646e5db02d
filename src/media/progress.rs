use crate::utils::strip_ansi;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Prefix yt-dlp prints in front of every progress line we ask for, so
/// they can be told apart from its regular chatter on stdout.
pub const PROGRESS_MARKER: &str = "[downify-progress]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressPhase {
    Downloading,
    /// One media segment finished fetching. Post-processing may follow.
    Finished,
    #[default]
    Other,
}

/// Library-agnostic progress update. `None` means the source did not say.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressEvent {
    pub phase: ProgressPhase,
    pub percent: Option<f64>,
    pub speed: Option<f64>,
    pub eta: Option<u64>,
    pub filename: Option<String>,
    pub playlist_index: Option<u32>,
    pub playlist_total: Option<u32>,
}

impl ProgressEvent {
    /// Basename of the file the event refers to.
    pub fn current_file(&self) -> Option<String> {
        let filename = self.filename.as_deref()?;
        Path::new(filename)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }

    /// Decodes a line produced by [`progress_template`]. Lines without the
    /// marker or with a malformed payload yield `None`.
    pub fn from_template_line(line: &str) -> Option<Self> {
        let (_, payload) = line.split_once(PROGRESS_MARKER)?;
        let parsed: TemplateLine = match serde_json::from_str(payload.trim()) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Ignoring malformed progress line ({}): {}", e, line);
                return None;
            }
        };
        Some(parsed.into_event())
    }
}

/// Value for yt-dlp's `--progress-template`.
pub fn progress_template() -> String {
    format!(
        "download:{PROGRESS_MARKER} {{\"progress\":%(progress)j,\
         \"playlist_index\":%(info.playlist_index)j,\
         \"n_entries\":%(info.n_entries)j,\
         \"playlist_count\":%(info.playlist_count)j}}"
    )
}

/// Parses strings like `" 45.3%"` or `"45.3%\x1b[0m"` into a percentage
/// clamped to `[0, 100]`.
pub fn parse_percent(raw: &str) -> Option<f64> {
    let cleaned = strip_ansi(raw);
    let number = cleaned.trim().trim_end_matches('%').trim();
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.clamp(0.0, 100.0))
}

#[derive(Debug, Deserialize)]
struct TemplateLine {
    #[serde(default)]
    progress: RawProgress,
    #[serde(default)]
    playlist_index: Value,
    #[serde(default)]
    n_entries: Value,
    #[serde(default)]
    playlist_count: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawProgress {
    status: Option<String>,
    filename: Option<String>,
    #[serde(rename = "_percent_str")]
    percent_str: Option<String>,
    downloaded_bytes: Option<f64>,
    total_bytes: Option<f64>,
    total_bytes_estimate: Option<f64>,
    speed: Option<f64>,
    eta: Option<f64>,
}

impl TemplateLine {
    fn into_event(self) -> ProgressEvent {
        let progress = self.progress;
        let phase = match progress.status.as_deref() {
            Some("downloading") => ProgressPhase::Downloading,
            Some("finished") => ProgressPhase::Finished,
            _ => ProgressPhase::Other,
        };

        let percent = match phase {
            ProgressPhase::Finished => Some(100.0),
            _ => progress
                .percent_str
                .as_deref()
                .and_then(parse_percent)
                .or_else(|| byte_ratio(&progress)),
        };

        ProgressEvent {
            phase,
            percent,
            speed: progress.speed.filter(|s| s.is_finite() && *s >= 0.0),
            eta: progress
                .eta
                .filter(|e| e.is_finite() && *e >= 0.0)
                .map(|e| e as u64),
            filename: progress.filename,
            playlist_index: lenient_u32(&self.playlist_index),
            playlist_total: lenient_u32(&self.n_entries)
                .or_else(|| lenient_u32(&self.playlist_count)),
        }
    }
}

fn byte_ratio(progress: &RawProgress) -> Option<f64> {
    let downloaded = progress.downloaded_bytes?;
    let total = progress
        .total_bytes
        .or(progress.total_bytes_estimate)
        .filter(|t| *t > 0.0)?;
    Some((downloaded / total * 100.0).clamp(0.0, 100.0))
}

/// yt-dlp renders missing template fields as `"NA"`, and some extractors
/// report numbers as strings.
fn lenient_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
