//! Turns a request (plus what is known about the source) into a concrete
//! format plan: selection expression, target container and re-encode
//! arguments.

use super::task::{DownloadRequest, MediaType};
use crate::media::probe::VIDEO_QUALITY_TIERS;
use crate::media::{Container, PlaylistSelection};

/// Requests at or above this height are upscaled when the source
/// resolution cannot be determined.
pub const UPSCALE_THRESHOLD: u32 = 1440;

const FALLBACK_HEIGHT: u32 = 480;
const MIN_NATIVE_TIER: u32 = 720;
const DEFAULT_AUDIO_KBPS: u32 = 192;
const UPSCALE_AUDIO_KBPS: u32 = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceResolution {
    Known(u32),
    Unknown,
    ProbeFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanMode {
    Audio,
    /// No transcoder: a single pre-muxed stream, nothing to merge.
    Combined,
    Native,
    Upscale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reencode {
    ExtractAudio { codec: Container, bitrate_kbps: u32 },
    Upscale { height: u32 },
}

impl Reencode {
    /// ffmpeg output arguments for the merge step.
    pub fn merge_output_args(&self) -> Vec<String> {
        match self {
            Reencode::ExtractAudio { .. } => Vec::new(),
            Reencode::Upscale { height } => vec![
                "-vf".to_string(),
                format!("scale=-2:{height}:flags=lanczos"),
                "-c:v".to_string(),
                "libx264".to_string(),
                "-preset".to_string(),
                "fast".to_string(),
                "-crf".to_string(),
                "18".to_string(),
                "-c:a".to_string(),
                "aac".to_string(),
                "-b:a".to_string(),
                format!("{UPSCALE_AUDIO_KBPS}k"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPlan {
    pub mode: PlanMode,
    pub format_expression: String,
    pub container: Option<Container>,
    pub reencode: Option<Reencode>,
    pub playlist: PlaylistSelection,
}

/// Maps a quality label to a target height. Labels below 720 (or ones
/// that are not numbers) resolve to 480; everything else snaps down to
/// the nearest known tier, capped at 4320.
pub fn target_height(label: &str) -> u32 {
    let trimmed = label.trim().trim_end_matches(['p', 'P']);
    let Ok(requested) = trimmed.parse::<u32>() else {
        return FALLBACK_HEIGHT;
    };
    if requested < MIN_NATIVE_TIER {
        return FALLBACK_HEIGHT;
    }

    VIDEO_QUALITY_TIERS
        .iter()
        .copied()
        .filter(|tier| *tier >= MIN_NATIVE_TIER && *tier <= requested)
        .max()
        .unwrap_or(FALLBACK_HEIGHT)
}

pub fn audio_bitrate(label: &str) -> u32 {
    label
        .trim()
        .trim_end_matches(['k', 'K'])
        .parse()
        .ok()
        .filter(|kbps| *kbps > 0)
        .unwrap_or(DEFAULT_AUDIO_KBPS)
}

/// Source resolution only matters for video with a transcoder around.
pub fn needs_source_probe(request: &DownloadRequest, transcoder_available: bool) -> bool {
    request.media_type == MediaType::Video && transcoder_available
}

pub fn should_upscale(target: u32, source: SourceResolution) -> bool {
    match source {
        SourceResolution::Known(height) => height < target,
        SourceResolution::Unknown | SourceResolution::ProbeFailed => target >= UPSCALE_THRESHOLD,
    }
}

pub fn playlist_selection(request: &DownloadRequest) -> PlaylistSelection {
    if !request.playlist_mode() {
        return PlaylistSelection::Single;
    }

    match (request.playlist_start, request.playlist_end) {
        (None, None) => PlaylistSelection::All,
        (start, end) => PlaylistSelection::Range {
            start: start.unwrap_or(1).max(1),
            end,
        },
    }
}

pub fn resolve(
    request: &DownloadRequest,
    transcoder_available: bool,
    source: SourceResolution,
) -> FormatPlan {
    let playlist = playlist_selection(request);

    if request.media_type == MediaType::Audio {
        return FormatPlan {
            mode: PlanMode::Audio,
            format_expression: "bestaudio/best".to_string(),
            container: Some(Container::Mp3),
            reencode: Some(Reencode::ExtractAudio {
                codec: Container::Mp3,
                bitrate_kbps: audio_bitrate(&request.quality),
            }),
            playlist,
        };
    }

    if !transcoder_available {
        return FormatPlan {
            mode: PlanMode::Combined,
            format_expression: "best".to_string(),
            container: None,
            reencode: None,
            playlist,
        };
    }

    let height = target_height(&request.quality);
    if should_upscale(height, source) {
        FormatPlan {
            mode: PlanMode::Upscale,
            format_expression: "bestvideo+bestaudio".to_string(),
            container: Some(Container::Mp4),
            reencode: Some(Reencode::Upscale { height }),
            playlist,
        }
    } else {
        FormatPlan {
            mode: PlanMode::Native,
            format_expression: format!(
                "bestvideo[height={height}]+bestaudio/bestvideo[height<={height}]+bestaudio/best[height<={height}]"
            ),
            container: Some(Container::Mp4),
            reencode: None,
            playlist,
        }
    }
}
