use crate::media::Transcoder;
use std::path::Path;
use tracing::{info, warn};

const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "mkv", "webm", "mov", "avi", "flv", "m4v"];
const AUDIO_EXTENSIONS: [&str; 9] = ["m4a", "mp3", "aac", "opus", "ogg", "oga", "wav", "flac", "weba"];

/// Result of checking a single-item scratch directory for unmerged
/// streams. Every variant carries the artifacts to hand on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Untouched(Vec<String>),
    Merged(Vec<String>),
    /// The merge was needed but failed; the originals are kept.
    Degraded { artifacts: Vec<String>, reason: String },
}

impl MergeOutcome {
    pub fn into_artifacts(self) -> Vec<String> {
        match self {
            MergeOutcome::Untouched(artifacts)
            | MergeOutcome::Merged(artifacts)
            | MergeOutcome::Degraded { artifacts, .. } => artifacts,
        }
    }
}

fn extension(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

fn is_video(name: &str) -> bool {
    extension(name).is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.as_str()))
}

fn is_audio(name: &str) -> bool {
    extension(name).is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.as_str()))
}

fn stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| name.to_string())
}

pub async fn reconcile(
    scratch_dir: &Path,
    artifacts: Vec<String>,
    transcoder: &dyn Transcoder,
) -> MergeOutcome {
    if artifacts.len() < 2 {
        return MergeOutcome::Untouched(artifacts);
    }

    let video = artifacts.iter().find(|name| is_video(name)).cloned();
    let audio = artifacts.iter().find(|name| is_audio(name)).cloned();
    let (Some(video), Some(audio)) = (video, audio) else {
        return MergeOutcome::Untouched(artifacts);
    };

    if !transcoder.is_available() {
        warn!("Found separate streams {} and {} but no transcoder", video, audio);
        return MergeOutcome::Degraded {
            artifacts,
            reason: "transcoder unavailable".to_string(),
        };
    }

    let stem = stem(&video);
    let merged_name = format!("{stem}.mp4");
    let temp_path = scratch_dir.join(format!("{stem}.merging.mp4"));

    info!("Merging leftover streams {} + {}", video, audio);
    if let Err(e) = transcoder
        .merge(&scratch_dir.join(&video), &scratch_dir.join(&audio), &temp_path)
        .await
    {
        warn!("Manual merge failed, keeping separate streams: {:#}", e);
        let _ = tokio::fs::remove_file(&temp_path).await;
        return MergeOutcome::Degraded {
            artifacts,
            reason: format!("{e:#}"),
        };
    }

    for original in [&video, &audio] {
        if let Err(e) = tokio::fs::remove_file(scratch_dir.join(original)).await {
            warn!("Failed to remove merged input {}: {}", original, e);
        }
    }

    if let Err(e) = tokio::fs::rename(&temp_path, scratch_dir.join(&merged_name)).await {
        warn!("Failed to move merged output into place: {}", e);
        let remaining = super::organizer::list_artifacts(scratch_dir)
            .await
            .unwrap_or_default();
        return MergeOutcome::Degraded {
            artifacts: remaining,
            reason: e.to_string(),
        };
    }

    match super::organizer::list_artifacts(scratch_dir).await {
        Ok(merged) => MergeOutcome::Merged(merged),
        Err(e) => {
            warn!("Failed to list merged output: {}", e);
            MergeOutcome::Degraded {
                artifacts: vec![merged_name],
                reason: e.to_string(),
            }
        }
    }
}
