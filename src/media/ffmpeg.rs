use anyhow::{Context, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use tracing::{info, warn};

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Detected once at startup; gates which format policies are reachable.
    fn is_available(&self) -> bool;

    /// Combines a video-only and an audio-only file into `output`,
    /// copying the video stream and re-encoding audio.
    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<()>;
}

pub struct Ffmpeg {
    binary: String,
    available: bool,
}

impl Ffmpeg {
    pub async fn detect(binary: &str) -> Self {
        let available = match tokio::process::Command::new(binary)
            .arg("-version")
            .output()
            .await
        {
            Ok(output) => {
                if output.status.success() {
                    let version_line = String::from_utf8_lossy(&output.stdout)
                        .lines()
                        .next()
                        .unwrap_or("unknown")
                        .to_string();
                    info!("✅ ffmpeg is available: {}", version_line);
                    true
                } else {
                    warn!("❌ ffmpeg command failed");
                    false
                }
            }
            Err(e) => {
                warn!(
                    "❌ ffmpeg not found: {} (high quality merging and upscaling disabled)",
                    e
                );
                false
            }
        };

        Self {
            binary: binary.to_string(),
            available,
        }
    }

    pub fn merge_args(video: &Path, audio: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-y", "-loglevel", "error", "-i"]
            .iter()
            .map(OsString::from)
            .collect();
        args.push(video.into());
        args.push("-i".into());
        args.push(audio.into());
        for arg in [
            "-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy", "-c:a", "aac", "-b:a", "192k",
        ] {
            args.push(arg.into());
        }
        args.push(output.into());
        args
    }
}

#[async_trait]
impl Transcoder for Ffmpeg {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn merge(&self, video: &Path, audio: &Path, output: &Path) -> Result<()> {
        info!(
            "Merging {} and {} with ffmpeg",
            video.display(),
            audio.display()
        );

        let output_result = tokio::process::Command::new(&self.binary)
            .args(Self::merge_args(video, audio, output))
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to spawn ffmpeg")?;

        if !output_result.status.success() {
            let error = String::from_utf8_lossy(&output_result.stderr);
            return Err(anyhow::anyhow!(
                "ffmpeg failed with status {}: {}",
                output_result.status,
                error.trim()
            ));
        }

        info!("Merged into {}", output.display());
        Ok(())
    }
}
