use super::{
    extractor::{Extractor, FetchConfig, FetchReport, PlaylistSelection, ProgressCallback},
    progress::{progress_template, ProgressEvent},
};
use crate::config::ToolsConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

const STDERR_TAIL_LINES: usize = 20;

pub struct YtDlpExtractor {
    binary: String,
    ffmpeg_location: Option<String>,
    probe_timeout: Duration,
    socket_timeout_secs: u64,
    force_ipv4: bool,
}

impl YtDlpExtractor {
    pub fn new(tools: &ToolsConfig) -> Self {
        // A bare "ffmpeg" is found on PATH by yt-dlp itself.
        let ffmpeg_location = (tools.ffmpeg != "ffmpeg").then(|| tools.ffmpeg.clone());

        Self {
            binary: tools.ytdlp.clone(),
            ffmpeg_location,
            probe_timeout: Duration::from_secs(tools.probe_timeout_secs),
            socket_timeout_secs: tools.socket_timeout_secs,
            force_ipv4: tools.force_ipv4,
        }
    }

    fn probe_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--dump-single-json".to_string(),
            "--skip-download".to_string(),
            "--flat-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
        ];
        if self.force_ipv4 {
            args.push("--force-ipv4".to_string());
        }
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    pub fn fetch_args(&self, config: &FetchConfig) -> Vec<String> {
        let mut args: Vec<String> = ["--newline", "--no-colors", "--force-overwrites"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if config.restrict_filenames {
            args.push("--restrict-filenames".to_string());
        }
        if config.ignore_errors {
            args.push("--ignore-errors".to_string());
        }
        if self.force_ipv4 {
            args.push("--force-ipv4".to_string());
        }
        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.clone());
        }

        args.push("--output".to_string());
        args.push(
            config
                .output_dir
                .join(&config.filename_template)
                .to_string_lossy()
                .into_owned(),
        );
        args.push("--format".to_string());
        args.push(config.format.clone());

        if let Some(container) = config.merge_container {
            args.push("--merge-output-format".to_string());
            args.push(container.as_str().to_string());
        }

        if let Some(audio) = &config.audio_extraction {
            args.push("--extract-audio".to_string());
            args.push("--audio-format".to_string());
            args.push(audio.codec.as_str().to_string());
            args.push("--audio-quality".to_string());
            args.push(format!("{}K", audio.bitrate_kbps));
        }

        if !config.merge_output_args.is_empty() {
            args.push("--postprocessor-args".to_string());
            args.push(format!(
                "Merger+ffmpeg_o:{}",
                config.merge_output_args.join(" ")
            ));
        }

        match config.playlist {
            PlaylistSelection::Single => args.push("--no-playlist".to_string()),
            PlaylistSelection::All => args.push("--yes-playlist".to_string()),
            PlaylistSelection::Range { .. } => {
                args.push("--yes-playlist".to_string());
                if let Some(items) = config.playlist.items_spec() {
                    args.push("--playlist-items".to_string());
                    args.push(items);
                }
            }
        }

        args.push("--progress-template".to_string());
        args.push(progress_template());
        args.push("--".to_string());
        args.push(config.url.clone());
        args
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe_metadata(&self, url: &str) -> Result<Value> {
        debug!("Extracting metadata with yt-dlp for: {}", url);

        let output = tokio::time::timeout(
            self.probe_timeout,
            Command::new(&self.binary)
                .args(self.probe_args(url))
                .kill_on_drop(true)
                .output(),
        )
        .await
        .context("Media metadata extraction timed out")?
        .context("Failed to extract media metadata")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow::anyhow!(
                "Media metadata extraction failed: {}",
                error.trim()
            ));
        }

        serde_json::from_slice(&output.stdout).context("Failed to parse media metadata")
    }

    async fn fetch(
        &self,
        config: &FetchConfig,
        on_progress: &ProgressCallback,
    ) -> Result<FetchReport> {
        let args = self.fetch_args(config);
        info!(
            "Running yt-dlp into {} (format: {})",
            config.output_dir.display(),
            config.format
        );
        debug!("yt-dlp arguments: {:?}", args);

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .context("Failed to spawn yt-dlp")?;

        let stdout = child.stdout.take().context("Failed to get yt-dlp stdout")?;
        let stderr = child.stderr.take().context("Failed to get yt-dlp stderr")?;

        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("yt-dlp stderr: {}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .context("Failed to read yt-dlp output")?
        {
            match ProgressEvent::from_template_line(&line) {
                Some(event) => on_progress(event),
                None => debug!("yt-dlp: {}", line),
            }
        }

        let status = child.wait().await.context("Failed to wait for yt-dlp")?;
        let diagnostic = stderr_task
            .await
            .context("Failed to join yt-dlp stderr reader")?;

        if !status.success() {
            warn!("yt-dlp exited with {}", status);
        }

        Ok(FetchReport {
            success: status.success(),
            diagnostic,
        })
    }

    async fn test_availability(&self) -> bool {
        match Command::new(&self.binary).arg("--version").output().await {
            Ok(output) => {
                if output.status.success() {
                    let version = String::from_utf8_lossy(&output.stdout);
                    info!("✅ yt-dlp is available, version: {}", version.trim());
                    true
                } else {
                    warn!("❌ yt-dlp command failed");
                    false
                }
            }
            Err(e) => {
                warn!("❌ yt-dlp not found: {}", e);
                false
            }
        }
    }
}
