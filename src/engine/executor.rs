use super::error::{EngineError, EngineResult};
use super::format::{FormatPlan, Reencode};
use super::relay::ProgressRelay;
use crate::media::{AudioExtraction, Extractor, FetchConfig, PlaylistSelection};
use std::path::Path;
use tracing::{info, warn};

pub const FILENAME_TEMPLATE: &str = "%(title)s.%(ext)s";

pub fn fetch_config(url: &str, scratch_dir: &Path, plan: &FormatPlan) -> FetchConfig {
    let audio_extraction = match &plan.reencode {
        Some(Reencode::ExtractAudio {
            codec,
            bitrate_kbps,
        }) => Some(AudioExtraction {
            codec: *codec,
            bitrate_kbps: *bitrate_kbps,
        }),
        _ => None,
    };

    // Audio extraction picks its own container; only merges need one.
    let merge_container = match audio_extraction {
        Some(_) => None,
        None => plan.container,
    };

    FetchConfig {
        url: url.trim().to_string(),
        output_dir: scratch_dir.to_path_buf(),
        filename_template: FILENAME_TEMPLATE.to_string(),
        format: plan.format_expression.clone(),
        merge_container,
        audio_extraction,
        merge_output_args: plan
            .reencode
            .as_ref()
            .map(Reencode::merge_output_args)
            .unwrap_or_default(),
        playlist: plan.playlist,
        ignore_errors: true,
        restrict_filenames: true,
    }
}

/// Runs the extractor once into `scratch_dir`. Not retried.
pub async fn execute(
    extractor: &dyn Extractor,
    url: &str,
    scratch_dir: &Path,
    plan: &FormatPlan,
    relay: &ProgressRelay,
) -> EngineResult<()> {
    let config = fetch_config(url, scratch_dir, plan);
    info!(
        "Fetching {} with {} (format: {})",
        config.url,
        extractor.name(),
        config.format
    );

    let relay = relay.clone();
    let report = extractor
        .fetch(&config, &move |event| relay.handle(event))
        .await
        .map_err(|e| EngineError::Extraction(format!("{e:#}")))?;

    if report.success {
        return Ok(());
    }

    if plan.playlist == PlaylistSelection::Single {
        let diagnostic = if report.diagnostic.is_empty() {
            format!("{} exited with an error", extractor.name())
        } else {
            report.diagnostic
        };
        return Err(EngineError::Extraction(diagnostic));
    }

    warn!(
        "{} reported errors for some playlist items: {}",
        extractor.name(),
        report.diagnostic
    );
    Ok(())
}
