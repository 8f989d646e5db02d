mod extractor;
mod ffmpeg;
pub mod probe;
mod progress;
mod types;
mod ytdlp;

pub use extractor::{
    AudioExtraction, Container, Extractor, FetchConfig, FetchReport, PlaylistSelection,
    ProgressCallback,
};
pub use ffmpeg::{Ffmpeg, Transcoder};
pub use progress::{ProgressEvent, ProgressPhase};
pub use types::{MediaInfo, ProbeOutcome};
pub use ytdlp::YtDlpExtractor;

use anyhow::Result;
use tracing::{info, warn};

pub async fn test_setup(extractor: &dyn Extractor, transcoder: &dyn Transcoder) -> Result<()> {
    info!("Testing media tool setup...");

    let extractor_available = extractor.test_availability().await;

    if extractor_available && !transcoder.is_available() {
        warn!(
            "⚠️  {} will work but merging, audio extraction and upscaling are disabled",
            extractor.name()
        );
    }

    if extractor_available {
        info!("✅ {} is ready", extractor.name());
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} is not available. Please install it to enable downloads.",
            extractor.name()
        ))
    }
}
