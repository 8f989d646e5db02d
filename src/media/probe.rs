use super::extractor::Extractor;
use super::types::{
    MediaInfo, PlaylistEntry, PlaylistSummary, ProbeOutcome, RawEntry, RawFormat, RawInfo,
    SingleSummary,
};
use crate::utils::format_bytes;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Vertical resolutions offered as video quality labels.
pub const VIDEO_QUALITY_TIERS: [u32; 7] = [480, 720, 1080, 1440, 2160, 3840, 4320];

/// Audio bitrate presets (kbps) offered as audio quality labels.
pub const AUDIO_BITRATE_PRESETS: [u32; 2] = [128, 320];

pub const MAX_PLAYLIST_ENTRIES: usize = 2000;

/// Queries metadata only; never downloads. Failures degrade to a
/// placeholder instead of propagating.
pub async fn probe(extractor: &dyn Extractor, url: &str) -> ProbeOutcome {
    match probe_raw(extractor, url).await {
        Ok(raw) => {
            let info = normalize(raw);
            match &info {
                MediaInfo::Playlist(playlist) => info!(
                    "Probed playlist '{}' with {} entries",
                    playlist.title, playlist.count
                ),
                MediaInfo::Single(single) => info!(
                    "Probed '{}' ({:.0}s, {} size estimates)",
                    single.title,
                    single.duration,
                    single.sizes.len()
                ),
            }
            ProbeOutcome::Resolved(info)
        }
        Err(e) => {
            warn!("Probe failed for {}: {:#}", url, e);
            ProbeOutcome::degraded(format!("{e:#}"))
        }
    }
}

pub async fn probe_raw(extractor: &dyn Extractor, url: &str) -> Result<RawInfo> {
    let value = extractor.probe_metadata(url).await?;
    serde_json::from_value(value).context("Failed to parse media metadata")
}

/// Highest vertical resolution among the source's video streams.
pub fn best_source_height(raw: &RawInfo) -> Option<u32> {
    raw.formats
        .iter()
        .filter(|f| f.has_video())
        .filter_map(RawFormat::height)
        .max()
        .or_else(|| raw.height.filter(|h| *h > 0.0).map(|h| h as u32))
}

pub fn normalize(mut raw: RawInfo) -> MediaInfo {
    let Some(raw_entries) = raw.entries.take() else {
        return MediaInfo::Single(single_summary(raw));
    };

    let entries = playlist_entries(&raw_entries);
    MediaInfo::Playlist(PlaylistSummary {
        is_playlist: true,
        title: raw.title.unwrap_or_else(|| "Playlist".to_string()),
        count: entries.len(),
        platform: raw.extractor_key.unwrap_or_else(|| "custom".to_string()),
        entries,
    })
}

fn playlist_entries(raw_entries: &[Option<RawEntry>]) -> Vec<PlaylistEntry> {
    if raw_entries.len() > MAX_PLAYLIST_ENTRIES {
        debug!(
            "Playlist has {} entries, keeping the first {}",
            raw_entries.len(),
            MAX_PLAYLIST_ENTRIES
        );
    }

    raw_entries
        .iter()
        .take(MAX_PLAYLIST_ENTRIES)
        .enumerate()
        .filter_map(|(position, entry)| {
            let entry = entry.as_ref()?;
            let index = position + 1;
            Some(PlaylistEntry {
                index,
                id: entry.id.clone().unwrap_or_else(|| "N/A".to_string()),
                title: entry
                    .title
                    .clone()
                    .unwrap_or_else(|| format!("Video {index}")),
                duration: entry.duration.unwrap_or(0.0),
                thumbnail: entry.thumbnails.last().and_then(|t| t.url.clone()),
            })
        })
        .collect()
}

fn single_summary(raw: RawInfo) -> SingleSummary {
    let duration = raw.duration.unwrap_or(0.0).max(0.0);
    let sizes = estimate_sizes(&raw.formats, duration);
    let video_url = raw.url.clone().or_else(|| playback_url(&raw.formats));

    SingleSummary {
        is_playlist: false,
        id: raw.id.unwrap_or_default(),
        title: raw.title.unwrap_or_else(|| "Unknown Title".to_string()),
        thumbnail: raw.thumbnail.unwrap_or_default(),
        duration,
        platform: raw.extractor_key.unwrap_or_default(),
        sizes,
        video_url,
    }
}

/// Last combined (audio+video) mp4 stream; extractors list formats worst
/// to best.
fn playback_url(formats: &[RawFormat]) -> Option<String> {
    formats
        .iter()
        .filter(|f| f.has_video() && f.has_audio() && f.ext.as_deref() == Some("mp4"))
        .filter_map(|f| f.url.clone())
        .last()
}

fn bytes_for_bitrate(kbps: f64, duration: f64) -> u64 {
    (kbps * 1000.0 / 8.0 * duration) as u64
}

/// Size of one stream: explicit filesize, then approximate filesize, then
/// total bitrate, then video+audio bitrate.
pub fn stream_size(format: &RawFormat, duration: f64) -> u64 {
    let positive = |v: Option<f64>| v.filter(|x| *x > 0.0);

    if let Some(size) = positive(format.filesize) {
        return size as u64;
    }
    if let Some(size) = positive(format.filesize_approx) {
        return size as u64;
    }
    if duration <= 0.0 {
        return 0;
    }
    if let Some(tbr) = positive(format.tbr) {
        return bytes_for_bitrate(tbr, duration);
    }
    let combined = positive(format.vbr).unwrap_or(0.0) + positive(format.abr).unwrap_or(0.0);
    if combined > 0.0 {
        return bytes_for_bitrate(combined, duration);
    }
    0
}

/// Byte-rate guess (kbps) for a resolution tier when the source gives no
/// usable size information.
fn heuristic_kbps(height: u32) -> f64 {
    if height >= 1080 {
        2000.0
    } else if height >= 720 {
        1000.0
    } else {
        700.0
    }
}

pub fn estimate_sizes(formats: &[RawFormat], duration: f64) -> BTreeMap<String, u64> {
    let mut sizes = BTreeMap::new();

    let best_audio_size = formats
        .iter()
        .filter(|f| f.is_audio_only())
        .max_by(|a, b| {
            a.abr
                .unwrap_or(0.0)
                .partial_cmp(&b.abr.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|f| stream_size(f, duration))
        .unwrap_or(0);

    for tier in VIDEO_QUALITY_TIERS {
        let best_video = formats
            .iter()
            .filter(|f| f.has_video() && f.height() == Some(tier))
            .max_by_key(|f| stream_size(f, duration));

        let Some(video) = best_video else {
            continue;
        };

        let mut total = stream_size(video, duration);
        if !video.has_audio() {
            total += best_audio_size;
        }
        if total == 0 && duration > 0.0 {
            total = bytes_for_bitrate(heuristic_kbps(tier), duration);
        }
        debug!("Estimated {}p at {}", tier, format_bytes(total));
        sizes.insert(tier.to_string(), total);
    }

    if sizes.is_empty() && duration > 0.0 {
        sizes.insert(
            "1080".to_string(),
            bytes_for_bitrate(heuristic_kbps(1080), duration),
        );
    }

    if duration > 0.0 {
        for kbps in AUDIO_BITRATE_PRESETS {
            sizes.insert(kbps.to_string(), bytes_for_bitrate(kbps as f64, duration));
        }
    }

    sizes
}
