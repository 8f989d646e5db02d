use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Summary of a collection URL. `index` on each entry is the 1-based
/// position in the source collection, gaps included.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlaylistSummary {
    pub is_playlist: bool,
    pub title: String,
    pub count: usize,
    pub platform: String,
    pub entries: Vec<PlaylistEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlaylistEntry {
    pub index: usize,
    pub id: String,
    pub title: String,
    pub duration: f64,
    pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SingleSummary {
    pub is_playlist: bool,
    pub id: String,
    pub title: String,
    pub thumbnail: String,
    pub duration: f64,
    pub platform: String,
    /// Quality label ("720", "128", ...) to estimated bytes.
    pub sizes: BTreeMap<String, u64>,
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum MediaInfo {
    Playlist(PlaylistSummary),
    Single(SingleSummary),
}

impl MediaInfo {
    /// Placeholder handed out when probing fails.
    pub fn placeholder() -> Self {
        MediaInfo::Single(SingleSummary {
            is_playlist: false,
            id: String::new(),
            title: String::new(),
            thumbnail: String::new(),
            duration: 0.0,
            platform: String::new(),
            sizes: BTreeMap::new(),
            video_url: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Resolved(MediaInfo),
    Degraded { info: MediaInfo, reason: String },
}

impl ProbeOutcome {
    pub fn degraded(reason: impl Into<String>) -> Self {
        ProbeOutcome::Degraded {
            info: MediaInfo::placeholder(),
            reason: reason.into(),
        }
    }

    pub fn into_info(self) -> MediaInfo {
        match self {
            ProbeOutcome::Resolved(info) => info,
            ProbeOutcome::Degraded { info, .. } => info,
        }
    }
}

// Shapes of the extractor's JSON dump. Every field is optional because
// extractors differ wildly in what they fill in.

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawInfo {
    pub id: Option<String>,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub extractor_key: Option<String>,
    pub url: Option<String>,
    pub height: Option<f64>,
    pub entries: Option<Vec<Option<RawEntry>>>,
    #[serde(deserialize_with = "null_as_default")]
    pub formats: Vec<RawFormat>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawEntry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub duration: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub thumbnails: Vec<RawThumbnail>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawThumbnail {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawFormat {
    pub ext: Option<String>,
    pub url: Option<String>,
    pub vcodec: Option<String>,
    pub acodec: Option<String>,
    pub height: Option<f64>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
    pub tbr: Option<f64>,
    pub vbr: Option<f64>,
    pub abr: Option<f64>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl RawFormat {
    /// Carries a video track. A missing `vcodec` counts as video, matching
    /// how yt-dlp treats formats of unknown codec.
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref() != Some("none")
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref() != Some("none")
    }

    pub fn is_audio_only(&self) -> bool {
        !self.has_video() && self.has_audio()
    }

    pub fn height(&self) -> Option<u32> {
        self.height.filter(|h| *h > 0.0).map(|h| h as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_serializes_empty_fields() {
        let json = serde_json::to_value(MediaInfo::placeholder()).unwrap();
        assert_eq!(json["is_playlist"], false);
        assert_eq!(json["title"], "");
        assert_eq!(json["thumbnail"], "");
        assert!(json["sizes"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_degraded_outcome_carries_placeholder() {
        let outcome = ProbeOutcome::degraded("boom");
        assert!(matches!(outcome, ProbeOutcome::Degraded { .. }));
        assert_eq!(outcome.into_info(), MediaInfo::placeholder());
    }

    #[test]
    fn test_raw_info_tolerates_nulls_and_missing_fields() {
        let raw: RawInfo = serde_json::from_str(
            r#"{"id": "abc", "title": null, "formats": null, "entries": [null, {"id": "x", "thumbnails": null}], "extra": 1}"#,
        )
        .unwrap();
        assert_eq!(raw.id.as_deref(), Some("abc"));
        assert!(raw.title.is_none());
        assert_eq!(raw.entries.as_ref().unwrap().len(), 2);
        assert!(raw.formats.is_empty());
    }

    #[test]
    fn test_format_stream_classification() {
        let audio = RawFormat {
            vcodec: Some("none".into()),
            acodec: Some("opus".into()),
            ..Default::default()
        };
        let video = RawFormat {
            vcodec: Some("avc1".into()),
            acodec: Some("none".into()),
            height: Some(1080.0),
            ..Default::default()
        };
        assert!(audio.is_audio_only());
        assert!(!video.is_audio_only());
        assert!(!video.has_audio());
        assert_eq!(video.height(), Some(1080));
    }
}
