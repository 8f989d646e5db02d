use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
}

/// Caller-supplied description of what to fetch. Immutable once a task
/// starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default)]
    pub platform: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub quality: String,
    #[serde(rename = "isPlaylist", alias = "is_playlist", default)]
    pub is_playlist: bool,
    #[serde(default)]
    pub playlist_start: Option<u32>,
    #[serde(default)]
    pub playlist_end: Option<u32>,
    #[serde(default)]
    pub title: Option<String>,
}

impl DownloadRequest {
    /// `platform = "playlist"` forces collection handling regardless of
    /// the flag.
    pub fn playlist_mode(&self) -> bool {
        self.is_playlist || self.platform == "playlist"
    }

    pub fn validate(&self) -> Result<(), String> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err("URL is required".to_string());
        }

        let parsed = url::Url::parse(url).map_err(|e| format!("Invalid URL: {e}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("Unsupported URL scheme: {}", parsed.scheme()));
        }

        if self.playlist_start == Some(0) || self.playlist_end == Some(0) {
            return Err("Playlist positions start at 1".to_string());
        }
        if let (Some(start), Some(end)) = (self.playlist_start, self.playlist_end) {
            if end < start {
                return Err(format!(
                    "Playlist end ({end}) is before playlist start ({start})"
                ));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }

    /// Status only moves forward. Re-entering `Processing` is allowed.
    pub fn can_advance_to(&self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (TaskStatus::Queued, TaskStatus::Processing | TaskStatus::Error) => true,
            (TaskStatus::Processing, TaskStatus::Processing) => true,
            (TaskStatus::Processing, TaskStatus::Completed | TaskStatus::Error) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    File,
    Folder,
}

/// Where a finished task's artifacts ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalOutput {
    pub output_type: OutputType,
    /// File name (single item) or folder name (playlist).
    pub primary_id: String,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub status: TaskStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_total: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_type: Option<OutputType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Task {
    pub fn queued() -> Self {
        Self {
            status: TaskStatus::Queued,
            progress: 0.0,
            speed: None,
            eta: None,
            current_file: None,
            playlist_index: None,
            playlist_total: None,
            output_type: None,
            file_id: None,
            files: Vec::new(),
            error: None,
        }
    }

    pub fn advance(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// Output fields are written together with the status change.
    pub fn complete(&mut self, output: FinalOutput) -> bool {
        if !self.advance(TaskStatus::Completed) {
            return false;
        }
        self.progress = 100.0;
        self.output_type = Some(output.output_type);
        self.file_id = Some(output.primary_id);
        self.files = output.files;
        true
    }

    pub fn fail(&mut self, message: String) -> bool {
        if !self.advance(TaskStatus::Error) {
            return false;
        }
        self.error = Some(message);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> DownloadRequest {
        DownloadRequest {
            url: "https://www.youtube.com/watch?v=abc".to_string(),
            platform: "youtube".to_string(),
            media_type: MediaType::Video,
            quality: "1080".to_string(),
            is_playlist: false,
            playlist_start: None,
            playlist_end: None,
            title: None,
        }
    }

    #[test]
    fn test_request_wire_format() {
        let parsed: DownloadRequest = serde_json::from_value(json!({
            "url": "https://example.com/v",
            "platform": "playlist",
            "type": "audio",
            "quality": "320",
            "isPlaylist": true,
            "playlist_start": 5,
            "playlist_end": 10,
            "title": "Mix"
        }))
        .unwrap();

        assert_eq!(parsed.media_type, MediaType::Audio);
        assert!(parsed.is_playlist);
        assert_eq!(parsed.playlist_start, Some(5));
        assert_eq!(parsed.title.as_deref(), Some("Mix"));

        let minimal: DownloadRequest = serde_json::from_value(json!({
            "url": "https://example.com/v",
            "type": "video",
            "quality": "720",
            "is_playlist": true
        }))
        .unwrap();
        assert!(minimal.is_playlist);
        assert_eq!(minimal.platform, "");
    }

    #[test]
    fn test_playlist_mode() {
        let mut req = request();
        assert!(!req.playlist_mode());
        req.platform = "playlist".to_string();
        assert!(req.playlist_mode());
        req.platform = "youtube".to_string();
        req.is_playlist = true;
        assert!(req.playlist_mode());
    }

    #[test]
    fn test_validate() {
        assert!(request().validate().is_ok());

        let mut req = request();
        req.url = "  ".to_string();
        assert!(req.validate().is_err());

        req.url = "ftp://example.com/file".to_string();
        assert!(req.validate().is_err());

        req.url = "not a url".to_string();
        assert!(req.validate().is_err());

        let mut req = request();
        req.playlist_start = Some(0);
        assert!(req.validate().is_err());

        req.playlist_start = Some(10);
        req.playlist_end = Some(5);
        assert!(req.validate().is_err());

        req.playlist_end = Some(10);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_status_only_moves_forward() {
        use TaskStatus::*;
        assert!(Queued.can_advance_to(Processing));
        assert!(Processing.can_advance_to(Processing));
        assert!(Processing.can_advance_to(Completed));
        assert!(Processing.can_advance_to(Error));
        assert!(!Queued.can_advance_to(Completed));
        assert!(!Processing.can_advance_to(Queued));
        assert!(!Completed.can_advance_to(Error));
        assert!(!Error.can_advance_to(Processing));
        assert!(Completed.is_terminal() && Error.is_terminal());
    }

    #[test]
    fn test_complete_sets_output_once() {
        let mut task = Task::queued();
        let output = FinalOutput {
            output_type: OutputType::File,
            primary_id: "a.mp4".to_string(),
            files: vec!["a.mp4".to_string()],
        };

        assert!(!task.complete(output.clone()));
        assert!(task.file_id.is_none());

        assert!(task.advance(TaskStatus::Processing));
        assert!(task.complete(output.clone()));
        assert_eq!(task.file_id.as_deref(), Some("a.mp4"));
        assert_eq!(task.progress, 100.0);

        let other = FinalOutput {
            primary_id: "b.mp4".to_string(),
            ..output
        };
        assert!(!task.complete(other));
        assert!(!task.fail("late".to_string()));
        assert_eq!(task.file_id.as_deref(), Some("a.mp4"));
        assert!(task.error.is_none());
    }

    #[test]
    fn test_task_serialization() {
        let mut task = Task::queued();
        task.advance(TaskStatus::Processing);
        task.fail("Download failed".to_string());

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "Download failed");
        assert!(json.get("file_id").is_none());
        assert!(json.get("speed").is_none());
    }
}
