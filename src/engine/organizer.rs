use super::error::{EngineError, EngineResult};
use super::task::{DownloadRequest, FinalOutput, OutputType};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SCRATCH_DIR_NAME: &str = ".tasks";
const MAX_FOLDER_NAME_LEN: usize = 120;
const TRANSIENT_SUFFIXES: [&str; 5] = [".part", ".ytdl", ".temp", ".tmp", ".merging.mp4"];

/// Shared output root plus the per-task scratch area beneath it.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    scratch_root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let scratch_root = root.join(SCRATCH_DIR_NAME);
        Self { root, scratch_root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scratch_dir(&self, task_id: &str) -> PathBuf {
        self.scratch_root.join(task_id)
    }

    /// Creates a fresh, empty scratch directory for the task.
    pub async fn prepare_scratch(&self, task_id: &str) -> io::Result<PathBuf> {
        let dir = self.scratch_dir(task_id);
        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Removes scratch directories left behind by a previous process.
    /// Returns how many were removed.
    pub async fn sweep_scratch(&self) -> io::Result<usize> {
        tokio::fs::create_dir_all(&self.root).await?;
        if !tokio::fs::try_exists(&self.scratch_root).await? {
            return Ok(0);
        }

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.scratch_root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove stale scratch {}: {}", path.display(), e),
            }
        }
        Ok(removed)
    }

    /// Maps a public file or folder id (`name` or `folder/name`) to a path
    /// under the output root.
    pub async fn resolve(&self, id: &str) -> Option<PathBuf> {
        let components: Vec<&str> = id.split('/').collect();
        if components.is_empty()
            || components.len() > 2
            || !components.iter().all(|c| is_public_component(c))
        {
            return None;
        }

        let path = components
            .iter()
            .fold(self.root.clone(), |path, component| path.join(component));
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(path),
            _ => None,
        }
    }
}

fn is_public_component(component: &str) -> bool {
    !component.is_empty()
        && !component.starts_with('.')
        && !component.contains(['/', '\\'])
        && component != ".."
}

fn is_transient(name: &str) -> bool {
    TRANSIENT_SUFFIXES
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

/// Sorted names of the regular files in `dir`.
pub async fn list_files(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            continue;
        }
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Finished artifacts in a scratch directory, without the extractor's
/// partial downloads.
pub async fn list_artifacts(scratch_dir: &Path) -> io::Result<Vec<String>> {
    let mut names = list_files(scratch_dir).await?;
    names.retain(|name| !is_transient(name));
    Ok(names)
}

pub fn sanitize_folder_name(title: Option<&str>, task_id: &str) -> String {
    let mut name = String::new();
    for c in title.unwrap_or_default().chars() {
        let c = if c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.' | '(' | ')') {
            c
        } else {
            '_'
        };
        if c == '_' && name.ends_with('_') {
            continue;
        }
        name.push(c);
    }

    let name: String = name
        .trim_matches(|c| matches!(c, ' ' | '.' | '_'))
        .chars()
        .take(MAX_FOLDER_NAME_LEN)
        .collect();
    let name = name.trim_end_matches(|c| matches!(c, ' ' | '.' | '_'));

    if name.is_empty() {
        let short_id: String = task_id.chars().take(8).collect();
        format!("playlist_{short_id}")
    } else {
        name.to_string()
    }
}

async fn move_into(scratch_dir: &Path, name: &str, dest_dir: &Path) -> EngineResult<()> {
    let from = scratch_dir.join(name);
    let to = dest_dir.join(name);

    // Same-named files in the destination are replaced.
    if tokio::fs::metadata(&to)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
    {
        tokio::fs::remove_file(&to)
            .await
            .map_err(|e| EngineError::organization(format!("Failed to replace {name}"), e))?;
    }

    tokio::fs::rename(&from, &to)
        .await
        .map_err(|e| EngineError::organization(format!("Failed to move {name}"), e))?;
    debug!("Moved {} to {}", from.display(), to.display());
    Ok(())
}

/// Moves the artifacts out of scratch into their caller-visible place and
/// removes the scratch directory.
pub async fn finalize(
    layout: &OutputLayout,
    task_id: &str,
    scratch_dir: &Path,
    request: &DownloadRequest,
    artifacts: &[String],
) -> EngineResult<FinalOutput> {
    if artifacts.is_empty() {
        return Err(EngineError::NoArtifacts);
    }

    let output = if request.playlist_mode() {
        let folder = sanitize_folder_name(request.title.as_deref(), task_id);
        let folder_path = layout.root().join(&folder);

        if tokio::fs::try_exists(&folder_path).await.unwrap_or(false) {
            info!("Adding files to existing folder {}", folder);
        }
        tokio::fs::create_dir_all(&folder_path)
            .await
            .map_err(|e| EngineError::organization(format!("Failed to create {folder}"), e))?;

        for name in artifacts {
            move_into(scratch_dir, name, &folder_path).await?;
        }

        let files = list_files(&folder_path)
            .await
            .map_err(|e| EngineError::organization(format!("Failed to list {folder}"), e))?;
        FinalOutput {
            output_type: OutputType::Folder,
            primary_id: folder,
            files,
        }
    } else {
        for name in artifacts {
            move_into(scratch_dir, name, layout.root()).await?;
        }
        FinalOutput {
            output_type: OutputType::File,
            primary_id: artifacts[0].clone(),
            files: artifacts.to_vec(),
        }
    };

    tokio::fs::remove_dir_all(scratch_dir)
        .await
        .map_err(|e| EngineError::organization("Failed to remove scratch directory", e))?;

    info!(
        "Task {} finalized as {:?} {}",
        task_id, output.output_type, output.primary_id
    );
    Ok(output)
}
