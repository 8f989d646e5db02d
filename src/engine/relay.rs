use super::registry::TaskRegistry;
use super::task::TaskStatus;
use crate::media::{ProgressEvent, ProgressPhase};

/// Writes normalized progress events into one task's registry entry.
#[derive(Clone)]
pub struct ProgressRelay {
    registry: TaskRegistry,
    task_id: String,
}

impl ProgressRelay {
    pub fn new(registry: TaskRegistry, task_id: impl Into<String>) -> Self {
        Self {
            registry,
            task_id: task_id.into(),
        }
    }

    pub fn handle(&self, event: ProgressEvent) {
        self.registry.update(&self.task_id, |task| {
            // Late events must not touch a finished task.
            if task.status != TaskStatus::Processing {
                return;
            }

            match event.phase {
                ProgressPhase::Downloading => {
                    task.progress = event.percent.unwrap_or(0.0);
                    if event.speed.is_some() {
                        task.speed = event.speed;
                    }
                    if event.eta.is_some() {
                        task.eta = event.eta;
                    }
                    if let Some(file) = event.current_file() {
                        task.current_file = Some(file);
                    }
                }
                ProgressPhase::Finished => {
                    task.progress = 100.0;
                    if let Some(file) = event.current_file() {
                        task.current_file = Some(file);
                    }
                }
                ProgressPhase::Other => {}
            }

            if event.playlist_index.is_some() {
                task.playlist_index = event.playlist_index;
            }
            if event.playlist_total.is_some() {
                task.playlist_total = event.playlist_total;
            }
        });
    }
}
