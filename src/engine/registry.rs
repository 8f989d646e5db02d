use super::task::{FinalOutput, Task, TaskStatus};
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Concurrent task store. Every mutation happens under the entry's shard
/// lock, so a writer on one task never disturbs another task's fields.
/// Clones share the same store.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<DashMap<String, Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new queued task and returns its id.
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.tasks.insert(id.clone(), Task::queued());
        id
    }

    /// Snapshot of a task's current state.
    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).map(|entry| entry.value().clone())
    }

    /// Applies `f` to the task atomically. Returns `false` if the task is
    /// unknown.
    pub fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Task),
    {
        match self.tasks.get_mut(id) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    pub fn start(&self, id: &str) -> bool {
        self.transition(id, |task| task.advance(TaskStatus::Processing))
    }

    pub fn complete(&self, id: &str, output: FinalOutput) -> bool {
        self.transition(id, |task| task.complete(output))
    }

    pub fn fail(&self, id: &str, message: impl Into<String>) -> bool {
        let message = message.into();
        self.transition(id, |task| task.fail(message))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    fn transition<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Task) -> bool,
    {
        match self.tasks.get_mut(id) {
            Some(mut entry) => f(entry.value_mut()),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::task::OutputType;

    #[test]
    fn test_create_and_get() {
        let registry = TaskRegistry::new();
        let id = registry.create();

        let task = registry.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.progress, 0.0);
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lifecycle() {
        let registry = TaskRegistry::new();
        let id = registry.create();

        assert!(registry.start(&id));
        assert!(registry.update(&id, |t| t.progress = 42.0));
        assert!(registry.complete(
            &id,
            FinalOutput {
                output_type: OutputType::Folder,
                primary_id: "Mix".to_string(),
                files: vec!["a.mp3".to_string(), "b.mp3".to_string()],
            }
        ));

        let task = registry.get(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.output_type, Some(OutputType::Folder));
        assert_eq!(task.files.len(), 2);

        assert!(!registry.fail(&id, "too late"));
        assert!(!registry.start(&id));
        assert_eq!(registry.get(&id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_unknown_task_updates_are_rejected() {
        let registry = TaskRegistry::new();
        assert!(!registry.update("nope", |t| t.progress = 1.0));
        assert!(!registry.start("nope"));
        assert!(!registry.fail("nope", "x"));
    }

    #[test]
    fn test_concurrent_writers_do_not_interfere() {
        let registry = TaskRegistry::new();
        let ids: Vec<String> = (0..8).map(|_| registry.create()).collect();

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .enumerate()
            .map(|(n, id)| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    registry.start(&id);
                    for step in 0..=100 {
                        registry.update(&id, |t| {
                            t.progress = step as f64;
                            t.playlist_index = Some(n as u32);
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        for (n, id) in ids.iter().enumerate() {
            let task = registry.get(id).unwrap();
            assert_eq!(task.progress, 100.0);
            assert_eq!(task.playlist_index, Some(n as u32));
            assert_eq!(task.status, TaskStatus::Processing);
        }
    }
}
