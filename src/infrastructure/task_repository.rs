use crate::domain::models::Task;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::kv_store::KeyValueStore;
use std::sync::Arc;

pub const TASKS_KEY: &str = "productivity_tasks";

/// Ordered task collection persisted as one JSON array.
#[derive(Clone)]
pub struct TaskRepository {
    store: Arc<dyn KeyValueStore>,
}

impl TaskRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Unreadable state falls back to an empty list; tasks dated outside the
    /// supported years are dropped.
    pub fn load(&self) -> Result<Vec<Task>, InfraError> {
        let Some(raw) = self.store.get(TASKS_KEY)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<Task>>(&raw) {
            Ok(tasks) => Ok(tasks
                .into_iter()
                .filter(|task| match task.date.validate() {
                    Ok(()) => true,
                    Err(error) => {
                        tracing::warn!(key = TASKS_KEY, name = %task.name, error = %error, "skipping stored task");
                        false
                    }
                })
                .collect()),
            Err(error) => {
                tracing::warn!(key = TASKS_KEY, error = %error, "discarding malformed task list");
                Ok(Vec::new())
            }
        }
    }

    pub fn save(&self, tasks: &[Task]) -> Result<(), InfraError> {
        let payload = serde_json::to_string(tasks)?;
        self.store.set(TASKS_KEY, &payload)?;
        tracing::debug!(count = tasks.len(), "saved task list");
        Ok(())
    }
}
