//! In-process advisory locks keyed by task ID.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Tracks which task IDs have a run in flight.
#[derive(Debug, Clone, Default)]
pub struct TaskLocks {
    active: Arc<Mutex<HashSet<String>>>,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `task_id`, or `None` if another run holds it.
    pub fn try_acquire(&self, task_id: &str) -> Option<TaskGuard> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(task_id.to_string()) {
            return None;
        }
        Some(TaskGuard {
            active: Arc::clone(&self.active),
            task_id: task_id.to_string(),
        })
    }

}

/// Releases the task ID on drop.
#[derive(Debug)]
pub struct TaskGuard {
    active: Arc<Mutex<HashSet<String>>>,
    task_id: String,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_refused_until_release() {
        let locks = TaskLocks::new();
        let guard = locks.try_acquire("t").unwrap();
        assert!(locks.try_acquire("t").is_none());
        assert!(locks.try_acquire("other").is_some());

        drop(guard);
        assert!(locks.try_acquire("t").is_some());
    }
}
