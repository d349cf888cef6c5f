use crate::engine::{local_day, now_ms};
use crate::sync::{DailyRecordSync, SyncOp};
use crate::Database;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

pub(crate) const TASKS_KEY: &str = "tasks";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItem {
    /// Creation time, epoch ms; unique within the checklist
    pub id: i64,
    pub text: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub completed: u32,
    pub total: u32,
}

/// Today's checklist. Only `completed` is ever edited in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checklist {
    items: Vec<TaskItem>,
}

impl Checklist {
    /// Malformed data yields an empty checklist
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<Vec<TaskItem>>(raw) {
            Ok(items) => Self { items },
            Err(e) => {
                warn!("[TASKS] Discarding malformed checklist: {}", e);
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.items)
    }

    pub fn items(&self) -> &[TaskItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<TaskItem> {
        self.items
    }

    /// Blank text is ignored
    pub fn add(&mut self, text: &str, now_ms: i64) -> Option<&TaskItem> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let id = match self.items.iter().map(|t| t.id).max() {
            Some(max) if max >= now_ms => max + 1,
            _ => now_ms,
        };
        self.items.push(TaskItem {
            id,
            text: text.to_string(),
            completed: false,
        });
        self.items.last()
    }

    /// Returns false for an unknown id
    pub fn toggle(&mut self, id: i64) -> bool {
        match self.items.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                task.completed = !task.completed;
                true
            }
            None => false,
        }
    }

    pub fn counts(&self) -> TaskCounts {
        TaskCounts {
            completed: self.items.iter().filter(|t| t.completed).count() as u32,
            total: self.items.len() as u32,
        }
    }
}

/// Local checklist persistence plus count mirroring to the daily record.
/// The local list stays authoritative even when the store write fails.
#[derive(Clone)]
pub struct TaskBoard {
    db: Arc<Database>,
    sync: DailyRecordSync,
    /// Held across load, mutate, persist and submit; shared by clones
    edits: Arc<Mutex<()>>,
}

impl TaskBoard {
    pub fn new(db: Arc<Database>, sync: DailyRecordSync) -> Self {
        Self {
            db,
            sync,
            edits: Arc::new(Mutex::new(())),
        }
    }

    fn lock_edits(&self) -> MutexGuard<'_, ()> {
        // Guards no data of its own, so a poisoned lock is still usable
        self.edits.lock().unwrap_or_else(|poisoned| {
            warn!("[TASKS] Edit lock poisoned, continuing");
            poisoned.into_inner()
        })
    }

    pub fn load(&self) -> Checklist {
        match self.db.get_app_meta(TASKS_KEY) {
            Ok(Some(raw)) => Checklist::from_json(&raw),
            Ok(None) => Checklist::default(),
            Err(e) => {
                error!("[TASKS] Failed to read checklist: {}", e);
                Checklist::default()
            }
        }
    }

    pub fn list(&self) -> Vec<TaskItem> {
        self.load().into_items()
    }

    pub fn add_task(&self, text: &str) -> Vec<TaskItem> {
        self.add_task_at(text, now_ms())
    }

    pub fn add_task_at(&self, text: &str, now_ms: i64) -> Vec<TaskItem> {
        let _edits = self.lock_edits();
        let mut checklist = self.load();
        let Some(id) = checklist.add(text, now_ms).map(|task| task.id) else {
            return checklist.into_items();
        };
        info!("[TASKS] Added task {}", id);
        self.commit(&checklist, now_ms);
        checklist.into_items()
    }

    pub fn toggle_task(&self, id: i64) -> Vec<TaskItem> {
        self.toggle_task_at(id, now_ms())
    }

    pub fn toggle_task_at(&self, id: i64, now_ms: i64) -> Vec<TaskItem> {
        let _edits = self.lock_edits();
        let mut checklist = self.load();
        if !checklist.toggle(id) {
            warn!("[TASKS] Toggle for unknown task {}", id);
            return checklist.into_items();
        }
        self.commit(&checklist, now_ms);
        checklist.into_items()
    }

    /// New working day: the local list starts empty
    pub fn clear(&self) -> Result<(), String> {
        let _edits = self.lock_edits();
        self.db
            .delete_app_meta(TASKS_KEY)
            .map_err(|e| format!("Failed to clear checklist: {}", e))?;
        info!("[TASKS] Checklist cleared");
        Ok(())
    }

    fn commit(&self, checklist: &Checklist, now_ms: i64) {
        match checklist.to_json() {
            Ok(raw) => {
                if let Err(e) = self.db.set_app_meta(TASKS_KEY, &raw) {
                    error!("[TASKS] Failed to save checklist: {}", e);
                }
            }
            Err(e) => error!("[TASKS] Failed to serialize checklist: {}", e),
        }

        let counts = checklist.counts();
        self.sync.submit(SyncOp::SetTaskCounts {
            day: local_day(now_ms),
            completed: counts.completed,
            total: counts.total,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_trims_and_ignores_blank() {
        let mut list = Checklist::default();
        assert!(list.add("   ", 1_000).is_none());
        let task = list.add("  write report ", 1_000).unwrap();
        assert_eq!(task.text, "write report");
        assert!(!task.completed);
        assert_eq!(list.counts(), TaskCounts { completed: 0, total: 1 });
    }

    #[test]
    fn test_ids_stay_unique_within_same_millisecond() {
        let mut list = Checklist::default();
        list.add("a", 5_000);
        list.add("b", 5_000);
        list.add("c", 4_000);
        let ids: Vec<i64> = list.items().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![5_000, 5_001, 5_002]);
    }

    #[test]
    fn test_toggle_twice_restores_counts() {
        let mut list = Checklist::default();
        list.add("a", 1);
        list.add("b", 2);
        let before = list.counts();

        assert!(list.toggle(2));
        assert_eq!(list.counts(), TaskCounts { completed: 1, total: 2 });
        assert!(list.toggle(2));
        assert_eq!(list.counts(), before);
    }

    #[test]
    fn test_toggle_unknown_id() {
        let mut list = Checklist::default();
        list.add("a", 1);
        assert!(!list.toggle(42));
        assert_eq!(list.counts(), TaskCounts { completed: 0, total: 1 });
    }

    #[test]
    fn test_malformed_json_is_empty() {
        assert_eq!(Checklist::from_json("not json"), Checklist::default());
        assert_eq!(Checklist::from_json("{\"id\": 1}"), Checklist::default());
    }

    #[test]
    fn test_json_keeps_order_and_flags() {
        let mut list = Checklist::default();
        list.add("first", 10);
        list.add("second", 20);
        list.toggle(20);

        let restored = Checklist::from_json(&list.to_json().unwrap());
        assert_eq!(restored, list);
        assert_eq!(restored.items()[1].text, "second");
        assert!(restored.items()[1].completed);
    }
}
