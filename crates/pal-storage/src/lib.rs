use chrono::{DateTime, Utc};
use pal_core::{parse_timestamp, ConversationEntry, Document, Task, TaskDraft};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed data file: {0}")]
    Parse(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("malformed reminder timestamp: {0}")]
    Timestamp(String),
    #[error("task {id} not found")]
    TaskNotFound { id: u64 },
    #[error("task title is required")]
    EmptyTitle,
}

/// Task fields the store owns; a create or update request cannot smuggle
/// them in through the passthrough map.
const RESERVED_FIELDS: &[&str] = &["id", "title", "done", "reminder", "reminded"];

/// File-backed store for the assistant state.
///
/// Owns the in-memory [`Document`] behind one mutex. Every mutating
/// operation holds the lock for its whole read-modify-write, then
/// rewrites the backing file wholesale before releasing it, so callers
/// are fully serialized. The write is not atomic; the small dataset and
/// single-process ownership make that acceptable.
pub struct Store {
    path: PathBuf,
    doc: Mutex<Document>,
}

impl Store {
    /// Load the document from `path`, or start empty when the file does
    /// not exist yet. A malformed file is an error, not a reset.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let doc = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw).map_err(|err| StorageError::Parse(err.to_string()))?
        } else {
            Document::default()
        };
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the whole document.
    pub fn document(&self) -> Document {
        self.lock().clone()
    }

    /// Snapshot of the task collection.
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    /// Create a task from a client draft: assign the next id, reset the
    /// lifecycle flags, and silently drop a reminder that does not parse
    /// as a timestamp.
    pub fn create_task(&self, draft: TaskDraft) -> Result<Task, StorageError> {
        if draft.title.is_empty() {
            return Err(StorageError::EmptyTitle);
        }
        let mut doc = self.lock();
        let id = doc.tasks.iter().map(|task| task.id).max().unwrap_or(0) + 1;
        let reminder = draft
            .reminder
            .filter(|value| parse_timestamp(value).is_ok());
        let mut extra = draft.extra;
        for field in RESERVED_FIELDS {
            extra.remove(*field);
        }
        let task = Task {
            id,
            title: draft.title,
            done: false,
            reminder,
            reminded: false,
            extra,
        };
        doc.tasks.push(task.clone());
        self.persist(&doc)?;
        Ok(task)
    }

    /// Shallow-merge `patch` over the task with the given id. Known and
    /// passthrough fields are overwritten alike; nothing is merged
    /// deeper than one level.
    pub fn update_task(&self, id: u64, patch: Map<String, Value>) -> Result<Task, StorageError> {
        let mut doc = self.lock();
        let Some(task) = doc.tasks.iter_mut().find(|task| task.id == id) else {
            return Err(StorageError::TaskNotFound { id });
        };

        let current = serde_json::to_value(&*task)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let Value::Object(mut merged) = current else {
            return Err(StorageError::Serialization(
                "task did not serialize to an object".to_string(),
            ));
        };
        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            merged.insert(key, value);
        }
        *task = serde_json::from_value(Value::Object(merged))
            .map_err(|err| StorageError::Serialization(err.to_string()))?;

        let updated = task.clone();
        self.persist(&doc)?;
        Ok(updated)
    }

    pub fn delete_task(&self, id: u64) -> Result<(), StorageError> {
        let mut doc = self.lock();
        let before = doc.tasks.len();
        doc.tasks.retain(|task| task.id != id);
        if doc.tasks.len() == before {
            return Err(StorageError::TaskNotFound { id });
        }
        self.persist(&doc)
    }

    /// Append one chat exchange to the conversation log. The log is
    /// append-only and never pruned.
    pub fn append_exchange(&self, entry: ConversationEntry) -> Result<(), StorageError> {
        let mut doc = self.lock();
        doc.conversation.push(entry);
        self.persist(&doc)
    }

    /// One sweeper tick: flip `reminded` on every task whose reminder is
    /// due at `now` and return their titles. The document is persisted
    /// once per tick even when nothing changed. A malformed reminder
    /// aborts the remaining scan for this tick and skips the persist.
    pub fn sweep_reminders(&self, now: DateTime<Utc>) -> Result<Vec<String>, StorageError> {
        let mut doc = self.lock();
        let mut due = Vec::new();
        for task in doc.tasks.iter_mut() {
            if task.reminded {
                continue;
            }
            let Some(reminder) = task.reminder.as_deref() else {
                continue;
            };
            let at = parse_timestamp(reminder)
                .map_err(|err| StorageError::Timestamp(err.to_string()))?;
            if at <= now {
                task.reminded = true;
                due.push(task.title.clone());
            }
        }
        self.persist(&doc)?;
        Ok(due)
    }

    fn lock(&self) -> MutexGuard<'_, Document> {
        self.doc
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, doc: &Document) -> Result<(), StorageError> {
        let raw = serde_json::to_string_pretty(doc)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        fs::write(&self.path, raw)?;
        Ok(())
    }
}
