// taskdeck/src/store.rs

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, io, path::{Path, PathBuf}, sync::Arc};
use tokio::sync::watch;
use tracing::debug;

use crate::{
    error::{Error, Result},
    task::{now_millis, Task, TaskId, TaskQuery},
};

/// Live, ordered result lists. Never ends on its own; dropping it unsubscribes.
pub type TaskListStream = BoxStream<'static, Result<Vec<Task>>>;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Assigns id and `created` when absent. An explicit id replaces any row holding it.
    async fn insert(&self, task: Task) -> Result<TaskId>;
    async fn update(&self, task: Task) -> Result<()>;
    async fn delete(&self, task: &Task) -> Result<()>;
    /// Atomic for readers. Returns how many rows went away.
    async fn delete_completed(&self) -> Result<usize>;
    async fn get(&self, id: TaskId) -> Result<Option<Task>>;
    fn query(&self, query: TaskQuery) -> TaskListStream;
}

/// Tasks the first launch starts with.
pub const WELCOME_TASKS: &[(&str, bool, bool)] = &[
    ("Add Todos by clicking on the add button", true, false),
    ("Edit Todos by clicking on the todos in the list", false, false),
    ("If a todo is done click on the checkbox in front of todo", false, false),
    ("You can search or filter them by the menu options above", false, false),
    ("You can delete a todo by swiping the todo from left to right", false, true),
    ("Mark a task important in the edit screen", false, true),
    ("Important task will appear on top", false, false),
];

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Table {
    next_id: i64,
    tasks: Vec<Task>,
}

struct Rows {
    by_id: BTreeMap<TaskId, Task>,
    next_id: i64,
}

impl Rows {
    fn to_table(&self) -> Table {
        Table { next_id: self.next_id, tasks: self.by_id.values().cloned().collect() }
    }
}

struct Shared {
    rows: RwLock<Rows>,
    path: Option<PathBuf>,
    changes: watch::Sender<u64>,
}

/// In-process task store; durable when opened on a file.
#[derive(Clone)]
pub struct LocalTaskStore {
    inner: Arc<Shared>,
}

impl Default for LocalTaskStore {
    fn default() -> Self { Self::in_memory() }
}

impl LocalTaskStore {
    pub fn in_memory() -> Self { Self::from_parts(BTreeMap::new(), 1, None) }

    /// Loads the JSON table at `path`; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let (by_id, next_id) = match fs::read_to_string(&path) {
            Ok(text) => {
                let table: Table = serde_json::from_str(&text).map_err(|e| Error::corrupt("task table", e))?;
                let mut next_id = table.next_id.max(1);
                for t in &table.tasks { next_id = next_id.max(id_after(t.id)?); }
                (table.tasks.into_iter().map(|t| (t.id, t)).collect(), next_id)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => (BTreeMap::new(), 1),
            Err(e) => return Err(e.into()),
        };
        Ok(Self::from_parts(by_id, next_id, Some(path)))
    }

    fn from_parts(by_id: BTreeMap<TaskId, Task>, next_id: i64, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Shared {
                rows: RwLock::new(Rows { by_id, next_id }),
                path,
                changes: watch::channel(0).0,
            }),
        }
    }

    pub fn path(&self) -> Option<&Path> { self.inner.path.as_deref() }
    pub fn len(&self) -> usize { self.inner.rows.read().by_id.len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    pub fn snapshot(&self) -> Vec<Task> { self.inner.rows.read().by_id.values().cloned().collect() }

    pub async fn seed_defaults(&self) -> Result<()> {
        for (name, important, completed) in WELCOME_TASKS {
            self.insert(Task::new(*name).important(*important).completed(*completed)).await?;
        }
        Ok(())
    }

    /// Applies `f` under the write lock, persists, then wakes live queries.
    fn mutate<T>(&self, f: impl FnOnce(&mut Rows) -> Result<T>) -> Result<T> {
        let out = {
            let mut rows = self.inner.rows.write();
            match &self.inner.path {
                None => f(&mut *rows)?,
                Some(path) => {
                    // a failed write leaves memory as it was
                    let before = (rows.by_id.clone(), rows.next_id);
                    let out = f(&mut *rows)?;
                    if let Err(e) = write_table(path, &rows.to_table()) {
                        (rows.by_id, rows.next_id) = before;
                        return Err(e);
                    }
                    out
                }
            }
        };
        self.inner.changes.send_modify(|v| *v += 1);
        Ok(out)
    }
}

/// The smallest id that may be handed out after `id`.
fn id_after(id: TaskId) -> Result<i64> {
    id.0.checked_add(1).ok_or_else(|| Error::corrupt("task id", format!("{id} leaves no room for another id")))
}

fn write_table(path: &Path, table: &Table) -> Result<()> {
    if let Some(dir) = path.parent() { fs::create_dir_all(dir)?; }
    let text = serde_json::to_string_pretty(table).map_err(|e| Error::corrupt("task table", e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, text)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl TaskStore for LocalTaskStore {
    async fn insert(&self, mut task: Task) -> Result<TaskId> {
        self.mutate(|rows| {
            if task.id.is_new() {
                task.id = TaskId(rows.next_id);
            }
            rows.next_id = rows.next_id.max(id_after(task.id)?);
            if task.created == 0 { task.created = now_millis(); }
            let id = task.id;
            rows.by_id.insert(id, task);
            Ok(id)
        })
    }

    async fn update(&self, task: Task) -> Result<()> {
        self.mutate(|rows| match rows.by_id.get_mut(&task.id) {
            Some(slot) => { *slot = task; Ok(()) }
            None => Err(Error::NotFound(task.id)),
        })
    }

    async fn delete(&self, task: &Task) -> Result<()> {
        self.mutate(|rows| rows.by_id.remove(&task.id).map(|_| ()).ok_or(Error::NotFound(task.id)))
    }

    async fn delete_completed(&self) -> Result<usize> {
        let removed = self.mutate(|rows| {
            let before = rows.by_id.len();
            rows.by_id.retain(|_, t| !t.completed);
            Ok(before - rows.by_id.len())
        })?;
        debug!(removed, "deleted completed tasks");
        Ok(removed)
    }

    async fn get(&self, id: TaskId) -> Result<Option<Task>> {
        Ok(self.inner.rows.read().by_id.get(&id).cloned())
    }

    fn query(&self, query: TaskQuery) -> TaskListStream {
        let inner = self.inner.clone();
        let rx = inner.changes.subscribe();
        stream::unfold((inner, rx, query, true), |(inner, mut rx, query, first)| async move {
            if first {
                rx.borrow_and_update();
            } else {
                rx.changed().await.ok()?;
            }
            let list = query.apply(inner.rows.read().by_id.values());
            Some((Ok(list), (inner, rx, query, false)))
        })
        .boxed()
    }
}
