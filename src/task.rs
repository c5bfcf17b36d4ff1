// taskdeck/src/task.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt, str::FromStr};

use crate::error::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl TaskId {
    /// Placeholder id; the store assigns a real one on insert.
    pub const NEW: TaskId = TaskId(0);
    pub fn is_new(self) -> bool { self == Self::NEW }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub completed: bool,
    /// Epoch millis, stamped once.
    pub created: i64,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self { id: TaskId::NEW, name: name.into(), important: false, completed: false, created: now_millis() }
    }
    pub fn important(mut self, important: bool) -> Self { self.important = important; self }
    pub fn completed(mut self, completed: bool) -> Self { self.completed = completed; self }
}

pub fn now_millis() -> i64 { Utc::now().timestamp_millis() }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortOrder {
    ByName,
    #[default]
    ByDate,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ByName => "BY_NAME",
            Self::ByDate => "BY_DATE",
        }
    }
}

impl FromStr for SortOrder {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BY_NAME" => Ok(Self::ByName),
            "BY_DATE" => Ok(Self::ByDate),
            other => Err(Error::corrupt("sort order", format!("unknown value {other:?}"))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPreferences {
    pub sort_order: SortOrder,
    pub hide_completed: bool,
}

/// One fully-parameterized store query: the `(search, sort_order, hide_completed)` tuple.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub search: String,
    pub sort_order: SortOrder,
    pub hide_completed: bool,
}

impl TaskQuery {
    pub fn new(search: impl Into<String>, prefs: FilterPreferences) -> Self {
        Self { search: search.into(), sort_order: prefs.sort_order, hide_completed: prefs.hide_completed }
    }

    pub fn matches(&self, task: &Task) -> bool {
        !(self.hide_completed && task.completed) && task.name.contains(self.search.as_str())
    }

    /// Important first, then the active sort key ascending, then id.
    pub fn compare(&self, a: &Task, b: &Task) -> Ordering {
        let key = match self.sort_order {
            SortOrder::ByName => a.name.cmp(&b.name),
            SortOrder::ByDate => a.created.cmp(&b.created),
        };
        b.important.cmp(&a.important).then(key).then(a.id.cmp(&b.id))
    }

    pub fn apply<'a>(&self, tasks: impl IntoIterator<Item = &'a Task>) -> Vec<Task> {
        let mut out: Vec<Task> = tasks.into_iter().filter(|t| self.matches(t)).cloned().collect();
        out.sort_by(|a, b| self.compare(a, b));
        out
    }
}
