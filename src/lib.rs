pub mod compose;
pub mod config;
pub mod error;
pub mod events;
pub mod prefs;
pub mod saved_state;
pub mod scope;
pub mod store;
pub mod task;
pub mod viewmodel;

pub use compose::QueryComposer;
pub use config::Config;
pub use error::{Error, Result};
pub use events::{AddEditResult, EventChannel, EventReceiver, EventSender, UiEvent};
pub use prefs::{FilePreferences, PreferenceStore, PreferenceStream};
pub use saved_state::SavedState;
pub use scope::{Job, TaskScope};
pub use store::{LocalTaskStore, TaskListStream, TaskStore};
pub use task::{FilterPreferences, SortOrder, Task, TaskId, TaskQuery};
pub use viewmodel::{AddEditTaskViewModel, DeleteAllCompletedViewModel, TasksViewModel};
