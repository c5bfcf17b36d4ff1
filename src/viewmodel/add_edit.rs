// taskdeck/src/viewmodel/add_edit.rs

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::{
    events::{AddEditResult, EventChannel, EventReceiver, UiEvent},
    saved_state::{SavedState, KEY_TASK, KEY_TASK_IMPORTANCE, KEY_TASK_NAME},
    scope::{Job, TaskScope},
    store::TaskStore,
    task::Task,
};

pub const INVALID_INPUT_MESSAGE: &str = "Fields cannot be empty";

struct Form {
    name: String,
    important: bool,
}

/// Add (no task in state) or edit (task in state) one task.
pub struct AddEditTaskViewModel {
    store: Arc<dyn TaskStore>,
    state: SavedState,
    task: Option<Task>,
    form: Mutex<Form>,
    events: EventChannel<UiEvent>,
    scope: TaskScope,
}

impl AddEditTaskViewModel {
    /// Reads the task under edit and any in-progress form values from `state`.
    pub fn new(store: Arc<dyn TaskStore>, state: SavedState) -> Self {
        let task = state.get::<Task>(KEY_TASK);
        let name = state.get::<String>(KEY_TASK_NAME)
            .or_else(|| task.as_ref().map(|t| t.name.clone()))
            .unwrap_or_default();
        let important = state.get::<bool>(KEY_TASK_IMPORTANCE)
            .or_else(|| task.as_ref().map(|t| t.important))
            .unwrap_or(false);
        Self {
            store,
            state,
            task,
            form: Mutex::new(Form { name, important }),
            events: EventChannel::new(),
            scope: TaskScope::new("add_edit"),
        }
    }

    /// Opens the screen for `task` (edit) or for a new one (`None`).
    pub fn open(store: Arc<dyn TaskStore>, state: SavedState, task: Option<&Task>) -> Self {
        match task {
            Some(t) => state.set(KEY_TASK, t),
            None => { state.remove(KEY_TASK); }
        }
        Self::new(store, state)
    }

    pub fn task(&self) -> Option<&Task> { self.task.as_ref() }
    pub fn is_edit(&self) -> bool { self.task.is_some() }

    pub fn task_name(&self) -> String { self.form.lock().name.clone() }

    pub fn set_task_name(&self, name: impl Into<String>) {
        let mut form = self.form.lock();
        form.name = name.into();
        self.state.set(KEY_TASK_NAME, &form.name);
    }

    pub fn task_importance(&self) -> bool { self.form.lock().important }

    pub fn set_task_importance(&self, important: bool) {
        self.form.lock().important = important;
        self.state.set(KEY_TASK_IMPORTANCE, &important);
    }

    pub async fn events(&self) -> EventReceiver<UiEvent> { self.events.attach().await }
    pub fn try_events(&self) -> Option<EventReceiver<UiEvent>> { self.events.try_attach() }

    pub fn scope(&self) -> &TaskScope { &self.scope }

    pub fn on_save_click(&self) -> Job<()> {
        let (name, important) = {
            let form = self.form.lock();
            (form.name.clone(), form.important)
        };
        let events = self.events.sender();
        if name.trim().is_empty() {
            return self.scope.launch(async move {
                events.send(UiEvent::ShowInvalidInputMessage(INVALID_INPUT_MESSAGE.to_string()));
                Ok(())
            });
        }
        let store = self.store.clone();
        match self.task.clone() {
            Some(task) => self.scope.launch(async move {
                let id = task.id;
                store.update(Task { name, important, ..task }).await?;
                debug!(%id, "task updated");
                events.send(UiEvent::NavigateBackWithResult(AddEditResult::EditOk));
                Ok(())
            }),
            None => self.scope.launch(async move {
                // the store stamps `created`
                let task = Task { created: 0, ..Task::new(name).important(important) };
                let id = store.insert(task).await?;
                debug!(%id, "task added");
                events.send(UiEvent::NavigateBackWithResult(AddEditResult::AddOk));
                Ok(())
            }),
        }
    }
}
