// taskdeck/src/viewmodel/tasks.rs

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
    compose::QueryComposer,
    error::Result,
    events::{AddEditResult, EventChannel, EventReceiver, UiEvent},
    prefs::{PreferenceStore, PreferenceStream},
    saved_state::{SavedState, KEY_SEARCH_QUERY},
    scope::{Job, TaskScope},
    store::{TaskListStream, TaskStore},
    task::{SortOrder, Task},
};

/// The task list screen: live list, search, sort/filter toggles, swipe/undo.
pub struct TasksViewModel {
    store: Arc<dyn TaskStore>,
    prefs: Arc<dyn PreferenceStore>,
    state: SavedState,
    search: watch::Sender<String>,
    events: EventChannel<UiEvent>,
    scope: TaskScope,
}

impl TasksViewModel {
    pub fn new(store: Arc<dyn TaskStore>, prefs: Arc<dyn PreferenceStore>, state: SavedState) -> Self {
        let initial = state.get::<String>(KEY_SEARCH_QUERY).unwrap_or_default();
        Self {
            store,
            prefs,
            state,
            search: watch::channel(initial).0,
            events: EventChannel::new(),
            scope: TaskScope::new("tasks"),
        }
    }

    pub fn search_query(&self) -> String { self.search.borrow().clone() }

    pub fn set_search_query(&self, query: impl Into<String>) {
        let query = query.into();
        self.state.set(KEY_SEARCH_QUERY, &query);
        self.search.send_replace(query);
    }

    pub fn preferences(&self) -> PreferenceStream { self.prefs.live() }

    /// A fresh live list; each call is an independent subscription.
    pub fn tasks(&self) -> TaskListStream {
        QueryComposer::new(self.store.clone()).compose(self.search.subscribe(), self.prefs.live())
    }

    pub async fn events(&self) -> EventReceiver<UiEvent> { self.events.attach().await }
    pub fn try_events(&self) -> Option<EventReceiver<UiEvent>> { self.events.try_attach() }

    pub fn scope(&self) -> &TaskScope { &self.scope }

    pub fn on_sort_order_selected(&self, order: SortOrder) -> Job<()> {
        let prefs = self.prefs.clone();
        self.scope.launch(async move { tolerate_io(prefs.set_sort_order(order).await) })
    }

    pub fn on_hide_completed_clicked(&self, hide: bool) -> Job<()> {
        let prefs = self.prefs.clone();
        self.scope.launch(async move { tolerate_io(prefs.set_hide_completed(hide).await) })
    }

    pub fn on_task_swiped(&self, task: Task) -> Job<()> {
        let store = self.store.clone();
        let events = self.events.sender();
        self.scope.launch(async move {
            store.delete(&task).await?;
            debug!(id = %task.id, "task deleted");
            events.send(UiEvent::ShowUndoDeleteTaskMessage(task));
            Ok(())
        })
    }

    pub fn on_undo_delete_clicked(&self, task: Task) -> Job<()> {
        let store = self.store.clone();
        self.scope.launch(async move {
            let id = store.insert(task).await?;
            debug!(%id, "task restored");
            Ok(())
        })
    }

    pub fn on_add_task_clicked(&self) -> Job<()> { self.emit(UiEvent::NavigateToAddTaskScreen) }

    pub fn on_task_selected(&self, task: Task) -> Job<()> { self.emit(UiEvent::NavigateToEditTaskScreen(task)) }

    pub fn on_task_checked_changed(&self, task: Task, checked: bool) -> Job<()> {
        let store = self.store.clone();
        self.scope.launch(async move { store.update(Task { completed: checked, ..task }).await })
    }

    /// Unknown codes are ignored.
    pub fn on_add_edit_result(&self, code: i32) -> Job<()> {
        match AddEditResult::from_code(code) {
            Some(result) => self.emit(UiEvent::ShowTaskSavedConfirmationMessage(result.confirmation().to_string())),
            None => Job::ready(Ok(())),
        }
    }

    pub fn delete_all_completed_click(&self) -> Job<()> { self.emit(UiEvent::NavigateToDeleteAllCompletedScreen) }

    /// Queued behind earlier operations so events keep their order.
    fn emit(&self, event: UiEvent) -> Job<()> {
        let events = self.events.sender();
        self.scope.launch(async move {
            events.send(event);
            Ok(())
        })
    }
}

/// Preference writes are fire-and-forget: an I/O fault is logged, anything else fails the job.
fn tolerate_io(res: Result<()>) -> Result<()> {
    match res {
        Err(e) if e.is_transient() => {
            warn!(error = %e, "preference write failed");
            Ok(())
        }
        other => other,
    }
}
