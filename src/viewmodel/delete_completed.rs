// taskdeck/src/viewmodel/delete_completed.rs

use std::sync::Arc;
use tracing::debug;

use crate::{
    scope::{Job, TaskScope},
    store::TaskStore,
};

/// Confirmation dialog for clearing completed tasks.
pub struct DeleteAllCompletedViewModel {
    store: Arc<dyn TaskStore>,
    app_scope: TaskScope,
}

impl DeleteAllCompletedViewModel {
    /// `app_scope` must outlive the dialog so the delete finishes after it closes.
    pub fn new(store: Arc<dyn TaskStore>, app_scope: TaskScope) -> Self { Self { store, app_scope } }

    /// Resolves to the number of tasks removed.
    pub fn on_confirm_click(&self) -> Job<usize> {
        let store = self.store.clone();
        self.app_scope.launch(async move {
            debug!("delete all completed tasks");
            store.delete_completed().await
        })
    }
}
