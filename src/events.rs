// taskdeck/src/events.rs

//! One-shot UI events.
//!
//! An [`EventChannel`] is owned by a view-model. Sending never blocks and never
//! fails while the channel lives; events queue until a consumer is attached and
//! each one is handed out exactly once, in order. Only one consumer can be
//! attached at a time. A consumer that detaches leaves the rest of the queue
//! for the next one.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::task::Task;

pub const ADD_TASK_RESULT_OK: i32 = 1;
pub const EDIT_TASK_RESULT_OK: i32 = 2;

/// Outcome the add/edit screen hands back to the list screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddEditResult {
    AddOk,
    EditOk,
}

impl AddEditResult {
    pub fn code(self) -> i32 {
        match self {
            Self::AddOk => ADD_TASK_RESULT_OK,
            Self::EditOk => EDIT_TASK_RESULT_OK,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            ADD_TASK_RESULT_OK => Some(Self::AddOk),
            EDIT_TASK_RESULT_OK => Some(Self::EditOk),
            _ => None,
        }
    }

    pub fn confirmation(self) -> &'static str {
        match self {
            Self::AddOk => "Task added",
            Self::EditOk => "Task updated",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UiEvent {
    ShowUndoDeleteTaskMessage(Task),
    NavigateToAddTaskScreen,
    NavigateToEditTaskScreen(Task),
    ShowTaskSavedConfirmationMessage(String),
    NavigateToDeleteAllCompletedScreen,
    ShowInvalidInputMessage(String),
    NavigateBackWithResult(AddEditResult),
}

pub struct EventChannel<E> {
    tx: EventSender<E>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<E>>>,
}

impl<E> Default for EventChannel<E> {
    fn default() -> Self { Self::new() }
}

impl<E> EventChannel<E> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx: EventSender { tx }, rx: Arc::new(Mutex::new(rx)) }
    }

    pub fn send(&self, event: E) { self.tx.send(event) }

    /// Handle for jobs that outlive a borrow of the owner.
    pub fn sender(&self) -> EventSender<E> { self.tx.clone() }

    /// Waits until any previous consumer detaches.
    pub async fn attach(&self) -> EventReceiver<E> {
        EventReceiver { rx: self.rx.clone().lock_owned().await }
    }

    pub fn try_attach(&self) -> Option<EventReceiver<E>> {
        self.rx.clone().try_lock_owned().ok().map(|rx| EventReceiver { rx })
    }
}

pub struct EventSender<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> Clone for EventSender<E> {
    fn clone(&self) -> Self { Self { tx: self.tx.clone() } }
}

impl<E> EventSender<E> {
    pub fn send(&self, event: E) {
        // only possible once the owning channel and every consumer are gone
        if self.tx.send(event).is_err() {
            warn!("event dropped: channel owner is gone");
        }
    }
}

/// The attached consumer. Dropping it detaches.
pub struct EventReceiver<E> {
    rx: OwnedMutexGuard<mpsc::UnboundedReceiver<E>>,
}

impl<E> EventReceiver<E> {
    /// Next event; `None` once every sender is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<E> { self.rx.recv().await }

    pub fn try_recv(&mut self) -> Option<E> { self.rx.try_recv().ok() }

    /// Everything queued right now.
    pub fn drain(&mut self) -> Vec<E> {
        let mut out = Vec::new();
        while let Some(e) = self.try_recv() { out.push(e); }
        out
    }
}
