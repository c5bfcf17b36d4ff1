// taskdeck/src/error.rs

use thiserror::Error;

use crate::task::TaskId;

#[derive(Debug, Error)]
pub enum Error {
    /// Transient storage fault; preference reads recover from it.
    #[error("storage i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("corrupt {what}: {reason}")]
    Corrupt { what: &'static str, reason: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn corrupt(what: &'static str, reason: impl ToString) -> Self {
        Self::Corrupt { what, reason: reason.to_string() }
    }

    /// Only I/O faults are worth retrying or papering over; everything else is a bug or bad data.
    pub fn is_transient(&self) -> bool { matches!(self, Self::Io(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
