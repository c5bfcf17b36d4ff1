// taskdeck/src/viewmodel/mod.rs

pub mod add_edit;
pub mod delete_completed;
pub mod tasks;

pub use add_edit::{AddEditTaskViewModel, INVALID_INPUT_MESSAGE};
pub use delete_completed::DeleteAllCompletedViewModel;
pub use tasks::TasksViewModel;
