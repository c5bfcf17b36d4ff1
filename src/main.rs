// taskdeck/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskdeck::{
    AddEditTaskViewModel, Config, DeleteAllCompletedViewModel, FilePreferences, FilterPreferences,
    LocalTaskStore, SavedState, SortOrder, Task, TaskId, TaskScope, TaskStore,
    TasksViewModel, UiEvent,
};

const KEY_LAST_DELETED: &str = "last_deleted";

#[derive(Parser)]
#[command(name = "taskdeck", version, about = "A reactive to-do list")]
struct Cli {
    /// Config file layered over the system and user ones
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Print tasks under the current search and preferences
    List {
        /// Replace the remembered search text ("" clears it)
        #[arg(long)]
        search: Option<String>,
    },
    Add {
        name: String,
        #[arg(long)]
        important: bool,
    },
    Edit {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        important: Option<bool>,
    },
    /// Flip a task's completed flag
    Toggle { id: i64 },
    Delete { id: i64 },
    /// Restore the most recently deleted task
    Undo,
    Sort {
        #[arg(value_enum)]
        order: SortArg,
    },
    HideCompleted {
        #[arg(action = ArgAction::Set)]
        hide: bool,
    },
    /// Delete every completed task
    ClearCompleted,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SortArg { Name, Date }

impl From<SortArg> for SortOrder {
    fn from(s: SortArg) -> Self {
        match s {
            SortArg::Name => SortOrder::ByName,
            SortArg::Date => SortOrder::ByDate,
        }
    }
}

/// Values a form screen would have collected.
#[derive(Default)]
struct FormInput {
    name: Option<String>,
    important: Option<bool>,
}

struct App {
    store: Arc<LocalTaskStore>,
    prefs: Arc<FilePreferences>,
    state: SavedState,
    state_path: PathBuf,
    app_scope: TaskScope,
}

impl App {
    async fn open(cfg: &Config) -> Result<Self> {
        let tasks_path = cfg.tasks_path()?;
        let fresh = !tasks_path.exists();
        let store = LocalTaskStore::open(&tasks_path).with_context(|| format!("open {}", tasks_path.display()))?;
        if fresh && cfg.seed_on_create() {
            store.seed_defaults().await?;
            info!(path = %tasks_path.display(), "seeded welcome tasks");
        }
        let prefs = FilePreferences::new(cfg.preferences_path()?);
        if cfg.watch_preferences() { prefs.watch_external()?; }
        let state_path = cfg.state_path()?;
        let state = SavedState::load(&state_path).with_context(|| format!("load {}", state_path.display()))?;
        Ok(Self {
            store: Arc::new(store),
            prefs: Arc::new(prefs),
            state,
            state_path,
            app_scope: TaskScope::new("app"),
        })
    }

    fn tasks_vm(&self) -> TasksViewModel {
        TasksViewModel::new(self.store.clone(), self.prefs.clone(), self.state.clone())
    }

    async fn find(&self, id: i64) -> Result<Task> {
        self.store.get(TaskId(id)).await?.with_context(|| format!("no task with id {id}"))
    }

    /// Acts on whatever the list screen has queued, the way its view would.
    async fn pump(&self, vm: &TasksViewModel, form: FormInput) -> Result<()> {
        let mut form = Some(form);
        let mut events = vm.events().await;
        while let Some(event) = events.try_recv() {
            match event {
                UiEvent::ShowUndoDeleteTaskMessage(task) => {
                    println!("Task deleted: {} (`taskdeck undo` restores it)", task.name);
                    self.state.set(KEY_LAST_DELETED, &task);
                }
                UiEvent::NavigateToAddTaskScreen => self.run_form(vm, None, form.take().unwrap_or_default()).await?,
                UiEvent::NavigateToEditTaskScreen(task) => {
                    self.run_form(vm, Some(&task), form.take().unwrap_or_default()).await?
                }
                UiEvent::ShowTaskSavedConfirmationMessage(msg) => println!("{msg}"),
                UiEvent::NavigateToDeleteAllCompletedScreen => {
                    let dialog = DeleteAllCompletedViewModel::new(self.store.clone(), self.app_scope.clone());
                    let removed = dialog.on_confirm_click().await?;
                    println!("Removed {removed} completed task(s)");
                }
                UiEvent::ShowInvalidInputMessage(msg) => bail!(msg),
                UiEvent::NavigateBackWithResult(result) => vm.on_add_edit_result(result.code()).await?,
            }
        }
        Ok(())
    }

    async fn run_form(&self, vm: &TasksViewModel, task: Option<&Task>, input: FormInput) -> Result<()> {
        // each visit to the form starts from a clean bag
        let screen = AddEditTaskViewModel::open(self.store.clone(), SavedState::new(), task);
        if let Some(name) = input.name { screen.set_task_name(name); }
        if let Some(important) = input.important { screen.set_task_importance(important); }
        screen.on_save_click().await?;
        let mut events = screen.events().await;
        while let Some(event) = events.try_recv() {
            match event {
                UiEvent::ShowInvalidInputMessage(msg) => bail!(msg),
                UiEvent::NavigateBackWithResult(result) => vm.on_add_edit_result(result.code()).await?,
                other => info!(?other, "ignored form event"),
            }
        }
        Ok(())
    }

    fn save_state(&self) -> Result<()> {
        self.state.save(&self.state_path).with_context(|| format!("save {}", self.state_path.display()))
    }
}

fn print_tasks(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("(no tasks)");
        return;
    }
    for t in tasks {
        let done = if t.completed { 'x' } else { ' ' };
        let flag = if t.important { '!' } else { ' ' };
        println!("{:>4} [{done}] {flag} {}", t.id.0, t.name);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(cli.config.as_deref())?;

    let filter = std::env::var("RUST_LOG").ok().or_else(|| cfg.log.filter.clone()).unwrap_or_else(|| "warn".into());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let app = App::open(&cfg).await?;
    let vm = app.tasks_vm();

    match cli.cmd {
        Cmd::List { search } => {
            if let Some(s) = search { vm.set_search_query(s); }
            let prefs = match vm.preferences().next().await {
                Some(Ok(p)) => p,
                _ => FilterPreferences::default(),
            };
            let search = vm.search_query();
            println!("sort: {}  hide completed: {}  search: {:?}", prefs.sort_order, prefs.hide_completed, search);
            let tasks = vm.tasks().next().await.context("task list closed")??;
            print_tasks(&tasks);
        }
        Cmd::Add { name, important } => {
            vm.on_add_task_clicked().await?;
            app.pump(&vm, FormInput { name: Some(name), important: Some(important) }).await?;
        }
        Cmd::Edit { id, name, important } => {
            let task = app.find(id).await?;
            vm.on_task_selected(task).await?;
            app.pump(&vm, FormInput { name, important }).await?;
        }
        Cmd::Toggle { id } => {
            let task = app.find(id).await?;
            let checked = !task.completed;
            vm.on_task_checked_changed(task, checked).await?;
        }
        Cmd::Delete { id } => {
            let task = app.find(id).await?;
            vm.on_task_swiped(task).await?;
            app.pump(&vm, FormInput::default()).await?;
        }
        Cmd::Undo => {
            let task: Task = app.state.get(KEY_LAST_DELETED).context("nothing to undo")?;
            vm.on_undo_delete_clicked(task.clone()).await?;
            app.state.remove(KEY_LAST_DELETED);
            println!("Restored: {}", task.name);
        }
        Cmd::Sort { order } => vm.on_sort_order_selected(order.into()).await?,
        Cmd::HideCompleted { hide } => vm.on_hide_completed_clicked(hide).await?,
        Cmd::ClearCompleted => {
            vm.delete_all_completed_click().await?;
            app.pump(&vm, FormInput::default()).await?;
        }
    }

    app.save_state()
}
