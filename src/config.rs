// taskdeck/src/config.rs

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, io, path::{Path, PathBuf}};

/// Merged: system -> user -> explicit file.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub seed: SeedConfig,
    pub preferences: PreferencesConfig,
    pub log: LogConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,         // default: platform data dir
    pub tasks_file: Option<PathBuf>,       // default: tasks.json
    pub preferences_file: Option<PathBuf>, // default: preferences.toml
    pub state_file: Option<PathBuf>,       // default: state.json
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SeedConfig {
    /// Insert the welcome tasks when the task file is first created. Default on.
    pub on_create: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PreferencesConfig {
    /// Pick up edits other processes make to the preferences file.
    pub watch: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    pub filter: Option<String>, // EnvFilter syntax; RUST_LOG wins
}

fn project_dirs() -> Option<ProjectDirs> { ProjectDirs::from("org", "taskdeck", "taskdeck") }

fn config_paths() -> (PathBuf, Option<PathBuf>) {
    let system = if cfg!(target_os = "windows") {
        PathBuf::from(r"C:\ProgramData\taskdeck\config.toml")
    } else {
        PathBuf::from("/etc/taskdeck/config.toml")
    };
    let user = project_dirs().map(|p| p.config_dir().join("config.toml"));
    (system, user)
}

impl Config {
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (system, user) = config_paths();
        let mut merged = Config::default();
        if let Some(sys) = read_file(&system)? { merge(&mut merged, &sys); }
        if let Some(usr) = user.as_deref().map(read_file).transpose()?.flatten() { merge(&mut merged, &usr); }
        if let Some(path) = explicit {
            let cfg = read_file(path)?.with_context(|| format!("config file {} not found", path.display()))?;
            merge(&mut merged, &cfg);
        }
        Ok(merged)
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(d) = &self.storage.data_dir { return Ok(d.clone()); }
        let proj = project_dirs().context("no home directory to place data in; set storage.data_dir")?;
        Ok(proj.data_dir().to_path_buf())
    }

    fn resolve(&self, file: &Option<PathBuf>, default: &str) -> Result<PathBuf> {
        match file {
            Some(p) if p.is_absolute() => Ok(p.clone()),
            Some(p) => Ok(self.data_dir()?.join(p)),
            None => Ok(self.data_dir()?.join(default)),
        }
    }

    pub fn tasks_path(&self) -> Result<PathBuf> { self.resolve(&self.storage.tasks_file, "tasks.json") }
    pub fn preferences_path(&self) -> Result<PathBuf> { self.resolve(&self.storage.preferences_file, "preferences.toml") }
    pub fn state_path(&self) -> Result<PathBuf> { self.resolve(&self.storage.state_file, "state.json") }
    pub fn seed_on_create(&self) -> bool { self.seed.on_create.unwrap_or(true) }
    pub fn watch_preferences(&self) -> bool { self.preferences.watch.unwrap_or(false) }
}

/// `Ok(None)` when the file is absent.
fn read_file(path: &Path) -> Result<Option<Config>> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };
    let cfg = toml::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(cfg))
}

fn merge(a: &mut Config, b: &Config) {
    let overlay = |dst: &mut Option<PathBuf>, src: &Option<PathBuf>| { if src.is_some() { *dst = src.clone(); } };
    overlay(&mut a.storage.data_dir, &b.storage.data_dir);
    overlay(&mut a.storage.tasks_file, &b.storage.tasks_file);
    overlay(&mut a.storage.preferences_file, &b.storage.preferences_file);
    overlay(&mut a.storage.state_file, &b.storage.state_file);

    if b.seed.on_create.is_some() { a.seed.on_create = b.seed.on_create; }
    if b.preferences.watch.is_some() { a.preferences.watch = b.preferences.watch; }
    if b.log.filter.is_some() { a.log.filter = b.log.filter.clone(); }
}
