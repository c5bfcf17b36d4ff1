// taskdeck/src/prefs.rs

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use notify::{recommended_watcher, Event, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{fs, io, path::{Path, PathBuf}, sync::Arc};
use tokio::sync::watch;
use tracing::debug;

use crate::{
    error::{Error, Result},
    task::{FilterPreferences, SortOrder},
};

/// Current preferences, then one item per change. Read faults arrive as items; the stream goes on.
pub type PreferenceStream = BoxStream<'static, Result<FilterPreferences>>;

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    fn live(&self) -> PreferenceStream;
    async fn set_sort_order(&self, order: SortOrder) -> Result<()>;
    async fn set_hide_completed(&self, hide: bool) -> Result<()>;
}

/// On-disk shape. Absent keys fall back to defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct PrefsFile {
    sort_order: Option<String>,
    hide_completed: Option<bool>,
}

impl PrefsFile {
    fn resolve(&self) -> Result<FilterPreferences> {
        let sort_order = match &self.sort_order {
            Some(s) => s.parse()?,
            None => SortOrder::default(),
        };
        Ok(FilterPreferences { sort_order, hide_completed: self.hide_completed.unwrap_or(false) })
    }
}

struct Shared {
    path: PathBuf,
    edit: Mutex<()>,
    changes: watch::Sender<u64>,
    watcher: Mutex<Option<notify::RecommendedWatcher>>,
}

/// TOML-file backed preferences (`sort_order`, `hide_completed`).
#[derive(Clone)]
pub struct FilePreferences {
    inner: Arc<Shared>,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Shared {
                path: path.into(),
                edit: Mutex::new(()),
                changes: watch::channel(0).0,
                watcher: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path { &self.inner.path }

    pub fn read(&self) -> Result<FilterPreferences> { read_file(&self.inner.path)?.resolve() }

    /// Re-publish when another process rewrites the file.
    pub fn watch_external(&self) -> Result<()> {
        let dir = match self.inner.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let target = self.inner.path.file_name().map(|n| n.to_os_string());
        let changes = self.inner.changes.clone();
        let mut watcher = recommended_watcher(move |res: notify::Result<Event>| {
            let Ok(ev) = res else { return; };
            if ev.paths.iter().any(|p| p.file_name().map(|n| n.to_os_string()) == target) {
                changes.send_modify(|v| *v += 1);
            }
        })
        .map_err(io::Error::other)?;
        watcher.watch(&dir, RecursiveMode::NonRecursive).map_err(io::Error::other)?;
        *self.inner.watcher.lock() = Some(watcher);
        debug!(path = %self.inner.path.display(), "watching preferences file");
        Ok(())
    }

    fn edit(&self, f: impl FnOnce(&mut PrefsFile)) -> Result<()> {
        {
            let _guard = self.inner.edit.lock();
            let mut current = read_file(&self.inner.path)?;
            f(&mut current);
            if let Some(dir) = self.inner.path.parent() { fs::create_dir_all(dir)?; }
            let text = toml::to_string_pretty(&current).map_err(|e| Error::corrupt("preferences", e))?;
            // readers do not take the edit lock; they must never see a truncated file
            let tmp = self.inner.path.with_extension("toml.tmp");
            fs::write(&tmp, text)?;
            fs::rename(&tmp, &self.inner.path)?;
        }
        self.inner.changes.send_modify(|v| *v += 1);
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<PrefsFile> {
    match fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text).map_err(|e| Error::corrupt("preferences", e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(PrefsFile::default()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl PreferenceStore for FilePreferences {
    fn live(&self) -> PreferenceStream {
        let inner = self.inner.clone();
        let rx = inner.changes.subscribe();
        stream::unfold((inner, rx, true), |(inner, mut rx, first)| async move {
            if first {
                rx.borrow_and_update();
            } else {
                rx.changed().await.ok()?;
            }
            let prefs = read_file(&inner.path).and_then(|f| f.resolve());
            Some((prefs, (inner, rx, false)))
        })
        .boxed()
    }

    async fn set_sort_order(&self, order: SortOrder) -> Result<()> {
        self.edit(|f| f.sort_order = Some(order.as_str().to_string()))
    }

    async fn set_hide_completed(&self, hide: bool) -> Result<()> {
        self.edit(|f| f.hide_completed = Some(hide))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::atomic::{AtomicBool, Ordering}, time::Duration};
    use tokio::time::timeout;

    async fn next(s: &mut PreferenceStream) -> Result<FilterPreferences> {
        timeout(Duration::from_secs(2), s.next()).await.expect("emission").expect("open")
    }

    #[tokio::test]
    async fn missing_file_reads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = FilePreferences::new(dir.path().join("prefs.toml"));
        assert_eq!(prefs.read().unwrap(), FilterPreferences::default());
        let mut live = prefs.live();
        assert_eq!(next(&mut live).await.unwrap(), FilterPreferences::default());
    }

    #[tokio::test]
    async fn writes_reach_live_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = FilePreferences::new(dir.path().join("nested").join("prefs.toml"));
        let mut live = prefs.live();
        next(&mut live).await.unwrap();

        prefs.set_sort_order(SortOrder::ByName).await.unwrap();
        assert_eq!(next(&mut live).await.unwrap().sort_order, SortOrder::ByName);

        prefs.set_hide_completed(true).await.unwrap();
        let now = next(&mut live).await.unwrap();
        assert_eq!(now, FilterPreferences { sort_order: SortOrder::ByName, hide_completed: true });

        let text = fs::read_to_string(prefs.path()).unwrap();
        assert!(text.contains("BY_NAME"), "{text}");
    }

    #[tokio::test]
    async fn readers_never_see_a_half_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = FilePreferences::new(dir.path().join("prefs.toml"));
        prefs.set_hide_completed(true).await.unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let (prefs, stop) = (prefs.clone(), stop.clone());
            std::thread::spawn(move || {
                let (mut reads, mut wrong) = (0u32, 0u32);
                while !stop.load(Ordering::Relaxed) {
                    reads += 1;
                    if !matches!(prefs.read(), Ok(p) if p.hide_completed) { wrong += 1; }
                }
                (reads, wrong)
            })
        };
        for i in 0..500 {
            let order = if i % 2 == 0 { SortOrder::ByName } else { SortOrder::ByDate };
            prefs.set_sort_order(order).await.unwrap();
        }
        stop.store(true, Ordering::Relaxed);
        let (reads, wrong) = reader.join().unwrap();
        assert!(reads > 0);
        assert_eq!(wrong, 0, "{wrong} of {reads} reads saw something other than the stored value");
    }

    #[tokio::test]
    async fn external_edits_are_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.toml");
        let prefs = FilePreferences::new(&path);
        prefs.watch_external().unwrap();
        let mut live = prefs.live();
        assert_eq!(next(&mut live).await.unwrap(), FilterPreferences::default());

        fs::write(&path, "sort_order = \"BY_NAME\"\nhide_completed = true\n").unwrap();

        let want = FilterPreferences { sort_order: SortOrder::ByName, hide_completed: true };
        timeout(Duration::from_secs(5), async {
            loop {
                match live.next().await {
                    Some(Ok(p)) if p == want => break,
                    Some(_) => {}
                    None => panic!("preference stream ended"),
                }
            }
        })
        .await
        .expect("external edit was not republished");
    }

    #[tokio::test]
    async fn unknown_sort_order_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.toml");
        fs::write(&path, "sort_order = \"BY_COLOUR\"\n").unwrap();
        let prefs = FilePreferences::new(&path);
        let mut live = prefs.live();
        let err = next(&mut live).await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn unreadable_path_is_transient() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be makes the read fail with an i/o error
        let path = dir.path().join("prefs.toml");
        fs::create_dir_all(&path).unwrap();
        let prefs = FilePreferences::new(&path);
        let err = prefs.read().unwrap_err();
        assert!(err.is_transient(), "{err}");
    }
}
