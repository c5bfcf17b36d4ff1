// taskdeck/src/compose.rs

//! Live task list: search text and filter preferences combined, switched onto
//! a fresh store query whenever the pair changes.

use futures::stream::{self, StreamExt};
use std::{future, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    prefs::PreferenceStream,
    store::{TaskListStream, TaskStore},
    task::{FilterPreferences, Task, TaskQuery},
};

#[derive(Clone)]
pub struct QueryComposer {
    store: Arc<dyn TaskStore>,
}

impl QueryComposer {
    pub fn new(store: Arc<dyn TaskStore>) -> Self { Self { store } }

    /// Lazy: nothing subscribes until the stream is polled, and dropping it
    /// drops the store subscription with it.
    pub fn compose(&self, search: watch::Receiver<String>, prefs: PreferenceStream) -> TaskListStream {
        let state = Composer {
            store: self.store.clone(),
            search: Some(search),
            prefs: Some(prefs),
            latest_search: None,
            latest_prefs: None,
            last_good: None,
            active: None,
            inner: None,
            failed: false,
        };
        stream::unfold(state, |mut c| async move {
            let item = c.next_list().await?;
            Some((item, c))
        })
        .boxed()
    }
}

enum Step {
    Search(Option<String>),
    Prefs(Option<Result<FilterPreferences>>),
    List(Option<Result<Vec<Task>>>),
}

struct Composer {
    store: Arc<dyn TaskStore>,
    search: Option<watch::Receiver<String>>,
    prefs: Option<PreferenceStream>,
    latest_search: Option<String>,
    latest_prefs: Option<FilterPreferences>,
    last_good: Option<FilterPreferences>,
    /// The query `inner` was opened for.
    active: Option<TaskQuery>,
    inner: Option<TaskListStream>,
    failed: bool,
}

impl Composer {
    async fn next_list(&mut self) -> Option<Result<Vec<Task>>> {
        if self.failed { return None; }
        if self.latest_search.is_none() {
            if let Some(rx) = self.search.as_mut() {
                self.latest_search = Some(rx.borrow_and_update().clone());
            }
        }
        loop {
            if self.search.is_none() && self.prefs.is_none() && self.inner.is_none() {
                return None;
            }
            // inputs win ties so a burst of changes collapses into one switch
            let step = tokio::select! {
                biased;
                s = search_changed(&mut self.search) => Step::Search(s),
                p = next_item(&mut self.prefs) => Step::Prefs(p),
                l = next_item(&mut self.inner) => Step::List(l),
            };
            match step {
                Step::Search(Some(text)) => self.latest_search = Some(text),
                Step::Search(None) => self.search = None,
                Step::Prefs(Some(Ok(p))) => {
                    self.last_good = Some(p);
                    self.latest_prefs = Some(p);
                }
                Step::Prefs(Some(Err(e))) if e.is_transient() => {
                    let fallback = self.last_good.unwrap_or_default();
                    warn!(error = %e, ?fallback, "preferences unreadable, using last known");
                    self.latest_prefs = Some(fallback);
                }
                Step::Prefs(Some(Err(e))) => return Some(self.fail(e)),
                Step::Prefs(None) => self.prefs = None,
                Step::List(Some(Ok(list))) => return Some(Ok(list)),
                Step::List(Some(Err(e))) => return Some(self.fail(e)),
                Step::List(None) => {
                    debug!("store subscription ended");
                    self.inner = None;
                }
            }
            self.switch_if_changed();
        }
    }

    fn switch_if_changed(&mut self) {
        let (Some(search), Some(prefs)) = (&self.latest_search, self.latest_prefs) else { return; };
        let query = TaskQuery::new(search.clone(), prefs);
        if self.active.as_ref() == Some(&query) { return; }
        // the old subscription goes before the new one exists
        self.inner = None;
        debug!(search = %query.search, sort = %query.sort_order, hide_completed = query.hide_completed, "switching task query");
        self.inner = Some(self.store.query(query.clone()));
        self.active = Some(query);
    }

    fn fail(&mut self, e: Error) -> Result<Vec<Task>> {
        self.failed = true;
        self.inner = None;
        Err(e)
    }
}

async fn search_changed(rx: &mut Option<watch::Receiver<String>>) -> Option<String> {
    let Some(rx) = rx.as_mut() else { return future::pending().await };
    match rx.changed().await {
        Ok(()) => Some(rx.borrow_and_update().clone()),
        Err(_) => None,
    }
}

async fn next_item<T>(s: &mut Option<stream::BoxStream<'static, T>>) -> Option<T> {
    match s.as_mut() {
        Some(s) => s.next().await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        prefs::{FilePreferences, PreferenceStore},
        store::LocalTaskStore,
        task::{SortOrder, TaskId},
    };
    use async_trait::async_trait;
    use std::{
        io,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tokio::{sync::mpsc, time::timeout};

    /// Wraps a store and counts how many query streams are alive.
    struct Counting {
        store: LocalTaskStore,
        live: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        opened: Arc<AtomicUsize>,
    }

    struct Guard(Arc<AtomicUsize>);
    impl Drop for Guard {
        fn drop(&mut self) { self.0.fetch_sub(1, Ordering::SeqCst); }
    }

    #[async_trait]
    impl TaskStore for Counting {
        async fn insert(&self, task: Task) -> Result<TaskId> { self.store.insert(task).await }
        async fn update(&self, task: Task) -> Result<()> { self.store.update(task).await }
        async fn delete(&self, task: &Task) -> Result<()> { self.store.delete(task).await }
        async fn delete_completed(&self) -> Result<usize> { self.store.delete_completed().await }
        async fn get(&self, id: TaskId) -> Result<Option<Task>> { self.store.get(id).await }
        fn query(&self, query: TaskQuery) -> TaskListStream {
            let now = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.opened.fetch_add(1, Ordering::SeqCst);
            let guard = Guard(self.live.clone());
            stream::unfold((self.store.query(query), guard), |(mut inner, guard)| async move {
                inner.next().await.map(|item| (item, (inner, guard)))
            })
            .boxed()
        }
    }

    fn counting(store: LocalTaskStore) -> (Arc<Counting>, Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let opened = Arc::new(AtomicUsize::new(0));
        let c = Arc::new(Counting { store, live: live.clone(), peak: peak.clone(), opened: opened.clone() });
        (c, live, peak, opened)
    }

    /// Preferences fed by hand.
    fn scripted() -> (mpsc::UnboundedSender<Result<FilterPreferences>>, PreferenceStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let s = stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|x| (x, rx)) }).boxed();
        (tx, s)
    }

    async fn next(s: &mut TaskListStream) -> Result<Vec<Task>> {
        timeout(Duration::from_secs(2), s.next()).await.expect("emission").expect("open")
    }

    fn names(list: &[Task]) -> Vec<&str> { list.iter().map(|t| t.name.as_str()).collect() }

    async fn sample() -> LocalTaskStore {
        let store = LocalTaskStore::in_memory();
        store.insert(Task { id: TaskId(1), ..Task::new("B") }).await.unwrap();
        store.insert(Task { id: TaskId(2), ..Task::new("A").important(true).completed(true) }).await.unwrap();
        store
    }

    #[tokio::test]
    async fn follows_the_hide_completed_example() {
        let store = Arc::new(sample().await);
        let (search_tx, search_rx) = watch::channel(String::new());
        let (prefs_tx, prefs) = scripted();
        prefs_tx.send(Ok(FilterPreferences { sort_order: SortOrder::ByName, hide_completed: false })).unwrap();

        let mut live = QueryComposer::new(store).compose(search_rx, prefs);
        assert_eq!(names(&next(&mut live).await.unwrap()), vec!["A", "B"]);

        prefs_tx.send(Ok(FilterPreferences { sort_order: SortOrder::ByName, hide_completed: true })).unwrap();
        assert_eq!(names(&next(&mut live).await.unwrap()), vec!["B"]);

        search_tx.send("A".into()).unwrap();
        assert!(next(&mut live).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_subscription_at_a_time_and_never_stale() {
        let store = LocalTaskStore::in_memory();
        for name in ["apple", "apricot", "banana", "blueberry", "cherry"] {
            store.insert(Task::new(name)).await.unwrap();
        }
        let (c, live_count, peak, _) = counting(store.clone());
        let (search_tx, search_rx) = watch::channel(String::new());
        let dir = tempfile::tempdir().unwrap();
        let prefs = FilePreferences::new(dir.path().join("p.toml"));
        let mut live = QueryComposer::new(c).compose(search_rx, prefs.live());

        assert_eq!(next(&mut live).await.unwrap().len(), 5);
        for (needle, expected) in [("ap", 2), ("b", 2), ("cherry", 1), ("", 5), ("zzz", 0)] {
            search_tx.send(needle.into()).unwrap();
            let list = next(&mut live).await.unwrap();
            assert_eq!(list.len(), expected, "search {needle:?}");
            assert!(list.iter().all(|t| t.name.contains(needle)));
        }
        // a store change still reaches the latest query only
        store.insert(Task::new("zzz top")).await.unwrap();
        assert_eq!(names(&next(&mut live).await.unwrap()), vec!["zzz top"]);

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        drop(live);
        assert_eq!(live_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn bursts_coalesce_into_the_latest_query() {
        let store = LocalTaskStore::in_memory();
        for name in ["one", "two", "three"] {
            store.insert(Task::new(name)).await.unwrap();
        }
        let (c, _, _, opened) = counting(store);
        let (search_tx, search_rx) = watch::channel(String::new());
        let (prefs_tx, prefs) = scripted();
        prefs_tx.send(Ok(FilterPreferences::default())).unwrap();
        let mut live = QueryComposer::new(c).compose(search_rx, prefs);
        next(&mut live).await.unwrap();
        let before = opened.load(Ordering::SeqCst);

        for s in ["t", "tw", "two", "o", "e"] {
            search_tx.send(s.into()).unwrap();
        }
        prefs_tx.send(Ok(FilterPreferences { sort_order: SortOrder::ByName, hide_completed: false })).unwrap();

        assert_eq!(names(&next(&mut live).await.unwrap()), vec!["one", "three"]);
        // watch keeps only the newest search; the prefs item costs one more switch at most
        assert!(opened.load(Ordering::SeqCst) - before <= 2);
    }

    #[tokio::test]
    async fn identical_tuple_does_not_resubscribe() {
        let (c, _, _, opened) = counting(sample().await);
        let (search_tx, search_rx) = watch::channel(String::new());
        let (prefs_tx, prefs) = scripted();
        prefs_tx.send(Ok(FilterPreferences::default())).unwrap();
        let mut live = QueryComposer::new(c.clone()).compose(search_rx, prefs);
        next(&mut live).await.unwrap();

        search_tx.send(String::new()).unwrap();
        prefs_tx.send(Ok(FilterPreferences::default())).unwrap();
        c.store.insert(Task::new("C")).await.unwrap();
        assert_eq!(next(&mut live).await.unwrap().len(), 3);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_pref_fault_falls_back_to_last_known() {
        let store = Arc::new(sample().await);
        let (_search_tx, search_rx) = watch::channel(String::new());
        let (prefs_tx, prefs) = scripted();
        let mut live = QueryComposer::new(store).compose(search_rx, prefs);

        // nothing known yet: defaults (BY_DATE, show completed)
        prefs_tx.send(Err(Error::Io(io::Error::other("disk hiccup")))).unwrap();
        assert_eq!(next(&mut live).await.unwrap().len(), 2);

        prefs_tx.send(Ok(FilterPreferences { sort_order: SortOrder::ByName, hide_completed: true })).unwrap();
        assert_eq!(names(&next(&mut live).await.unwrap()), vec!["B"]);

        // fault again: keeps hiding, so no switch and no new list until the store changes
        prefs_tx.send(Err(Error::Io(io::Error::other("disk hiccup")))).unwrap();
        assert!(timeout(Duration::from_millis(100), live.next()).await.is_err());
    }

    #[tokio::test]
    async fn other_pref_faults_end_the_stream() {
        let store = Arc::new(sample().await);
        let (_search_tx, search_rx) = watch::channel(String::new());
        let (prefs_tx, prefs) = scripted();
        prefs_tx.send(Ok(FilterPreferences::default())).unwrap();
        let mut live = QueryComposer::new(store).compose(search_rx, prefs);
        next(&mut live).await.unwrap();

        prefs_tx.send(Err(Error::corrupt("preferences", "bad sort order"))).unwrap();
        assert!(matches!(next(&mut live).await, Err(Error::Corrupt { .. })));
        assert!(timeout(Duration::from_secs(1), live.next()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nothing_emitted_before_preferences_arrive() {
        let store = Arc::new(sample().await);
        let (_search_tx, search_rx) = watch::channel(String::new());
        let (prefs_tx, prefs) = scripted();
        let mut live = QueryComposer::new(store).compose(search_rx, prefs);
        assert!(timeout(Duration::from_millis(50), live.next()).await.is_err());
        prefs_tx.send(Ok(FilterPreferences::default())).unwrap();
        assert_eq!(next(&mut live).await.unwrap().len(), 2);
    }
}
