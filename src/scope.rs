// taskdeck/src/scope.rs

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use parking_lot::Mutex;
use tokio::{sync::{mpsc, oneshot}, task::JoinHandle};
use tracing::{debug, error};

use crate::error::{Error, Result};

type BoxJob = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Inner {
    name: &'static str,
    tx: mpsc::UnboundedSender<BoxJob>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(w) = self.worker.get_mut().take() { w.abort(); }
    }
}

/// A serial job queue owned by one view-model (or by the whole app).
///
/// Jobs run one at a time, in launch order. Cancelling the scope drops the
/// running job and everything queued behind it. Must be created inside a
/// tokio runtime.
#[derive(Clone)]
pub struct TaskScope {
    inner: Arc<Inner>,
}

impl TaskScope {
    pub fn new(name: &'static str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<BoxJob>();
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
        });
        debug!(scope = name, "scope started");
        Self { inner: Arc::new(Inner { name, tx, worker: Mutex::new(Some(worker)) }) }
    }

    pub fn name(&self) -> &'static str { self.inner.name }

    pub fn launch<T, F>(&self, fut: F) -> Job<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (done, rx) = oneshot::channel();
        let name = self.inner.name;
        let job: BoxJob = Box::pin(async move {
            let out = fut.await;
            if let Err(e) = &out {
                error!(scope = name, error = %e, "operation failed");
            }
            let _ = done.send(out);
        });
        // a cancelled scope drops the job, which resolves the handle to Cancelled
        let _ = self.inner.tx.send(job);
        Job { rx }
    }

    pub fn cancel(&self) {
        if let Some(w) = self.inner.worker.lock().take() {
            debug!(scope = self.inner.name, "scope cancelled");
            w.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool { self.inner.worker.lock().is_none() }
}

/// Handle to a launched job. Awaiting it is optional.
pub struct Job<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Job<T> {
    /// An already-finished job.
    pub fn ready(out: Result<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(out);
        Self { rx }
    }
}

impl<T> Future for Job<T> {
    type Output = Result<T>;
    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.unwrap_or(Err(Error::Cancelled)))
    }
}
