use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Notify;

#[derive(Default)]
struct Inflight {
    count: AtomicUsize,
    idle: Notify,
}

/// Detached background work that must not block the caller.
///
/// Tasks run on the tokio runtime with no cancellation. A failing task only
/// logs its error together with the name it was submitted under.
#[derive(Clone, Default)]
pub struct TaskQueue {
    inflight: Arc<Inflight>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.submit_boxed(name.into(), Box::pin(task));
    }

    fn submit_boxed(&self, name: String, task: BoxFuture<'static, anyhow::Result<()>>) {
        let inflight = self.inflight.clone();
        inflight.count.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::debug!("Starting background task {name}");
            if let Err(e) = task.await {
                tracing::error!("Background task {name} failed: {e:#}");
            }
            if inflight.count.fetch_sub(1, Ordering::SeqCst) == 1 {
                inflight.idle.notify_waiters();
            }
        });
    }

    pub fn inflight(&self) -> usize {
        self.inflight.count.load(Ordering::SeqCst)
    }

    /// Resolves once no submitted task is running, including tasks
    /// submitted by other tasks in the meantime.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inflight.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inflight() == 0 {
                return;
            }
            notified.await;
        }
    }
}
