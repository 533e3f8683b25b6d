//! Process-wide tokio runtime for the `sweep` binary.
//!
//! One [`CancellationToken`] is created with the runtime and handed to every
//! task through [`SweepHandle`]; cancelling it (Ctrl-C, shutdown) makes
//! cancellable tasks resolve to `None` instead of finishing their work.
use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct SweepHandle {
    inner: Handle,
    cancel: Arc<CancellationToken>,
}

pub struct SweepRuntime {
    runtime: Runtime,
    cancel: Arc<CancellationToken>,
}

impl SweepRuntime {
    /// Build a multi-threaded runtime with timers and IO enabled.
    ///
    /// ```
    /// use sweep_runtime::SweepRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = SweepRuntime::build("sweep-doctest", Some(1)).unwrap();
    /// assert_eq!(runtime.block_on(async { 6 * 7 }), 42);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn build(thread_name: &str, worker_threads: Option<usize>) -> Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(thread_name);
        if let Some(workers) = worker_threads {
            builder.worker_threads(workers.max(1));
        }
        let runtime = builder
            .build()
            .with_context(|| format!("building runtime {thread_name}"))?;
        debug!(target: "sweep.runtime", thread_name, ?worker_threads, "runtime started");
        Ok(Self {
            runtime,
            cancel: Arc::new(CancellationToken::new()),
        })
    }

    pub fn handle(&self) -> SweepHandle {
        SweepHandle {
            inner: self.runtime.handle().clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// Cancel the shared token, then give running tasks `graceful` to wind down.
    ///
    /// ```
    /// use sweep_runtime::SweepRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = SweepRuntime::build("sweep-shutdown", Some(1)).unwrap();
    /// let token = runtime.handle().cancellation();
    /// runtime.shutdown(Duration::from_millis(5));
    /// assert!(token.is_cancelled());
    /// ```
    pub fn shutdown(self, graceful: Duration) {
        self.cancel.cancel();
        info!(target: "sweep.runtime", graceful_ms = graceful.as_millis() as u64, "runtime shutting down");
        self.runtime.shutdown_timeout(graceful);
    }
}

impl SweepHandle {
    pub fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.spawn(fut)
    }

    /// Spawn `fut`, dropping it when the shared token is cancelled.
    ///
    /// ```
    /// use sweep_runtime::SweepRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = SweepRuntime::build("sweep-cancellable", Some(1)).unwrap();
    /// let handle = runtime.handle();
    /// let task = handle.spawn_cancellable(async {
    ///     tokio::time::sleep(Duration::from_secs(3600)).await;
    ///     "finished"
    /// });
    /// handle.cancellation().cancel();
    /// let outcome = runtime.block_on(async move { task.await.unwrap() });
    /// assert_eq!(outcome, None);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn spawn_cancellable<F, T>(&self, fut: F) -> JoinHandle<Option<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let cancel = self.cancel.clone();
        self.inner.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => None,
                value = fut => Some(value),
            }
        })
    }

    /// Cancel the shared token on the first Ctrl-C.
    pub fn cancel_on_ctrl_c(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        self.inner.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => info!(target: "sweep.runtime", "interrupt received, cancelling"),
                        Err(e) => warn!(target: "sweep.runtime", error = %e, "could not listen for ctrl-c"),
                    }
                    cancel.cancel();
                }
            }
        })
    }

    /// Shared cancellation token.
    ///
    /// ```
    /// use sweep_runtime::SweepRuntime;
    ///
    /// let runtime = SweepRuntime::build("sweep-token", Some(1)).unwrap();
    /// let cancel = runtime.handle().cancellation();
    /// assert!(!cancel.is_cancelled());
    /// ```
    pub fn cancellation(&self) -> Arc<CancellationToken> {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_share_one_token() {
        let runtime = SweepRuntime::build("sweep-test", Some(1)).unwrap();
        let a = runtime.handle();
        let b = a.clone();
        a.cancellation().cancel();
        assert!(b.cancellation().is_cancelled());
        runtime.shutdown(Duration::from_millis(5));
    }

    #[test]
    fn cancellable_tasks_finish_normally_when_not_cancelled() {
        let runtime = SweepRuntime::build("sweep-test", Some(1)).unwrap();
        let task = runtime.handle().spawn_cancellable(async { 3 });
        assert_eq!(runtime.block_on(task).unwrap(), Some(3));
        runtime.shutdown(Duration::from_millis(5));
    }

    #[test]
    fn ctrl_c_listener_exits_on_cancel() {
        let runtime = SweepRuntime::build("sweep-test", Some(1)).unwrap();
        let handle = runtime.handle();
        let listener = handle.cancel_on_ctrl_c();
        handle.cancellation().cancel();
        runtime.block_on(listener).unwrap();
        runtime.shutdown(Duration::from_millis(5));
    }
}
