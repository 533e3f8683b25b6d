//! Guarded poller.
//!
//! Re-evaluates a guard on a fixed cadence until it holds, the maximum wait
//! elapses or an external cancellation token fires. The guard is checked
//! once before the first sleep, so an already-satisfied guard resolves
//! without waiting.
use crate::error::TraversalError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Predicate re-checked by the poller.
#[async_trait]
pub trait Guard: Send {
    async fn check(&mut self) -> Result<bool, TraversalError>;
}

#[async_trait]
impl<F, Fut> Guard for F
where
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = Result<bool, TraversalError>> + Send,
{
    async fn check(&mut self) -> Result<bool, TraversalError> {
        (self)().await
    }
}

/// Adapter for synchronous, infallible predicates.
pub struct SyncGuard<F>(pub F);

#[async_trait]
impl<F> Guard for SyncGuard<F>
where
    F: FnMut() -> bool + Send,
{
    async fn check(&mut self) -> Result<bool, TraversalError> {
        Ok((self.0)())
    }
}

/// Upper bound on a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxWait {
    Bounded(Duration),
    /// Only valid with a termination signal; see [`PollGuard::unbounded_with_signal`].
    Unbounded,
}

/// How a poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Satisfied,
    TimedOut,
    Cancelled,
}

impl PollOutcome {
    pub fn is_satisfied(self) -> bool {
        matches!(self, Self::Satisfied)
    }
}

pub struct PollGuard<G> {
    guard: G,
    interval: Duration,
    max_wait: MaxWait,
    tolerate_errors: bool,
    cancel: Option<CancellationToken>,
    carries_signal: bool,
}

impl<G: Guard> PollGuard<G> {
    pub fn new(guard: G, interval: Duration, max_wait: MaxWait) -> Self {
        Self {
            guard,
            interval,
            max_wait,
            tolerate_errors: false,
            cancel: None,
            carries_signal: false,
        }
    }

    /// Poll every `interval`, giving up after `max_wait`.
    ///
    /// ```
    /// use std::time::Duration;
    /// use sweep_core::poll::{poll, PollGuard, SyncGuard};
    ///
    /// let rt = tokio::runtime::Runtime::new().unwrap();
    /// let ready = rt.block_on(poll(PollGuard::bounded(
    ///     SyncGuard(|| true),
    ///     Duration::from_millis(50),
    ///     Duration::from_secs(1),
    /// )));
    /// assert!(ready.unwrap());
    /// ```
    pub fn bounded(guard: G, interval: Duration, max_wait: Duration) -> Self {
        Self::new(guard, interval, MaxWait::Bounded(max_wait))
    }

    /// Poll without a deadline. The guard itself must turn true once the
    /// content source reports that nothing more will arrive (for example a
    /// "no more pages" flag), otherwise the wait never ends on its own.
    pub fn unbounded_with_signal(guard: G, interval: Duration) -> Self {
        Self {
            carries_signal: true,
            ..Self::new(guard, interval, MaxWait::Unbounded)
        }
    }

    /// Treat guard errors as `false` and keep polling.
    pub fn tolerate_errors(mut self) -> Self {
        self.tolerate_errors = true;
        self
    }

    /// Stop as soon as `token` is cancelled.
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_wait(&self) -> MaxWait {
        self.max_wait
    }

    fn validate(&self) -> Result<(), TraversalError> {
        if self.interval.is_zero() {
            return Err(TraversalError::InvalidGuard(
                "poll interval must be greater than zero".into(),
            ));
        }
        if self.max_wait == MaxWait::Unbounded && !self.carries_signal && self.cancel.is_none() {
            return Err(TraversalError::InvalidGuard(
                "unbounded poll needs a termination signal or a cancellation token".into(),
            ));
        }
        Ok(())
    }
}

/// Run the poll and report how it ended.
pub async fn poll_outcome<G: Guard>(mut guard: PollGuard<G>) -> Result<PollOutcome, TraversalError> {
    guard.validate()?;

    let started = Instant::now();
    let deadline = match guard.max_wait {
        MaxWait::Bounded(max) => Some(started + max),
        MaxWait::Unbounded => None,
    };
    let cancel = guard.cancel.take().unwrap_or_default();
    let mut checks: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            debug!(target: "sweep.poll", checks, "poll cancelled");
            return Ok(PollOutcome::Cancelled);
        }

        checks += 1;
        match guard.guard.check().await {
            Ok(true) => {
                trace!(
                    target: "sweep.poll",
                    checks,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "guard satisfied"
                );
                return Ok(PollOutcome::Satisfied);
            }
            Ok(false) => {}
            Err(e) if guard.tolerate_errors => {
                warn!(target: "sweep.poll", error = %e, checks, "guard failed; treating as false");
            }
            Err(e) => return Err(e),
        }

        let nap = match deadline {
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    debug!(
                        target: "sweep.poll",
                        checks,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "poll timed out"
                    );
                    return Ok(PollOutcome::TimedOut);
                }
                (deadline - now).min(guard.interval)
            }
            None => guard.interval,
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(target: "sweep.poll", checks, "poll cancelled while sleeping");
                return Ok(PollOutcome::Cancelled);
            }
            _ = sleep(nap) => {}
        }
    }
}

/// `true` the moment the guard holds, `false` on timeout or cancellation.
pub async fn poll<G: Guard>(guard: PollGuard<G>) -> Result<bool, TraversalError> {
    poll_outcome(guard).await.map(PollOutcome::is_satisfied)
}
