//! Progress envelope emitted at every step of a traversal.
//!
//! `state` is a reference to the caller's accumulator, not a copy: the
//! accumulator keeps changing after a value that references it has been
//! emitted. Consumers that need a point-in-time view call
//! [`Progress::snapshot`] as soon as they receive the value.
use crate::error::TraversalError;
use futures::Stream;
use serde::Serialize;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

/// Caller-owned mutable accumulator shared by reference with every progress value.
pub type Shared<S> = Arc<Mutex<S>>;

/// Wrap `state` for sharing with progress values.
pub fn shared<S>(state: S) -> Shared<S> {
    Arc::new(Mutex::new(state))
}

/// Lock a shared accumulator, recovering the data if a previous holder panicked.
pub fn lock<S>(state: &Shared<S>) -> MutexGuard<'_, S> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Lazy sequence of progress values; an `Err` item ends it abnormally.
pub type ProgressStream<'a, S> =
    Pin<Box<dyn Stream<Item = Result<Progress<S>, TraversalError>> + Send + 'a>>;

/// Box `stream` as a [`ProgressStream`].
pub fn boxed<'a, S, St>(stream: St) -> ProgressStream<'a, S>
where
    St: Stream<Item = Result<Progress<S>, TraversalError>> + Send + 'a,
{
    Box::pin(stream)
}

/// One step of a traversal trace.
pub struct Progress<S> {
    pub state: Option<Shared<S>>,
    pub message: String,
    /// Hint to the consumer that the page needs time before the next pull.
    pub wait: bool,
    /// Set on the final value when the walk ended because a wait for more
    /// children ran out of time rather than because the root was exhausted.
    pub timed_out: bool,
}

/// Build a progress value that does not ask the consumer to wait.
pub fn progress<S>(message: impl Into<String>, state: Option<&Shared<S>>) -> Progress<S> {
    Progress {
        state: state.cloned(),
        message: message.into(),
        wait: false,
        timed_out: false,
    }
}

impl<S> Progress<S> {
    pub fn no_wait(message: impl Into<String>, state: &Shared<S>) -> Self {
        progress(message, Some(state))
    }

    pub fn with_wait(message: impl Into<String>, state: &Shared<S>) -> Self {
        Self {
            wait: true,
            ..progress(message, Some(state))
        }
    }

    /// Message-only value.
    pub fn message(message: impl Into<String>) -> Self {
        progress(message, None)
    }

    /// True when both values reference the same accumulator.
    pub fn shares_state_with(&self, other: &Progress<S>) -> bool {
        match (&self.state, &other.state) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Copy of the accumulator as it is right now.
    pub fn snapshot(&self) -> Option<S>
    where
        S: Clone,
    {
        self.state.as_ref().map(|s| lock(s).clone())
    }

    /// JSON view of the value with the accumulator as it is right now.
    pub fn to_json(&self) -> serde_json::Value
    where
        S: Serialize,
    {
        let state = self
            .state
            .as_ref()
            .and_then(|s| serde_json::to_value(&*lock(s)).ok())
            .unwrap_or(serde_json::Value::Null);
        serde_json::json!({
            "message": self.message,
            "wait": self.wait,
            "timed_out": self.timed_out,
            "state": state,
        })
    }
}

impl<S> Clone for Progress<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            message: self.message.clone(),
            wait: self.wait,
            timed_out: self.timed_out,
        }
    }
}

impl<S> fmt::Debug for Progress<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("message", &self.message)
            .field("wait", &self.wait)
            .field("timed_out", &self.timed_out)
            .field("has_state", &self.state.is_some())
            .finish()
    }
}

impl<S> fmt::Display for Progress<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, Serialize, PartialEq)]
    struct Counter {
        items: u32,
    }

    #[test]
    fn state_is_emitted_by_reference() {
        let state = shared(Counter::default());
        let first = Progress::no_wait("first", &state);
        lock(&state).items += 1;
        let second = Progress::no_wait("second", &state);

        // both values see the mutation made after `first` was built
        assert_eq!(first.snapshot(), Some(Counter { items: 1 }));
        assert!(first.shares_state_with(&second));
    }

    #[test]
    fn snapshot_is_a_copy() {
        let state = shared(Counter::default());
        let p = Progress::no_wait("viewed", &state);
        let snap = p.snapshot().unwrap();
        lock(&state).items = 10;
        assert_eq!(snap.items, 0);
        assert_eq!(p.snapshot().unwrap().items, 10);
    }

    #[test]
    fn clone_keeps_the_same_accumulator() {
        let state = shared(Counter::default());
        let p = Progress::with_wait("loading", &state);
        let q = p.clone();
        assert!(p.shares_state_with(&q));
        assert!(q.wait);
    }

    #[test]
    fn message_only_values_have_no_state() {
        let p: Progress<Counter> = Progress::message("done");
        assert!(p.snapshot().is_none());
        assert_eq!(p.to_json()["state"], serde_json::Value::Null);
        assert_eq!(p.to_string(), "done");
    }

    #[test]
    fn json_view_includes_current_state() {
        let state = shared(Counter { items: 3 });
        let p = Progress::no_wait("viewed", &state);
        let v = p.to_json();
        assert_eq!(v["message"], "viewed");
        assert_eq!(v["state"]["items"], 3);
        assert_eq!(v["timed_out"], false);
    }
}
