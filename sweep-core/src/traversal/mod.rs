//! The traversal engine.
//!
//! [`traverse`] turns a [`TraversalHooks`] implementation into a lazy stream of
//! progress values. The walk moves through these states:
//!
//! ```text
//! NotStarted -> SettingUp -> SetupFailed ------------------------> Done
//!                         \-> Iterating <-> WaitingForMore -----> Done
//! ```
//!
//! Each pull from the stream runs the engine until the next progress value
//! is ready. Values from nested sequences (`pre_traversal`, `handler`,
//! `setup_failure`) are relayed in order before the engine moves on, so the
//! stream is an exact trace of what happened. Errors raised by `setup`,
//! `first_child`, `next_child`, `should_wait`, `wait` or a handler's own
//! stream end the stream with that error; the engine only recovers the
//! "no child right now, maybe wait" case.
//!
//! Dropping the stream drops whatever wait is in flight.
mod walk;

pub use walk::{ChildHandler, SiblingWalk};

use crate::dom::NodeRef;
use crate::error::TraversalError;
use crate::progress::{boxed, Progress, ProgressStream};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

/// Operations that parameterize one traversal run.
///
/// Extra arguments a handler needs (shared counters, options, the platform
/// handle) live on the implementing type.
#[async_trait]
pub trait TraversalHooks: Send + Sync {
    type Node: NodeRef;
    type State: Send + 'static;

    /// Locate the traversal root. `None` is a setup failure, not an error.
    async fn setup(&self) -> Result<Option<Self::Node>, TraversalError>;

    /// Runs once after a successful setup, before the first child.
    fn pre_traversal(&self) -> Option<ProgressStream<'_, Self::State>> {
        None
    }

    /// Child the walk starts from. `None` means the root is empty.
    async fn first_child(&self, parent: &Self::Node) -> Result<Option<Self::Node>, TraversalError>;

    /// Child after `current`, or `None` if none is available right now.
    async fn next_child(
        &self,
        parent: &Self::Node,
        current: &Self::Node,
    ) -> Result<Option<Self::Node>, TraversalError>;

    /// Whether to wait for more children before concluding the walk.
    async fn should_wait(&self, parent: &Self::Node, current: &Self::Node)
        -> Result<bool, TraversalError>;

    /// Bounded wait for more children; `true` if new content arrived.
    async fn wait(&self, parent: &Self::Node, current: &Self::Node) -> Result<bool, TraversalError>;

    /// Process one child.
    fn handler(&self, child: Self::Node) -> ProgressStream<'_, Self::State>;

    /// Fallback sequence run when `setup` finds no root.
    fn setup_failure(&self) -> Option<ProgressStream<'_, Self::State>> {
        None
    }

    /// Final value of the walk.
    fn post_traversal(&self, failed: bool) -> Progress<Self::State>;

    /// Called before the cursor is used after a suspension (a handler run or
    /// a wait). Returning `false` aborts the walk with a structural error.
    async fn revalidate(
        &self,
        _parent: &Self::Node,
        _current: &Self::Node,
    ) -> Result<bool, TraversalError> {
        Ok(true)
    }
}

/// Observable phase of a traversal, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    NotStarted,
    SettingUp,
    SetupFailed,
    Iterating,
    WaitingForMore,
    Done,
}

impl fmt::Display for TraversalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotStarted => "not_started",
            Self::SettingUp => "setting_up",
            Self::SetupFailed => "setup_failed",
            Self::Iterating => "iterating",
            Self::WaitingForMore => "waiting_for_more",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

struct Cursor<N> {
    parent: N,
    current: N,
}

/// Internal phases; `Visit` and `Advance` are both `Iterating` from outside.
enum Phase<N> {
    NotStarted,
    SettingUp,
    SetupFailed,
    Visit(Cursor<N>),
    Advance(Cursor<N>),
    WaitingForMore(Cursor<N>),
    Done { failed: bool, timed_out: bool },
}

impl<N> Phase<N> {
    fn state(&self) -> TraversalState {
        match self {
            Self::NotStarted => TraversalState::NotStarted,
            Self::SettingUp => TraversalState::SettingUp,
            Self::SetupFailed => TraversalState::SetupFailed,
            Self::Visit(_) | Self::Advance(_) => TraversalState::Iterating,
            Self::WaitingForMore(_) => TraversalState::WaitingForMore,
            Self::Done { .. } => TraversalState::Done,
        }
    }
}

/// Drive `hooks` to completion as a lazy, fused stream of progress values.
///
/// The stream ends after `post_traversal` has been emitted exactly once;
/// polling it again yields `None` and never restarts the walk.
pub fn traverse<H>(hooks: H) -> ProgressStream<'static, H::State>
where
    H: TraversalHooks + 'static,
{
    let run = Uuid::new_v4();
    let stream = try_stream! {
        let hooks = hooks;
        let mut phase: Phase<H::Node> = Phase::NotStarted;
        let mut visited: u64 = 0;
        let mut excursions: u64 = 0;

        loop {
            let from = phase.state();
            phase = match phase {
                Phase::NotStarted => Phase::SettingUp,

                Phase::SettingUp => match hooks.setup().await? {
                    None => Phase::SetupFailed,
                    Some(parent) => {
                        if let Some(mut pre) = hooks.pre_traversal() {
                            while let Some(value) = pre.next().await {
                                yield value?;
                            }
                        }
                        match hooks.first_child(&parent).await? {
                            Some(current) => Phase::Visit(Cursor { parent, current }),
                            None => {
                                debug!(target: "sweep.traversal", %run, "traversal root has no children");
                                Phase::Done { failed: false, timed_out: false }
                            }
                        }
                    }
                },

                Phase::SetupFailed => {
                    info!(target: "sweep.traversal", %run, "setup found no traversal root");
                    if let Some(mut fallback) = hooks.setup_failure() {
                        while let Some(value) = fallback.next().await {
                            yield value?;
                        }
                    }
                    Phase::Done { failed: true, timed_out: false }
                }

                Phase::Visit(cursor) => {
                    visited += 1;
                    let mut handled = hooks.handler(cursor.current.clone());
                    while let Some(value) = handled.next().await {
                        yield value?;
                    }
                    Phase::Advance(cursor)
                }

                Phase::Advance(Cursor { parent, current }) => {
                    if !hooks.revalidate(&parent, &current).await? {
                        Err::<(), TraversalError>(TraversalError::structural(format!(
                            "cursor at {current:?} is no longer valid under {parent:?}"
                        )))?;
                    }
                    match hooks.next_child(&parent, &current).await? {
                        Some(next) => Phase::Visit(Cursor { parent, current: next }),
                        None => {
                            if hooks.should_wait(&parent, &current).await? {
                                Phase::WaitingForMore(Cursor { parent, current })
                            } else {
                                Phase::Done { failed: false, timed_out: false }
                            }
                        }
                    }
                }

                Phase::WaitingForMore(cursor) => {
                    excursions += 1;
                    if hooks.wait(&cursor.parent, &cursor.current).await? {
                        Phase::Advance(cursor)
                    } else {
                        debug!(target: "sweep.traversal", %run, visited, "wait for more children timed out");
                        Phase::Done { failed: false, timed_out: true }
                    }
                }

                Phase::Done { failed, timed_out } => {
                    info!(
                        target: "sweep.traversal",
                        %run,
                        failed,
                        timed_out,
                        visited,
                        excursions,
                        "traversal finished"
                    );
                    let mut last = hooks.post_traversal(failed);
                    last.timed_out = timed_out;
                    yield last;
                    break;
                }
            };

            let to = phase.state();
            if from != to {
                debug!(target: "sweep.traversal", %run, %from, %to, visited, "state transition");
            }
        }
    };
    boxed(stream.fuse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{lock, progress, shared, Shared};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    /// Scripted hooks over a vector of child ids.
    struct Scripted {
        children: Arc<Mutex<Vec<u32>>>,
        /// `next_child` always answers `current + 1`.
        endless: bool,
        setup_ok: bool,
        wait_results: Mutex<Vec<bool>>,
        should_wait: bool,
        should_wait_calls: Arc<AtomicU32>,
        wait_calls: Arc<AtomicU32>,
        log: Shared<Vec<String>>,
    }

    impl Scripted {
        fn new(children: Vec<u32>) -> Self {
            Self {
                children: Arc::new(Mutex::new(children)),
                endless: false,
                setup_ok: true,
                wait_results: Mutex::new(Vec::new()),
                should_wait: false,
                should_wait_calls: Arc::new(AtomicU32::new(0)),
                wait_calls: Arc::new(AtomicU32::new(0)),
                log: shared(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TraversalHooks for Scripted {
        type Node = u32;
        type State = Vec<String>;

        async fn setup(&self) -> Result<Option<u32>, TraversalError> {
            Ok(self.setup_ok.then_some(0))
        }

        async fn first_child(&self, _parent: &u32) -> Result<Option<u32>, TraversalError> {
            Ok(self.children.lock().unwrap().first().copied())
        }

        async fn next_child(&self, _parent: &u32, current: &u32) -> Result<Option<u32>, TraversalError> {
            if self.endless {
                return Ok(Some(current + 1));
            }
            let children = self.children.lock().unwrap();
            let pos = children.iter().position(|c| c == current);
            Ok(pos.and_then(|p| children.get(p + 1).copied()))
        }

        async fn should_wait(&self, _parent: &u32, _current: &u32) -> Result<bool, TraversalError> {
            self.should_wait_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.should_wait)
        }

        async fn wait(&self, _parent: &u32, _current: &u32) -> Result<bool, TraversalError> {
            self.wait_calls.fetch_add(1, Ordering::SeqCst);
            let mut results = self.wait_results.lock().unwrap();
            Ok(if results.is_empty() { false } else { results.remove(0) })
        }

        fn handler(&self, child: u32) -> ProgressStream<'_, Vec<String>> {
            lock(&self.log).push(format!("handle {child}"));
            let p = progress(format!("child {child}"), Some(&self.log));
            Box::pin(futures::stream::iter(vec![Ok::<_, TraversalError>(p)]))
        }

        fn post_traversal(&self, failed: bool) -> Progress<Vec<String>> {
            progress(format!("finished failed={failed}"), Some(&self.log))
        }
    }

    async fn messages<H: TraversalHooks + 'static>(hooks: H) -> Vec<String> {
        traverse(hooks)
            .map(|p| p.expect("traversal should not fail").message)
            .collect()
            .await
    }

    #[tokio::test]
    async fn static_children_are_visited_in_order_without_waiting() {
        let hooks = Scripted::new(vec![1, 2, 3, 4, 5]);
        let should_wait_calls = hooks.should_wait_calls.clone();
        let wait_calls = hooks.wait_calls.clone();
        let mut stream = traverse(hooks);
        let mut seen = Vec::new();
        while let Some(p) = stream.next().await {
            seen.push(p.unwrap().message);
        }
        assert_eq!(
            seen,
            vec!["child 1", "child 2", "child 3", "child 4", "child 5", "finished failed=false"]
        );
        // asked once, at the end of the list
        assert_eq!(should_wait_calls.load(Ordering::SeqCst), 1);
        assert_eq!(wait_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn endless_children_never_ask_to_wait() {
        let mut hooks = Scripted::new(vec![1]);
        hooks.endless = true;
        hooks.should_wait = true;
        let should_wait_calls = hooks.should_wait_calls.clone();
        let wait_calls = hooks.wait_calls.clone();

        let seen: Vec<String> = traverse(hooks)
            .take(50)
            .map(|p| p.unwrap().message)
            .collect()
            .await;

        assert_eq!(seen.len(), 50);
        assert_eq!(seen[49], "child 50");
        assert_eq!(should_wait_calls.load(Ordering::SeqCst), 0);
        assert_eq!(wait_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn setup_failure_skips_the_handler() {
        let mut hooks = Scripted::new(vec![1, 2]);
        hooks.setup_ok = false;
        let log = hooks.log.clone();
        let seen = messages(hooks).await;
        assert_eq!(seen, vec!["finished failed=true"]);
        assert!(lock(&log).is_empty());
    }

    #[tokio::test]
    async fn empty_root_finishes_immediately() {
        let seen = messages(Scripted::new(vec![])).await;
        assert_eq!(seen, vec!["finished failed=false"]);
    }

    #[tokio::test]
    async fn timed_out_wait_is_flagged_on_the_final_value() {
        let mut hooks = Scripted::new(vec![1]);
        hooks.should_wait = true;
        let values: Vec<_> = traverse(hooks).map(|p| p.unwrap()).collect().await;
        assert_eq!(values.len(), 2);
        assert!(values[1].timed_out);
        assert!(!values[0].timed_out);
    }

    #[tokio::test]
    async fn stream_is_fused_after_done() {
        let mut stream = traverse(Scripted::new(vec![1]));
        while stream.next().await.is_some() {}
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn nothing_runs_until_pulled() {
        let hooks = Scripted::new(vec![1, 2]);
        let log = hooks.log.clone();
        let mut stream = traverse(hooks);
        assert!(lock(&log).is_empty());
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.message, "child 1");
        assert_eq!(lock(&log).as_slice(), ["handle 1"]);
    }

    struct Invalidating(Scripted);

    #[async_trait]
    impl TraversalHooks for Invalidating {
        type Node = u32;
        type State = Vec<String>;

        async fn setup(&self) -> Result<Option<u32>, TraversalError> {
            self.0.setup().await
        }
        async fn first_child(&self, parent: &u32) -> Result<Option<u32>, TraversalError> {
            self.0.first_child(parent).await
        }
        async fn next_child(&self, parent: &u32, current: &u32) -> Result<Option<u32>, TraversalError> {
            self.0.next_child(parent, current).await
        }
        async fn should_wait(&self, parent: &u32, current: &u32) -> Result<bool, TraversalError> {
            self.0.should_wait(parent, current).await
        }
        async fn wait(&self, parent: &u32, current: &u32) -> Result<bool, TraversalError> {
            self.0.wait(parent, current).await
        }
        fn handler(&self, child: u32) -> ProgressStream<'_, Vec<String>> {
            self.0.handler(child)
        }
        fn post_traversal(&self, failed: bool) -> Progress<Vec<String>> {
            self.0.post_traversal(failed)
        }
        async fn revalidate(&self, _parent: &u32, current: &u32) -> Result<bool, TraversalError> {
            Ok(*current != 2)
        }
    }

    #[tokio::test]
    async fn invalid_cursor_ends_the_stream_with_an_error() {
        let mut stream = traverse(Invalidating(Scripted::new(vec![1, 2, 3])));
        assert_eq!(stream.next().await.unwrap().unwrap().message, "child 1");
        assert_eq!(stream.next().await.unwrap().unwrap().message, "child 2");
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, TraversalError::StructuralAssumption(_)));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn state_names_are_snake_case() {
        assert_eq!(TraversalState::WaitingForMore.to_string(), "waiting_for_more");
        assert_eq!(Phase::<u32>::Advance(Cursor { parent: 0, current: 1 }).state(), TraversalState::Iterating);
    }
}
