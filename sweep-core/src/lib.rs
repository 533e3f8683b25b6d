//! Incremental traversal and interaction engine for live document trees.
//!
//! The engine walks the children of a traversal root left to right, waits for
//! more children when the visible ones run out, hands every child to a
//! caller-supplied handler and reports each step as a [`progress::Progress`]
//! value. Nothing runs until the consumer pulls the next value from the
//! returned stream, and dropping the stream cancels whatever wait is pending.
//!
//! - [`traversal`]: the hook contract ([`traversal::TraversalHooks`]) and the
//!   engine ([`traversal::traverse`])
//! - [`poll`]: the guarded poller every bounded wait is built on
//! - [`interact`]: scroll/click/wait primitives with pacing
//! - [`delay`]: fixed and jittered suspensions
//! - [`progress`]: the progress envelope and shared accumulator
//! - [`dom`]: the platform capability trait the primitives act through
//!
//! # Examples
//!
//! Walking a static list with the in-memory DOM used by the test suite:
//!
//! ```rust
//! # #[cfg(feature = "test-utils")]
//! # {
//! use futures::StreamExt;
//! use std::sync::Arc;
//! use sweep_core::progress::{progress, Progress, ProgressStream};
//! use sweep_core::test_utils::FakeDom;
//! use sweep_core::traversal::{traverse, ChildHandler, SiblingWalk};
//!
//! struct Count;
//!
//! impl ChildHandler<usize> for Count {
//!     type State = ();
//!
//!     fn handle(&self, child: usize) -> ProgressStream<'_, ()> {
//!         Box::pin(futures::stream::once(async move {
//!             Ok::<_, sweep_core::TraversalError>(progress(format!("visited {child}"), None))
//!         }))
//!     }
//!
//!     fn finished(&self, _failed: bool) -> Progress<()> {
//!         progress("done", None)
//!     }
//! }
//!
//! let dom = Arc::new(FakeDom::new());
//! let list = dom.append(dom.body(), "ul");
//! dom.append(list, "li");
//! dom.append(list, "li");
//!
//! let rt = tokio::runtime::Runtime::new().unwrap();
//! let messages: Vec<String> = rt.block_on(async {
//!     traverse(SiblingWalk::new(dom, list, Count))
//!         .map(|p| p.unwrap().message)
//!         .collect()
//!         .await
//! });
//! assert_eq!(messages.len(), 3);
//! assert_eq!(messages.last().map(String::as_str), Some("done"));
//! # }
//! ```
pub mod delay;
pub mod dom;
pub mod error;
pub mod interact;
pub mod poll;
pub mod progress;
pub mod traversal;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use dom::{ChangeObservation, Dom, DomError, NodeRef, Selector};
pub use error::{InteractionError, TraversalError};
pub use poll::{poll, MaxWait, PollGuard, PollOutcome};
pub use progress::{boxed, lock, progress, shared, Progress, ProgressStream, Shared};
pub use traversal::{traverse, TraversalHooks, TraversalState};
