//! Site behaviors built on the sweep traversal engine.
//!
//! A behavior pairs a [`BehaviorMetadata`] (which pages it applies to) with
//! a way to turn a [`Dom`] into a progress stream. Most behaviors do that by
//! implementing [`sweep_core::TraversalHooks`] and handing the hooks to
//! [`sweep_core::traverse`].
//!
//! - [`autoscroll::AutoScroll`]: generic fallback, scrolls until the page stops growing
//! - [`death_imitates_language::DeathImitatesLanguage`]: flat list of items
//! - [`instagram::InstagramUser`]: a user's stories, posts and comments
//! - [`registry::BehaviorRegistry`]: picks a behavior for a URL
use std::sync::Arc;
use std::time::Duration;
use sweep_config::TimingConfig;
use sweep_core::delay::Pacing;
use sweep_core::{Dom, ProgressStream};

pub mod autoscroll;
pub mod death_imitates_language;
pub mod instagram;
pub mod metadata;
pub mod registry;
pub mod state;

pub use autoscroll::AutoScroll;
pub use death_imitates_language::DeathImitatesLanguage;
pub use instagram::InstagramUser;
pub use metadata::BehaviorMetadata;
pub use registry::BehaviorRegistry;
pub use state::BehaviorState;

#[derive(Debug, thiserror::Error)]
pub enum BehaviorError {
    #[error("invalid match pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Something that can walk a page and report what it did.
pub trait Behavior<D: Dom>: Send + Sync {
    fn metadata(&self) -> &BehaviorMetadata;

    /// Start a run over `dom`. Nothing happens until the stream is polled.
    fn run(&self, dom: Arc<D>) -> ProgressStream<'static, BehaviorState>;
}

/// Timing knobs shared by all behaviors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BehaviorOptions {
    /// Pause after each scroll or click.
    pub pacing: Pacing,
    pub poll_interval: Duration,
    /// Longest wait for more content before a walk concludes.
    pub max_wait: Duration,
    /// Longest wait for a single element (a dialog, an article) to appear.
    pub element_timeout: Duration,
    pub max_scrolls: Option<u32>,
    /// Pixels per auto-scroll step.
    pub scroll_step: i64,
}

impl Default for BehaviorOptions {
    fn default() -> Self {
        Self::from(&TimingConfig::default())
    }
}

impl From<&TimingConfig> for BehaviorOptions {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            pacing: timing.pacing(),
            poll_interval: timing.poll_interval(),
            max_wait: timing.max_wait(),
            element_timeout: timing.element_timeout(),
            max_scrolls: timing.max_scrolls,
            scroll_step: 500,
        }
    }
}

impl BehaviorOptions {
    /// No pacing and short waits, for tests.
    pub fn fast() -> Self {
        Self {
            pacing: Pacing::none(),
            poll_interval: Duration::from_millis(100),
            max_wait: Duration::from_secs(1),
            element_timeout: Duration::from_secs(1),
            max_scrolls: None,
            scroll_step: 500,
        }
    }
}
