//! Instagram user pages.
//!
//! The profile grid is a list of rows, each holding a few posts, and more
//! rows are appended as the page scrolls. Rows are walked with the engine's
//! wait-for-more loop; the posts of each row are a nested [`SiblingWalk`].
//!
//! [`SiblingWalk`]: sweep_core::traversal::SiblingWalk
use crate::{Behavior, BehaviorError, BehaviorMetadata, BehaviorOptions, BehaviorState};
use std::sync::Arc;
use std::time::Duration;
use sweep_core::progress::{shared, ProgressStream, Shared};
use sweep_core::{traverse, Dom, Selector};

mod post;
pub mod selectors;
mod user;

use user::UserPageWalk;

/// How often the row container is re-checked while waiting for more rows.
pub const ROW_POLL_INTERVAL: Duration = Duration::from_millis(2_500);

/// Wait applied once the last loaded row has been viewed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWait {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

/// Views a user's stories, then every post with its comments and replies.
pub struct InstagramUser {
    metadata: BehaviorMetadata,
    opts: BehaviorOptions,
    rows: RowWait,
}

impl InstagramUser {
    pub const NAME: &'static str = "instagramUserBehavior";

    pub fn new(opts: BehaviorOptions) -> Result<Self, BehaviorError> {
        Ok(Self {
            metadata: BehaviorMetadata::new(
                Self::NAME,
                "Instagram User Page",
                r"^https?://(www\.)?instagram\.com/[^/]+(?:/(?:[?].+)?(?:tagged(?:/)?)?)?$",
                "Capture all stories, images, videos and comments on user’s page.",
                "2019-10-11T17:08:12-04:00",
            )?,
            opts,
            rows: RowWait {
                poll_interval: ROW_POLL_INTERVAL,
                max_wait: opts.max_wait,
            },
        })
    }

    pub fn with_row_wait(mut self, rows: RowWait) -> Self {
        self.rows = rows;
        self
    }
}

impl<D: Dom> Behavior<D> for InstagramUser {
    fn metadata(&self) -> &BehaviorMetadata {
        &self.metadata
    }

    fn run(&self, dom: Arc<D>) -> ProgressStream<'static, BehaviorState> {
        let session = Session {
            dom,
            opts: self.opts,
            state: shared(BehaviorState::new()),
        };
        traverse(UserPageWalk::new(session, self.rows))
    }
}

/// Everything one run shares between its hooks and nested walks.
pub(crate) struct Session<D> {
    pub dom: Arc<D>,
    pub opts: BehaviorOptions,
    pub state: Shared<BehaviorState>,
}

impl<D> Clone for Session<D> {
    fn clone(&self) -> Self {
        Self {
            dom: self.dom.clone(),
            opts: self.opts,
            state: self.state.clone(),
        }
    }
}

pub(crate) fn css_all(selectors: &[&str]) -> Vec<Selector> {
    selectors.iter().map(|s| Selector::css(*s)).collect()
}

/// Short id of a post from its link (`/p/<id>/`), or the link itself.
pub(crate) fn post_id(href: &str) -> String {
    let mut segments = href.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment == "p" {
            if let Some(id) = segments.next() {
                return id.to_string();
            }
        }
    }
    href.to_string()
}
