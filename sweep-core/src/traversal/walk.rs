use super::TraversalHooks;
use crate::dom::Dom;
use crate::error::TraversalError;
use crate::progress::{Progress, ProgressStream};
use async_trait::async_trait;
use std::sync::Arc;

/// Per-child work for a [`SiblingWalk`].
pub trait ChildHandler<N>: Send + Sync {
    type State: Send + 'static;

    fn handle(&self, child: N) -> ProgressStream<'_, Self::State>;

    fn finished(&self, failed: bool) -> Progress<Self::State>;
}

/// Visits every element child of a known parent, first child to last
/// sibling, without ever waiting for more. Used for nested walks, e.g. the
/// posts inside one row of a feed.
pub struct SiblingWalk<D: Dom, H> {
    dom: Arc<D>,
    parent: D::Node,
    handler: H,
}

impl<D: Dom, H> SiblingWalk<D, H> {
    pub fn new(dom: Arc<D>, parent: D::Node, handler: H) -> Self {
        Self {
            dom,
            parent,
            handler,
        }
    }
}

#[async_trait]
impl<D, H> TraversalHooks for SiblingWalk<D, H>
where
    D: Dom,
    H: ChildHandler<D::Node>,
{
    type Node = D::Node;
    type State = H::State;

    async fn setup(&self) -> Result<Option<D::Node>, TraversalError> {
        Ok(Some(self.parent.clone()))
    }

    async fn first_child(&self, parent: &D::Node) -> Result<Option<D::Node>, TraversalError> {
        Ok(self.dom.first_child(parent).await?)
    }

    async fn next_child(
        &self,
        _parent: &D::Node,
        current: &D::Node,
    ) -> Result<Option<D::Node>, TraversalError> {
        Ok(self.dom.next_sibling(current).await?)
    }

    async fn should_wait(&self, _parent: &D::Node, _current: &D::Node) -> Result<bool, TraversalError> {
        Ok(false)
    }

    async fn wait(&self, _parent: &D::Node, _current: &D::Node) -> Result<bool, TraversalError> {
        Ok(false)
    }

    fn handler(&self, child: D::Node) -> ProgressStream<'_, H::State> {
        self.handler.handle(child)
    }

    fn post_traversal(&self, failed: bool) -> Progress<H::State> {
        self.handler.finished(failed)
    }
}
