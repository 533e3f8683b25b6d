use super::post::PostHandler;
use super::selectors::*;
use super::{RowWait, Session};
use crate::autoscroll::scroll_page;
use crate::BehaviorState;
use async_stream::try_stream;
use async_trait::async_trait;
use sweep_core::dom::first_child_chain;
use sweep_core::interact::{
    click_with_delay, scroll_into_view_with_delay, wait_for_additional_children, wait_for_predicate,
    WaitForChildren,
};
use sweep_core::progress::{boxed, lock, Progress, ProgressStream};
use sweep_core::traversal::SiblingWalk;
use sweep_core::{traverse, Dom, Selector, TraversalError, TraversalHooks};
use tracing::debug;

const MAX_STORIES: u32 = 100;

/// Rows of the profile grid. The container is two first-child hops below
/// the page's top `article`.
pub(crate) struct UserPageWalk<D> {
    session: Session<D>,
    rows: RowWait,
}

impl<D: Dom> UserPageWalk<D> {
    pub(crate) fn new(session: Session<D>, rows: RowWait) -> Self {
        Self { session, rows }
    }
}

#[async_trait]
impl<D: Dom> TraversalHooks for UserPageWalk<D> {
    type Node = D::Node;
    type State = BehaviorState;

    async fn setup(&self) -> Result<Option<D::Node>, TraversalError> {
        let dom = &*self.session.dom;
        let Some(article) = dom.query(None, &Selector::css(POST_TOP_MOST_CONTAINER)).await? else {
            return Ok(None);
        };
        let rows = first_child_chain(dom, &article, 2).await?;
        if let Some(rows) = &rows {
            if let Some(first) = dom.first_child(rows).await? {
                scroll_into_view_with_delay(dom, &first, self.session.opts.pacing).await;
            }
        }
        Ok(rows)
    }

    fn pre_traversal(&self) -> Option<ProgressStream<'_, BehaviorState>> {
        Some(view_stories_and_load_post_view(self.session.clone()))
    }

    async fn first_child(&self, parent: &D::Node) -> Result<Option<D::Node>, TraversalError> {
        Ok(self.session.dom.first_child(parent).await?)
    }

    async fn next_child(
        &self,
        _parent: &D::Node,
        current: &D::Node,
    ) -> Result<Option<D::Node>, TraversalError> {
        let dom = &*self.session.dom;
        let next = dom.next_sibling(current).await?;
        if let Some(row) = &next {
            scroll_into_view_with_delay(dom, row, self.session.opts.pacing).await;
        }
        Ok(next)
    }

    async fn should_wait(&self, _parent: &D::Node, current: &D::Node) -> Result<bool, TraversalError> {
        Ok(self.session.dom.next_sibling(current).await?.is_none())
    }

    async fn wait(&self, parent: &D::Node, _current: &D::Node) -> Result<bool, TraversalError> {
        let grew = wait_for_additional_children(
            &self.session.dom,
            parent,
            WaitForChildren::bounded(self.rows.max_wait, self.rows.poll_interval),
        )
        .await?;
        debug!(target: "sweep.behavior", grew, "waited for more rows");
        Ok(grew)
    }

    fn handler(&self, row: D::Node) -> ProgressStream<'_, BehaviorState> {
        lock(&self.session.state).incr("rows");
        traverse(SiblingWalk::new(
            self.session.dom.clone(),
            row,
            PostHandler::new(self.session.clone()),
        ))
    }

    fn setup_failure(&self) -> Option<ProgressStream<'_, BehaviorState>> {
        Some(scroll_page(
            self.session.dom.clone(),
            self.session.opts,
            self.session.state.clone(),
        ))
    }

    fn post_traversal(&self, failed: bool) -> Progress<BehaviorState> {
        let msg = if failed {
            "Behavior finished due to failure to find users posts container, reverting to auto scroll"
        } else {
            "Viewed all posts of the user being viewed"
        };
        Progress::no_wait(msg, &self.session.state)
    }

    async fn revalidate(&self, parent: &D::Node, current: &D::Node) -> Result<bool, TraversalError> {
        let dom = &*self.session.dom;
        Ok(dom.is_attached(parent).await? && dom.is_attached(current).await?)
    }
}

/// Wait until the first `article` on the page is no longer `previous`,
/// returning the new one.
async fn article_change<D: Dom>(
    s: &Session<D>,
    previous: Option<D::Node>,
) -> Result<Option<D::Node>, TraversalError> {
    let page = s.dom.clone();
    let before = previous.clone();
    let changed = wait_for_predicate(
        move || {
            let dom = page.clone();
            let before = before.clone();
            async move {
                let now = dom.query(None, &Selector::css(POST_TOP_MOST_CONTAINER)).await?;
                Ok::<_, TraversalError>(now != before)
            }
        },
        s.opts.poll_interval,
        s.opts.element_timeout,
    )
    .await?;
    if !changed {
        debug!(target: "sweep.behavior", "article did not change in time");
    }
    Ok(s.dom.query(None, &Selector::css(POST_TOP_MOST_CONTAINER)).await?)
}

/// View the stories when the profile offers them, then prime the single
/// post view by pointing the history at the first post and back.
fn view_stories_and_load_post_view<D: Dom>(s: Session<D>) -> ProgressStream<'static, BehaviorState> {
    boxed(try_stream! {
        let dom = s.dom.clone();

        let mut control = dom.query(None, &Selector::css(OPEN_STORIES)).await?;
        let mut stories: u32 = 0;
        while let Some(node) = control.take() {
            if stories >= MAX_STORIES {
                break;
            }
            click_with_delay(&*dom, &node, s.opts.pacing).await?;
            stories += 1;
            lock(&s.state).incr("stories");
            yield Progress::no_wait(format!("Viewed story #{stories}"), &s.state);
            control = dom.query(None, &Selector::css(NEXT_STORY)).await?;
        }

        yield Progress::no_wait("Loading single post view", &s.state);
        let initial = dom.query(None, &Selector::css(POST_TOP_MOST_CONTAINER)).await?;
        let mut first_post = None;
        if let Some(article) = &initial {
            if let Some(anchor) = dom.query(Some(article), &Selector::css(POST_ANCHOR)).await? {
                first_post = dom.attribute(&anchor, "href").await?;
            }
        }
        if let Some(href) = first_post {
            let original = dom.current_url().await?;
            dom.replace_history(&href).await?;
            let post_article = article_change(&s, initial).await?;
            dom.replace_history(&original).await?;
            article_change(&s, post_article).await?;
        }
        yield Progress::no_wait("Done loading single post view", &s.state);
    })
}
