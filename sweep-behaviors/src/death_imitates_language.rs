use crate::{Behavior, BehaviorError, BehaviorMetadata, BehaviorOptions, BehaviorState};
use async_stream::try_stream;
use async_trait::async_trait;
use std::sync::Arc;
use sweep_core::dom::{Dom, Selector};
use sweep_core::interact::{scroll_into_view_with_delay, select_from_and_click_with_delay};
use sweep_core::progress::{boxed, lock, shared, Progress, ProgressStream, Shared};
use sweep_core::{traverse, TraversalError, TraversalHooks};
use tracing::warn;

const MORE_INFO_BUTTON: &str = "button.btn.btn-more-info";

/// Views every item of the deathimitateslanguage gallery, opening each
/// item's "more info" panel.
pub struct DeathImitatesLanguage {
    metadata: BehaviorMetadata,
    opts: BehaviorOptions,
}

impl DeathImitatesLanguage {
    pub const NAME: &'static str = "deathImitatesLanguageBehavior";

    pub fn new(opts: BehaviorOptions) -> Result<Self, BehaviorError> {
        Ok(Self {
            metadata: BehaviorMetadata::new(
                Self::NAME,
                "Death Imitates Language",
                r"^(?:https?://(?:www\.)?)?deathimitateslanguage\.harmvandendorpel\.com/?$",
                "Views all items on the page.",
                "2019-06-06T12:55:43",
            )?,
            opts,
        })
    }
}

impl<D: Dom> Behavior<D> for DeathImitatesLanguage {
    fn metadata(&self) -> &BehaviorMetadata {
        &self.metadata
    }

    fn run(&self, dom: Arc<D>) -> ProgressStream<'static, BehaviorState> {
        traverse(ItemWalk {
            dom,
            opts: self.opts,
            state: shared(BehaviorState::new()),
        })
    }
}

/// The items are the children of the first element under `body`.
struct ItemWalk<D> {
    dom: Arc<D>,
    opts: BehaviorOptions,
    state: Shared<BehaviorState>,
}

#[async_trait]
impl<D: Dom> TraversalHooks for ItemWalk<D> {
    type Node = D::Node;
    type State = BehaviorState;

    async fn setup(&self) -> Result<Option<D::Node>, TraversalError> {
        let Some(body) = self.dom.query(None, &Selector::css("body")).await? else {
            return Ok(None);
        };
        Ok(self.dom.first_child(&body).await?)
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

    fn handler(&self, item: D::Node) -> ProgressStream<'_, BehaviorState> {
        boxed(try_stream! {
            let dom = &*self.dom;
            scroll_into_view_with_delay(dom, &item, self.opts.pacing).await;
            let more_info = Selector::css(MORE_INFO_BUTTON);
            match select_from_and_click_with_delay(dom, &item, &more_info, self.opts.pacing).await {
                Ok(_) => {
                    lock(&self.state).incr("items");
                    yield Progress::no_wait("Viewed item", &self.state);
                }
                Err(e) => {
                    warn!(target: "sweep.behavior", error = %e, ?item, "item vanished while viewing");
                    yield Progress::no_wait(format!("Could not view item: {e}"), &self.state);
                }
            }
        })
    }

    fn post_traversal(&self, _failed: bool) -> Progress<BehaviorState> {
        Progress::no_wait("Behavior done", &self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use sweep_core::test_utils::FakeDom;

    fn gallery(items: usize) -> (Arc<FakeDom>, Vec<usize>) {
        let dom = Arc::new(FakeDom::new());
        let root = dom.append(dom.body(), "div.gallery");
        let buttons = (0..items)
            .map(|_| {
                let item = dom.append(root, "div.item");
                dom.append(item, "button.btn.btn-more-info")
            })
            .collect();
        (dom, buttons)
    }

    #[tokio::test(start_paused = true)]
    async fn views_every_item_and_opens_its_info() {
        let (dom, buttons) = gallery(3);
        let behavior = DeathImitatesLanguage::new(BehaviorOptions::fast()).unwrap();
        let values: Vec<_> = behavior.run(dom.clone()).map(|p| p.unwrap()).collect().await;

        let messages: Vec<&str> = values.iter().map(|p| p.message.as_str()).collect();
        assert_eq!(messages, vec!["Viewed item", "Viewed item", "Viewed item", "Behavior done"]);
        assert!(buttons.iter().all(|b| dom.clicks(*b) == 1));
        assert_eq!(values[3].snapshot().unwrap().get("items"), 3);
        assert!(values[0].shares_state_with(&values[3]));
    }

    #[tokio::test(start_paused = true)]
    async fn items_without_a_button_still_count() {
        let dom = Arc::new(FakeDom::new());
        let root = dom.append(dom.body(), "div");
        dom.append(root, "div");
        let behavior = DeathImitatesLanguage::new(BehaviorOptions::fast()).unwrap();
        let last = behavior.run(dom).map(|p| p.unwrap()).collect::<Vec<_>>().await.pop().unwrap();
        assert_eq!(last.snapshot().unwrap().get("items"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_body_finishes_immediately() {
        let dom = Arc::new(FakeDom::new());
        let behavior = DeathImitatesLanguage::new(BehaviorOptions::fast()).unwrap();
        let messages: Vec<String> = behavior.run(dom).map(|p| p.unwrap().message).collect().await;
        assert_eq!(messages, vec!["Behavior done"]);
    }

    #[test]
    fn matches_the_gallery_host_only() {
        let behavior = DeathImitatesLanguage::new(BehaviorOptions::fast()).unwrap();
        let meta = &behavior.metadata;
        assert!(meta.matches("https://deathimitateslanguage.harmvandendorpel.com/"));
        assert!(meta.matches("deathimitateslanguage.harmvandendorpel.com"));
        assert!(!meta.matches("https://deathimitateslanguage.harmvandendorpel.com/about"));
    }
}
