use crate::{Behavior, BehaviorError, BehaviorMetadata, BehaviorOptions, BehaviorState};
use async_stream::try_stream;
use std::sync::Arc;
use sweep_core::interact::wait_for_predicate;
use sweep_core::progress::{boxed, lock, shared, Progress, ProgressStream, Shared};
use sweep_core::{Dom, TraversalError};
use tracing::debug;

/// Scrolls the window step by step until the page stops growing.
///
/// When the bottom is reached the page gets up to `max_wait` to load more
/// content before the run ends. Also used as the fallback when a site
/// behavior cannot find what it expects.
pub struct AutoScroll {
    metadata: BehaviorMetadata,
    opts: BehaviorOptions,
}

impl AutoScroll {
    pub const NAME: &'static str = "autoscroll";

    pub fn new(opts: BehaviorOptions) -> Result<Self, BehaviorError> {
        Ok(Self {
            metadata: BehaviorMetadata::new(
                Self::NAME,
                "Auto Scroll",
                r"^https?://",
                "Scroll the page until no more content is loaded.",
                "2019-10-11T17:08:12-04:00",
            )?,
            opts,
        })
    }
}

/// Scroll `dom`, counting into `state`.
pub fn scroll_page<D: Dom>(
    dom: Arc<D>,
    opts: BehaviorOptions,
    state: Shared<BehaviorState>,
) -> ProgressStream<'static, BehaviorState> {
    boxed(try_stream! {
        let mut scrolls: u32 = 0;
        loop {
            if opts.max_scrolls.is_some_and(|max| scrolls >= max) {
                debug!(target: "sweep.behavior", scrolls, "scroll limit reached");
                break;
            }
            if !dom.can_scroll_down().await? {
                let page = dom.clone();
                let grew = wait_for_predicate(
                    move || {
                        let dom = page.clone();
                        async move { Ok::<_, TraversalError>(dom.can_scroll_down().await?) }
                    },
                    opts.poll_interval,
                    opts.max_wait,
                )
                .await?;
                if !grew {
                    break;
                }
            }
            dom.scroll_by(opts.scroll_step).await?;
            scrolls += 1;
            lock(&state).incr("scrolls");
            yield Progress::no_wait(format!("Scrolled page #{scrolls}"), &state);
            opts.pacing.pause().await;
        }
        yield Progress::no_wait("Auto scroll finished", &state);
    })
}

impl<D: Dom> Behavior<D> for AutoScroll {
    fn metadata(&self) -> &BehaviorMetadata {
        &self.metadata
    }

    fn run(&self, dom: Arc<D>) -> ProgressStream<'static, BehaviorState> {
        scroll_page(dom, self.opts, shared(BehaviorState::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;
    use sweep_core::test_utils::FakeDom;

    #[tokio::test(start_paused = true)]
    async fn scrolls_to_the_bottom_then_stops() {
        let dom = Arc::new(FakeDom::new());
        dom.set_page_height(2_300);
        let behavior = AutoScroll::new(BehaviorOptions::fast()).unwrap();
        let values: Vec<_> = behavior.run(dom.clone()).map(|p| p.unwrap()).collect().await;

        // 800px viewport over 2300px: three 500px steps reach the bottom
        assert_eq!(values.len(), 4);
        assert_eq!(values[2].message, "Scrolled page #3");
        assert_eq!(values[3].message, "Auto scroll finished");
        assert_eq!(values[3].snapshot().unwrap().get("scrolls"), 3);
        assert_eq!(dom.scroll_y(), 1_500);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_the_page_to_grow() {
        let dom = Arc::new(FakeDom::new());
        dom.set_page_height(1_300);
        let grower = dom.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            grower.set_page_height(1_800);
        });
        let opts = BehaviorOptions {
            max_wait: Duration::from_secs(2),
            ..BehaviorOptions::fast()
        };
        let scrolls = scroll_page(dom.clone(), opts, shared(BehaviorState::new()))
            .filter(|p| futures::future::ready(p.as_ref().is_ok_and(|p| p.message.starts_with("Scrolled"))))
            .count()
            .await;
        assert_eq!(scrolls, 2);
        assert_eq!(dom.scroll_y(), 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn respects_the_scroll_limit() {
        let dom = Arc::new(FakeDom::new());
        dom.set_page_height(100_000);
        let opts = BehaviorOptions {
            max_scrolls: Some(2),
            ..BehaviorOptions::fast()
        };
        let behavior = AutoScroll::new(opts).unwrap();
        let messages: Vec<String> = behavior.run(dom).map(|p| p.unwrap().message).collect().await;
        assert_eq!(messages, vec!["Scrolled page #1", "Scrolled page #2", "Auto scroll finished"]);
    }

    #[test]
    fn matches_any_web_page() {
        let behavior = AutoScroll::new(BehaviorOptions::fast()).unwrap();
        assert!(behavior.metadata.matches("https://example.com/anything"));
        assert!(!behavior.metadata.matches("file:///tmp/x.html"));
    }
}
