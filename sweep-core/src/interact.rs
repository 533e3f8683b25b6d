//! Interaction primitives.
//!
//! Each primitive is one suspension point: act on the document, then pause
//! (see [`Pacing`]) so content triggered by the action can settle.
use crate::delay::Pacing;
use crate::dom::{ChangeObservation, Dom, Selector};
use crate::error::{InteractionError, TraversalError};
use crate::poll::{poll, Guard, MaxWait, PollGuard, SyncGuard};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_ELEMENT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Scroll `node` into view, then pause. Never fails: a node that is already
/// visible, or one the platform refuses to scroll to, is logged and skipped.
pub async fn scroll_into_view_with_delay<D: Dom + ?Sized>(dom: &D, node: &D::Node, pacing: Pacing) {
    if let Err(e) = dom.scroll_into_view(node).await {
        debug!(target: "sweep.interact", error = %e, ?node, "scroll into view failed");
    }
    pacing.pause().await;
}

/// Click `node`, then pause.
pub async fn click_with_delay<D: Dom + ?Sized>(
    dom: &D,
    node: &D::Node,
    pacing: Pacing,
) -> Result<(), InteractionError> {
    let attached = dom
        .is_attached(node)
        .await
        .map_err(|e| InteractionError::from_dom("click", e))?;
    if !attached {
        return Err(InteractionError::StaleNode { action: "click" });
    }
    dom.click(node)
        .await
        .map_err(|e| InteractionError::from_dom("click", e))?;
    pacing.pause().await;
    Ok(())
}

/// Scroll `node` into view and click it, pausing after both steps.
pub async fn scroll_into_view_and_click_with_delay<D: Dom + ?Sized>(
    dom: &D,
    node: &D::Node,
    pacing: Pacing,
) -> Result<(), InteractionError> {
    scroll_into_view_with_delay(dom, node, pacing).await;
    click_with_delay(dom, node, pacing).await
}

/// Click the first descendant of `from` matching `selector`.
///
/// Returns `Ok(false)` when nothing matched.
pub async fn select_from_and_click_with_delay<D: Dom + ?Sized>(
    dom: &D,
    from: &D::Node,
    selector: &Selector,
    pacing: Pacing,
) -> Result<bool, InteractionError> {
    let target = dom
        .query(Some(from), selector)
        .await
        .map_err(|e| InteractionError::from_dom("select", e))?;
    match target {
        Some(target) => {
            click_with_delay(dom, &target, pacing).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Index of the first selector with a match under `scope`.
pub async fn any_selector_exists<D: Dom + ?Sized>(
    dom: &D,
    scope: Option<&D::Node>,
    selectors: &[Selector],
) -> Result<Option<usize>, TraversalError> {
    for (idx, selector) in selectors.iter().enumerate() {
        if dom.query(scope, selector).await?.is_some() {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}

/// Wait up to `timeout` for a descendant of `root` matching `selector`.
///
/// Uses the platform's change observation when available and falls back to
/// polling every `interval` otherwise. `None` means nothing appeared in time.
pub async fn wait_for_element<D: Dom>(
    dom: &Arc<D>,
    root: Option<&D::Node>,
    selector: &Selector,
    timeout: Duration,
    interval: Duration,
) -> Result<Option<D::Node>, TraversalError> {
    match root {
        Some(root) => {
            let deadline = Instant::now() + timeout;
            loop {
                // mutations between this query and the observer attaching go
                // unreported, so every observation window starts with a query
                if let Some(found) = dom.query(Some(root), selector).await? {
                    return Ok(Some(found));
                }
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    debug!(target: "sweep.interact", %selector, "element did not appear in time");
                    return Ok(None);
                }
                match dom.observe_change(root, remaining).await? {
                    ChangeObservation::Changed | ChangeObservation::TimedOut => {}
                    ChangeObservation::Unsupported => break,
                }
            }
        }
        None => {
            if let Some(found) = dom.query(None, selector).await? {
                return Ok(Some(found));
            }
        }
    }

    let guard_dom = dom.clone();
    let guard_root = root.cloned();
    let guard_selector = selector.clone();
    let appeared = poll(PollGuard::bounded(
        move || {
            let dom = guard_dom.clone();
            let root = guard_root.clone();
            let selector = guard_selector.clone();
            async move { Ok::<_, TraversalError>(dom.query(root.as_ref(), &selector).await?.is_some()) }
        },
        interval,
        timeout,
    ))
    .await?;

    if appeared {
        Ok(dom.query(root, selector).await?)
    } else {
        debug!(target: "sweep.interact", %selector, "element did not appear in time");
        Ok(None)
    }
}

/// Poll `guard` every `interval` for at most `timeout`.
pub async fn wait_for_predicate<G: Guard>(
    guard: G,
    interval: Duration,
    timeout: Duration,
) -> Result<bool, TraversalError> {
    poll(PollGuard::bounded(guard, interval, timeout)).await
}

/// Options for [`wait_for_additional_children`].
pub struct WaitForChildren<G> {
    pub max_wait: MaxWait,
    pub poll_interval: Duration,
    /// Extra stop condition, e.g. "the feed reports no more pages".
    pub guard: Option<G>,
}

/// Guard type for waits that only watch the child count.
pub type ChildCountOnly = SyncGuard<fn() -> bool>;

impl WaitForChildren<ChildCountOnly> {
    /// Wait at most `max_wait` for the child count to change.
    pub fn bounded(max_wait: Duration, poll_interval: Duration) -> Self {
        Self {
            max_wait: MaxWait::Bounded(max_wait),
            poll_interval,
            guard: None,
        }
    }
}

/// Resolve `true` once `parent`'s child count differs from the count at call
/// time or the extra guard holds; `false` when the wait runs out.
///
/// An unbounded `max_wait` is only accepted together with an extra guard,
/// which must carry the "no more content" signal.
pub async fn wait_for_additional_children<D, G>(
    dom: &Arc<D>,
    parent: &D::Node,
    opts: WaitForChildren<G>,
) -> Result<bool, TraversalError>
where
    D: Dom,
    G: Guard,
{
    let before = dom.child_count(parent).await?;
    let has_signal = opts.guard.is_some();
    let guard = ChildCountGuard {
        dom: dom.clone(),
        parent: parent.clone(),
        before,
        extra: opts.guard,
    };
    let guard = match opts.max_wait {
        MaxWait::Bounded(max) => PollGuard::bounded(guard, opts.poll_interval, max),
        MaxWait::Unbounded if has_signal => {
            PollGuard::unbounded_with_signal(guard, opts.poll_interval)
        }
        // rejected by the poller: nothing would ever end this wait
        MaxWait::Unbounded => PollGuard::new(guard, opts.poll_interval, MaxWait::Unbounded),
    };
    poll(guard).await
}

struct ChildCountGuard<D: Dom, G> {
    dom: Arc<D>,
    parent: D::Node,
    before: usize,
    extra: Option<G>,
}

#[async_trait::async_trait]
impl<D: Dom, G: Guard> Guard for ChildCountGuard<D, G> {
    async fn check(&mut self) -> Result<bool, TraversalError> {
        if self.dom.child_count(&self.parent).await? != self.before {
            return Ok(true);
        }
        match self.extra.as_mut() {
            Some(extra) => extra.check().await,
            None => Ok(false),
        }
    }
}
