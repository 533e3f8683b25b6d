use super::selectors::*;
use super::{css_all, post_id, Session};
use crate::BehaviorState;
use async_stream::try_stream;
use futures::StreamExt;
use sweep_core::delay::Pacing;
use sweep_core::dom::{query_any, text_contains, DomError, DomResult};
use sweep_core::interact::{
    any_selector_exists, click_with_delay, scroll_into_view_and_click_with_delay,
    scroll_into_view_with_delay, wait_for_element,
};
use sweep_core::progress::{boxed, lock, Progress, ProgressStream, Shared};
use sweep_core::traversal::ChildHandler;
use sweep_core::{Dom, Selector, TraversalError};
use tracing::warn;

const MAX_CAROUSEL_IMAGES: u32 = 30;
const MAX_COMMENT_PAGES: u32 = 200;
const MAX_REPLY_PAGES: u32 = 50;

/// Opens and views each post of one grid row.
pub(crate) struct PostHandler<D> {
    session: Session<D>,
}

impl<D> PostHandler<D> {
    pub(crate) fn new(session: Session<D>) -> Self {
        Self { session }
    }
}

impl<D: Dom> ChildHandler<D::Node> for PostHandler<D> {
    type State = BehaviorState;

    fn handle(&self, post: D::Node) -> ProgressStream<'_, BehaviorState> {
        isolate(
            view_post(self.session.clone(), post),
            self.session.state.clone(),
        )
    }

    fn finished(&self, _failed: bool) -> Progress<BehaviorState> {
        Progress::no_wait("Viewed all posts in row", &self.session.state)
    }
}

/// Turn the first error of `inner` into a progress message so one broken
/// post does not end the whole walk.
fn isolate(
    mut inner: ProgressStream<'static, BehaviorState>,
    state: Shared<BehaviorState>,
) -> ProgressStream<'static, BehaviorState> {
    boxed(try_stream! {
        while let Some(item) = inner.next().await {
            match item {
                Ok(p) => {
                    yield p;
                }
                Err(e) => {
                    yield post_failed(&state, &e);
                    break;
                }
            }
        }
    })
}

fn post_failed(state: &Shared<BehaviorState>, e: &TraversalError) -> Progress<BehaviorState> {
    warn!(target: "sweep.behavior", error = %e, "post failed");
    lock(state).incr("failed_posts");
    Progress::no_wait(format!("Failed to view post: {e}"), state)
}

async fn post_anchor<D: Dom>(dom: &D, post: &D::Node) -> DomResult<Option<D::Node>> {
    if let Some(first) = dom.first_child(post).await? {
        if dom.tag_name(&first).await? == POST_ANCHOR {
            return Ok(Some(first));
        }
        return dom.query(Some(&first), &Selector::css(POST_ANCHOR)).await;
    }
    Ok(None)
}

/// The dialog nested in `popup`, or `popup` itself.
async fn inner_dialog<D: Dom>(dom: &D, popup: &D::Node) -> DomResult<D::Node> {
    Ok(dom
        .query(Some(popup), &Selector::css(DIV_DIALOG))
        .await?
        .unwrap_or_else(|| popup.clone()))
}

/// Click the dialog's close button: the inner dialog's next sibling when
/// that is a button, otherwise one of the known fallbacks.
async fn close_dialog<D: Dom>(dom: &D, popup: &D::Node, pacing: Pacing) -> Result<(), TraversalError> {
    let inner = inner_dialog(dom, popup).await?;
    let mut close = None;
    if let Some(sibling) = dom.next_sibling(&inner).await? {
        if dom.tag_name(&sibling).await? == "button" {
            close = Some(sibling);
        }
    }
    if close.is_none() {
        let fallbacks: Vec<Selector> = POST_POPUP_CLOSE.iter().map(|x| Selector::xpath(*x)).collect();
        close = query_any(dom, None, &fallbacks).await?;
    }
    match close {
        Some(button) => click_with_delay(dom, &button, pacing).await?,
        None => warn!(target: "sweep.behavior", "no close control for post dialog"),
    }
    Ok(())
}

fn view_post<D: Dom>(s: Session<D>, post: D::Node) -> ProgressStream<'static, BehaviorState> {
    boxed(try_stream! {
        let dom = s.dom.clone();
        let pacing = s.opts.pacing;
        'post: {
            let Some(anchor) = post_anchor(&*dom, &post).await? else {
                yield Progress::no_wait("Encountered a non-post", &s.state);
                break 'post;
            };
            let href = dom.attribute(&anchor, "href").await?.unwrap_or_default();
            let id = post_id(&href);

            click_with_delay(&*dom, &anchor, pacing).await?;
            let body = dom.query(None, &Selector::css("body")).await?;
            let popup = wait_for_element(
                &dom,
                body.as_ref(),
                &Selector::css(DIV_DIALOG),
                s.opts.element_timeout,
                s.opts.poll_interval,
            )
            .await?;
            let Some(popup) = popup else {
                yield Progress::no_wait(format!("Failed to open {id} for viewing"), &s.state);
                break 'post;
            };
            yield Progress::no_wait(format!("Viewing post {id}"), &s.state);

            // the dialog is closed whatever happens while viewing it
            let mut failure = None;
            let mut contents = view_contents(s.clone(), post.clone(), popup.clone(), id.clone());
            while let Some(item) = contents.next().await {
                match item {
                    Ok(p) => {
                        yield p;
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            if let Err(e) = close_dialog(&*dom, &popup, pacing).await {
                warn!(target: "sweep.behavior", error = %e, post = %id, "closing post dialog failed");
                if failure.is_none() {
                    failure = Some(e);
                }
            }

            if let Some(e) = failure {
                yield post_failed(&s.state, &e);
                break 'post;
            }
            lock(&s.state).incr("posts");
            yield Progress::no_wait(format!("Viewed post {id}"), &s.state);
        }
    })
}

/// Media, then comments, of the post shown in `popup`.
fn view_contents<D: Dom>(
    s: Session<D>,
    post: D::Node,
    popup: D::Node,
    id: String,
) -> ProgressStream<'static, BehaviorState> {
    boxed(try_stream! {
        let dom = s.dom.clone();
        let inner = inner_dialog(&*dom, &popup).await?;
        if let Some(content) = dom.query(Some(&inner), &Selector::css(POST_TOP_MOST_CONTAINER)).await? {
            let mut media = view_media(s.clone(), post, content.clone(), id.clone());
            while let Some(item) = media.next().await {
                match item {
                    Ok(p) => {
                        yield p;
                    }
                    Err(e) => {
                        warn!(target: "sweep.behavior", error = %e, post = %id, "viewing post media failed");
                        yield Progress::no_wait(
                            format!("An error occurred while viewing the contents of the post ({id})"),
                            &s.state,
                        );
                        break;
                    }
                }
            }

            if let Some(list) = dom.query(Some(&content), &Selector::css(COMMENT_LIST)).await? {
                let mut comments = view_comments(s.clone(), list);
                while let Some(p) = comments.next().await {
                    yield p?;
                }
            }
        }
    })
}

/// Step through carousel images or start a video, depending on the
/// badge shown on the post's thumbnail.
fn view_media<D: Dom>(
    s: Session<D>,
    post: D::Node,
    content: D::Node,
    id: String,
) -> ProgressStream<'static, BehaviorState> {
    boxed(try_stream! {
        let dom = s.dom.clone();
        if any_selector_exists(&*dom, Some(&post), &css_all(MULTI_IMAGE_THUMBNAIL)).await?.is_some() {
            let next_image = css_all(NEXT_IMAGE);
            let mut viewed: u32 = 1;
            while viewed < MAX_CAROUSEL_IMAGES {
                let Some(chevron) = query_any(&*dom, Some(&content), &next_image).await? else {
                    break;
                };
                click_with_delay(&*dom, &chevron, s.opts.pacing).await?;
                viewed += 1;
                lock(&s.state).incr("images");
                yield Progress::no_wait(format!("Viewed image {viewed} of post {id}"), &s.state);
            }
        } else if any_selector_exists(&*dom, Some(&post), &css_all(VIDEO_THUMBNAIL)).await?.is_some() {
            if let Some(play) = query_any(&*dom, Some(&content), &css_all(PLAY_VIDEO)).await? {
                click_with_delay(&*dom, &play, s.opts.pacing).await?;
                lock(&s.state).incr("videos");
                yield Progress::no_wait(format!("Played video of post {id}"), &s.state);
            }
        }
    })
}

/// Load every page of comments, then view each comment and expand its replies.
fn view_comments<D: Dom>(s: Session<D>, list: D::Node) -> ProgressStream<'static, BehaviorState> {
    boxed(try_stream! {
        let dom = s.dom.clone();
        let pacing = s.opts.pacing;

        let more = Selector::css(MORE_COMMENTS);
        let mut pages: u32 = 0;
        while let Some(span) = dom.query(Some(&list), &more).await? {
            if !dom.is_attached(&span).await? || pages >= MAX_COMMENT_PAGES {
                break;
            }
            scroll_into_view_and_click_with_delay(&*dom, &span, pacing).await?;
            pages += 1;
            yield Progress::no_wait(format!("Loaded additional comments #{pages} times"), &s.state);
        }
        yield Progress::no_wait("All comments loaded", &s.state);

        let caption = Selector::css(POSTERS_OWN_COMMENT);
        let replies = Selector::css(MORE_REPLIES);
        let mut caption_seen = false;
        let mut viewed: u64 = 0;
        let mut cursor = dom.first_child(&list).await?;
        while let Some(comment) = cursor {
            if !caption_seen && dom.matches(&comment, &caption).await? {
                caption_seen = true;
                scroll_into_view_with_delay(&*dom, &comment, Pacing::none()).await;
                yield Progress::no_wait("Viewed poster's own comment", &s.state);
            } else {
                viewed += 1;
                lock(&s.state).incr("comments");
                yield Progress::no_wait(format!("Viewed comment {viewed}"), &s.state);

                let mut toggle = dom.query(Some(&comment), &replies).await?;
                if let Some(span) = &toggle {
                    if says_hide(&*dom, span).await? {
                        toggle = None;
                    }
                }
                let mut loaded: u32 = 0;
                while let Some(span) = toggle.take() {
                    if !dom.is_attached(&span).await? || loaded >= MAX_REPLY_PAGES {
                        break;
                    }
                    scroll_into_view_and_click_with_delay(&*dom, &span, pacing).await?;
                    if says_hide(&*dom, &span).await? {
                        break;
                    }
                    loaded += 1;
                    lock(&s.state).incr("replies");
                    yield Progress::no_wait(
                        format!("Clicked loaded more replies for comment {viewed} (#{loaded} times)"),
                        &s.state,
                    );
                    toggle = dom.query(Some(&comment), &replies).await?;
                }
            }
            cursor = dom.next_sibling(&comment).await?;
        }
    })
}

/// Whether a reply toggle now offers to hide the replies. A toggle that was
/// re-rendered by its own click is read as "not yet".
async fn says_hide<D: Dom>(dom: &D, toggle: &D::Node) -> DomResult<bool> {
    match text_contains(dom, toggle, "hide").await {
        Err(DomError::StaleNode) => Ok(false),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweep_core::progress::shared;

    #[tokio::test]
    async fn isolate_reports_the_first_error_and_stops() {
        let state = shared(BehaviorState::default());
        let inner: ProgressStream<'static, BehaviorState> = Box::pin(futures::stream::iter(vec![
            Ok(Progress::no_wait("Viewing post P1", &state)),
            Err(TraversalError::Dom(DomError::StaleNode)),
            Ok(Progress::no_wait("never seen", &state)),
        ]));

        let messages: Vec<String> = isolate(inner, state.clone())
            .map(|p| p.unwrap().message)
            .collect()
            .await;

        assert_eq!(
            messages,
            vec![
                "Viewing post P1".to_string(),
                "Failed to view post: dom error: node is no longer attached to the document".to_string(),
            ]
        );
        assert_eq!(lock(&state).get("failed_posts"), 1);
    }
}
