use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use sweep_behaviors::instagram::RowWait;
use sweep_behaviors::{Behavior, BehaviorOptions, BehaviorState, InstagramUser};
use sweep_core::test_utils::FakeDom;
use sweep_core::{Dom, Progress, Selector};

/// What clicking a comment's reply toggle does.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Replies {
    #[default]
    None,
    /// Loads one reply, then reads "Hide replies".
    Toggle,
    /// Loads one reply and re-renders the toggle away.
    RerenderedToggle,
    /// Re-renders the whole comment.
    RerenderedComment,
}

#[derive(Debug, Clone, Copy, Default)]
struct Post {
    carousel: bool,
    video: bool,
    more_comments: bool,
    replies: Replies,
    opens: bool,
}

impl Post {
    fn plain() -> Self {
        Self {
            opens: true,
            ..Self::default()
        }
    }
}

struct Profile {
    dom: Arc<FakeDom>,
    rows: usize,
    stories: usize,
}

/// body > stories control, article > div > div (rows) > div.row > div.post > a
fn profile() -> Profile {
    let dom = Arc::new(FakeDom::new());
    let stories = dom.append(dom.body(), "div");
    dom.set_attr(stories, "aria-label", "Open Stories");
    dom.on_click(stories, |dom| {
        let next = dom.append(dom.body(), "div.storiesRightChevron");
        dom.on_click(next, move |dom| {
            if dom.clicks(next) >= 2 {
                dom.remove(next);
            }
        });
    });

    let article = dom.append(dom.body(), "article");
    let wrapper = dom.append(article, "div");
    let rows = dom.append(wrapper, "div");

    // the single post view swaps the page's article out and back
    let single = dom.append(dom.body(), "article");
    dom.remove(single);
    dom.on_navigate(move |dom, url| {
        if url.contains("/p/") {
            dom.remove(article);
            dom.reattach(dom.body(), single);
        } else {
            dom.remove(single);
            dom.reattach(dom.body(), article);
        }
    });
    Profile { dom, rows, stories }
}

fn add_row(dom: &FakeDom, rows: usize, posts: &[(&str, Post)]) -> usize {
    let row = dom.append(rows, "div.row");
    for (id, post) in posts {
        add_post(dom, row, id, *post);
    }
    row
}

fn add_post(dom: &FakeDom, row: usize, id: &str, post: Post) {
    let cell = dom.append(row, "div.post");
    let anchor = dom.append(cell, "a");
    dom.set_attr(anchor, "href", &format!("/p/{id}/"));
    if post.carousel {
        dom.append(anchor, "span.coreSpriteSidecarIconLarge");
    }
    if post.video {
        dom.append(anchor, "span.coreSpriteVideoIconLarge");
    }
    if post.opens {
        dom.on_click(anchor, move |dom| open_dialog(dom, post));
    }
}

fn open_dialog(dom: &FakeDom, post: Post) {
    let outer = dom.append(dom.body(), "div");
    dom.set_attr(outer, "role", "dialog");
    let inner = dom.append(outer, "div");
    dom.set_attr(inner, "role", "dialog");
    let close = dom.append(outer, "button");
    dom.on_click(close, move |dom| dom.remove(outer));

    let article = dom.append(inner, "article");
    if post.carousel {
        let next = dom.append(article, "div.coreSpriteRightChevron");
        dom.on_click(next, move |dom| {
            if dom.clicks(next) >= 2 {
                dom.remove(next);
            }
        });
    }
    if post.video {
        dom.append(article, "span.videoSpritePlayButton");
    }

    let list = dom.append(article, "ul");
    let caption = dom.append(list, "li");
    dom.set_attr(caption, "role", "menuitem");
    dom.append(list, "li");
    if post.replies != Replies::None {
        let comment = dom.append(list, "li");
        let holder = dom.append(comment, "div");
        let button = dom.append(holder, "button");
        dom.set_attr(button, "type", "button");
        let toggle = dom.append(button, "span");
        dom.set_text(toggle, "View replies (1)");
        let kind = post.replies;
        dom.on_click(toggle, move |dom| match kind {
            Replies::Toggle if dom.clicks(toggle) >= 2 => dom.set_text(toggle, "Hide replies"),
            Replies::RerenderedComment => dom.remove(comment),
            _ => {
                if kind == Replies::RerenderedToggle {
                    dom.remove(button);
                }
                let replies = dom.append(comment, "ul");
                dom.append(replies, "li");
            }
        });
    }
    if post.more_comments {
        let loader = dom.append(list, "li");
        let span = dom.append(loader, "span");
        dom.set_attr(span, "aria-label", "Load more comments");
        dom.on_click(span, move |dom| {
            dom.remove(loader);
            dom.append(list, "li");
        });
    }
}

fn behavior() -> InstagramUser {
    InstagramUser::new(BehaviorOptions::fast())
        .unwrap()
        .with_row_wait(RowWait {
            poll_interval: Duration::from_millis(100),
            max_wait: Duration::from_secs(1),
        })
}

async fn open_dialogs(dom: &FakeDom) -> usize {
    dom.query_all(None, &Selector::css(r#"div[role="dialog"]"#))
        .await
        .unwrap()
        .len()
}

/// Messages after the single post view is primed.
fn row_messages<'a>(messages: &[&'a str]) -> Vec<&'a str> {
    let start = messages
        .iter()
        .position(|m| *m == "Done loading single post view")
        .unwrap();
    messages[start + 1..].to_vec()
}

fn messages(values: &[Progress<BehaviorState>]) -> Vec<&str> {
    values.iter().map(|p| p.message.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn views_stories_posts_and_late_rows() {
    let page = profile();
    let dom = page.dom.clone();
    add_row(
        &dom,
        page.rows,
        &[
            (
                "P1",
                Post {
                    carousel: true,
                    more_comments: true,
                    replies: Replies::Toggle,
                    ..Post::plain()
                },
            ),
            ("P2", Post::plain()),
        ],
    );
    let late = dom.clone();
    let rows = page.rows;
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        add_row(
            &late,
            rows,
            &[(
                "P3",
                Post {
                    video: true,
                    ..Post::plain()
                },
            )],
        );
    });

    let values: Vec<_> = behavior().run(dom.clone()).map(|p| p.unwrap()).collect().await;

    assert_eq!(
        messages(&values),
        vec![
            "Viewed story #1",
            "Viewed story #2",
            "Viewed story #3",
            "Loading single post view",
            "Done loading single post view",
            "Viewing post P1",
            "Viewed image 2 of post P1",
            "Viewed image 3 of post P1",
            "Loaded additional comments #1 times",
            "All comments loaded",
            "Viewed poster's own comment",
            "Viewed comment 1",
            "Viewed comment 2",
            "Clicked loaded more replies for comment 2 (#1 times)",
            "Viewed comment 3",
            "Viewed post P1",
            "Viewing post P2",
            "All comments loaded",
            "Viewed poster's own comment",
            "Viewed comment 1",
            "Viewed post P2",
            "Viewed all posts in row",
            "Viewing post P3",
            "Played video of post P3",
            "All comments loaded",
            "Viewed poster's own comment",
            "Viewed comment 1",
            "Viewed post P3",
            "Viewed all posts in row",
            "Viewed all posts of the user being viewed",
        ]
    );

    let last = values.last().unwrap();
    assert!(last.timed_out);
    assert!(values.iter().all(|p| p.shares_state_with(last)));
    let state = last.snapshot().unwrap();
    assert_eq!(state.get("stories"), 3);
    assert_eq!(state.get("rows"), 2);
    assert_eq!(state.get("posts"), 3);
    assert_eq!(state.get("images"), 2);
    assert_eq!(state.get("videos"), 1);
    assert_eq!(state.get("comments"), 5);
    assert_eq!(state.get("replies"), 1);

    assert_eq!(dom.clicks(page.stories), 1);
    assert_eq!(dom.history(), vec!["/p/P1/".to_string(), "https://example.test/".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn odd_cells_do_not_stop_the_row() {
    let page = profile();
    let dom = page.dom.clone();
    let row = add_row(&dom, page.rows, &[("P1", Post::default())]);
    dom.append(row, "div.post");
    add_post(&dom, row, "P2", Post::plain());

    let values: Vec<_> = behavior().run(dom.clone()).map(|p| p.unwrap()).collect().await;
    let messages = messages(&values);

    let row_start = messages.iter().position(|m| *m == "Done loading single post view").unwrap() + 1;
    assert_eq!(
        &messages[row_start..row_start + 3],
        &["Failed to open P1 for viewing", "Encountered a non-post", "Viewing post P2"]
    );
    assert!(messages.contains(&"Viewed post P2"));
    assert_eq!(values.last().unwrap().snapshot().unwrap().get("posts"), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_grid_falls_back_to_scrolling() {
    let dom = Arc::new(FakeDom::new());
    dom.set_page_height(1_300);
    let values: Vec<_> = behavior().run(dom.clone()).map(|p| p.unwrap()).collect().await;

    assert_eq!(
        messages(&values),
        vec![
            "Scrolled page #1",
            "Auto scroll finished",
            "Behavior finished due to failure to find users posts container, reverting to auto scroll",
        ]
    );
    let last = values.last().unwrap();
    assert!(!last.timed_out);
    assert!(values[0].shares_state_with(last));
    assert_eq!(last.snapshot().unwrap().get("scrolls"), 1);
}

#[tokio::test(start_paused = true)]
async fn rerendered_reply_toggle_counts_as_loaded() {
    let page = profile();
    let dom = page.dom.clone();
    add_row(
        &dom,
        page.rows,
        &[(
            "P1",
            Post {
                replies: Replies::RerenderedToggle,
                ..Post::plain()
            },
        )],
    );

    let values: Vec<_> = behavior().run(dom.clone()).map(|p| p.unwrap()).collect().await;

    assert_eq!(
        row_messages(&messages(&values)),
        vec![
            "Viewing post P1",
            "All comments loaded",
            "Viewed poster's own comment",
            "Viewed comment 1",
            "Viewed comment 2",
            "Clicked loaded more replies for comment 2 (#1 times)",
            "Viewed post P1",
            "Viewed all posts in row",
            "Viewed all posts of the user being viewed",
        ]
    );
    assert_eq!(open_dialogs(&dom).await, 0);
    let state = values.last().unwrap().snapshot().unwrap();
    assert_eq!(state.get("replies"), 1);
    assert_eq!(state.get("failed_posts"), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_post_closes_its_dialog_and_the_row_goes_on() {
    let page = profile();
    let dom = page.dom.clone();
    add_row(
        &dom,
        page.rows,
        &[
            (
                "P1",
                Post {
                    replies: Replies::RerenderedComment,
                    ..Post::plain()
                },
            ),
            ("P2", Post::plain()),
        ],
    );

    let values: Vec<_> = behavior().run(dom.clone()).map(|p| p.unwrap()).collect().await;
    let messages = row_messages(&messages(&values));

    assert_eq!(
        &messages[..6],
        &[
            "Viewing post P1",
            "All comments loaded",
            "Viewed poster's own comment",
            "Viewed comment 1",
            "Viewed comment 2",
            "Clicked loaded more replies for comment 2 (#1 times)",
        ]
    );
    assert!(messages[6].starts_with("Failed to view post: "), "{}", messages[6]);
    assert_eq!(
        &messages[7..],
        &[
            "Viewing post P2",
            "All comments loaded",
            "Viewed poster's own comment",
            "Viewed comment 1",
            "Viewed post P2",
            "Viewed all posts in row",
            "Viewed all posts of the user being viewed",
        ]
    );
    assert!(!messages.contains(&"Viewed post P1"));
    assert_eq!(open_dialogs(&dom).await, 0);

    let state = values.last().unwrap().snapshot().unwrap();
    assert_eq!(state.get("posts"), 1);
    assert_eq!(state.get("failed_posts"), 1);
}
