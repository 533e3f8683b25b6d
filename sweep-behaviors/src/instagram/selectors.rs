//! Instagram markup the behavior relies on.

pub const POST_TOP_MOST_CONTAINER: &str = "article";
pub const DIV_DIALOG: &str = r#"div[role="dialog"]"#;
pub const OPEN_STORIES: &str = r#"div[aria-label="Open Stories"]"#;
pub const NEXT_STORY: &str = r#"div[class*="RightChevron" i]"#;
pub const POST_ANCHOR: &str = "a";
pub const COMMENT_LIST: &str = "ul";

/// Span whose click loads another page of comments.
pub const MORE_COMMENTS: &str = r#"* > span[aria-label*="more comments" i]"#;
/// Span toggling the replies under a comment.
pub const MORE_REPLIES: &str = r#"* > button[type="button"] > span"#;
/// The poster's own caption, rendered as the first comment.
pub const POSTERS_OWN_COMMENT: &str = r#"li[role="menuitem"]"#;

/// Thumbnail badges marking a carousel post.
pub const MULTI_IMAGE_THUMBNAIL: &[&str] = &[
    r#"span[aria-label*="Carousel" i]"#,
    r#"span[class*="SpriteCarousel" i]"#,
    "span.coreSpriteSidecarIconLarge",
];

/// "Next image" control inside an open carousel post.
pub const NEXT_IMAGE: &[&str] = &[
    "button > div.coreSpriteRightChevron",
    "div.coreSpriteRightChevron",
];

/// Thumbnail badges marking a video post.
pub const VIDEO_THUMBNAIL: &[&str] = &[
    r#"span[role="button"].videoSpritePlayButton"#,
    r#"span[aria-label*="Video" i]"#,
    r#"span[class*="SpriteVideo" i]"#,
    "span.coreSpriteVideoIconLarge",
    r#"span[aria-label$="Video" i]"#,
    r#"span[class*="glyphsSpriteVideo_large"]"#,
];

/// Play control inside an open video post.
pub const PLAY_VIDEO: &[&str] = &[
    r#"span[role="button"].videoSpritePlayButton"#,
    "span.videoSpritePlayButton",
];

/// Fallbacks for the dialog close button when it is not the inner dialog's sibling.
pub const POST_POPUP_CLOSE: &[&str] = &[
    r#"//body/div/div/button[contains(text(), "Close")]"#,
    r#"/html/body/div[2]/button[1][contains(text(), "Close")]"#,
];
