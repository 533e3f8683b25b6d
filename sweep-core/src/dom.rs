//! Platform capability surface.
//!
//! The engine never touches the document directly; the interaction primitives
//! and behavior hooks go through [`Dom`]. Nodes are opaque handles that can be
//! compared and handed back to the platform, nothing more.
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Opaque reference to a document node.
pub trait NodeRef: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

impl<T> NodeRef for T where T: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {}

/// Node lookup expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    Css(String),
    XPath(String),
}

impl Selector {
    pub fn css(s: impl Into<String>) -> Self {
        Self::Css(s.into())
    }

    pub fn xpath(s: impl Into<String>) -> Self {
        Self::XPath(s.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Css(s) | Self::XPath(s) => s,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css({s})"),
            Self::XPath(s) => write!(f, "xpath({s})"),
        }
    }
}

/// Result of waiting for a structural change under a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeObservation {
    Changed,
    TimedOut,
    /// The platform cannot observe mutations; fall back to polling.
    Unsupported,
}

#[derive(thiserror::Error, Debug)]
pub enum DomError {
    #[error("node is no longer attached to the document")]
    StaleNode,

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("script error: {0}")]
    Script(String),

    #[error(transparent)]
    Platform(#[from] anyhow::Error),
}

pub type DomResult<T> = std::result::Result<T, DomError>;

/// Document access used by the interaction primitives and behavior hooks.
///
/// `scope: None` means the whole document.
#[async_trait]
pub trait Dom: Send + Sync + 'static {
    type Node: NodeRef;

    async fn query(&self, scope: Option<&Self::Node>, selector: &Selector)
        -> DomResult<Option<Self::Node>>;

    async fn query_all(&self, scope: Option<&Self::Node>, selector: &Selector)
        -> DomResult<Vec<Self::Node>>;

    async fn first_child(&self, node: &Self::Node) -> DomResult<Option<Self::Node>>;

    async fn next_sibling(&self, node: &Self::Node) -> DomResult<Option<Self::Node>>;

    async fn previous_sibling(&self, node: &Self::Node) -> DomResult<Option<Self::Node>>;

    /// Number of element children.
    async fn child_count(&self, node: &Self::Node) -> DomResult<usize>;

    /// Whether the node is still connected to the document.
    async fn is_attached(&self, node: &Self::Node) -> DomResult<bool>;

    async fn matches(&self, node: &Self::Node, selector: &Selector) -> DomResult<bool>;

    /// Lower-case tag name.
    async fn tag_name(&self, node: &Self::Node) -> DomResult<String>;

    async fn text(&self, node: &Self::Node) -> DomResult<String>;

    async fn attribute(&self, node: &Self::Node, name: &str) -> DomResult<Option<String>>;

    async fn click(&self, node: &Self::Node) -> DomResult<()>;

    async fn scroll_into_view(&self, node: &Self::Node) -> DomResult<()>;

    /// Scroll the window vertically by `dy` pixels.
    async fn scroll_by(&self, dy: i64) -> DomResult<()>;

    async fn can_scroll_down(&self) -> DomResult<bool>;

    async fn current_url(&self) -> DomResult<String>;

    /// Replace the current history entry with `url` and notify the page.
    async fn replace_history(&self, url: &str) -> DomResult<()>;

    /// Wait up to `timeout` for the subtree under `node` to change.
    ///
    /// Implementations may give up early with `TimedOut`. Mutations made
    /// before the call are not reported, so callers re-check the document
    /// after every result.
    async fn observe_change(
        &self,
        _node: &Self::Node,
        _timeout: Duration,
    ) -> DomResult<ChangeObservation> {
        Ok(ChangeObservation::Unsupported)
    }
}

/// Select the first node matched by any of `selectors`, in order.
pub async fn query_any<D: Dom + ?Sized>(
    dom: &D,
    scope: Option<&D::Node>,
    selectors: &[Selector],
) -> DomResult<Option<D::Node>> {
    for selector in selectors {
        if let Some(node) = dom.query(scope, selector).await? {
            return Ok(Some(node));
        }
    }
    Ok(None)
}

/// Follow `hops` first-child links from `node`.
pub async fn first_child_chain<D: Dom + ?Sized>(
    dom: &D,
    node: &D::Node,
    hops: usize,
) -> DomResult<Option<D::Node>> {
    let mut current = node.clone();
    for _ in 0..hops {
        match dom.first_child(&current).await? {
            Some(child) => current = child,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Case-insensitive substring test against the node's text.
pub async fn text_contains<D: Dom + ?Sized>(
    dom: &D,
    node: &D::Node,
    needle: &str,
) -> DomResult<bool> {
    let text = dom.text(node).await?;
    Ok(text.to_lowercase().contains(&needle.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_display_names_the_kind() {
        assert_eq!(Selector::css("article").to_string(), "css(article)");
        assert_eq!(Selector::xpath("//li").to_string(), "xpath(//li)");
        assert_eq!(Selector::xpath("//li").as_str(), "//li");
    }
}
