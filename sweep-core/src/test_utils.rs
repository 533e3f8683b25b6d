//! In-memory document used by the test suites.
//!
//! Supports the CSS subset the behaviors rely on: tag, `.class`, `[attr]`,
//! `[attr="v"]`, `[attr*="v"]`, `[attr^="v"]`, `[attr$="v"]` (with an
//! optional ` i` flag), `*`, and the descendant and `>` combinators. XPath
//! selectors are rejected.
use crate::dom::{ChangeObservation, Dom, DomError, DomResult, Selector};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

pub type NodeId = usize;

type ClickHook = Arc<dyn Fn(&FakeDom) + Send + Sync>;
type NavigateHook = Arc<dyn Fn(&FakeDom, &str) + Send + Sync>;

#[derive(Debug, Default)]
struct NodeData {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attached: bool,
    clicks: u32,
    scrolled_into_view: u32,
}

#[derive(Default)]
struct Inner {
    nodes: Vec<NodeData>,
    url: String,
    history: Vec<String>,
    scroll_y: i64,
    viewport_height: i64,
    page_height: i64,
}

pub struct FakeDom {
    inner: Mutex<Inner>,
    on_click: Mutex<HashMap<NodeId, ClickHook>>,
    on_navigate: Mutex<Option<NavigateHook>>,
    changes: watch::Sender<u64>,
    observation: bool,
}

impl Default for FakeDom {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDom {
    /// Empty document: `html > body`, 800px viewport over an 800px page.
    pub fn new() -> Self {
        let html = NodeData {
            tag: "html".into(),
            attached: true,
            children: vec![1],
            ..Default::default()
        };
        let body = NodeData {
            tag: "body".into(),
            attached: true,
            parent: Some(0),
            ..Default::default()
        };
        let (changes, _) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner {
                nodes: vec![html, body],
                url: "https://example.test/".into(),
                viewport_height: 800,
                page_height: 800,
                ..Default::default()
            }),
            on_click: Mutex::new(HashMap::new()),
            on_navigate: Mutex::new(None),
            changes,
            observation: false,
        }
    }

    /// Report structural changes through [`Dom::observe_change`].
    pub fn with_observation(mut self) -> Self {
        self.observation = true;
        self
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn notify(&self) {
        self.changes.send_modify(|v| *v += 1);
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn body(&self) -> NodeId {
        1
    }

    /// Append a child described as `tag`, `tag.class` or `.class` (div).
    pub fn append(&self, parent: NodeId, shape: &str) -> NodeId {
        let id = self.append_unobserved(parent, shape);
        self.notify();
        id
    }

    /// Like [`append`](Self::append), but no observer hears about it: the
    /// mutation landed before anyone was watching.
    pub fn append_unobserved(&self, parent: NodeId, shape: &str) -> NodeId {
        let mut parts = shape.split('.');
        let tag = match parts.next() {
            Some("") | None => "div".to_string(),
            Some(tag) => tag.to_lowercase(),
        };
        let classes: Vec<&str> = parts.filter(|c| !c.is_empty()).collect();
        let id = {
            let mut inner = self.inner();
            let id = inner.nodes.len();
            let attached = inner.nodes[parent].attached;
            let mut node = NodeData {
                tag,
                parent: Some(parent),
                attached,
                ..Default::default()
            };
            if !classes.is_empty() {
                node.attrs.insert("class".into(), classes.join(" "));
            }
            inner.nodes.push(node);
            inner.nodes[parent].children.push(id);
            id
        };
        id
    }

    pub fn set_attr(&self, node: NodeId, name: &str, value: &str) {
        self.inner().nodes[node]
            .attrs
            .insert(name.to_string(), value.to_string());
    }

    pub fn set_text(&self, node: NodeId, text: &str) {
        self.inner().nodes[node].text = text.to_string();
    }

    /// Detach `node` (and its subtree) from the document.
    pub fn remove(&self, node: NodeId) {
        {
            let mut inner = self.inner();
            if let Some(parent) = inner.nodes[node].parent.take() {
                inner.nodes[parent].children.retain(|c| *c != node);
            }
            let mut stack = vec![node];
            while let Some(n) = stack.pop() {
                inner.nodes[n].attached = false;
                stack.extend(inner.nodes[n].children.iter().copied());
            }
        }
        self.notify();
    }

    /// Re-insert a removed `node` as the last child of `parent`.
    pub fn reattach(&self, parent: NodeId, node: NodeId) {
        {
            let mut inner = self.inner();
            if let Some(old) = inner.nodes[node].parent.take() {
                inner.nodes[old].children.retain(|c| *c != node);
            }
            inner.nodes[node].parent = Some(parent);
            inner.nodes[parent].children.push(node);
            let attached = inner.nodes[parent].attached;
            let mut stack = vec![node];
            while let Some(n) = stack.pop() {
                inner.nodes[n].attached = attached;
                stack.extend(inner.nodes[n].children.iter().copied());
            }
        }
        self.notify();
    }

    /// Run `hook` after every click on `node`.
    pub fn on_click(&self, node: NodeId, hook: impl Fn(&FakeDom) + Send + Sync + 'static) {
        self.on_click
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(node, Arc::new(hook));
    }

    /// Run `hook` after every history replacement.
    pub fn on_navigate(&self, hook: impl Fn(&FakeDom, &str) + Send + Sync + 'static) {
        *self.on_navigate.lock().unwrap_or_else(|p| p.into_inner()) = Some(Arc::new(hook));
    }

    pub fn clicks(&self, node: NodeId) -> u32 {
        self.inner().nodes[node].clicks
    }

    pub fn scrolled_into_view(&self, node: NodeId) -> u32 {
        self.inner().nodes[node].scrolled_into_view
    }

    pub fn is_attached_now(&self, node: NodeId) -> bool {
        self.inner().nodes[node].attached
    }

    pub fn children_of(&self, node: NodeId) -> Vec<NodeId> {
        self.inner().nodes[node].children.clone()
    }

    pub fn set_page_height(&self, height: i64) {
        self.inner().page_height = height;
        self.notify();
    }

    pub fn scroll_y(&self) -> i64 {
        self.inner().scroll_y
    }

    pub fn history(&self) -> Vec<String> {
        self.inner().history.clone()
    }

    fn check_attached(inner: &Inner, node: NodeId) -> DomResult<()> {
        match inner.nodes.get(node) {
            Some(n) if n.attached => Ok(()),
            _ => Err(DomError::StaleNode),
        }
    }

    fn descendants(inner: &Inner, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = inner.nodes[scope].children.iter().rev().copied().collect();
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(inner.nodes[n].children.iter().rev().copied());
        }
        out
    }

    fn select(&self, scope: Option<&NodeId>, selector: &Selector) -> DomResult<Vec<NodeId>> {
        let complex = match selector {
            Selector::Css(css) => parse_css(css)?,
            Selector::XPath(x) => {
                return Err(DomError::InvalidSelector(format!("xpath unsupported: {x}")))
            }
        };
        let inner = self.inner();
        let scope = scope.copied().unwrap_or(0);
        Self::check_attached(&inner, scope)?;
        Ok(Self::descendants(&inner, scope)
            .into_iter()
            .filter(|n| matches_complex(&inner, *n, &complex))
            .collect())
    }

    fn text_of(inner: &Inner, node: NodeId) -> String {
        let mut text = inner.nodes[node].text.clone();
        for child in &inner.nodes[node].children {
            text.push_str(&Self::text_of(inner, *child));
        }
        text
    }
}

#[async_trait]
impl Dom for FakeDom {
    type Node = NodeId;

    async fn query(&self, scope: Option<&NodeId>, selector: &Selector) -> DomResult<Option<NodeId>> {
        Ok(self.select(scope, selector)?.into_iter().next())
    }

    async fn query_all(&self, scope: Option<&NodeId>, selector: &Selector) -> DomResult<Vec<NodeId>> {
        self.select(scope, selector)
    }

    async fn first_child(&self, node: &NodeId) -> DomResult<Option<NodeId>> {
        let inner = self.inner();
        Self::check_attached(&inner, *node)?;
        Ok(inner.nodes[*node].children.first().copied())
    }

    async fn next_sibling(&self, node: &NodeId) -> DomResult<Option<NodeId>> {
        let inner = self.inner();
        Self::check_attached(&inner, *node)?;
        let Some(parent) = inner.nodes[*node].parent else {
            return Ok(None);
        };
        let siblings = &inner.nodes[parent].children;
        let pos = siblings.iter().position(|c| c == node);
        Ok(pos.and_then(|p| siblings.get(p + 1).copied()))
    }

    async fn previous_sibling(&self, node: &NodeId) -> DomResult<Option<NodeId>> {
        let inner = self.inner();
        Self::check_attached(&inner, *node)?;
        let Some(parent) = inner.nodes[*node].parent else {
            return Ok(None);
        };
        let siblings = &inner.nodes[parent].children;
        let pos = siblings.iter().position(|c| c == node);
        Ok(pos.and_then(|p| p.checked_sub(1)).and_then(|p| siblings.get(p).copied()))
    }

    async fn child_count(&self, node: &NodeId) -> DomResult<usize> {
        let inner = self.inner();
        Self::check_attached(&inner, *node)?;
        Ok(inner.nodes[*node].children.len())
    }

    async fn is_attached(&self, node: &NodeId) -> DomResult<bool> {
        Ok(self.inner().nodes.get(*node).map(|n| n.attached).unwrap_or(false))
    }

    async fn matches(&self, node: &NodeId, selector: &Selector) -> DomResult<bool> {
        let complex = match selector {
            Selector::Css(css) => parse_css(css)?,
            Selector::XPath(x) => {
                return Err(DomError::InvalidSelector(format!("xpath unsupported: {x}")))
            }
        };
        let inner = self.inner();
        Self::check_attached(&inner, *node)?;
        Ok(matches_complex(&inner, *node, &complex))
    }

    async fn tag_name(&self, node: &NodeId) -> DomResult<String> {
        let inner = self.inner();
        Self::check_attached(&inner, *node)?;
        Ok(inner.nodes[*node].tag.clone())
    }

    async fn text(&self, node: &NodeId) -> DomResult<String> {
        let inner = self.inner();
        Self::check_attached(&inner, *node)?;
        Ok(Self::text_of(&inner, *node))
    }

    async fn attribute(&self, node: &NodeId, name: &str) -> DomResult<Option<String>> {
        let inner = self.inner();
        Self::check_attached(&inner, *node)?;
        Ok(inner.nodes[*node].attrs.get(name).cloned())
    }

    async fn click(&self, node: &NodeId) -> DomResult<()> {
        {
            let mut inner = self.inner();
            Self::check_attached(&inner, *node)?;
            inner.nodes[*node].clicks += 1;
        }
        let hook = self
            .on_click
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(node)
            .cloned();
        if let Some(hook) = hook {
            hook(self);
        }
        Ok(())
    }

    async fn scroll_into_view(&self, node: &NodeId) -> DomResult<()> {
        let mut inner = self.inner();
        Self::check_attached(&inner, *node)?;
        inner.nodes[*node].scrolled_into_view += 1;
        Ok(())
    }

    async fn scroll_by(&self, dy: i64) -> DomResult<()> {
        let mut inner = self.inner();
        let max = (inner.page_height - inner.viewport_height).max(0);
        inner.scroll_y = (inner.scroll_y + dy).clamp(0, max);
        Ok(())
    }

    async fn can_scroll_down(&self) -> DomResult<bool> {
        let inner = self.inner();
        Ok(inner.scroll_y + inner.viewport_height < inner.page_height)
    }

    async fn current_url(&self) -> DomResult<String> {
        Ok(self.inner().url.clone())
    }

    async fn replace_history(&self, url: &str) -> DomResult<()> {
        {
            let mut inner = self.inner();
            inner.url = url.to_string();
            inner.history.push(url.to_string());
        }
        let hook = self
            .on_navigate
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(hook) = hook {
            hook(self, url);
        }
        Ok(())
    }

    async fn observe_change(&self, _node: &NodeId, timeout: Duration) -> DomResult<ChangeObservation> {
        if !self.observation {
            return Ok(ChangeObservation::Unsupported);
        }
        let mut rx = self.changes.subscribe();
        match tokio::time::timeout(timeout, rx.changed()).await {
            Ok(_) => Ok(ChangeObservation::Changed),
            Err(_) => Ok(ChangeObservation::TimedOut),
        }
    }
}

// --- minimal CSS matcher -------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Contains,
    Prefix,
    Suffix,
}

#[derive(Debug, Clone)]
struct AttrCond {
    name: String,
    op: AttrOp,
    value: String,
    case_insensitive: bool,
}

#[derive(Debug, Clone, Default)]
struct Compound {
    tag: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCond>,
}

/// Compounds left to right; `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
#[derive(Debug, Clone, Default)]
struct Complex {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

fn parse_css(css: &str) -> DomResult<Complex> {
    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_brackets = false;
    for ch in css.chars() {
        match ch {
            '[' => {
                in_brackets = true;
                current.push(ch);
            }
            ']' => {
                in_brackets = false;
                current.push(ch);
            }
            c if in_brackets => current.push(c),
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            '>' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(">".into());
            }
            c => current.push(c),
        }
    }
    if in_brackets {
        return Err(DomError::InvalidSelector(css.to_string()));
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    let mut complex = Complex::default();
    let mut pending = Combinator::Descendant;
    for token in tokens {
        if token == ">" {
            pending = Combinator::Child;
            continue;
        }
        if !complex.compounds.is_empty() {
            complex.combinators.push(pending);
        }
        complex.compounds.push(parse_compound(&token, css)?);
        pending = Combinator::Descendant;
    }
    if complex.compounds.is_empty() {
        return Err(DomError::InvalidSelector(css.to_string()));
    }
    Ok(complex)
}

fn parse_compound(token: &str, css: &str) -> DomResult<Compound> {
    let invalid = || DomError::InvalidSelector(css.to_string());
    let mut compound = Compound::default();
    let mut rest = token;

    let tag_end = rest.find(['.', '[']).unwrap_or(rest.len());
    let tag = &rest[..tag_end];
    if !tag.is_empty() && tag != "*" {
        compound.tag = Some(tag.to_lowercase());
    }
    rest = &rest[tag_end..];

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            compound.classes.push(after[..end].to_string());
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']').ok_or_else(invalid)?;
            compound.attrs.push(parse_attr(&after[..end]).ok_or_else(invalid)?);
            rest = &after[end + 1..];
        } else {
            return Err(invalid());
        }
    }
    Ok(compound)
}

fn parse_attr(body: &str) -> Option<AttrCond> {
    let body = body.trim();
    let Some(eq) = body.find('=') else {
        return Some(AttrCond {
            name: body.to_string(),
            op: AttrOp::Exists,
            value: String::new(),
            case_insensitive: false,
        });
    };
    let (op, name_end) = match body[..eq].chars().last() {
        Some('*') => (AttrOp::Contains, eq - 1),
        Some('^') => (AttrOp::Prefix, eq - 1),
        Some('$') => (AttrOp::Suffix, eq - 1),
        _ => (AttrOp::Equals, eq),
    };
    let name = body[..name_end].trim().to_string();
    let mut value = body[eq + 1..].trim();
    let mut case_insensitive = false;
    if let Some(stripped) = value.strip_suffix(" i").or_else(|| value.strip_suffix(" I")) {
        case_insensitive = true;
        value = stripped.trim();
    }
    let value = value.trim_matches(|c| c == '"' || c == '\'').to_string();
    Some(AttrCond {
        name,
        op,
        value,
        case_insensitive,
    })
}

fn matches_compound(inner: &Inner, node: NodeId, compound: &Compound) -> bool {
    let data = &inner.nodes[node];
    if let Some(tag) = &compound.tag {
        if &data.tag != tag {
            return false;
        }
    }
    let classes: Vec<&str> = data
        .attrs
        .get("class")
        .map(|c| c.split_whitespace().collect())
        .unwrap_or_default();
    if !compound.classes.iter().all(|c| classes.contains(&c.as_str())) {
        return false;
    }
    compound.attrs.iter().all(|cond| {
        let Some(actual) = data.attrs.get(&cond.name) else {
            return false;
        };
        let (actual, expected) = if cond.case_insensitive {
            (actual.to_lowercase(), cond.value.to_lowercase())
        } else {
            (actual.clone(), cond.value.clone())
        };
        match cond.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::Contains => actual.contains(&expected),
            AttrOp::Prefix => actual.starts_with(&expected),
            AttrOp::Suffix => actual.ends_with(&expected),
        }
    })
}

fn matches_complex(inner: &Inner, node: NodeId, complex: &Complex) -> bool {
    let last = complex.compounds.len() - 1;
    matches_from(inner, node, complex, last)
}

fn matches_from(inner: &Inner, node: NodeId, complex: &Complex, idx: usize) -> bool {
    if !matches_compound(inner, node, &complex.compounds[idx]) {
        return false;
    }
    if idx == 0 {
        return true;
    }
    match complex.combinators[idx - 1] {
        Combinator::Child => match inner.nodes[node].parent {
            Some(parent) => matches_from(inner, parent, complex, idx - 1),
            None => false,
        },
        Combinator::Descendant => {
            let mut ancestor = inner.nodes[node].parent;
            while let Some(a) = ancestor {
                if matches_from(inner, a, complex, idx - 1) {
                    return true;
                }
                ancestor = inner.nodes[a].parent;
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn css_subset_matches_like_a_browser() {
        let dom = FakeDom::new();
        let dialog = dom.append(dom.body(), "div");
        dom.set_attr(dialog, "role", "dialog");
        let article = dom.append(dialog, "article");
        let span = dom.append(article, "span.coreSpriteSidecarIconLarge");
        dom.set_attr(span, "aria-label", "Load more comments");

        let q = |s: &str| Selector::css(s);
        assert_eq!(dom.query(None, &q("div[role=\"dialog\"] > article")).await.unwrap(), Some(article));
        assert_eq!(dom.query(None, &q("div article span")).await.unwrap(), Some(span));
        assert_eq!(dom.query(None, &q("span.coreSpriteSidecarIconLarge")).await.unwrap(), Some(span));
        assert_eq!(
            dom.query(None, &q("* > span[aria-label*=\"more comments\" i]")).await.unwrap(),
            Some(span)
        );
        assert_eq!(dom.query(None, &q("body > article")).await.unwrap(), None);
        assert_eq!(dom.query(Some(&article), &q("article")).await.unwrap(), None);
        assert!(dom.query(None, &Selector::xpath("//span")).await.is_err());
    }

    #[tokio::test]
    async fn removed_subtrees_become_stale() {
        let dom = FakeDom::new();
        let list = dom.append(dom.body(), "ul");
        let item = dom.append(list, "li");
        dom.remove(list);
        assert!(!dom.is_attached(&item).await.unwrap());
        assert!(matches!(dom.click(&item).await, Err(DomError::StaleNode)));
    }

    #[tokio::test]
    async fn siblings_follow_document_order() {
        let dom = FakeDom::new();
        let list = dom.append(dom.body(), "ul");
        let a = dom.append(list, "li");
        let b = dom.append(list, "li");
        assert_eq!(dom.first_child(&list).await.unwrap(), Some(a));
        assert_eq!(dom.next_sibling(&a).await.unwrap(), Some(b));
        assert_eq!(dom.next_sibling(&b).await.unwrap(), None);
        assert_eq!(dom.previous_sibling(&b).await.unwrap(), Some(a));
        assert_eq!(dom.child_count(&list).await.unwrap(), 2);
    }
}
