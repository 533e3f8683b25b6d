use super::scripts;
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::{Client, Locator};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use sweep_core::dom::{ChangeObservation, Dom, DomError, DomResult, Selector};
use tracing::trace;

/// W3C key under which an element reference is serialized.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Longest single `execute_async` call, kept under the session's script
/// timeout. Longer waits come back as `TimedOut` and are re-armed by the
/// caller.
const OBSERVE_CHUNK: Duration = Duration::from_secs(20);

/// A page element, compared by its WebDriver reference.
#[derive(Clone)]
pub struct WebNode {
    id: String,
    element: Element,
}

impl WebNode {
    fn new(element: Element) -> DomResult<Self> {
        let value = serde_json::to_value(&element).map_err(|e| DomError::Platform(e.into()))?;
        let id = element_key(&value)
            .ok_or_else(|| DomError::Script(format!("element without reference: {value}")))?;
        Ok(Self { id, element })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn element(&self) -> &Element {
        &self.element
    }

    fn arg(&self) -> Value {
        json!({ ELEMENT_KEY: self.id })
    }
}

impl PartialEq for WebNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for WebNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WebNode({})", self.id)
    }
}

fn element_key(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get("ELEMENT"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn platform(err: CmdError) -> DomError {
    if err.is_stale_element_reference() {
        DomError::StaleNode
    } else if matches!(&err, CmdError::Standard(wd) if wd.error == ErrorStatus::InvalidSelector) {
        DomError::InvalidSelector(err.to_string())
    } else {
        DomError::Platform(err.into())
    }
}

/// `Ok(None)` for a lookup that matched nothing, the mapped error otherwise.
fn none_if_missing(err: CmdError) -> DomResult<Option<WebNode>> {
    if err.is_no_such_element() {
        Ok(None)
    } else {
        Err(platform(err))
    }
}

fn locator(selector: &Selector) -> Locator<'_> {
    match selector {
        Selector::Css(css) => Locator::Css(css),
        Selector::XPath(xpath) => Locator::XPath(xpath),
    }
}

/// [`Dom`] over a live WebDriver session.
#[derive(Clone)]
pub struct WebDom {
    client: Client,
}

impl WebDom {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn script(&self, script: &str, args: Vec<Value>) -> DomResult<Value> {
        self.client.execute(script, args).await.map_err(platform)
    }

    async fn relative(&self, node: &WebNode, xpath: &str) -> DomResult<Option<WebNode>> {
        match node.element.find(Locator::XPath(xpath)).await {
            Ok(found) => WebNode::new(found).map(Some),
            Err(e) => none_if_missing(e),
        }
    }
}

#[async_trait]
impl Dom for WebDom {
    type Node = WebNode;

    async fn query(&self, scope: Option<&WebNode>, selector: &Selector) -> DomResult<Option<WebNode>> {
        let found = match scope {
            Some(node) => node.element.find(locator(selector)).await,
            None => self.client.find(locator(selector)).await,
        };
        match found {
            Ok(element) => WebNode::new(element).map(Some),
            Err(e) => none_if_missing(e),
        }
    }

    async fn query_all(&self, scope: Option<&WebNode>, selector: &Selector) -> DomResult<Vec<WebNode>> {
        let found = match scope {
            Some(node) => node.element.find_all(locator(selector)).await,
            None => self.client.find_all(locator(selector)).await,
        }
        .map_err(platform)?;
        found.into_iter().map(WebNode::new).collect()
    }

    async fn first_child(&self, node: &WebNode) -> DomResult<Option<WebNode>> {
        self.relative(node, "./*[1]").await
    }

    async fn next_sibling(&self, node: &WebNode) -> DomResult<Option<WebNode>> {
        self.relative(node, "following-sibling::*[1]").await
    }

    async fn previous_sibling(&self, node: &WebNode) -> DomResult<Option<WebNode>> {
        self.relative(node, "preceding-sibling::*[1]").await
    }

    async fn child_count(&self, node: &WebNode) -> DomResult<usize> {
        let count = self.script(scripts::CHILD_COUNT, vec![node.arg()]).await?;
        count
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| DomError::Script(format!("childElementCount returned {count}")))
    }

    async fn is_attached(&self, node: &WebNode) -> DomResult<bool> {
        match self.script(scripts::IS_CONNECTED, vec![node.arg()]).await {
            Ok(v) => Ok(v.as_bool().unwrap_or(false)),
            Err(DomError::StaleNode) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn matches(&self, node: &WebNode, selector: &Selector) -> DomResult<bool> {
        let script = match selector {
            Selector::Css(_) => scripts::MATCHES_CSS,
            Selector::XPath(_) => scripts::MATCHES_XPATH,
        };
        let hit = self
            .script(script, vec![node.arg(), json!(selector.as_str())])
            .await?;
        Ok(hit.as_bool().unwrap_or(false))
    }

    async fn tag_name(&self, node: &WebNode) -> DomResult<String> {
        let tag = self.script(scripts::TAG_NAME, vec![node.arg()]).await?;
        Ok(tag.as_str().unwrap_or_default().to_string())
    }

    async fn text(&self, node: &WebNode) -> DomResult<String> {
        node.element.text().await.map_err(platform)
    }

    async fn attribute(&self, node: &WebNode, name: &str) -> DomResult<Option<String>> {
        node.element.attr(name).await.map_err(platform)
    }

    async fn click(&self, node: &WebNode) -> DomResult<()> {
        trace!(target: "sweep.driver", node = node.id(), "click");
        node.element.click().await.map_err(platform)
    }

    async fn scroll_into_view(&self, node: &WebNode) -> DomResult<()> {
        self.script(scripts::SCROLL_INTO_VIEW, vec![node.arg()]).await?;
        Ok(())
    }

    async fn scroll_by(&self, dy: i64) -> DomResult<()> {
        self.script(scripts::SCROLL_BY, vec![json!(dy)]).await?;
        Ok(())
    }

    async fn can_scroll_down(&self) -> DomResult<bool> {
        let more = self.script(scripts::CAN_SCROLL_DOWN, vec![]).await?;
        Ok(more.as_bool().unwrap_or(false))
    }

    async fn current_url(&self) -> DomResult<String> {
        let url = self.client.current_url().await.map_err(platform)?;
        Ok(url.to_string())
    }

    async fn replace_history(&self, url: &str) -> DomResult<()> {
        self.script(scripts::REPLACE_HISTORY, vec![json!(url)]).await?;
        Ok(())
    }

    async fn observe_change(&self, node: &WebNode, timeout: Duration) -> DomResult<ChangeObservation> {
        if timeout.is_zero() {
            return Ok(ChangeObservation::TimedOut);
        }
        let window = timeout.min(OBSERVE_CHUNK);
        let changed = self
            .client
            .execute_async(
                scripts::OBSERVE_CHANGE,
                vec![node.arg(), json!(window.as_millis() as u64)],
            )
            .await
            .map_err(platform)?;
        if changed.as_bool().unwrap_or(false) {
            Ok(ChangeObservation::Changed)
        } else {
            Ok(ChangeObservation::TimedOut)
        }
    }
}
