//! Page scripts run through `execute` / `execute_async`.

pub(crate) const CHILD_COUNT: &str = "return arguments[0].childElementCount;";

pub(crate) const IS_CONNECTED: &str = "return arguments[0].isConnected;";

pub(crate) const TAG_NAME: &str = "return arguments[0].tagName.toLowerCase();";

pub(crate) const MATCHES_CSS: &str = "return arguments[0].matches(arguments[1]);";

pub(crate) const MATCHES_XPATH: &str = r#"
const [node, xpath] = arguments;
const hits = document.evaluate(xpath, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
for (let i = 0; i < hits.snapshotLength; i++) {
  if (hits.snapshotItem(i) === node) return true;
}
return false;
"#;

pub(crate) const SCROLL_INTO_VIEW: &str =
    "arguments[0].scrollIntoView({ behavior: 'auto', block: 'center', inline: 'center' });";

pub(crate) const SCROLL_BY: &str = "window.scrollBy(0, arguments[0]);";

pub(crate) const CAN_SCROLL_DOWN: &str = r#"
const el = document.scrollingElement || document.documentElement;
return window.scrollY + window.innerHeight < el.scrollHeight;
"#;

/// Swap the URL without a navigation and let the page's router react.
pub(crate) const REPLACE_HISTORY: &str = r#"
window.history.replaceState({}, '', arguments[0]);
window.dispatchEvent(new PopStateEvent('popstate', { state: {} }));
"#;

/// Resolves `true` on the first child-list mutation under `arguments[0]`,
/// `false` after `arguments[1]` milliseconds.
pub(crate) const OBSERVE_CHANGE: &str = r#"
const [node, ms, done] = arguments;
let timer = null;
const observer = new MutationObserver(() => {
  observer.disconnect();
  clearTimeout(timer);
  done(true);
});
observer.observe(node, { childList: true, subtree: true });
timer = setTimeout(() => {
  observer.disconnect();
  done(false);
}, ms);
"#;
