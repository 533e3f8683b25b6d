use super::dom::WebDom;
use anyhow::{Context, Result};
use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use std::sync::Arc;
use sweep_config::DriverConfig;
use tracing::info;
use url::Url;
use webdriver::capabilities::Capabilities;

/// A WebDriver session plus the [`WebDom`] view of its current page.
pub struct SweepDriver {
    client: Client,
    dom: Arc<WebDom>,
}

/// Chrome command-line switches for `config`.
pub fn chrome_arguments(config: &DriverConfig) -> Vec<String> {
    let mut args = vec![
        format!("--window-size={},{}", config.window_width, config.window_height),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--no-first-run".to_string(),
    ];
    if let Some(ua) = &config.user_agent {
        args.push(format!("--user-agent={ua}"));
    }
    if config.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
    }
    args
}

fn capabilities(config: &DriverConfig) -> Capabilities {
    let mut caps = Capabilities::new();
    caps.insert(
        "goog:chromeOptions".to_string(),
        json!({ "args": chrome_arguments(config) }),
    );
    caps
}

impl SweepDriver {
    /// Open a session on the WebDriver service at `config.webdriver_url`.
    pub async fn connect(config: &DriverConfig) -> Result<Self> {
        let client = ClientBuilder::native()
            .capabilities(capabilities(config))
            .connect(&config.webdriver_url)
            .await
            .with_context(|| format!("failed to connect to WebDriver at {}", config.webdriver_url))?;
        info!(
            target: "sweep.driver",
            url = %config.webdriver_url,
            headless = config.headless,
            "webdriver session started"
        );
        let dom = Arc::new(WebDom::new(client.clone()));
        Ok(Self { client, dom })
    }

    /// Navigate to `url` and wait for the load to finish.
    pub async fn goto(&self, url: &str) -> Result<()> {
        let parsed = Url::parse(url).with_context(|| format!("invalid url: {url}"))?;
        self.client
            .goto(parsed.as_str())
            .await
            .with_context(|| format!("navigation to {parsed} failed"))?;
        Ok(())
    }

    pub fn dom(&self) -> Arc<WebDom> {
        self.dom.clone()
    }

    /// Close the browser session.
    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_adds_headless_switches() {
        let config = DriverConfig {
            headless: true,
            ..DriverConfig::default()
        };
        let args = chrome_arguments(&config);
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--window-size=1280,800".to_string()));
    }

    #[test]
    fn user_agent_is_forwarded() {
        let config = DriverConfig {
            user_agent: Some("sweep/1.0".into()),
            ..DriverConfig::default()
        };
        let args = chrome_arguments(&config);
        assert!(args.contains(&"--user-agent=sweep/1.0".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn capabilities_carry_chrome_options() {
        let caps = capabilities(&DriverConfig::default());
        let args = &caps["goog:chromeOptions"]["args"];
        assert!(args.as_array().is_some_and(|a| !a.is_empty()));
    }
}
