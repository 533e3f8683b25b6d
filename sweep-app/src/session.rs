use anyhow::Result;
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use sweep_behaviors::{Behavior, BehaviorOptions, BehaviorRegistry, BehaviorState};
use sweep_common::{OutputFormat, SweepError};
use sweep_config::SweepConfig;
use sweep_core::{Dom, Progress, ProgressStream};
use sweep_drivers::{SweepDriver, WebDom};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One visit: a page, the behavior to run on it, and how to print progress.
pub struct Session {
    pub config: SweepConfig,
    pub url: String,
    pub behavior: Option<String>,
    pub format: OutputFormat,
}

/// How a drained run ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    pub steps: u64,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl Session {
    pub async fn run(self, cancel: Arc<CancellationToken>) -> Result<Outcome> {
        let opts = BehaviorOptions::from(&self.config.timing);
        let mut registry = BehaviorRegistry::<WebDom>::with_defaults(opts)?;
        registry.retain_enabled(&self.config);
        let behavior = pick(&registry, &self.url, self.behavior.as_deref())?;
        info!(
            target: "sweep.app",
            url = %self.url,
            behavior = behavior.metadata().name,
            "starting run"
        );

        let driver = SweepDriver::connect(&self.config.driver)
            .await
            .map_err(SweepError::Driver)?;
        let outcome = match driver.goto(&self.url).await {
            Ok(()) => {
                let stream = behavior.run(driver.dom());
                drain(stream, self.format, &cancel, &mut std::io::stdout()).await
            }
            Err(e) => Err(SweepError::Driver(e).into()),
        };
        if let Err(e) = driver.close().await {
            warn!(target: "sweep.app", error = %e, "closing the browser session failed");
        }
        outcome
    }
}

/// `name` when given, otherwise whatever matches `url`.
fn pick<D: Dom>(
    registry: &BehaviorRegistry<D>,
    url: &str,
    name: Option<&str>,
) -> sweep_common::Result<Arc<dyn Behavior<D>>> {
    match name {
        Some(name) => registry
            .by_name(name)
            .ok_or_else(|| SweepError::BehaviorNotFound(name.to_string())),
        None => Ok(registry.select(url)),
    }
}

/// Pull `stream` to the end, printing each value, until `cancel` fires.
///
/// Cancelling drops the stream, which stops the walk at its next await.
pub async fn drain<W: Write>(
    mut stream: ProgressStream<'_, BehaviorState>,
    format: OutputFormat,
    cancel: &CancellationToken,
    out: &mut W,
) -> Result<Outcome> {
    let mut outcome = Outcome::default();
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(target: "sweep.app", steps = outcome.steps, "run cancelled");
                outcome.cancelled = true;
                break;
            }
            next = stream.next() => next,
        };
        let Some(item) = next else {
            break;
        };
        let progress = item.map_err(SweepError::from)?;
        outcome.steps += 1;
        outcome.timed_out = progress.timed_out;
        write_progress(out, format, outcome.steps, &progress)?;
    }
    Ok(outcome)
}

fn write_progress<W: Write>(
    out: &mut W,
    format: OutputFormat,
    step: u64,
    progress: &Progress<BehaviorState>,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Text => {
            let wait = if progress.wait { " (waiting)" } else { "" };
            writeln!(out, "[{step}] {}{wait}", progress.message)
        }
        OutputFormat::Json => writeln!(out, "{}", progress.to_json()),
    }
}
