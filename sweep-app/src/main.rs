use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use sweep_common::OutputFormat;
use sweep_common::observability::init_logging;
use sweep_config::SweepConfigLoader;
use sweep_runtime::SweepRuntime;
use tracing::info;

use session::Session;
mod session;

/// Walk a page in a real browser the way a visitor would.
#[derive(Debug, Parser)]
#[command(name = "sweep", version)]
struct Cli {
    /// Page to visit.
    #[arg(required_unless_present = "print_config")]
    url: Option<String>,

    /// YAML config file; defaults to the user config dir, then ./sweep.yaml.
    #[arg(long, env = "SWEEP_CONFIG")]
    config: Option<PathBuf>,

    /// Run this behavior instead of picking one by URL.
    #[arg(long)]
    behavior: Option<String>,

    #[arg(long)]
    headless: bool,

    /// Print each progress value as a JSON line.
    #[arg(long)]
    json: bool,

    /// Print the effective configuration and exit.
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => SweepConfigLoader::new().with_file(path),
        None => SweepConfigLoader::new().discover(),
    };
    let mut cfg = loader.load()?;
    if cli.headless {
        cfg.driver.headless = true;
    }
    if cli.print_config {
        print!("{}", cfg.to_yaml()?);
        return Ok(());
    }

    let log_path = init_logging(cfg.logging.to_log_config())?;
    info!(target: "sweep.app", log = %log_path.display(), "logging initialised");

    let Some(url) = cli.url else {
        anyhow::bail!("a URL is required");
    };
    let format = if cli.json { OutputFormat::Json } else { OutputFormat::Text };

    let runtime = SweepRuntime::build("sweep-worker", None)?;
    let handle = runtime.handle();
    let _interrupt = handle.cancel_on_ctrl_c();

    let session = Session {
        config: cfg,
        url,
        behavior: cli.behavior,
        format,
    };
    let result = runtime.block_on(session.run(handle.cancellation()));
    runtime.shutdown(Duration::from_secs(2));

    let outcome = result?;
    info!(
        target: "sweep.app",
        steps = outcome.steps,
        timed_out = outcome.timed_out,
        cancelled = outcome.cancelled,
        "run finished"
    );
    Ok(())
}
