//! nbdigest - execute a directory of Jupyter notebooks into one markdown report.

mod colors;
mod config;
mod driver;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{
    DEFAULT_INPUT_DIR, DEFAULT_KERNEL, DEFAULT_OUTPUT_FILE, DEFAULT_STARTUP_TIMEOUT_SECS,
    DEFAULT_TITLE, ReportConfig,
};
use crate::driver::RunOutcome;

#[derive(Parser)]
#[command(name = "nbdigest")]
#[command(about = "Execute every notebook in a directory and summarize the results in markdown")]
#[command(version)]
struct Cli {
    /// Directory containing the .ipynb files
    #[arg(long, default_value = DEFAULT_INPUT_DIR)]
    input_dir: PathBuf,

    /// Report file to write (overwritten)
    #[arg(short, long, default_value = DEFAULT_OUTPUT_FILE)]
    output: PathBuf,

    /// Kernelspec used to run every notebook
    #[arg(long, default_value = DEFAULT_KERNEL)]
    kernel: String,

    /// Report title
    #[arg(long, default_value = DEFAULT_TITLE)]
    title: String,

    /// Include code cell source in the report
    #[arg(long)]
    include_source: bool,

    /// Seconds to wait for a kernel to become ready
    #[arg(long, default_value_t = DEFAULT_STARTUP_TIMEOUT_SECS)]
    startup_timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl From<Cli> for ReportConfig {
    fn from(cli: Cli) -> Self {
        Self {
            input_dir: cli.input_dir,
            output_file: cli.output,
            kernel_name: cli.kernel,
            title: cli.title,
            include_source: cli.include_source,
            startup_timeout: Duration::from_secs(cli.startup_timeout),
            verbose: cli.verbose,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Helper to format nbdigest-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(core_err) = err.downcast_ref::<nbdigest_core::Error>() {
            anyhow::anyhow!("{}", core_err.with_hint())
        } else {
            err
        }
    };

    let config = ReportConfig::from(cli);
    match driver::run(&config).await.map_err(format_error)? {
        RunOutcome::Written {
            notebooks,
            critical,
            ..
        } => {
            tracing::info!("Processed {} notebooks ({} critical)", notebooks, critical);
        }
        RunOutcome::InputMissing | RunOutcome::MissingDependency => {}
    }

    Ok(())
}
