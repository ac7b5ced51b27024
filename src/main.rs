use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use poolwatch::collectors::{
    wait_until_ready, DockerContainerCheck, DockerLogSource, LineSource, StreamSource,
};
use poolwatch::config::Config;
use poolwatch::error::ReadinessError;
use poolwatch::watcher::{PoolWatcher, StopReason};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit code when the log source never became ready
const EXIT_NOT_READY: i32 = 2;

/// Command-line arguments for the blue/green pool watcher
#[derive(Parser)]
#[command(
    name = "poolwatch",
    about = "Blue/green pool watcher - failover and error-rate alerts from nginx access logs",
    long_about = "Tails the access log of an nginx reverse proxy that load-balances between \
                  blue and green backend pools, detects failovers, recoveries and elevated \
                  5xx rates, and posts cooldown-gated alerts to a Slack webhook."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Replay an access log instead of tailing the proxy container
    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Read access log lines from PATH ('-' for stdin) instead of docker logs"
    )]
    input: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose logging output (debug level)")]
    verbose: bool,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// A missing config file is allowed (defaults are used); a missing
    /// input file is not.
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if config_path.extension().is_some_and(|ext| ext != "toml") {
                    warn!(
                        "Configuration file does not have .toml extension: {}",
                        config_path.display()
                    );
                }
            }
        }

        if let Some(ref input) = self.input {
            if !is_stdin(input) && !input.is_file() {
                return Err(format!("Input is not a readable file: {}", input.display()));
            }
        }

        Ok(())
    }
}

fn is_stdin(path: &Path) -> bool {
    path == Path::new("-")
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

/// Open the configured line source
///
/// Without `--input` this waits for the proxy container to be running and
/// then follows its logs.
fn open_source(
    cli: &Cli,
    config: &Config,
    running: &AtomicBool,
) -> anyhow::Result<Box<dyn LineSource>> {
    match &cli.input {
        Some(path) if is_stdin(path) => {
            info!("Reading access log from stdin");
            Ok(Box::new(StreamSource::from_reader(std::io::stdin())))
        }
        Some(path) => {
            info!("Replaying access log from {}", path.display());
            let file = File::open(path)
                .with_context(|| format!("Failed to open input file {}", path.display()))?;
            Ok(Box::new(StreamSource::from_reader(file)))
        }
        None => {
            let check = DockerContainerCheck::new(config.source.container.clone());
            wait_until_ready(
                &check,
                config.source.readiness_attempts,
                config.readiness_interval(),
                running,
            )?;

            let source = DockerLogSource::spawn(&config.source.container).with_context(|| {
                format!("Failed to follow logs of {}", config.source.container)
            })?;
            Ok(Box::new(source))
        }
    }
}

fn run(cli: &Cli, running: &AtomicBool) -> anyhow::Result<StopReason> {
    let mut config =
        Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_env()
        .context("Failed to read configuration from environment")?;
    config.validate().context("Invalid configuration")?;

    let mut watcher = PoolWatcher::new(&config).context("Failed to initialize watcher")?;
    watcher.log_banner();

    let mut source = open_source(cli, &config, running)?;
    let reason = watcher.run(source.as_mut(), running)?;
    Ok(reason)
}

/// Clear `running` on SIGINT, SIGTERM or SIGHUP
fn install_shutdown_handler(running: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        info!("Received shutdown signal, shutting down gracefully...");
        running.store(false, Ordering::SeqCst);
    })
}

/// Process exit code for a failed run
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<ReadinessError>() {
        Some(ReadinessError::Timeout { .. }) => EXIT_NOT_READY,
        Some(ReadinessError::Interrupted) => 0,
        None => 1,
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    info!("Starting poolwatch");

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    let running = Arc::new(AtomicBool::new(true));
    if let Err(e) = install_shutdown_handler(Arc::clone(&running)) {
        error!("Failed to install signal handler: {}", e);
        std::process::exit(1);
    }

    match run(&cli, &running) {
        Ok(StopReason::EndOfStream) => info!("Log stream finished, poolwatch exiting"),
        Ok(StopReason::Shutdown) => info!("poolwatch shutdown complete"),
        Err(e) => {
            let code = exit_code(&e);
            if code == 0 {
                info!("{}", e);
            } else {
                error!("{:#}", e);
            }
            std::process::exit(code);
        }
    }
}
