use anyhow::{Context, Result};
use clap::Parser;
use crossbeam::channel::{self, Sender};
use hw_sens::config::AppConfig;
use hw_sens::display::{write_device_tree, ConsoleRenderer, OutputFormat};
use hw_sens_core::{DeviceAggregate, SamplingScheduler};
use hw_sens_sources::{open_source, SourceKind};
use log::{error, info, warn};
use std::path::PathBuf;

/// hw-sens - Sample hardware sensors in the background and report running statistics
#[derive(Parser, Debug, Clone)]
#[command(name = "hw-sens")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Sampling interval in milliseconds
    #[arg(short = 'i', long = "interval", value_name = "MS")]
    interval: Option<u64>,

    /// Sensor backend: auto, hwmon, sysinfo or simulated
    #[arg(short = 's', long = "source", value_name = "SOURCE")]
    source: Option<SourceKind>,

    /// Output format: table or json
    #[arg(short = 'f', long = "format", value_name = "FORMAT")]
    format: Option<OutputFormat>,

    /// Directory to discover hwmon devices in
    #[arg(long = "hwmon-root", value_name = "DIR")]
    hwmon_root: Option<PathBuf>,

    /// Stop when every read failed for this many consecutive ticks (0 = never)
    #[arg(long = "max-failed-ticks", value_name = "N")]
    max_failed_ticks: Option<u32>,

    /// Exit after rendering this many snapshots
    #[arg(short = 'n', long = "ticks", value_name = "N")]
    ticks: Option<u64>,

    /// Config file to use instead of the default location
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// List discovered devices and channels, then exit
    #[arg(short = 'l', long = "list")]
    list: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long = "write-config")]
    write_config: bool,

    /// Debug verbosity level (0=quiet, 1=info, 2=debug, 3=trace)
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", default_value = "0")]
    debug: u8,
}

impl Cli {
    /// Command line values override the config file
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(interval) = self.interval {
            config.update_interval_ms = interval;
        }
        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(format) = self.format {
            config.output = format;
        }
        if let Some(root) = &self.hwmon_root {
            config.hwmon_root = root.clone();
        }
        if let Some(limit) = self.max_failed_ticks {
            config.max_failed_ticks = limit;
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Level 0 (default): warn only
    // Level 1: info
    // Level 2: debug
    // Level 3+: trace
    let log_level = match cli.debug {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // Allow RUST_LOG to override CLI setting
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Starting hw-sens v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    cli.apply_to(&mut config);
    config.validate()?;

    if cli.write_config {
        let path = match &cli.config {
            Some(path) => path.clone(),
            None => AppConfig::config_path()?,
        };
        config.save_to_path(&path)?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let source = open_source(config.source, &config.hwmon_root)
        .with_context(|| format!("Failed to open {} sensor source", config.source))?;

    if cli.list {
        let mut stdout = std::io::stdout().lock();
        write_device_tree(&mut stdout, source.devices())?;
        return Ok(());
    }

    info!("Building channel aggregates...");
    let aggregates = DeviceAggregate::from_tree(&source, source.devices());
    if aggregates.is_empty() {
        warn!("Source '{}' exposes no readable input channels", source.name());
    }

    let mut scheduler = SamplingScheduler::new(aggregates, config.scheduler_config())?;
    let reader = scheduler.reader();
    let (shutdown_tx, shutdown_rx) = channel::bounded(1);
    spawn_signal_listener(shutdown_tx)?;
    scheduler.start()?;
    info!("Sampling '{}' every {:?}", source.name(), scheduler.interval());

    let mut renderer = ConsoleRenderer::stdout(config.output);
    let mut rendered: u64 = 0;
    let mut render_result = Ok(());

    loop {
        crossbeam::select! {
            recv(reader.ready_receiver()) -> msg => {
                if msg.is_err() {
                    warn!("Sampling thread exited");
                    break;
                }
                if let Err(e) = reader.deliver(&mut renderer) {
                    render_result = Err(e);
                    break;
                }
                rendered += 1;
                if cli.ticks.is_some_and(|limit| rendered >= limit) {
                    break;
                }
            }
            recv(shutdown_rx) -> _ => {
                info!("Interrupted, stopping sampler");
                break;
            }
        }
    }

    scheduler.stop().context("Sampling stopped with an error")?;
    render_result.context("Failed to render snapshot")
}

/// Forward Ctrl-C to `shutdown` from a small tokio runtime on its own thread
fn spawn_signal_listener(shutdown: Sender<()>) -> Result<()> {
    std::thread::Builder::new()
        .name("hw-sens-signals".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to create signal runtime: {}", e);
                    return;
                }
            };
            runtime.block_on(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                let _ = shutdown.try_send(());
            });
        })
        .context("Failed to spawn signal listener thread")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "hw-sens",
            "--interval",
            "250",
            "--source",
            "simulated",
            "--format",
            "json",
            "--max-failed-ticks",
            "4",
            "--ticks",
            "2",
        ]);
        let mut config = AppConfig::default();
        cli.apply_to(&mut config);

        assert_eq!(config.update_interval_ms, 250);
        assert_eq!(config.source, SourceKind::Simulated);
        assert_eq!(config.output, OutputFormat::Json);
        assert_eq!(config.max_failed_ticks, 4);
        assert_eq!(cli.ticks, Some(2));
    }

    #[test]
    fn test_cli_defaults_keep_config() {
        let cli = Cli::parse_from(["hw-sens"]);
        let mut config = AppConfig {
            update_interval_ms: 500,
            ..AppConfig::default()
        };
        cli.apply_to(&mut config);
        assert_eq!(config.update_interval_ms, 500);
        assert_eq!(cli.debug, 0);
        assert!(!cli.list);
    }

    #[test]
    fn test_cli_rejects_unknown_source() {
        assert!(Cli::try_parse_from(["hw-sens", "--source", "wmi"]).is_err());
    }
}
