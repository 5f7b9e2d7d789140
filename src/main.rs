//! pi_gpiod - GPIO status daemon binary.
//!
//! Runs the polling thread, health monitor, heartbeat and HTTP API, or
//! performs one-shot inspection commands.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pi_gpiod::gpio::{open_hardware_backend, PIN_MAP};
use pi_gpiod::health::MONITOR_INTERVAL;
use pi_gpiod::{
    start_web_server, AppState, Bank, DeviceInfo, ErrorCache, ErrorHandler, GpioBackend,
    GpioManager, HealthMonitor, Heartbeat, LogFiles, ServiceConfig, ServiceStats, ServiceStatus,
    SimulatedGpio, WebConfig,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pi_gpiod")]
#[command(about = "GPIO status daemon for Raspberry Pi")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Polls GPIO input and output banks and serves them over HTTP")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file
    #[arg(long, default_value = "Config.json")]
    config: PathBuf,

    /// HTTP bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// HTTP port (overrides listenPort)
    #[arg(short, long)]
    port: Option<u16>,

    /// Delay between poll cycles in milliseconds (overrides gpio.pollingIntervalMs)
    #[arg(long)]
    polling_interval: Option<u64>,

    /// Sticky-high hold for inputs in milliseconds (overrides gpio.stickyHighInputMs)
    #[arg(long)]
    sticky_high: Option<u64>,

    /// Use simulated GPIO lines instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon (default)
    Serve(ServeArgs),

    /// Poll once and print the three banks
    Read(ReadArgs),

    /// Show the pin map
    Pins,
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Do not broadcast the UDP heartbeat
    #[arg(long)]
    no_heartbeat: bool,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,
}

#[derive(Args)]
struct ReadArgs {
    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::Serve(args)) => serve_command(&cli, args).await,
        Some(Commands::Read(args)) => {
            init_logging(&cli, None)?;
            read_command(&cli, args)
        }
        Some(Commands::Pins) => {
            pins_command();
            Ok(())
        }
        None => serve_command(&cli, &ServeArgs::default()).await,
    }
}

/// Console logging, plus the daily log files when `logs` is set. The returned
/// guard flushes the file writer and must live until shutdown.
fn init_logging(cli: &Cli, logs: Option<&LogFiles>) -> Result<Option<WorkerGuard>> {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let console = fmt::layer().with_target(false).compact();

    let (file, guard) = match logs {
        Some(logs) => {
            let appender = logs.appender().context("Failed to open log directory")?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(guard)
}

fn print_banner() {
    println!("pi_gpiod - GPIO status daemon");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

/// File configuration with command-line overrides applied.
fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = ServiceConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    if let Some(port) = cli.port {
        config.listen_port = port;
    }
    if let Some(ms) = cli.polling_interval {
        anyhow::ensure!(ms > 0, "--polling-interval must be greater than zero");
        config.gpio = config.gpio.with_polling_interval_ms(ms);
    }
    if let Some(ms) = cli.sticky_high {
        config.gpio = config.gpio.with_sticky_high_input_ms(ms);
    }
    Ok(config)
}

fn select_backend(simulate: bool) -> Option<Box<dyn GpioBackend>> {
    if simulate {
        info!("Using simulated GPIO lines");
        return Some(Box::new(SimulatedGpio::new()));
    }
    if !cfg!(target_os = "linux") {
        return None;
    }
    match open_hardware_backend() {
        Ok(backend) => Some(backend),
        Err(e) => {
            warn!("GPIO hardware unavailable: {}", e);
            None
        }
    }
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> Result<()> {
    print_banner();
    let config = load_config(cli)?;
    let logs = config.log_directory.as_ref().map(LogFiles::new);
    let _log_guard = init_logging(cli, logs.as_ref())?;
    if let Some(logs) = &logs {
        info!("Writing logs to {}", logs.dir().display());
    }

    let errors = ErrorHandler::new(Arc::new(ErrorCache::new(config.error_retention())));
    let gpio = Arc::new(GpioManager::new(
        config.gpio,
        select_backend(cli.simulate),
        errors.clone(),
    ));
    gpio.initialize();

    let mut monitor = HealthMonitor::spawn(Arc::clone(&gpio), MONITOR_INTERVAL)
        .context("Failed to start health monitor")?;

    let state = AppState {
        gpio,
        stats: Arc::new(ServiceStats::new()),
        errors: errors.clone(),
        device: Arc::new(DeviceInfo::new(&config.storage_path)),
        status: Arc::new(ServiceStatus::new()),
        logs,
    };
    info!("Device {} ({})", state.device.name(), state.device.serial());

    let heartbeat = if args.no_heartbeat {
        info!("Heartbeat disabled");
        None
    } else {
        let heartbeat = Heartbeat::new(
            Arc::clone(&state.device),
            Arc::clone(&state.status),
            Arc::clone(&state.stats),
            errors,
        )
        .with_interface_names(config.interface_names.clone())
        .with_http_port(config.listen_port)
        .with_target(SocketAddr::from((Ipv4Addr::BROADCAST, config.heartbeat_port)));
        Some(heartbeat.spawn())
    };

    let web_config = WebConfig::new(&cli.host, config.listen_port).with_cors(!args.no_cors);
    info!("Web server configuration:");
    info!("  - Bind address: {}", web_config.bind_address());
    info!("  - CORS enabled: {}", web_config.enable_cors);
    info!("  - Polling interval: {}ms", config.gpio.polling_interval_ms);
    info!("  - Sticky high: {}ms", config.gpio.sticky_high_input_ms);

    let served = start_web_server(web_config, state).await;

    if let Some(heartbeat) = heartbeat {
        heartbeat.abort();
    }
    monitor.stop();
    served.context("Web server failed")
}

fn read_command(cli: &Cli, args: &ReadArgs) -> Result<()> {
    let config = load_config(cli)?;
    let gpio = GpioManager::new(
        config.gpio,
        select_backend(cli.simulate),
        ErrorHandler::default(),
    );
    gpio.configure_pins().context("Cannot read GPIO")?;
    gpio.poll_once().context("Poll cycle failed")?;

    match args.format.as_str() {
        "json" => {
            let banks = serde_json::json!({
                "input1": gpio.bank(Bank::Input1),
                "input2": gpio.bank(Bank::Input2),
                "output": gpio.bank(Bank::Output),
            });
            println!("{}", serde_json::to_string_pretty(&banks)?);
        }
        "pretty" => {
            for bank in Bank::ALL {
                println!("{:<7} {}", bank, gpio.bank(bank));
            }
        }
        other => anyhow::bail!("Unsupported format: {}. Use 'json' or 'pretty'", other),
    }
    Ok(())
}

fn pins_command() {
    println!("{:>4}  {:>4}  {:>6}  {:<6}  {:<7}  {}", "slot", "gpio", "header", "mode", "bank", "bit");
    for (slot, spec) in PIN_MAP.iter().enumerate() {
        if let Some(spec) = spec {
            println!(
                "{:>4}  {:>4}  {:>6}  {:<6}  {:<7}  {}",
                slot,
                spec.gpio_id,
                spec.pin_id,
                format!("{:?}", spec.mode),
                spec.bank.as_str(),
                spec.bit
            );
        }
    }
}
