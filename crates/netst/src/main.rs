//! netst - Main entry point
//!
//! Remote-login reachability tests, TCP port scans and LLDP/CDP neighbour
//! discovery from a management host.

mod config;
mod facade;
mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use netst_core::{Credentials, PortRange, Target, VendorTag};
use netst_discovery::PnetCapture;
use netst_probe::cancel_pair;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::facade::DiagnosticsFacade;

#[derive(Parser, Debug)]
#[command(name = "netst")]
#[command(about = "Network diagnostics: connectivity, port scans and neighbour discovery")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "netst.toml", global = true)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Vendor of the target devices (cisco, extreme, linux)
    #[arg(long, global = true)]
    vendor: Option<VendorTag>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct LoginArgs {
    /// Login name (defaults to shell.username from the configuration)
    #[arg(short, long)]
    username: Option<String>,

    /// Login password
    #[arg(short, long, env = "NETST_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// SSH port
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Test remote-login reachability of one or more devices
    Connect {
        #[arg(required = true)]
        targets: Vec<IpAddr>,

        #[command(flatten)]
        login: LoginArgs,
    },
    /// Classify TCP ports on a device as open, closed or filtered
    Scan {
        target: IpAddr,

        /// Ports to scan, e.g. 22,80,8000-8010
        #[arg(short = 'P', long)]
        ports: PortRange,

        /// Per-port timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Discover directly connected neighbours
    #[command(subcommand)]
    Discover(DiscoverCommand),
    /// Write a default configuration file
    InitConfig,
}

#[derive(Subcommand, Debug)]
enum DiscoverCommand {
    /// Listen for LLDP/CDP frames on a local interface
    Passive {
        /// Interface to capture on
        #[arg(short, long)]
        interface: Option<String>,

        /// Seconds to listen (0 = until interrupted)
        #[arg(short, long)]
        duration: Option<u64>,
    },
    /// Read the neighbour tables of devices over SSH
    Remote {
        #[arg(required = true)]
        targets: Vec<IpAddr>,

        #[command(flatten)]
        login: LoginArgs,
    },
}

fn target(addr: IpAddr, vendor: Option<VendorTag>) -> Target {
    match vendor {
        Some(vendor) => Target::with_vendor(addr, vendor),
        None => Target::new(addr),
    }
}

fn targets(addrs: &[IpAddr], vendor: Option<VendorTag>) -> Vec<Target> {
    addrs.iter().map(|&addr| target(addr, vendor)).collect()
}

fn credentials(login: &LoginArgs, config: &config::Config) -> Result<Credentials> {
    let Some(username) = login.username.clone().or_else(|| config.shell.username.clone()) else {
        bail!("no username given (use --username or shell.username)");
    };
    let Some(password) = login.password.clone() else {
        bail!("no password given (use --password or NETST_PASSWORD)");
    };
    Ok(Credentials::new(username, password))
}

fn print<T: serde::Serialize>(json: bool, report: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", output::to_json(report)?);
    } else {
        print!("{}", text(report));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("netst v{}", env!("CARGO_PKG_VERSION"));

    if let Command::InitConfig = args.command {
        if args.config.exists() {
            bail!("{} already exists", args.config.display());
        }
        config::save_default_config(&args.config)?;
        info!(path = %args.config.display(), "Wrote default configuration");
        return Ok(());
    }

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Command line values override the file
    match &args.command {
        Command::Connect { login, .. } | Command::Discover(DiscoverCommand::Remote { login, .. }) => {
            if let Some(port) = login.port {
                config.shell.port = port;
            }
        }
        Command::Scan {
            timeout_ms: Some(timeout_ms),
            ..
        } => config.probe.timeout_ms = *timeout_ms,
        Command::Discover(DiscoverCommand::Passive { interface, duration }) => {
            if let Some(interface) = interface {
                config.discovery.interface = Some(interface.clone());
            }
            if let Some(duration) = duration {
                config.discovery.duration_secs = *duration;
            }
        }
        _ => {}
    }
    config.validate()?;

    info!(
        max_concurrency = config.probe.max_concurrency,
        timeout_ms = config.probe.timeout_ms,
        "Configuration loaded"
    );

    // Ctrl-C cancels the running operation; queued probes are discarded
    let (cancel, token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    let facade = DiagnosticsFacade::ssh(config, token);

    match &args.command {
        Command::Connect { targets: addrs, login } => {
            let credentials = credentials(login, facade.config())?;
            let report = facade
                .connect_test(&targets(addrs, args.vendor), &credentials)
                .await?;
            print(args.json, &report, output::render_connectivity)?;
        }
        Command::Scan { target: addr, ports, .. } => {
            let report = facade
                .scan(&target(*addr, args.vendor), ports.ports())
                .await?;
            print(args.json, &report, output::render_scan)?;
        }
        Command::Discover(DiscoverCommand::Passive { .. }) => {
            let config = facade.config();
            let Some(interface) = config.discovery.interface.clone() else {
                bail!("no capture interface given (use --interface or discovery.interface)");
            };
            let read_timeout = Duration::from_millis(config.discovery.read_timeout_ms);
            let mut capture = PnetCapture::open(&interface, read_timeout)
                .with_context(|| format!("cannot capture on {}", interface))?;
            let report = facade
                .discover_passive(&mut capture, config.capture_duration())
                .await?;
            print(args.json, &report, output::render_discovery)?;
        }
        Command::Discover(DiscoverCommand::Remote { targets: addrs, login }) => {
            let credentials = credentials(login, facade.config())?;
            let report = facade
                .discover_active(&targets(addrs, args.vendor), &credentials)
                .await?;
            print(args.json, &report, output::render_discovery)?;
        }
        Command::InitConfig => {}
    }

    Ok(())
}
