//! onionhost - host a directory or a local port as a Tor hidden service
//!
//! Thin command-line front end over the orchestration engine:
//! - `start` publishes the configured site and streams bootstrap progress
//! - `stop` / `restart` manage the supervised tor and nginx processes
//! - `status` probes process liveness and bootstrap state
//! - `address` prints the published onion address
//! - `validate` / `config` check and edit the persisted configuration
//!
//! All real work lives in the library; this binary parses arguments,
//! threads the persisted `ServiceConfig` through the engine, and renders
//! callback events.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use onionhost::bootstrap::BootstrapMonitor;
use onionhost::platform::PlatformPaths;
use onionhost::service::{default_base_dir, ServiceManager};
use onionhost::state::ServiceConfig;
use onionhost::validate::{check_port, PortCheck};
use onionhost::{Error, HostingMethod};

/// Host static sites or local services on the Tor network
#[derive(Debug, Parser)]
#[command(name = "onionhost")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the hidden service and wait for bootstrap to complete
    Start {
        /// Serve this directory (direct file serving)
        #[arg(short, long, conflicts_with = "port")]
        dir: Option<PathBuf>,

        /// Forward to an already running server on this local port
        #[arg(short, long)]
        port: Option<u16>,

        /// Listen port for the managed local server
        #[arg(long)]
        server_port: Option<u16>,

        /// Bootstrap timeout in seconds
        #[arg(long, default_value = "120")]
        timeout: u64,
    },

    /// Stop the supervised tor and nginx processes
    Stop {
        /// Also scan for relay processes matching the managed config
        /// file when no PID record is available (recovery fallback)
        #[arg(long)]
        scan: bool,
    },

    /// Stop and start again
    Restart {
        /// Bootstrap timeout in seconds
        #[arg(long, default_value = "120")]
        timeout: u64,
    },

    /// Show process liveness and bootstrap progress
    Status,

    /// Print the published onion address
    Address,

    /// Validate a port or the configured site directory
    Validate {
        /// Port to check against the engine's policy
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show or change the persisted configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Select direct file serving from a directory
    SetDir { dir: PathBuf },
    /// Select forwarding to a local port
    SetPort { port: u16 },
    /// Change the managed local server's listen port
    SetServerPort { port: u16 },
}

fn progress_printer() -> impl FnMut(u8, &str) + Send + 'static {
    |percent, message| {
        info!("Bootstrap {:>3}% - {}", percent, message);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let paths = PlatformPaths::for_host();
    let base_dir = default_base_dir();
    let manager = ServiceManager::new(paths, base_dir);

    let state_path = manager.state_path();
    let mut config = ServiceConfig::load(&state_path).context("Failed to load configuration")?;

    match cli.command {
        Command::Start {
            dir,
            port,
            server_port,
            timeout,
        } => {
            if let Some(dir) = dir {
                config.set_site_dir(dir);
            }
            if let Some(port) = port {
                config.set_forward_port(port);
            }
            if let Some(port) = server_port {
                config.server_port = port;
            }
            config.save(&state_path)?;

            let manager = manager.with_monitor(BootstrapMonitor::new(Duration::from_secs(timeout)));
            match manager.start(&mut config, progress_printer()).await {
                Ok(address) => {
                    println!();
                    println!("✓ Hidden service is live");
                    println!("  Address: http://{}", address);
                    match config.method {
                        HostingMethod::DirectFileServing => {
                            if let Some(dir) = &config.site_dir {
                                println!("  Serving: {}", dir.display());
                            }
                        },
                        HostingMethod::ForwardedPort => {
                            if let Some(port) = config.forward_port {
                                println!("  Forwarding to: 127.0.0.1:{}", port);
                            }
                        },
                    }
                    Ok(())
                },
                Err(Error::BootstrapTimeout { seconds, percent }) => {
                    error!("Bootstrap timed out after {}s at {}%", seconds, percent);
                    error!("The relay is still running and may yet converge.");
                    error!("Run `onionhost address` to keep checking, or `onionhost stop` to give up.");
                    bail!("bootstrap timed out");
                },
                Err(e) => Err(e).context("Failed to start hidden service"),
            }
        },

        Command::Stop { scan } => {
            manager
                .stop(&mut config, scan)
                .await
                .context("Failed to stop service")?;
            println!("✓ Service stopped");
            Ok(())
        },

        Command::Restart { timeout } => {
            let manager = manager.with_monitor(BootstrapMonitor::new(Duration::from_secs(timeout)));
            let address = manager
                .restart(&mut config, progress_printer())
                .await
                .context("Failed to restart service")?;
            println!("✓ Hidden service is live at http://{}", address);
            Ok(())
        },

        Command::Status => {
            let status = manager.status(&config);
            println!("Service status");
            println!("  Method:          {}", config.method);
            println!("  tor running:     {}", status.relay_running);
            println!("  nginx running:   {}", status.server_running);
            if status.bootstrap_percent > 0 && status.bootstrap_percent < 100 {
                println!(
                    "  Bootstrap:       {}% ({})",
                    status.bootstrap_percent, status.bootstrap_status
                );
            }
            match &status.onion_address {
                Some(address) => println!("  Address:         http://{}", address),
                None => println!("  Address:         (not yet published)"),
            }
            if !status.tor_installed {
                warn!("tor was not found on PATH");
            }
            if !status.nginx_installed && config.method == HostingMethod::DirectFileServing {
                warn!("nginx was not found on PATH");
            }
            Ok(())
        },

        Command::Address => {
            match &config.onion_address {
                Some(address) => {
                    println!("http://{}", address);
                    Ok(())
                },
                None => {
                    // The relay may have published since the last start
                    match manager.await_address(Duration::from_secs(1)).await {
                        Ok(address) => {
                            config.onion_address = Some(address.clone());
                            config.save(&state_path)?;
                            println!("http://{}", address);
                            Ok(())
                        },
                        Err(_) => bail!("no onion address available yet; is the service running?"),
                    }
                },
            }
        },

        Command::Validate { port } => {
            if let Some(port) = port {
                match check_port(port) {
                    PortCheck::Ok => println!("✓ Port {} is usable", port),
                    PortCheck::Warning(reason) => println!("⚠ {}", reason),
                    PortCheck::Rejected(reason) => {
                        println!("✗ {}", reason);
                        bail!("port rejected");
                    },
                }
            }

            if let Some(dir) = &config.site_dir {
                onionhost::validate_site_dir(dir).context("Site directory is not servable")?;
                println!("✓ Site directory {} is servable", dir.display());
            }
            Ok(())
        },

        Command::Config { action } => {
            match action {
                ConfigAction::Show => {
                    let rendered = serde_json::to_string_pretty(&config)?;
                    println!("{}", rendered);
                },
                ConfigAction::SetDir { dir } => {
                    onionhost::validate_site_dir(&dir)?;
                    config.set_site_dir(dir);
                    config.save(&state_path)?;
                    println!("✓ Method set to {}", config.method);
                },
                ConfigAction::SetPort { port } => {
                    if let PortCheck::Rejected(reason) = check_port(port) {
                        bail!("invalid port: {}", reason);
                    }
                    config.set_forward_port(port);
                    config.save(&state_path)?;
                    println!("✓ Method set to {} on port {}", config.method, port);
                },
                ConfigAction::SetServerPort { port } => {
                    if let PortCheck::Rejected(reason) = check_port(port) {
                        bail!("invalid port: {}", reason);
                    }
                    config.server_port = port;
                    config.save(&state_path)?;
                    println!("✓ Local server port set to {}", port);
                },
            }
            Ok(())
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_start_with_dir() {
        let cli = Cli::try_parse_from(["onionhost", "start", "--dir", "/srv/site"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn cli_rejects_dir_and_port_together() {
        let cli = Cli::try_parse_from(["onionhost", "start", "--dir", "/srv/site", "--port", "3000"]);
        assert!(cli.is_err());
    }

    #[test]
    fn cli_parses_stop_with_scan() {
        let cli = Cli::try_parse_from(["onionhost", "stop", "--scan"]);
        assert!(cli.is_ok());
    }
}
