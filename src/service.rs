//! Service orchestration
//!
//! Composes validation, config generation, permission normalization,
//! process supervision, and bootstrap monitoring into the start, stop,
//! restart, and status operations external front ends call. The engine
//! never retries on its own; after a bootstrap timeout the caller picks
//! between `await_address` (keep waiting) and `stop` explicitly.

use crate::bootstrap::{BootstrapMonitor, BootstrapState, SharedBootstrapState, WatchOutcome};
use crate::error::{Error, Result};
use crate::hsdir;
use crate::nginx;
use crate::platform::{command_on_path, PlatformPaths};
use crate::state::{HostingMethod, ServiceConfig};
use crate::supervisor::{LaunchOutcome, ProcessRole, Supervisor};
use crate::torrc;
use crate::validate::{check_port, validate_site_dir, PortCheck};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long to wait for the local server to accept loopback connections
const SERVER_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to keep polling for the address file after the relay goes live
const ADDRESS_WAIT: Duration = Duration::from_secs(10);

/// Point-in-time view of the managed processes
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub relay_running: bool,
    pub server_running: bool,
    pub bootstrap_percent: u8,
    pub bootstrap_status: String,
    pub onion_address: Option<String>,
    pub tor_installed: bool,
    pub nginx_installed: bool,
}

/// Orchestrates the engine's components for one service configuration
pub struct ServiceManager {
    paths: PlatformPaths,
    supervisor: Supervisor,
    monitor: BootstrapMonitor,
    bootstrap: SharedBootstrapState,
    cancel: Mutex<CancellationToken>,
    base_dir: PathBuf,
}

impl ServiceManager {
    /// `base_dir` holds the engine's own files (state record, PID
    /// records, server error log), conventionally `~/.onionhost`.
    pub fn new(paths: PlatformPaths, base_dir: PathBuf) -> Self {
        if paths.fallback {
            warn!("Unrecognized platform; using direct-invocation defaults under the current account");
        }
        let supervisor = Supervisor::new(base_dir.join("run"), paths.tor_config.clone());
        ServiceManager {
            paths,
            supervisor,
            monitor: BootstrapMonitor::default(),
            bootstrap: Arc::new(Mutex::new(BootstrapState::default())),
            cancel: Mutex::new(CancellationToken::new()),
            base_dir,
        }
    }

    /// Override the bootstrap timeout
    pub fn with_monitor(mut self, monitor: BootstrapMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    /// Where the service configuration record is persisted
    pub fn state_path(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Shared view of the current bootstrap progress
    pub fn bootstrap_state(&self) -> SharedBootstrapState {
        Arc::clone(&self.bootstrap)
    }

    /// Cancel an in-progress bootstrap watch. The relay keeps running.
    pub fn cancel_watch(&self) {
        if let Ok(token) = self.cancel.lock() {
            token.cancel();
        }
    }

    /// Start the service and block until the published address is known.
    /// Progress callbacks arrive concurrently with the bootstrap wait,
    /// strictly increasing in percentage. On timeout or failure, already
    /// started processes are left running for inspection.
    pub async fn start<F>(&self, config: &mut ServiceConfig, on_progress: F) -> Result<String>
    where
        F: FnMut(u8, &str) + Send + 'static,
    {
        let target_port = self.validate(config)?;
        let hs_dir = self.paths.hidden_service_dir();

        // Config generation before any process is touched
        torrc::write_stanza(&self.paths.tor_config, &hs_dir, target_port)?;
        if let (HostingMethod::DirectFileServing, Some(site_dir)) =
            (config.method, config.site_dir.as_ref())
        {
            let error_log = self.base_dir.join("nginx-error.log");
            nginx::write_site_config(&self.paths, site_dir, config.server_port, &error_log)?;
        }

        let owner = self
            .paths
            .hs_owner
            .as_ref()
            .map(|(u, g)| (u.as_str(), g.as_str()));
        hsdir::enforce(&hs_dir, owner)?;

        if config.method == HostingMethod::DirectFileServing {
            self.supervisor
                .launch(ProcessRole::LocalServer, self.paths.nginx_invocation())
                .await?;
            self.wait_for_server(config.server_port).await?;
            info!("Local server reachable on 127.0.0.1:{}", config.server_port);
        }

        let outcome = self
            .supervisor
            .launch(ProcessRole::Relay, self.paths.tor_invocation())
            .await?;

        let address = match outcome {
            LaunchOutcome::AlreadyRunning(pid) => {
                info!("Relay already running (PID {}); reading published address", pid);
                self.await_address(ADDRESS_WAIT).await?
            },
            LaunchOutcome::Started(mut handle) => {
                let stdout = handle.take_stdout().ok_or_else(|| {
                    Error::process_start(ProcessRole::Relay.name(), "output stream unavailable")
                })?;

                if let Ok(mut state) = self.bootstrap.lock() {
                    *state = BootstrapState::default();
                }
                let cancel = CancellationToken::new();
                if let Ok(mut slot) = self.cancel.lock() {
                    *slot = cancel.clone();
                }

                let monitor = self.monitor.clone();
                let state = Arc::clone(&self.bootstrap);
                let watch = tokio::spawn(async move {
                    monitor.watch(stdout, cancel, state, on_progress).await
                });

                let outcome = watch.await.map_err(|e| Error::BootstrapFailed {
                    reason: format!("bootstrap watch aborted: {}", e),
                })?;

                match outcome {
                    WatchOutcome::Live => self.await_address(ADDRESS_WAIT).await?,
                    WatchOutcome::TimedOut { percent } => {
                        return Err(Error::BootstrapTimeout {
                            seconds: self.monitor.timeout().as_secs(),
                            percent,
                        });
                    },
                    WatchOutcome::Failed { last_line } => {
                        return Err(Error::BootstrapFailed {
                            reason: last_line
                                .unwrap_or_else(|| "relay exited without diagnostics".to_string()),
                        });
                    },
                    WatchOutcome::Cancelled => {
                        return Err(Error::WatchCancelled);
                    },
                }
            },
        };

        config.onion_address = Some(address.clone());
        config.running = true;
        config.save(&self.state_path())?;

        info!("Service published at {}", address);
        Ok(address)
    }

    /// Stop both managed processes. Both are always attempted; individual
    /// failures are aggregated rather than short-circuiting. `allow_scan`
    /// enables the command-line-scan recovery fallback for a relay with
    /// no usable PID record.
    pub async fn stop(&self, config: &mut ServiceConfig, allow_scan: bool) -> Result<()> {
        let stop_server = async {
            if config.method == HostingMethod::DirectFileServing {
                self.supervisor.terminate(ProcessRole::LocalServer).await
            } else {
                Ok(())
            }
        };

        let stop_relay = async {
            if self.supervisor.has_record(ProcessRole::Relay) {
                self.supervisor.terminate(ProcessRole::Relay).await
            } else if allow_scan {
                self.supervisor.terminate_relay_by_scan().map(|_| ())
            } else {
                Ok(())
            }
        };

        let (server_result, relay_result) = futures::join!(stop_server, stop_relay);

        config.running = false;
        config.save(&self.state_path())?;

        let mut failures = Vec::new();
        if let Err(e) = server_result {
            failures.push(format!("nginx: {}", e));
        }
        if let Err(e) = relay_result {
            failures.push(format!("tor: {}", e));
        }

        if failures.is_empty() {
            info!("Service stopped");
            Ok(())
        } else {
            Err(Error::StopPartial {
                summary: failures.join("; "),
            })
        }
    }

    /// Stop (best-effort) then start again
    pub async fn restart<F>(&self, config: &mut ServiceConfig, on_progress: F) -> Result<String>
    where
        F: FnMut(u8, &str) + Send + 'static,
    {
        if let Err(e) = self.stop(config, false).await {
            warn!("Stop before restart reported: {}", e);
        }
        self.start(config, on_progress).await
    }

    /// Liveness of both processes plus the current bootstrap snapshot
    pub fn status(&self, config: &ServiceConfig) -> ServiceStatus {
        let snapshot = self
            .bootstrap
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default();

        ServiceStatus {
            relay_running: self.supervisor.is_running(ProcessRole::Relay),
            server_running: self.supervisor.is_running(ProcessRole::LocalServer),
            bootstrap_percent: snapshot.percent,
            bootstrap_status: snapshot.status,
            onion_address: config.onion_address.clone(),
            tor_installed: command_on_path(&self.paths.tor_program),
            nginx_installed: command_on_path(&self.paths.nginx_program),
        }
    }

    /// Poll the relay-managed address file until it appears or `timeout`
    /// elapses. This is the "keep waiting" option after a bootstrap
    /// timeout; it touches no process.
    pub async fn await_address(&self, timeout: Duration) -> Result<String> {
        let hs_dir = self.paths.hidden_service_dir();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match hsdir::read_hostname(&hs_dir) {
                Ok(address) => return Ok(address),
                Err(_) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// Configuration checks that run before any process or file is
    /// touched. Returns the local port the relay will forward onto.
    fn validate(&self, config: &ServiceConfig) -> Result<u16> {
        if config.site_dir.is_some() && config.forward_port.is_some() {
            return Err(Error::validation(
                "configuration",
                "both hosting methods are configured active; they are mutually exclusive",
            ));
        }

        match config.method {
            HostingMethod::DirectFileServing => {
                let site_dir = config.site_dir.as_ref().ok_or_else(|| {
                    Error::validation("configuration", "no site directory configured")
                })?;
                validate_site_dir(site_dir)?;
                self.check_port_policy("server port", config.server_port)?;
                Ok(config.server_port)
            },
            HostingMethod::ForwardedPort => {
                let port = config.forward_port.ok_or_else(|| {
                    Error::validation("configuration", "no forward port configured")
                })?;
                self.check_port_policy("forward port", port)?;
                Ok(port)
            },
        }
    }

    fn check_port_policy(&self, what: &str, port: u16) -> Result<()> {
        match check_port(port) {
            PortCheck::Ok => Ok(()),
            PortCheck::Warning(reason) => {
                warn!("{}: {}", what, reason);
                Ok(())
            },
            PortCheck::Rejected(reason) => Err(Error::validation(what, reason)),
        }
    }

    /// Bounded connect-retry loop against the local server's loopback
    /// port. The server counts as up once one connection is accepted.
    async fn wait_for_server(&self, port: u16) -> Result<()> {
        let addr = format!("127.0.0.1:{}", port);
        let deadline = tokio::time::Instant::now() + SERVER_READY_TIMEOUT;

        loop {
            match TcpStream::connect(&addr).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    if tokio::time::Instant::now() >= deadline {
                        return Err(Error::process_start(
                            ProcessRole::LocalServer.name(),
                            format!("not reachable on {} within {:?}: {}", addr, SERVER_READY_TIMEOUT, e),
                        ));
                    }
                    tokio::time::sleep(Duration::from_millis(250)).await;
                },
            }
        }
    }
}

/// Engine base directory for the invoking account
pub fn default_base_dir() -> PathBuf {
    crate::platform::home_dir().join(".onionhost")
}
