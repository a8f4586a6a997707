//! Process supervision
//!
//! Starts, tracks, and terminates the relay and local server processes
//! directly, without a system service manager. Each role has one on-disk
//! PID record, written only by this module. A recorded process is probed
//! and matched against its invocation signature before every launch, so
//! a second relay instance is never started against the same config file
//! and stale records are discarded instead of trusted.

use crate::error::{Error, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Grace period between SIGTERM and the escalation to SIGKILL
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Delay before probing a fresh child for an immediate exit
const SPAWN_PROBE_DELAY: Duration = Duration::from_millis(150);

/// The two process roles this engine manages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessRole {
    Relay,
    LocalServer,
}

impl ProcessRole {
    pub fn name(&self) -> &'static str {
        match self {
            ProcessRole::Relay => "tor",
            ProcessRole::LocalServer => "nginx",
        }
    }

    fn record_name(&self) -> &'static str {
        match self {
            ProcessRole::Relay => "relay.json",
            ProcessRole::LocalServer => "server.json",
        }
    }
}

/// On-disk record of a launched process and its invocation signature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidRecord {
    pub pid: u32,
    pub argv: Vec<String>,
}

/// A process started by this supervisor. Dropping the handle does not
/// kill the process; lifecycle control goes through the PID record so a
/// later invocation of the engine can still stop it.
#[derive(Debug)]
pub struct ProcessHandle {
    pub pid: u32,
    child: Child,
}

impl ProcessHandle {
    /// Take the captured output stream for the bootstrap monitor
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Whether the child has already exited
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }
}

/// Result of a launch request
#[derive(Debug)]
pub enum LaunchOutcome {
    Started(ProcessHandle),
    /// A matching process was already running; launching was a no-op
    AlreadyRunning(u32),
}

/// Supervises the relay and local server processes via PID records
pub struct Supervisor {
    run_dir: PathBuf,
    tor_config: PathBuf,
}

impl Supervisor {
    /// `run_dir` holds the PID records; `tor_config` identifies which
    /// relay processes belong to this engine.
    pub fn new(run_dir: PathBuf, tor_config: PathBuf) -> Self {
        Supervisor {
            run_dir,
            tor_config,
        }
    }

    /// Launch a process for a role, reconciling any previous record
    /// first. Returns `AlreadyRunning` when a live process matching the
    /// invocation signature (or, for the relay, any process identifiable
    /// as owning our config file) is found.
    pub async fn launch(&self, role: ProcessRole, argv: Vec<String>) -> Result<LaunchOutcome> {
        if argv.is_empty() {
            return Err(Error::process_start(role.name(), "empty invocation"));
        }

        if let Some(pid) = self.reconcile(role, &argv)? {
            info!("{} already running with PID {}", role.name(), pid);
            return Ok(LaunchOutcome::AlreadyRunning(pid));
        }

        if role == ProcessRole::Relay {
            // Last line of defense against a duplicate relay: adopt any
            // process already holding our config file.
            let owned = self.find_relay_pids();
            if let Some(&pid) = owned.first() {
                info!(
                    "Found relay PID {} already attached to {}; not starting another",
                    pid,
                    self.tor_config.display()
                );
                self.write_record(role, &PidRecord { pid, argv })?;
                return Ok(LaunchOutcome::AlreadyRunning(pid));
            }
        }

        debug!("Spawning {}: {:?}", role.name(), argv);
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map_err(|e| {
                Error::process_start(
                    role.name(),
                    format!("could not spawn {}: {}. Is it installed?", argv[0], e),
                )
            })?;

        let pid = child
            .id()
            .ok_or_else(|| Error::process_start(role.name(), "process exited before start"))?;

        // A bad config makes both tor and nginx exit within milliseconds;
        // catch that here instead of reporting a phantom launch.
        tokio::time::sleep(SPAWN_PROBE_DELAY).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(Error::process_start(
                role.name(),
                format!("exited immediately with {}", status),
            ));
        }

        self.write_record(role, &PidRecord { pid, argv })?;
        info!("{} started with PID {}", role.name(), pid);

        Ok(LaunchOutcome::Started(ProcessHandle { pid, child }))
    }

    /// Check the stored record against the expected invocation. A stale
    /// record (process gone) is discarded; a live unrelated process is
    /// left untouched and simply not treated as ours.
    fn reconcile(&self, role: ProcessRole, expected_argv: &[String]) -> Result<Option<u32>> {
        let Some(record) = self.read_record(role)? else {
            return Ok(None);
        };

        if !process_alive(record.pid) {
            debug!(
                "Discarding stale {} record (PID {} is gone)",
                role.name(),
                record.pid
            );
            self.remove_record(role)?;
            return Ok(None);
        }

        let token = signature_token(expected_argv);
        if record.argv == expected_argv && cmdline_contains(record.pid, &token) {
            return Ok(Some(record.pid));
        }

        debug!(
            "PID {} is alive but does not match the expected {} invocation; leaving it alone",
            record.pid,
            role.name()
        );
        Ok(None)
    }

    /// Send a graceful stop to the recorded process, escalating to
    /// SIGKILL after a short grace period. Terminating an absent process
    /// is a success, not an error.
    pub async fn terminate(&self, role: ProcessRole) -> Result<()> {
        let Some(record) = self.read_record(role)? else {
            debug!("No {} record; nothing to terminate", role.name());
            return Ok(());
        };

        if !process_alive(record.pid) {
            self.remove_record(role)?;
            return Ok(());
        }

        info!("Stopping {} (PID {})", role.name(), record.pid);
        signal_process(record.pid, Signal::SIGTERM)?;

        let deadline = tokio::time::Instant::now() + TERMINATE_GRACE;
        while tokio::time::Instant::now() < deadline {
            if !process_alive(record.pid) {
                self.remove_record(role)?;
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        warn!(
            "{} (PID {}) did not stop within grace period; sending SIGKILL",
            role.name(),
            record.pid
        );
        signal_process(record.pid, Signal::SIGKILL)?;
        self.remove_record(role)?;
        Ok(())
    }

    /// Recovery fallback: signal every process whose command line carries
    /// the exact config file this engine manages. Never matches unrelated
    /// processes. Opt-in and loudly logged; normal termination goes
    /// through the PID record.
    pub fn terminate_relay_by_scan(&self) -> Result<usize> {
        let pids = self.find_relay_pids();
        if pids.is_empty() {
            return Ok(0);
        }

        warn!(
            "Recovery fallback: stopping {} relay process(es) matched by config path {}",
            pids.len(),
            self.tor_config.display()
        );

        let mut stopped = 0;
        for pid in pids {
            match signal_process(pid, Signal::SIGTERM) {
                Ok(()) => stopped += 1,
                Err(e) => warn!("Could not signal PID {}: {}", pid, e),
            }
        }
        let _ = self.remove_record(ProcessRole::Relay);
        Ok(stopped)
    }

    /// Whether a PID record exists for the role, live or not
    pub fn has_record(&self, role: ProcessRole) -> bool {
        matches!(self.read_record(role), Ok(Some(_)))
    }

    /// Liveness probe for status reporting
    pub fn is_running(&self, role: ProcessRole) -> bool {
        match self.read_record(role) {
            Ok(Some(record)) => {
                process_alive(record.pid)
                    && cmdline_contains(record.pid, &signature_token(&record.argv))
            },
            _ => false,
        }
    }

    /// PIDs of live processes whose command line contains our config path
    fn find_relay_pids(&self) -> Vec<u32> {
        let pattern = self.tor_config.to_string_lossy();
        let output = match std::process::Command::new("pgrep")
            .arg("-f")
            .arg(pattern.as_ref())
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                debug!("pgrep unavailable ({}); skipping relay scan", e);
                return Vec::new();
            },
        };

        let own_pid = std::process::id();
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.trim().parse::<u32>().ok())
            .filter(|&pid| pid != own_pid)
            // pgrep patterns are regexes; confirm the literal path match
            .filter(|&pid| cmdline_contains(pid, &pattern))
            .collect()
    }

    fn record_path(&self, role: ProcessRole) -> PathBuf {
        self.run_dir.join(role.record_name())
    }

    fn read_record(&self, role: ProcessRole) -> Result<Option<PidRecord>> {
        let path = self.record_path(role);
        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    warn!("Corrupt PID record {}; discarding: {}", path.display(), e);
                    let _ = std::fs::remove_file(&path);
                    Ok(None)
                },
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::State { path, source: e }),
        }
    }

    fn write_record(&self, role: ProcessRole, record: &PidRecord) -> Result<()> {
        let path = self.record_path(role);
        std::fs::create_dir_all(&self.run_dir).map_err(|e| Error::State {
            path: path.clone(),
            source: e,
        })?;
        let content = serde_json::to_string(record).map_err(|e| Error::State {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        std::fs::write(&path, content).map_err(|e| Error::State { path, source: e })
    }

    fn remove_record(&self, role: ProcessRole) -> Result<()> {
        let path = self.record_path(role);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::State { path, source: e }),
        }
    }
}

/// The part of an invocation that identifies the process later: the
/// config file argument when one is present, else the program name.
fn signature_token(argv: &[String]) -> String {
    argv.iter()
        .position(|a| a == "-f" || a == "-c")
        .and_then(|i| argv.get(i + 1))
        .cloned()
        .unwrap_or_else(|| argv.first().cloned().unwrap_or_default())
}

/// Signal-0 liveness probe
fn process_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

fn signal_process(pid: u32, signal: Signal) -> Result<()> {
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(()),
        // Already gone is what termination wanted anyway
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(Error::Io(std::io::Error::from_raw_os_error(e as i32))),
    }
}

/// Whether the live process's command line contains the given token.
/// Reads /proc where available, falling back to ps.
fn cmdline_contains(pid: u32, token: &str) -> bool {
    let proc_path = format!("/proc/{}/cmdline", pid);
    if let Ok(raw) = std::fs::read(&proc_path) {
        let cmdline: String = raw
            .split(|&b| b == 0)
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(" ");
        return cmdline.contains(token);
    }

    std::process::Command::new("ps")
        .args(["-o", "args=", "-p", &pid.to_string()])
        .output()
        .map(|o| String::from_utf8_lossy(&o.stdout).contains(token))
        .unwrap_or(false)
}
