//! Bootstrap progress monitoring
//!
//! The relay reports its startup as semi-structured notice lines:
//!
//! ```text
//! ... [notice] Bootstrapped 50% (loading_descriptors): Loading relay descriptors
//! ```
//!
//! A dedicated parser turns each line into a typed event, and a watch
//! loop applies events to a bounded, monotonic progress state machine.
//! Percentages never move backwards within one watch; duplicate or
//! reordered log delivery is ignored. The watch ends in `Live` at 100%,
//! `Failed` on relay exit, `TimedOut` at the wall-clock bound (the relay
//! itself is left running; it may still converge), or `Cancelled`.

use regex::Regex;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default wall-clock bound for one bootstrap watch
pub const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(120);

/// Progress phases, bucketed from the reported percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapPhase {
    Idle,
    Connecting,
    DirectoryLookup,
    DescriptorLoad,
    NetworkStatus,
    CircuitBuild,
    Live,
}

impl BootstrapPhase {
    pub fn from_percent(percent: u8) -> Self {
        match percent {
            0..=9 => BootstrapPhase::Connecting,
            10..=49 => BootstrapPhase::DirectoryLookup,
            50..=74 => BootstrapPhase::DescriptorLoad,
            75..=89 => BootstrapPhase::NetworkStatus,
            90..=99 => BootstrapPhase::CircuitBuild,
            _ => BootstrapPhase::Live,
        }
    }
}

/// Live progress of one launch attempt
#[derive(Debug, Clone)]
pub struct BootstrapState {
    pub percent: u8,
    pub status: String,
    pub phase: BootstrapPhase,
}

impl Default for BootstrapState {
    fn default() -> Self {
        BootstrapState {
            percent: 0,
            status: String::new(),
            phase: BootstrapPhase::Idle,
        }
    }
}

/// Shared, lockable view of the current bootstrap state
pub type SharedBootstrapState = Arc<Mutex<BootstrapState>>;

/// One parsed progress event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapEvent {
    pub percent: u8,
    pub message: String,
}

/// How a watch ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Reached 100%
    Live,
    /// The relay exited or its output closed before 100%
    Failed { last_line: Option<String> },
    /// The wall-clock bound elapsed; the relay is still running
    TimedOut { percent: u8 },
    /// The caller cancelled; the relay is untouched
    Cancelled,
}

fn bootstrap_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Covers both the modern "(tag): Message" form and older
        // tag-less notices.
        Regex::new(r"Bootstrapped (\d{1,3})%(?:\s*\(([^)]*)\))?(?::\s*(.*))?$")
            .expect("bootstrap pattern is valid")
    })
}

/// Parse one diagnostic line into a typed progress event.
/// Lines without a bootstrap notice, and percentages over 100, yield None.
pub fn parse_bootstrap_line(line: &str) -> Option<BootstrapEvent> {
    let captures = bootstrap_pattern().captures(line)?;
    let percent: u8 = captures.get(1)?.as_str().parse().ok()?;
    if percent > 100 {
        return None;
    }

    let message = captures
        .get(3)
        .map(|m| m.as_str().trim())
        .filter(|m| !m.is_empty())
        .or_else(|| captures.get(2).map(|m| m.as_str().trim()))
        .unwrap_or("Connecting...")
        .to_string();

    Some(BootstrapEvent { percent, message })
}

/// Watches one bootstrap attempt on the relay's output stream
#[derive(Debug, Clone)]
pub struct BootstrapMonitor {
    timeout: Duration,
}

impl Default for BootstrapMonitor {
    fn default() -> Self {
        BootstrapMonitor {
            timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
        }
    }
}

impl BootstrapMonitor {
    pub fn new(timeout: Duration) -> Self {
        BootstrapMonitor { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Consume the relay's output line by line, updating `state` and
    /// invoking `on_progress` for every strictly increasing percentage.
    /// The callback sees each distinct percentage at most once, in
    /// non-decreasing order. Returns when 100% is reached, the stream
    /// ends, the timeout elapses, or `cancel` fires; the relay process
    /// is never signalled from here.
    pub async fn watch<R, F>(
        &self,
        output: R,
        cancel: CancellationToken,
        state: SharedBootstrapState,
        mut on_progress: F,
    ) -> WatchOutcome
    where
        R: AsyncRead + Unpin,
        F: FnMut(u8, &str),
    {
        let mut lines = BufReader::new(output).lines();
        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut last_percent: u8 = 0;
        let mut last_line: Option<String> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Bootstrap watch cancelled at {}%", last_percent);
                    return WatchOutcome::Cancelled;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!("Bootstrap did not complete within {:?} (reached {}%)", self.timeout, last_percent);
                    return WatchOutcome::TimedOut { percent: last_percent };
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            debug!("tor: {}", line);
                            let Some(event) = parse_bootstrap_line(&line) else {
                                last_line = Some(line);
                                continue;
                            };
                            last_line = Some(line);

                            // Equal or lower percentages are duplicate or
                            // reordered delivery; ignore them.
                            if event.percent <= last_percent {
                                continue;
                            }

                            last_percent = event.percent;
                            self.apply(&state, &event);
                            on_progress(event.percent, &event.message);

                            if event.percent == 100 {
                                return WatchOutcome::Live;
                            }
                        }
                        Ok(None) => {
                            return WatchOutcome::Failed { last_line };
                        }
                        Err(e) => {
                            warn!("Error reading relay output: {}", e);
                            return WatchOutcome::Failed { last_line };
                        }
                    }
                }
            }
        }
    }

    fn apply(&self, state: &SharedBootstrapState, event: &BootstrapEvent) {
        if let Ok(mut state) = state.lock() {
            state.percent = event.percent;
            state.status = event.message.clone();
            state.phase = BootstrapPhase::from_percent(event.percent);
        }
    }
}
