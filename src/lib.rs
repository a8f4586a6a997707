//! onionhost - publish local content as a Tor hidden service
//!
//! This library supervises a system tor process and a local nginx
//! instance directly (no service manager), generates their config
//! stanzas idempotently, enforces the hidden-service directory's
//! permissions, and parses tor's live bootstrap output into a monotonic
//! progress state machine surfaced through a caller-supplied callback.

pub mod bootstrap;
pub mod error;
pub mod hsdir;
pub mod nginx;
pub mod platform;
pub mod service;
pub mod state;
pub mod supervisor;
pub mod torrc;
pub mod validate;

pub use bootstrap::{BootstrapMonitor, BootstrapPhase, BootstrapState, WatchOutcome};
pub use error::{Error, Result};
pub use platform::{PlatformId, PlatformPaths};
pub use service::{ServiceManager, ServiceStatus};
pub use state::{HostingMethod, ServiceConfig};
pub use supervisor::{LaunchOutcome, ProcessRole, Supervisor};
pub use validate::{check_port, validate_site_dir, PortCheck, TOR_RESERVED_PORTS};
