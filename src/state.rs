//! Persisted service configuration
//!
//! One JSON record describing what the engine publishes and how. Created
//! with defaults on first run, overwritten on change, never deleted.
//! The record is passed explicitly through every orchestration call;
//! persistence is a side effect at the edges, not ambient global state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default listen port for the managed local server
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// How content behind the hidden service is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostingMethod {
    /// Serve a directory through the engine-managed local server
    DirectFileServing,
    /// Forward to a caller-operated server on a local port
    ForwardedPort,
}

impl std::fmt::Display for HostingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostingMethod::DirectFileServing => write!(f, "direct-file-serving"),
            HostingMethod::ForwardedPort => write!(f, "forwarded-port"),
        }
    }
}

/// The persisted service configuration record
///
/// Exactly one of `site_dir` / `forward_port` is meaningful, selected by
/// `method`. The setters below clear the opposite field; `start` rejects
/// a hand-edited record where both are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub method: HostingMethod,

    /// Target directory for direct file serving
    pub site_dir: Option<PathBuf>,

    /// Target port for the forwarded-port method
    pub forward_port: Option<u16>,

    /// Listen port of the managed local server
    pub server_port: u16,

    /// Published address; None until a bootstrap has completed
    pub onion_address: Option<String>,

    /// Set while the service is considered up
    pub running: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            method: HostingMethod::DirectFileServing,
            site_dir: None,
            forward_port: None,
            server_port: DEFAULT_SERVER_PORT,
            onion_address: None,
            running: false,
        }
    }
}

impl ServiceConfig {
    /// Select file serving from the given directory
    pub fn set_site_dir(&mut self, dir: PathBuf) {
        self.method = HostingMethod::DirectFileServing;
        self.site_dir = Some(dir);
        self.forward_port = None;
    }

    /// Select forwarding to the given local port
    pub fn set_forward_port(&mut self, port: u16) {
        self.method = HostingMethod::ForwardedPort;
        self.forward_port = Some(port);
        self.site_dir = None;
    }

    /// The local port the relay should forward onto for the active method
    pub fn relay_target_port(&self) -> Option<u16> {
        match self.method {
            HostingMethod::DirectFileServing => Some(self.server_port),
            HostingMethod::ForwardedPort => self.forward_port,
        }
    }

    /// Load the record from disk, or defaults when no file exists yet
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| Error::State {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServiceConfig::default()),
            Err(e) => Err(Error::State {
                path: path.to_path_buf(),
                source: e,
            }),
        }
    }

    /// Persist the record, creating the parent directory as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::State {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let content = serde_json::to_string_pretty(self).map_err(|e| Error::State {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;

        std::fs::write(path, content).map_err(|e| Error::State {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_on_first_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.method, HostingMethod::DirectFileServing);
        assert_eq!(config.server_port, DEFAULT_SERVER_PORT);
        assert!(config.onion_address.is_none());
        assert!(!config.running);
    }

    #[test]
    fn round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = ServiceConfig::default();
        config.set_forward_port(3000);
        config.onion_address = Some("abc.onion".to_string());
        config.save(&path).unwrap();

        let loaded = ServiceConfig::load(&path).unwrap();
        assert_eq!(loaded.method, HostingMethod::ForwardedPort);
        assert_eq!(loaded.forward_port, Some(3000));
        assert_eq!(loaded.onion_address.as_deref(), Some("abc.onion"));
    }

    #[test]
    fn setters_keep_methods_exclusive() {
        let mut config = ServiceConfig::default();
        config.set_site_dir(PathBuf::from("/site"));
        config.set_forward_port(3000);

        assert!(config.site_dir.is_none());
        assert_eq!(config.forward_port, Some(3000));
        assert_eq!(config.relay_target_port(), Some(3000));

        config.set_site_dir(PathBuf::from("/site"));
        assert!(config.forward_port.is_none());
        assert_eq!(config.relay_target_port(), Some(config.server_port));
    }
}
