//! Port and site-directory validation
//!
//! Local checks only. Whether a port is already bound is a launch-time
//! concern of the process supervisor, not of this module.

use crate::error::{Error, Result};
use std::path::Path;

/// Ports the Tor network reserves for its own SOCKS and control channels.
/// These can never be forwarded to: 9050/9051 belong to the system
/// daemon, 9150/9151 to Tor Browser's bundled instance.
pub const TOR_RESERVED_PORTS: [u16; 4] = [9050, 9051, 9150, 9151];

/// Index files accepted as site entry points
pub const INDEX_FILES: [&str; 3] = ["index.html", "index.htm", "index.php"];

/// Outcome of a port policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortCheck {
    Ok,
    /// Allowed but flagged; the caller decides how loudly to surface it
    Warning(String),
    Rejected(String),
}

/// Check a port against the engine's policy, rules in order:
/// out of range, reserved by Tor, privileged, ok.
pub fn check_port(port: u16) -> PortCheck {
    if port == 0 {
        return PortCheck::Rejected("port must be in the range 1-65535".to_string());
    }

    if TOR_RESERVED_PORTS.contains(&port) {
        return PortCheck::Rejected(format!(
            "port {} is reserved by Tor for its own SOCKS/control channels",
            port
        ));
    }

    if port <= 1023 {
        return PortCheck::Warning(format!(
            "port {} is privileged; binding it requires elevated rights",
            port
        ));
    }

    PortCheck::Ok
}

/// Validate a directory intended for file serving: it must exist, be a
/// directory, and contain a recognized index file.
pub fn validate_site_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Err(Error::validation(
            "site directory",
            format!("{} does not exist", dir.display()),
        ));
    }

    if !dir.is_dir() {
        return Err(Error::validation(
            "site directory",
            format!("{} is not a directory", dir.display()),
        ));
    }

    let has_index = INDEX_FILES.iter().any(|name| dir.join(name).exists());
    if !has_index {
        return Err(Error::validation(
            "site directory",
            format!(
                "no index file found in {}; expected one of: {}",
                dir.display(),
                INDEX_FILES.join(", ")
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_port_rejected() {
        assert!(matches!(check_port(0), PortCheck::Rejected(_)));
    }

    #[test]
    fn reserved_ports_rejected() {
        for port in TOR_RESERVED_PORTS {
            assert!(
                matches!(check_port(port), PortCheck::Rejected(_)),
                "port {} should be rejected",
                port
            );
        }
    }

    #[test]
    fn privileged_port_warns() {
        assert!(matches!(check_port(80), PortCheck::Warning(_)));
        assert!(matches!(check_port(443), PortCheck::Warning(_)));
        assert!(matches!(check_port(1023), PortCheck::Warning(_)));
    }

    #[test]
    fn unprivileged_port_ok() {
        assert_eq!(check_port(8080), PortCheck::Ok);
        assert_eq!(check_port(1024), PortCheck::Ok);
        assert_eq!(check_port(65535), PortCheck::Ok);
    }
}
