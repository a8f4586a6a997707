//! Hidden-service directory normalization
//!
//! The relay refuses to start against a hidden-service directory with a
//! mode looser than owner-only, so enforcing 700 here is a precondition
//! of every launch, not a best-effort nicety. Ownership follows the
//! platform's tor account where one exists; failures are reported, never
//! swallowed, because they reliably predict relay startup failure.

use crate::error::{Error, Result};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

/// Relay-managed file carrying the published address
pub const HOSTNAME_FILE: &str = "hostname";

/// Create the hidden-service directory if absent and enforce owner-only
/// mode plus the expected owning account.
pub fn enforce(dir: &Path, owner: Option<(&str, &str)>) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| Error::Permission {
        path: dir.to_path_buf(),
        reason: format!("could not create directory: {}", e),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        std::fs::set_permissions(dir, perms).map_err(|e| Error::Permission {
            path: dir.to_path_buf(),
            reason: format!("could not set mode 700: {}", e),
        })?;
    }

    if let Some((user, group)) = owner {
        chown_recursive(dir, user, group)?;
    } else {
        debug!(
            "No service account on this platform; {} stays owned by the invoking account",
            dir.display()
        );
    }

    info!("Hidden service directory ready: {}", dir.display());
    Ok(())
}

/// Set ownership via chown. Skipped with a warning when the account does
/// not exist on this host (e.g. tor installed without its package user).
fn chown_recursive(dir: &Path, user: &str, group: &str) -> Result<()> {
    let account_exists = Command::new("id")
        .arg("-u")
        .arg(user)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);

    if !account_exists {
        warn!(
            "Account {} not present on this host; leaving ownership of {} unchanged",
            user,
            dir.display()
        );
        return Ok(());
    }

    let output = Command::new("chown")
        .arg("-R")
        .arg(format!("{}:{}", user, group))
        .arg(dir)
        .output()
        .map_err(|e| Error::Permission {
            path: dir.to_path_buf(),
            reason: format!("could not run chown: {}", e),
        })?;

    if !output.status.success() {
        return Err(Error::Permission {
            path: dir.to_path_buf(),
            reason: format!(
                "chown to {}:{} failed: {}",
                user,
                group,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }

    debug!("Ownership of {} set to {}:{}", dir.display(), user, group);
    Ok(())
}

/// Read the published address from the relay-managed hostname file.
/// This engine only ever reads it; the relay writes it once bootstrap
/// completes.
pub fn read_hostname(dir: &Path) -> Result<String> {
    let path = dir.join(HOSTNAME_FILE);
    let content = std::fs::read_to_string(&path)?;
    let address = content.trim().to_string();
    if address.is_empty() {
        return Err(Error::BootstrapFailed {
            reason: format!("{} exists but is empty", path.display()),
        });
    }
    Ok(address)
}
