//! Local server config fragment writer
//!
//! Emits one engine-owned virtual-host block bound to loopback, serving
//! the target directory, and links it into the server's active-sites
//! set. Re-running overwrites the fragment; nothing is ever appended to
//! the server's main configuration.
//!
//! Access logging is disabled in the fragment: the relay network already
//! anonymizes clients, and a local access log would leak this host's own
//! view of request timing.

use crate::error::{Error, Result};
use crate::platform::PlatformPaths;
use crate::torrc::atomic_write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the engine-owned fragment
pub const SITE_CONFIG_NAME: &str = "onionhost.conf";

/// Render the virtual-host block for a site root on a loopback port
fn render(site_root: &Path, port: u16, error_log: &Path) -> String {
    format!(
        r#"server {{
    listen 127.0.0.1:{port};
    server_name localhost;

    # Hide server identity from responses
    server_tokens off;
    add_header X-Frame-Options "SAMEORIGIN" always;
    add_header X-Content-Type-Options "nosniff" always;
    add_header X-XSS-Protection "1; mode=block" always;
    add_header Referrer-Policy "no-referrer" always;

    root {root};
    index index.html index.htm;

    location / {{
        try_files $uri $uri/ =404;
    }}

    access_log off;
    error_log {error_log};
}}
"#,
        port = port,
        root = site_root.display(),
        error_log = error_log.display(),
    )
}

/// Write the engine-owned site fragment and link it into the active set.
/// Returns the fragment path. Idempotent: a second run with the same
/// arguments leaves the fragment and link unchanged.
pub fn write_site_config(
    paths: &PlatformPaths,
    site_root: &Path,
    port: u16,
    error_log: &Path,
) -> Result<PathBuf> {
    let fragment = paths.nginx_sites_available.join(SITE_CONFIG_NAME);
    let content = render(site_root, port, error_log);

    std::fs::create_dir_all(&paths.nginx_sites_available).map_err(|e| Error::ConfigWrite {
        path: fragment.clone(),
        source: e,
    })?;

    atomic_write(&fragment, &content)?;
    info!("Local server config written: {}", fragment.display());

    link_into_enabled(paths, &fragment)?;
    Ok(fragment)
}

/// Link the fragment into the active-sites directory. Platforms whose
/// conf.d is the active set need no link.
fn link_into_enabled(paths: &PlatformPaths, fragment: &Path) -> Result<()> {
    if paths.nginx_sites_enabled == paths.nginx_sites_available {
        return Ok(());
    }

    let link = paths.nginx_sites_enabled.join(SITE_CONFIG_NAME);
    let map_err = |e: std::io::Error| Error::ConfigWrite {
        path: link.clone(),
        source: e,
    };

    std::fs::create_dir_all(&paths.nginx_sites_enabled).map_err(map_err)?;

    match std::fs::symlink_metadata(&link) {
        Ok(_) => {
            // Replace whatever is there so re-runs never stack duplicates
            std::fs::remove_file(&link).map_err(map_err)?;
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => return Err(map_err(e)),
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(fragment, &link).map_err(map_err)?;
    #[cfg(not(unix))]
    std::fs::copy(fragment, &link).map(|_| ()).map_err(map_err)?;

    debug!("Site enabled: {} -> {}", link.display(), fragment.display());
    Ok(())
}
