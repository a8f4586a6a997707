//! Test utilities and fixtures for onionhost
//!
//! Scripted stand-ins for the tor and nginx daemons, scratch platform
//! profiles pointing into temp directories, and small site fixtures.

use onionhost::platform::{PlatformId, PlatformPaths};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Create a site directory containing an index file
pub fn create_site_dir(base: &Path) -> PathBuf {
    let site = base.join("site");
    std::fs::create_dir_all(&site).expect("Failed to create site dir");
    std::fs::write(site.join("index.html"), "<html>hello</html>").expect("Failed to write index");
    site
}

/// Platform profile pointing every path into a scratch directory, with
/// no service account so permission normalization stays local.
pub fn scratch_paths(base: &Path) -> PlatformPaths {
    let mut paths = PlatformPaths::resolve(PlatformId::Unknown);
    paths.tor_config = base.join("torrc");
    paths.tor_data_dir = base.join("tor-data");
    paths.nginx_sites_available = base.join("sites-available");
    paths.nginx_sites_enabled = base.join("sites-enabled");
    paths
}

/// Write an executable shell script and return its path
pub fn write_script(path: &Path, body: &str) -> PathBuf {
    let content = format!("#!/bin/sh\n{}\n", body);
    std::fs::write(path, content).expect("Failed to write script");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .expect("Failed to mark script executable");
    }

    path.to_path_buf()
}

/// A fake relay that logs each spawn, emits a bootstrap sequence on
/// stdout, writes the hostname file, and then lingers like a daemon.
pub fn fake_relay_script(
    base: &Path,
    hs_dir: &Path,
    spawn_log: &Path,
    percents: &[u8],
    address: Option<&str>,
) -> PathBuf {
    let mut body = String::new();
    body.push_str(&format!("echo started >> {}\n", spawn_log.display()));
    if let Some(address) = address {
        body.push_str(&format!("mkdir -p {}\n", hs_dir.display()));
        body.push_str(&format!(
            "echo {} > {}/hostname\n",
            address,
            hs_dir.display()
        ));
    }
    for percent in percents {
        body.push_str(&format!(
            "echo '[notice] Bootstrapped {}% (phase_{}): Phase at {} percent'\n",
            percent, percent, percent
        ));
    }
    body.push_str("sleep 30\n");

    write_script(&base.join("fake-tor.sh"), &body)
}

/// A fake local server that just lingers; tests bind the loopback port
/// themselves so reachability checks have something to connect to.
pub fn fake_server_script(base: &Path) -> PathBuf {
    write_script(&base.join("fake-nginx.sh"), "sleep 30")
}

/// Count lines in the spawn log (zero when never spawned)
pub fn spawn_count(spawn_log: &Path) -> usize {
    std::fs::read_to_string(spawn_log)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}
