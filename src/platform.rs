//! Platform resolution
//!
//! Maps the host OS/distribution to the config paths, service account,
//! and executable invocations the engine needs. Resolution is a lookup
//! table keyed by a platform tag, resolved once at startup; it never
//! fails. An unrecognized host falls back to a direct-invocation,
//! current-account profile and the caller gets a warning, not an error.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Platform identity tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformId {
    Debian,
    Arch,
    RedHat,
    Darwin,
    Termux,
    Unknown,
}

impl PlatformId {
    /// Detect the platform of the running host
    pub fn detect() -> Self {
        if env::var_os("TERMUX_VERSION").is_some() || Path::new("/data/data/com.termux").exists() {
            return PlatformId::Termux;
        }

        if cfg!(target_os = "macos") {
            return PlatformId::Darwin;
        }

        if cfg!(target_os = "linux") {
            if let Ok(content) = fs::read_to_string("/etc/os-release") {
                return Self::classify_os_release(&content);
            }
        }

        PlatformId::Unknown
    }

    /// Classify an os-release file into a distribution family
    fn classify_os_release(content: &str) -> Self {
        let content = content.to_lowercase();

        let debian_like = ["debian", "ubuntu", "mint", "pop", "elementary", "zorin"];
        let arch_like = ["arch", "manjaro", "endeavour", "garuda"];
        let redhat_like = ["rhel", "fedora", "centos", "rocky", "alma"];

        if debian_like.iter().any(|d| content.contains(d)) {
            PlatformId::Debian
        } else if arch_like.iter().any(|d| content.contains(d)) {
            PlatformId::Arch
        } else if redhat_like.iter().any(|d| content.contains(d)) {
            PlatformId::RedHat
        } else {
            PlatformId::Unknown
        }
    }
}

/// Resolved paths, accounts, and invocations for one host
///
/// Fields are public so tests and embedders can point the engine at a
/// scratch tree instead of the system locations.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    pub id: PlatformId,

    /// The relay's main config file (torrc)
    pub tor_config: PathBuf,

    /// Base directory for hidden-service state (key material, hostname)
    pub tor_data_dir: PathBuf,

    /// Where the engine-owned nginx fragment is written
    pub nginx_sites_available: PathBuf,

    /// Where the fragment is linked into the active set. Equal to
    /// `nginx_sites_available` on platforms whose conf.d is the active set.
    pub nginx_sites_enabled: PathBuf,

    /// Relay executable name
    pub tor_program: String,

    /// Local server executable name
    pub nginx_program: String,

    /// System account the relay must run as, where the platform uses a
    /// privilege-separated tor account. None means invoke directly.
    pub tor_run_as: Option<String>,

    /// Account and group expected to own the hidden-service directory.
    /// None leaves ownership with the invoking account.
    pub hs_owner: Option<(String, String)>,

    /// Set when the host was not recognized and defaults were substituted
    pub fallback: bool,
}

impl PlatformPaths {
    /// Resolve the path/account profile for a platform tag
    pub fn resolve(id: PlatformId) -> Self {
        match id {
            PlatformId::Debian => Self::linux_profile(
                id,
                Some("debian-tor"),
                ("debian-tor", "debian-tor"),
                "/etc/nginx/sites-available",
                "/etc/nginx/sites-enabled",
            ),
            PlatformId::Arch => Self::linux_profile(
                id,
                Some("tor"),
                ("tor", "tor"),
                "/etc/nginx/sites-available",
                "/etc/nginx/sites-enabled",
            ),
            PlatformId::RedHat => Self::linux_profile(
                id,
                Some("tor"),
                ("tor", "tor"),
                "/etc/nginx/conf.d",
                "/etc/nginx/conf.d",
            ),
            PlatformId::Darwin => PlatformPaths {
                id,
                tor_config: PathBuf::from("/usr/local/etc/tor/torrc"),
                tor_data_dir: PathBuf::from("/usr/local/var/lib/tor"),
                nginx_sites_available: PathBuf::from("/usr/local/etc/nginx/servers"),
                nginx_sites_enabled: PathBuf::from("/usr/local/etc/nginx/servers"),
                tor_program: "tor".to_string(),
                nginx_program: "nginx".to_string(),
                tor_run_as: None,
                hs_owner: None,
                fallback: false,
            },
            PlatformId::Termux => {
                let prefix = env::var("PREFIX")
                    .unwrap_or_else(|_| "/data/data/com.termux/files/usr".to_string());
                let home = home_dir();
                PlatformPaths {
                    id,
                    tor_config: PathBuf::from(&prefix).join("etc/tor/torrc"),
                    tor_data_dir: home.join(".tor"),
                    nginx_sites_available: PathBuf::from(&prefix).join("etc/nginx/sites-available"),
                    nginx_sites_enabled: PathBuf::from(&prefix).join("etc/nginx/sites-enabled"),
                    tor_program: "tor".to_string(),
                    nginx_program: "nginx".to_string(),
                    tor_run_as: None,
                    hs_owner: None,
                    fallback: false,
                }
            },
            PlatformId::Unknown => {
                // Direct-invocation, current-account profile under $HOME
                let base = home_dir().join(".onionhost");
                PlatformPaths {
                    id,
                    tor_config: base.join("torrc"),
                    tor_data_dir: base.join("tor-data"),
                    nginx_sites_available: base.join("nginx"),
                    nginx_sites_enabled: base.join("nginx"),
                    tor_program: "tor".to_string(),
                    nginx_program: "nginx".to_string(),
                    tor_run_as: None,
                    hs_owner: None,
                    fallback: true,
                }
            },
        }
    }

    fn linux_profile(
        id: PlatformId,
        run_as: Option<&str>,
        owner: (&str, &str),
        sites_available: &str,
        sites_enabled: &str,
    ) -> Self {
        PlatformPaths {
            id,
            tor_config: PathBuf::from("/etc/tor/torrc"),
            tor_data_dir: PathBuf::from("/var/lib/tor"),
            nginx_sites_available: PathBuf::from(sites_available),
            nginx_sites_enabled: PathBuf::from(sites_enabled),
            tor_program: "tor".to_string(),
            nginx_program: "nginx".to_string(),
            tor_run_as: run_as.map(String::from),
            hs_owner: Some((owner.0.to_string(), owner.1.to_string())),
            fallback: false,
        }
    }

    /// Resolve the profile for the running host
    pub fn for_host() -> Self {
        Self::resolve(PlatformId::detect())
    }

    /// Hidden-service directory managed by this engine
    pub fn hidden_service_dir(&self) -> PathBuf {
        self.tor_data_dir.join("onionhost")
    }

    /// Full argv for launching the relay against the managed config file
    pub fn tor_invocation(&self) -> Vec<String> {
        let config = self.tor_config.to_string_lossy().to_string();
        match &self.tor_run_as {
            Some(account) => vec![
                "sudo".to_string(),
                "-u".to_string(),
                account.clone(),
                self.tor_program.clone(),
                "-f".to_string(),
                config,
            ],
            None => vec![self.tor_program.clone(), "-f".to_string(), config],
        }
    }

    /// Full argv for launching the local server as a supervised child
    pub fn nginx_invocation(&self) -> Vec<String> {
        vec![
            self.nginx_program.clone(),
            "-g".to_string(),
            "daemon off;".to_string(),
        ]
    }
}

/// Whether an executable resolves on PATH
pub fn command_on_path(program: &str) -> bool {
    std::process::Command::new("which")
        .arg(program)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Home directory of the invoking account
pub fn home_dir() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
