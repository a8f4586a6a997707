//! Relay config stanza writer
//!
//! Maintains a clearly delimited, engine-owned section of the relay's
//! config file holding exactly one HiddenServiceDir/HiddenServicePort
//! pair. All unrelated content is preserved. Writes go to a temporary
//! file in the target directory and are renamed into place, so a failed
//! write never leaves a partial config behind.

use crate::error::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

const SECTION_BEGIN: &str = "# BEGIN onionhost managed section";
const SECTION_END: &str = "# END onionhost managed section";

/// Virtual port the hidden service is published on
pub const HIDDEN_SERVICE_VIRTUAL_PORT: u16 = 80;

/// Path of the one-time backup taken before the first modification
pub fn backup_path(torrc: &Path) -> PathBuf {
    let mut name = torrc
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "torrc".to_string());
    name.push_str(".onionhost.bak");
    torrc.with_file_name(name)
}

/// Ensure the relay config contains exactly one forwarding stanza for
/// `hs_dir`, pointing at `target_port`. Re-running with the same
/// arguments leaves the file byte-identical; a port change rewrites the
/// managed section in place.
pub fn write_stanza(torrc: &Path, hs_dir: &Path, target_port: u16) -> Result<()> {
    let (existing, file_present) = match std::fs::read_to_string(torrc) {
        Ok(content) => (content, true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (String::new(), false),
        Err(e) => {
            return Err(Error::ConfigWrite {
                path: torrc.to_path_buf(),
                source: e,
            })
        },
    };

    let mut retained: Vec<&str> = Vec::new();
    let mut in_section = false;
    for line in existing.lines() {
        if line.trim() == SECTION_BEGIN {
            in_section = true;
            continue;
        }
        if line.trim() == SECTION_END {
            in_section = false;
            continue;
        }
        if in_section {
            continue;
        }
        // Distribution torrc files ship commented HiddenService examples;
        // a stray uncommenting or a parser quirk around them has bitten
        // enough people that we strip them outright.
        if is_commented_example(line) {
            debug!("Stripping commented example line: {}", line.trim());
            continue;
        }
        retained.push(line);
    }

    while retained.last().is_some_and(|l| l.trim().is_empty()) {
        retained.pop();
    }

    let mut output = String::new();
    if !retained.is_empty() {
        output.push_str(&retained.join("\n"));
        output.push_str("\n\n");
    }
    output.push_str(SECTION_BEGIN);
    output.push('\n');
    output.push_str(&format!("HiddenServiceDir {}\n", hs_dir.display()));
    output.push_str(&format!(
        "HiddenServicePort {} 127.0.0.1:{}\n",
        HIDDEN_SERVICE_VIRTUAL_PORT, target_port
    ));
    output.push_str(SECTION_END);
    output.push('\n');

    if existing == output {
        debug!("Relay config already up to date: {}", torrc.display());
        return Ok(());
    }

    if file_present {
        take_backup_once(torrc)?;
    }
    atomic_write(torrc, &output)?;
    info!(
        "Relay config updated: {} -> 127.0.0.1:{}",
        hs_dir.display(),
        target_port
    );
    Ok(())
}

/// Commented-out HiddenService example line shipped by distributions
fn is_commented_example(line: &str) -> bool {
    let trimmed = line.trim_start();
    let Some(rest) = trimmed.strip_prefix('#') else {
        return false;
    };
    let rest = rest.trim_start();
    rest.starts_with("HiddenServiceDir") || rest.starts_with("HiddenServicePort")
}

fn take_backup_once(torrc: &Path) -> Result<()> {
    let backup = backup_path(torrc);
    if backup.exists() {
        return Ok(());
    }
    std::fs::copy(torrc, &backup).map_err(|e| Error::ConfigWrite {
        path: backup.clone(),
        source: e,
    })?;
    info!("Backed up original relay config to {}", backup.display());
    Ok(())
}

/// Write via a sibling temp file plus rename; never leaves partial content
pub(crate) fn atomic_write(target: &Path, content: &str) -> Result<()> {
    let parent = target.parent().filter(|p| !p.as_os_str().is_empty()).ok_or_else(|| {
        Error::ConfigWrite {
            path: target.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "config path has no parent directory",
            ),
        }
    })?;

    let map_err = |e: std::io::Error| Error::ConfigWrite {
        path: target.to_path_buf(),
        source: e,
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(map_err)?;
    tmp.write_all(content.as_bytes()).map_err(map_err)?;
    tmp.flush().map_err(map_err)?;
    tmp.persist(target).map_err(|e| map_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn commented_examples_detected() {
        assert!(is_commented_example("#HiddenServiceDir /var/lib/tor/hs"));
        assert!(is_commented_example("  # HiddenServicePort 80 127.0.0.1:80"));
        assert!(!is_commented_example("HiddenServiceDir /var/lib/tor/hs"));
        assert!(!is_commented_example("# SocksPort 9050"));
    }

    #[test]
    fn creates_file_when_absent() {
        let dir = tempdir().unwrap();
        let torrc = dir.path().join("torrc");

        write_stanza(&torrc, Path::new("/var/lib/tor/onionhost"), 8080).unwrap();

        let content = std::fs::read_to_string(&torrc).unwrap();
        assert!(content.contains("HiddenServiceDir /var/lib/tor/onionhost"));
        assert!(content.contains("HiddenServicePort 80 127.0.0.1:8080"));
        // No backup of a file that never existed
        assert!(!backup_path(&torrc).exists());
    }

    #[test]
    fn missing_parent_is_config_write_error() {
        let dir = tempdir().unwrap();
        let torrc = dir.path().join("no-such-dir").join("torrc");

        let err = write_stanza(&torrc, Path::new("/hs"), 8080).unwrap_err();
        assert!(matches!(err, Error::ConfigWrite { .. }));
    }
}
