//! Relay config writer properties: idempotency, pure port updates,
//! preservation of unrelated content, example stripping, backup.

mod test_utils;

use onionhost::torrc::{backup_path, write_stanza};
use std::path::Path;
use test_utils::*;

#[test]
fn double_write_is_idempotent() {
    let dir = temp_dir();
    let torrc = dir.path().join("torrc");
    let hs = Path::new("/var/lib/tor/onionhost");

    write_stanza(&torrc, hs, 8080).unwrap();
    let first = std::fs::read_to_string(&torrc).unwrap();

    write_stanza(&torrc, hs, 8080).unwrap();
    let second = std::fs::read_to_string(&torrc).unwrap();

    assert_eq!(first, second);
}

#[test]
fn port_change_is_a_pure_update() {
    let dir = temp_dir();
    let torrc = dir.path().join("torrc");
    let hs = Path::new("/var/lib/tor/onionhost");

    write_stanza(&torrc, hs, 8080).unwrap();
    write_stanza(&torrc, hs, 9000).unwrap();

    let content = std::fs::read_to_string(&torrc).unwrap();
    assert_eq!(content.matches("HiddenServiceDir").count(), 1);
    assert_eq!(content.matches("HiddenServicePort").count(), 1);
    assert!(content.contains("HiddenServicePort 80 127.0.0.1:9000"));
    assert!(!content.contains(":8080"));
}

#[test]
fn unrelated_content_preserved() {
    let dir = temp_dir();
    let torrc = dir.path().join("torrc");
    std::fs::write(
        &torrc,
        "SocksPort 9050\nLog notice file /var/log/tor/notices.log\n",
    )
    .unwrap();

    write_stanza(&torrc, Path::new("/hs"), 8080).unwrap();

    let content = std::fs::read_to_string(&torrc).unwrap();
    assert!(content.contains("SocksPort 9050"));
    assert!(content.contains("Log notice file /var/log/tor/notices.log"));
    assert!(content.contains("HiddenServiceDir /hs"));
}

#[test]
fn commented_examples_stripped() {
    let dir = temp_dir();
    let torrc = dir.path().join("torrc");
    std::fs::write(
        &torrc,
        "SocksPort 9050\n\
         #HiddenServiceDir /var/lib/tor/hidden_service/\n\
         #HiddenServicePort 80 127.0.0.1:80\n\
         # Other comment stays\n",
    )
    .unwrap();

    write_stanza(&torrc, Path::new("/hs"), 8080).unwrap();

    let content = std::fs::read_to_string(&torrc).unwrap();
    assert!(!content.contains("hidden_service/"));
    assert!(!content.contains("127.0.0.1:80\n"));
    assert!(content.contains("# Other comment stays"));
    // Exactly the managed stanza remains
    assert_eq!(content.matches("HiddenServiceDir").count(), 1);
}

#[test]
fn backup_taken_once_with_original_content() {
    let dir = temp_dir();
    let torrc = dir.path().join("torrc");
    let original = "SocksPort 9050\n";
    std::fs::write(&torrc, original).unwrap();

    write_stanza(&torrc, Path::new("/hs"), 8080).unwrap();
    let backup = backup_path(&torrc);
    assert_eq!(std::fs::read_to_string(&backup).unwrap(), original);

    // A later port change must not clobber the original backup
    write_stanza(&torrc, Path::new("/hs"), 9000).unwrap();
    assert_eq!(std::fs::read_to_string(&backup).unwrap(), original);
}

#[test]
fn managed_section_is_delimited() {
    let dir = temp_dir();
    let torrc = dir.path().join("torrc");

    write_stanza(&torrc, Path::new("/hs"), 8080).unwrap();

    let content = std::fs::read_to_string(&torrc).unwrap();
    let begin = content.find("# BEGIN onionhost").expect("begin marker");
    let end = content.find("# END onionhost").expect("end marker");
    assert!(begin < end);

    let section = &content[begin..end];
    assert!(section.contains("HiddenServiceDir /hs"));
}
