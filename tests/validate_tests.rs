//! Port policy and site directory validation properties

mod test_utils;

use onionhost::validate::{check_port, validate_site_dir, PortCheck, TOR_RESERVED_PORTS};
use test_utils::*;

#[test]
fn reserved_ports_always_rejected() {
    for port in TOR_RESERVED_PORTS {
        match check_port(port) {
            PortCheck::Rejected(reason) => {
                assert!(reason.contains(&port.to_string()));
            },
            other => panic!("port {} should be rejected, got {:?}", port, other),
        }
    }
}

#[test]
fn privileged_ports_warn_but_pass() {
    for port in [1u16, 22, 80, 443, 1023] {
        assert!(
            !TOR_RESERVED_PORTS.contains(&port),
            "sample must avoid the reserved set"
        );
        assert!(
            matches!(check_port(port), PortCheck::Warning(_)),
            "port {} should warn",
            port
        );
    }
}

#[test]
fn ordinary_ports_pass_clean() {
    for port in [1024u16, 3000, 8080, 65535] {
        assert_eq!(check_port(port), PortCheck::Ok);
    }
}

#[test]
fn port_zero_rejected() {
    assert!(matches!(check_port(0), PortCheck::Rejected(_)));
}

#[test]
fn site_dir_with_index_accepted() {
    let dir = temp_dir();
    let site = create_site_dir(dir.path());
    assert!(validate_site_dir(&site).is_ok());
}

#[test]
fn site_dir_without_index_rejected() {
    let dir = temp_dir();
    let site = dir.path().join("empty");
    std::fs::create_dir_all(&site).unwrap();
    std::fs::write(site.join("notes.txt"), "no index here").unwrap();

    let err = validate_site_dir(&site).unwrap_err();
    assert!(err.to_string().contains("index"));
}

#[test]
fn missing_site_dir_rejected() {
    let dir = temp_dir();
    let missing = dir.path().join("nowhere");
    assert!(validate_site_dir(&missing).is_err());
}

#[test]
fn file_instead_of_dir_rejected() {
    let dir = temp_dir();
    let file = dir.path().join("index.html");
    std::fs::write(&file, "not a directory").unwrap();
    assert!(validate_site_dir(&file).is_err());
}

#[test]
fn alternative_index_names_accepted() {
    for name in ["index.htm", "index.php"] {
        let dir = temp_dir();
        let site = dir.path().join("site");
        std::fs::create_dir_all(&site).unwrap();
        std::fs::write(site.join(name), "x").unwrap();
        assert!(
            validate_site_dir(&site).is_ok(),
            "{} should satisfy the index check",
            name
        );
    }
}
