//! Tests for ConfigSource and the routing text parser
//!
//! Tests cover the line grammar, the host-list synthesis, fingerprinting,
//! and failure modes that must leave no partial state.

use std::io::Write;

use crate::{ConfigError, ConfigSource, fingerprint, parse_routing_text};

// =============================================================================
// Line grammar tests
// =============================================================================

#[test]
fn test_parse_single_route() {
    let table = parse_routing_text("events 10.0.0.1:9009").unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(
        table.get("events").unwrap().primary(),
        Some("10.0.0.1:9009")
    );
}

#[test]
fn test_parse_address_group() {
    let table = parse_routing_text("events 10.0.0.1:9009;10.0.0.2:9009").unwrap();

    let handle = table.get("events").unwrap();
    assert_eq!(handle.addrs(), ["10.0.0.1:9009", "10.0.0.2:9009"]);
}

#[test]
fn test_parse_multiple_routes_with_wildcard() {
    let text = "\
# stream routes
events 10.0.0.1:9009
logs 10.0.0.2:9009

* 10.0.0.9:9009
";
    let table = parse_routing_text(text).unwrap();

    assert_eq!(table.len(), 3);
    assert_eq!(
        table.resolve("events").unwrap().primary(),
        Some("10.0.0.1:9009")
    );
    assert_eq!(
        table.resolve("anything-else").unwrap().primary(),
        Some("10.0.0.9:9009")
    );
}

#[test]
fn test_parse_skips_comments_and_blank_lines() {
    let table = parse_routing_text("# only noise\n\n   \n# more noise\n").unwrap();
    assert!(table.is_empty());
}

#[test]
fn test_parse_empty_text_yields_empty_table() {
    let table = parse_routing_text("").unwrap();
    assert!(table.is_empty());
}

// =============================================================================
// Failure modes
// =============================================================================

#[test]
fn test_parse_missing_address() {
    let err = parse_routing_text("events").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { line: 1, .. }));
    assert!(err.to_string().contains("missing destination address"));
}

#[test]
fn test_parse_trailing_tokens() {
    let err = parse_routing_text("events 10.0.0.1:9009 extra").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { line: 1, .. }));
}

#[test]
fn test_parse_address_without_port() {
    let err = parse_routing_text("events 10.0.0.1").unwrap_err();
    assert!(err.to_string().contains("must be host:port"));
}

#[test]
fn test_parse_address_with_bad_port() {
    let err = parse_routing_text("events 10.0.0.1:notaport").unwrap_err();
    assert!(err.to_string().contains("invalid port"));
}

#[test]
fn test_parse_empty_address_in_group() {
    let err = parse_routing_text("events 10.0.0.1:9009;;10.0.0.2:9009").unwrap_err();
    assert!(err.to_string().contains("empty destination address"));
}

#[test]
fn test_parse_duplicate_key_reports_second_line() {
    let text = "events 10.0.0.1:9009\nevents 10.0.0.2:9009";
    let err = parse_routing_text(text).unwrap_err();

    match err {
        ConfigError::DuplicateKey { key, line } => {
            assert_eq!(key, "events");
            assert_eq!(line, 2);
        }
        other => panic!("expected DuplicateKey, got {other:?}"),
    }
}

#[test]
fn test_parse_error_line_numbers_are_one_based() {
    let text = "# comment\nevents 10.0.0.1:9009\nbroken";
    let err = parse_routing_text(text).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { line: 3, .. }));
}

// =============================================================================
// ConfigSource tests
// =============================================================================

#[test]
fn test_host_list_synthesizes_wildcard_route() {
    let source = ConfigSource::host_list(vec!["10.0.0.1:9009".into(), "10.0.0.2:9009".into()]);
    let snapshot = source.parse().unwrap();

    let table = snapshot.table();
    assert_eq!(table.len(), 1);
    assert_eq!(
        table.wildcard().unwrap().addrs(),
        ["10.0.0.1:9009", "10.0.0.2:9009"]
    );
}

#[test]
fn test_host_list_fingerprint_matches_synthesized_text() {
    let source = ConfigSource::host_list(vec!["10.0.0.1:9009".into(), "10.0.0.2:9009".into()]);
    let snapshot = source.parse().unwrap();

    assert_eq!(
        snapshot.fingerprint(),
        fingerprint("* 10.0.0.1:9009;10.0.0.2:9009")
    );
}

#[test]
fn test_file_source_reads_and_fingerprints() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "events 10.0.0.1:9009\n* 10.0.0.9:9009\n").unwrap();

    let source = ConfigSource::file(file.path());
    let snapshot = source.parse().unwrap();

    assert_eq!(snapshot.table().len(), 2);
    assert_eq!(
        snapshot.fingerprint(),
        fingerprint("events 10.0.0.1:9009\n* 10.0.0.9:9009\n")
    );
    assert!(snapshot.loaded_at_unix() > 0);
}

#[test]
fn test_missing_file_is_an_io_error() {
    let source = ConfigSource::file("/nonexistent/shunt/routes.conf");
    let err = source.parse().unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_each_parse_builds_fresh_handles() {
    let source = ConfigSource::host_list(vec!["10.0.0.1:9009".into()]);

    let first = source.parse().unwrap();
    let second = source.parse().unwrap();

    let a = first.table().wildcard().unwrap();
    let b = second.table().wildcard().unwrap();
    assert!(!std::sync::Arc::ptr_eq(a, b));
}

#[test]
fn test_describe() {
    assert_eq!(
        ConfigSource::file("/etc/shunt/routes.conf").describe(),
        "file:/etc/shunt/routes.conf"
    );
    assert_eq!(
        ConfigSource::host_list(vec!["a:1".into(), "b:2".into()]).describe(),
        "hosts:2"
    );
}

// =============================================================================
// Fingerprint tests
// =============================================================================

#[test]
fn test_fingerprint_is_stable_and_content_sensitive() {
    let a = fingerprint("events 10.0.0.1:9009");
    let b = fingerprint("events 10.0.0.1:9009");
    let c = fingerprint("events 10.0.0.2:9009");

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
}
