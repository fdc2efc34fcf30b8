use crate::channel::{collect, compose, read_line_trimmed, ErrorFilter};
use std::io::Cursor;

#[test]
fn compose_joins_tokens_and_appends_identity() {
    assert_eq!(compose(&["ls", "-al", "/x"], None), "ls -al /x; id");
}

#[test]
fn compose_appends_class_of_service() {
    assert_eq!(
        compose(&["put", "a", ":", "b"], Some(4001)),
        "put a : b cos=4001; id"
    );
}

#[test]
fn collect_stops_on_exact_sentinel_only() {
    let mut input = Cursor::new("data 1\nprefix SENT suffix\nSENT trailing\nSENT\nafter\n");
    let response = collect(&mut input, "SENT").unwrap();
    assert_eq!(response.lines, ["data 1", "prefix SENT suffix", "SENT trailing"]);
    assert!(response.error.is_none());

    // the line after the sentinel was not consumed
    let rest = read_line_trimmed(&mut input).unwrap();
    assert_eq!(rest, "after");
}

#[test]
fn collect_trims_trailing_whitespace_before_matching() {
    let mut input = Cursor::new("one\nSENT   \n");
    let response = collect(&mut input, "SENT").unwrap();
    assert_eq!(response.lines, ["one"]);
}

#[test]
fn collect_accumulates_error_lines_separately() {
    let mut input = Cursor::new("*** first error\nkept line\n*** second error\nSENT\n");
    let response = collect(&mut input, "SENT").unwrap();
    assert_eq!(response.lines, ["kept line"]);
    assert_eq!(
        response.error.as_deref(),
        Some("*** first error\n*** second error")
    );
}

#[test]
fn collect_fails_on_eof_before_sentinel() {
    let mut input = Cursor::new("no sentinel here\n");
    let err = collect(&mut input, "SENT").unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
}

#[test]
fn benign_patterns_match_known_conditions() {
    let filter = ErrorFilter::new();
    let benign = [
        "*** getFile: no valid checksum for /archive/x",
        "*** no data at hierarchy level 0",
        "*** ls: /archive/gone: HPSS_ENOENT",
        "*** Background stage failed with error -5",
        "*** error setting nameserver attributes for /x: HPSS_EACCES",
        "*** stage: No such file or directory",
    ];
    for message in benign {
        assert!(filter.is_benign(message), "expected benign: {message}");
    }
}

#[test]
fn unknown_errors_are_not_benign() {
    let filter = ErrorFilter::new();
    let fatal = [
        "*** hsi: unknown command: frob",
        "*** ls: /archive/x: HPSS_EACCES (access denied)",
        "*** connection lost",
    ];
    for message in fatal {
        assert!(!filter.is_benign(message), "expected fatal: {message}");
    }
}
