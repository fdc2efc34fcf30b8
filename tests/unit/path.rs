use crate::path::{absolute, clean, resolve};

#[test]
fn clean_drops_dot_and_empty_segments() {
    assert_eq!(clean("/a/./b/../c"), "/a/c");
    assert_eq!(clean("a//b///c"), "/a/b/c");
    assert_eq!(clean("./x"), "/x");
    assert_eq!(clean(""), "/");
}

#[test]
fn clean_never_pops_past_root() {
    assert_eq!(clean(".."), "/");
    assert_eq!(clean("../.."), "/");
    assert_eq!(clean("/a/../.."), "/");
    assert_eq!(clean("../a"), "/a");
}

#[test]
fn clean_is_idempotent() {
    let cases = [
        "/a/./b/../c",
        "..",
        "a//b",
        "/already/clean",
        "",
        "/a/../../b/c/..",
    ];
    for case in cases {
        let once = clean(case);
        assert_eq!(clean(&once), once, "not idempotent for {case:?}");
    }
}

#[test]
fn resolve_prefixes_the_subtree() {
    assert_eq!(resolve("archive", "data/x"), "archive/data/x");
    assert_eq!(resolve("archive", "/data/../y"), "archive/y");
}

#[test]
fn absolute_includes_remote_root() {
    assert_eq!(
        absolute("/hpss/home/alice", "archive", "data/x"),
        "/hpss/home/alice/archive/data/x"
    );
}
