//! Ledger persistence: what one run writes into the header, the next run reads back.

use std::fs;

use templar_core::materials::{self, Ledger};
use tempfile::TempDir;

fn sample() -> Ledger {
    [
        ("alpine", "3.19.1"),
        ("apk:busybox", "1.36.1-r15"),
        ("apk:musl", "1.2.4_git20230717-r4"),
        ("image:base", "9b2f1c0e"),
        ("regexurl:caddy", "2.7.6"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn write_artifact(dir: &TempDir, ledger: &Ledger) -> std::path::PathBuf {
    let path = dir.path().join("Dockerfile");
    let mut contents =
        materials::header("https://example.com/blob/master/", "app/Dockerfile.tera", ledger)
            .expect("header");
    contents.push_str("FROM scratch\nRUN true\n");
    fs::write(&path, contents).expect("write artifact");
    path
}

#[test]
fn unchanged_upstream_produces_no_changes() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_artifact(&dir, &sample());

    let previous = materials::read_previous(&path);
    assert_eq!(previous, sample());
    assert!(materials::diff(&previous, &sample()).is_empty());
}

#[test]
fn bumped_package_is_the_only_change() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_artifact(&dir, &sample());

    let mut next = sample();
    next.insert("apk:busybox".into(), "1.36.1-r16".into());
    next.remove("regexurl:caddy");

    let changes = materials::diff(&materials::read_previous(&path), &next);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].material, "apk:busybox");
    assert_eq!(changes[0].old, "1.36.1-r15");
    assert_eq!(changes[0].new, "1.36.1-r16");
}

#[test]
fn crlf_artifact_still_parses() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("Dockerfile");
    fs::write(&path, "# Generated from x\r\n# BOM: {\"golang\":\"1.22.1\"}\r\n\r\nFROM scratch\r\n")
        .expect("write");
    let ledger = materials::read_previous(&path);
    assert_eq!(ledger.get("golang").map(String::as_str), Some("1.22.1"));
}
