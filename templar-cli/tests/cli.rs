use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn templar_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("templar"));
    cmd.env("RUST_LOG", "warn").env("NO_COLOR", "1");
    cmd
}

fn project(root: &Path, name: &str, template: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).expect("create project dir");
    fs::write(dir.join("Dockerfile.tera"), template).expect("write template");
}

#[test]
fn order_lists_dependencies_first() {
    let input = TempDir::new().expect("input");
    project(input.path(), "app", "FROM {{ image(ref=\"base\") }}\n");
    project(input.path(), "base", "FROM scratch\n");

    templar_cmd()
        .arg("order")
        .arg(input.path())
        .assert()
        .success()
        .stdout("base\napp\n");
}

#[test]
fn order_batches_table() {
    let input = TempDir::new().expect("input");
    project(input.path(), "app", "FROM {{ image(ref=\"base\") }}\n");
    project(input.path(), "tool", "FROM {{ image(ref=\"base\") }}\n");
    project(input.path(), "base", "FROM scratch\n");

    templar_cmd()
        .arg("order")
        .arg(input.path())
        .arg("--batches")
        .assert()
        .success()
        .stdout(contains("batch").and(contains("app, tool")));
}

#[test]
fn order_fails_on_reciprocal_references() {
    let input = TempDir::new().expect("input");
    project(input.path(), "a", "FROM {{ image(ref=\"b\") }}\n");
    project(input.path(), "b", "FROM {{ image(ref=\"a\") }}\n");

    templar_cmd()
        .arg("order")
        .arg(input.path())
        .assert()
        .failure()
        .stderr(contains("could not fully resolve dependencies"));
}

#[test]
fn generate_writes_outputs_with_header() {
    let input = TempDir::new().expect("input");
    let output = TempDir::new().expect("output");
    project(input.path(), "base", "FROM scratch\n");

    templar_cmd()
        .arg("generate")
        .arg(input.path())
        .arg(output.path())
        .args(["--workflow-commands", "false"])
        .args(["--source-link", "https://example.com/tree/"])
        .assert()
        .success()
        .stdout(contains("base").and(contains("::group::").not()));

    let written = fs::read_to_string(output.path().join("base/Dockerfile")).expect("read output");
    assert_eq!(
        written,
        "# Generated from https://example.com/tree/base/Dockerfile.tera\n# BOM: {}\n\nFROM scratch\n"
    );
}

#[test]
fn generate_dry_run_writes_nothing() {
    let input = TempDir::new().expect("input");
    let output = TempDir::new().expect("output");
    project(input.path(), "base", "FROM scratch\n");

    templar_cmd()
        .arg("generate")
        .arg(input.path())
        .arg(output.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(contains("::group::base").and(contains("would write")));

    assert!(!output.path().join("base").exists());
}

#[test]
fn diff_shows_rendered_changes_without_writing() {
    let input = TempDir::new().expect("input");
    let output = TempDir::new().expect("output");
    project(input.path(), "base", "FROM scratch\n");

    templar_cmd()
        .arg("diff")
        .arg(input.path())
        .arg(output.path())
        .assert()
        .success()
        .stdout(contains("+++ b/base/Dockerfile").and(contains("+FROM scratch")));

    assert!(!output.path().join("base/Dockerfile").exists());

    templar_cmd()
        .arg("generate")
        .arg(input.path())
        .arg(output.path())
        .assert()
        .success();

    templar_cmd()
        .arg("diff")
        .arg(input.path())
        .arg(output.path())
        .assert()
        .success()
        .stdout(contains("No differences."));
}
