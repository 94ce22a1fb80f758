//! End-to-end tests for the nbdigest binary.
//!
//! Tests that execute notebooks need `python3` with `ipykernel`:
//! `cargo test -p nbdigest-cli -- --ignored`

#![allow(deprecated)] // cargo_bin is deprecated but still functional

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn nbdigest() -> Command {
    Command::cargo_bin("nbdigest").unwrap()
}

fn write_notebook(dir: &Path, name: &str, cells: serde_json::Value) {
    let doc = serde_json::json!({
        "metadata": {"kernelspec": {"name": "python3", "display_name": "Python 3"}},
        "nbformat": 4,
        "nbformat_minor": 5,
        "cells": cells
    });
    fs::write(dir.join(name), doc.to_string()).unwrap();
}

fn code(source: &str) -> serde_json::Value {
    serde_json::json!({
        "cell_type": "code", "metadata": {}, "execution_count": null,
        "outputs": [], "source": source
    })
}

// =============================================================================
// CLI Surface
// =============================================================================

#[test]
fn test_help() {
    nbdigest()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--input-dir"))
        .stdout(predicate::str::contains("--include-source"));
}

#[test]
fn test_missing_input_dir_writes_nothing() {
    let temp = TempDir::new().unwrap();

    nbdigest()
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Directory models not found."));

    assert!(!temp.path().join("Model_Results_And_Analysis.md").exists());
}

#[test]
fn test_unknown_kernel_writes_nothing() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("models")).unwrap();

    nbdigest()
        .current_dir(temp.path())
        .args(["--kernel", "no-such-kernel-nbdigest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no-such-kernel-nbdigest"));

    assert!(!temp.path().join("Model_Results_And_Analysis.md").exists());
}

// =============================================================================
// Full Runs
// =============================================================================

#[test]
#[ignore = "Requires python3 with ipykernel"]
fn test_report_for_passing_and_failing_notebooks() {
    let temp = TempDir::new().unwrap();
    let models = temp.path().join("models");
    fs::create_dir(&models).unwrap();
    write_notebook(&models, "a.ipynb", serde_json::json!([code("print('ok')")]));
    write_notebook(
        &models,
        "b.ipynb",
        serde_json::json!([code("undefined_name")]),
    );

    nbdigest()
        .current_dir(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("[1/2] Processing a.ipynb"))
        .stdout(predicate::str::contains("[2/2] Processing b.ipynb"))
        .stdout(predicate::str::contains("Summary successfully generated"));

    let report = fs::read_to_string(temp.path().join("Model_Results_And_Analysis.md")).unwrap();
    assert!(report.starts_with(
        "# Classification Model Results & Analysis Summary (Auto-Run)\n\n**Source Directory**: `models/`\n"
    ));

    let a = report.find("# a\n").unwrap();
    let b = report.find("# b\n").unwrap();
    assert!(report[a..b].contains("```text\nok\n"));
    assert!(report[b..].contains("**Warning: Notebook execution failed or incomplete.**"));
    assert!(report[b..].contains("❌ **Error**: `NameError`"));
    assert!(report[b..].contains("<details><summary>Traceback</summary>"));
}

#[test]
#[ignore = "Requires python3 with ipykernel"]
fn test_empty_dir_writes_header_only() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("models")).unwrap();
    let output = temp.path().join("out.md");

    nbdigest()
        .current_dir(temp.path())
        .args(["--output", "out.md", "--title", "Empty"])
        .assert()
        .success();

    assert_eq!(
        fs::read_to_string(output).unwrap(),
        "# Empty\n\n**Source Directory**: `models/`\n\n**Generated**: nbdigest\n\n---\n"
    );
}
