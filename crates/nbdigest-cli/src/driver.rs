//! The batch: discover notebooks, execute each one, write one report.
//!
//! Faults are contained at three levels. A failing cell is the executor's
//! business and shows up as a warning in that notebook's fragment. Anything
//! that goes wrong with a single file (unreadable JSON, kernel launch
//! failure, even a panic) becomes a critical fragment and the batch moves on.
//! Only a missing input directory or a missing kernel dependency stops the
//! run, and then no report is written at all.

use std::any::Any;
use std::fs;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use anyhow::Context;
use futures::FutureExt;
use nbdigest_core::{ExecutionCallback, KernelExecutor, KernelSpec, Notebook, NotebookRunner};
use nbdigest_render::{RenderOptions, ReportBuilder, display_name, render_notebook};

use crate::colors;
use crate::config::ReportConfig;

/// How a run ended.
#[derive(Debug, PartialEq)]
pub enum RunOutcome {
    /// The report was written.
    Written {
        path: PathBuf,
        notebooks: usize,
        critical: usize,
    },
    /// The input directory does not exist; nothing was written.
    InputMissing,
    /// The kernel cannot be launched on this machine; nothing was written.
    MissingDependency,
}

/// Run the whole batch described by `config`.
pub async fn run(config: &ReportConfig) -> anyhow::Result<RunOutcome> {
    if !config.input_dir.is_dir() {
        println!("Directory {} not found.", config.input_dir.display());
        return Ok(RunOutcome::InputMissing);
    }

    let spec = match resolve_kernel(&config.kernel_name).await {
        Ok(spec) => spec,
        Err(e) if e.is_precondition() => {
            println!("{}Error:{} {}", colors::RED, colors::RESET, e.with_hint());
            return Ok(RunOutcome::MissingDependency);
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(
        "Using kernel '{}' ({})",
        spec.name,
        spec.argv.first().map(String::as_str).unwrap_or_default()
    );

    let notebooks = discover_notebooks(&config.input_dir)?;
    tracing::debug!(
        "Found {} notebooks in {}",
        notebooks.len(),
        config.input_dir.display()
    );

    let mut executor = KernelExecutor::new(spec, config.kernel_options());
    executor.set_callback(ProgressCallback::new(config.verbose));

    let mut builder = ReportBuilder::new(&config.header());
    build_report(
        &mut executor,
        &notebooks,
        &mut builder,
        &config.render_options(),
    )
    .await;

    let critical = builder.critical_count();
    let report = builder.finish();
    fs::write(&config.output_file, report).with_context(|| {
        format!(
            "Failed to write report to {}",
            config.output_file.display()
        )
    })?;

    println!(
        "\n{}Summary successfully generated:{} {}",
        colors::GREEN,
        colors::RESET,
        config.output_file.display()
    );

    Ok(RunOutcome::Written {
        path: config.output_file.clone(),
        notebooks: notebooks.len(),
        critical,
    })
}

/// Find the kernel and check it can launch on this machine.
async fn resolve_kernel(name: &str) -> nbdigest_core::Result<KernelSpec> {
    let spec = KernelSpec::find(name)?;
    spec.check_available().await?;
    Ok(spec)
}

/// Non-hidden `.ipynb` files (or links to files) directly inside `dir`, by file name.
pub fn discover_notebooks(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut notebooks = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            tracing::warn!("Skipping non UTF-8 file name {:?}", name);
            continue;
        };
        if name.starts_with('.') || !name.ends_with(".ipynb") {
            continue;
        }
        // Follows symlinks.
        let path = entry.path();
        if path.is_file() {
            notebooks.push(path);
        } else {
            tracing::warn!("Skipping {}: not a regular file", path.display());
        }
    }

    notebooks.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(notebooks)
}

/// Process `notebooks` in order, adding one fragment per file to `builder`.
pub async fn build_report<R: NotebookRunner>(
    runner: &mut R,
    notebooks: &[PathBuf],
    builder: &mut ReportBuilder,
    options: &RenderOptions,
) {
    let total = notebooks.len();

    for (i, path) in notebooks.iter().enumerate() {
        let file_name = file_name(path);
        println!(
            "{}[{}/{}]{} Processing {}{}{}...",
            colors::DIM,
            i + 1,
            total,
            colors::RESET,
            colors::BOLD,
            file_name,
            colors::RESET
        );

        let outcome = AssertUnwindSafe(process_notebook(runner, path, options))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(fragment)) => builder.push_fragment(fragment),
            Ok(Err(e)) => {
                println!(
                    "{}Critical error processing {}:{} {}",
                    colors::RED,
                    path.display(),
                    colors::RESET,
                    e
                );
                tracing::error!("Critical error processing {}: {:#}", path.display(), e);
                builder.push_critical(file_name, &e.to_string());
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                println!(
                    "{}Critical error processing {}:{} {}",
                    colors::RED,
                    path.display(),
                    colors::RESET,
                    message
                );
                builder.push_critical(file_name, &message);
            }
        }
    }
}

/// Load, execute and render one notebook.
async fn process_notebook<R: NotebookRunner>(
    runner: &mut R,
    path: &Path,
    options: &RenderOptions,
) -> anyhow::Result<String> {
    println!("  Loading {}...", path.display());
    let notebook = Notebook::read_from_file(path)?;

    // The kernel runs inside the notebook's own directory.
    let working_dir = path
        .canonicalize()?
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    println!(
        "  Executing {} (this may take a while)...",
        path.display()
    );
    let executed = runner.execute(notebook, &working_dir).await?;

    match &executed.failure {
        None => println!("  {}Execution successful.{}", colors::GREEN, colors::RESET),
        Some(message) => println!(
            "  {}Execution FAILED:{} {}",
            colors::YELLOW,
            colors::RESET,
            message.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or_default()
        ),
    }

    Ok(render_notebook(
        &executed.notebook,
        display_name(file_name(path)),
        executed.failure.as_deref(),
        options,
    ))
}

fn file_name(path: &Path) -> &str {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Progress callback that prints per-cell status when verbose.
pub struct ProgressCallback {
    verbose: bool,
}

impl ProgressCallback {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ExecutionCallback for ProgressCallback {
    fn on_cell_started(&self, position: usize, total: usize) {
        if self.verbose {
            print!(
                "{}    ▶ cell {}/{}{} ",
                colors::CYAN,
                position,
                total,
                colors::RESET
            );
            colors::flush_stdout();
        }
    }

    fn on_cell_completed(&self, _position: usize, _total: usize) {
        if self.verbose {
            println!("{}✓{}", colors::GREEN, colors::RESET);
        }
    }

    fn on_cell_error(&self, _position: usize, _total: usize, _message: &str) {
        if self.verbose {
            println!("{}✗{}", colors::RED, colors::RESET);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbdigest_core::{ExecutedNotebook, Output, StreamOutput};
    use nbdigest_render::{FAILURE_WARNING, ReportHeader, SEPARATOR};
    use tempfile::TempDir;

    /// Stands in for the kernel: fills in canned outputs per file.
    #[derive(Default)]
    struct FakeRunner {
        seen: Vec<PathBuf>,
    }

    impl NotebookRunner for FakeRunner {
        async fn execute(
            &mut self,
            mut notebook: Notebook,
            working_dir: &Path,
        ) -> nbdigest_core::Result<ExecutedNotebook> {
            self.seen.push(working_dir.to_path_buf());

            let mut failure = None;
            for (_, cell) in notebook.code_cells_mut() {
                match cell.source.as_str() {
                    "print('ok')" => {
                        cell.outputs = vec![Output::Stream(StreamOutput {
                            name: "stdout".to_string(),
                            text: "ok\n".to_string(),
                        })]
                    }
                    "explode()" => panic!("runner exploded"),
                    other => {
                        failure = Some(format!("NameError: name '{}' is not defined", other));
                        break;
                    }
                }
            }
            Ok(ExecutedNotebook { notebook, failure })
        }
    }

    fn write_notebook(dir: &Path, name: &str, code: &[&str]) {
        let cells: Vec<serde_json::Value> = code
            .iter()
            .map(|source| {
                serde_json::json!({
                    "cell_type": "code", "metadata": {}, "execution_count": null,
                    "outputs": [], "source": source
                })
            })
            .collect();
        let doc = serde_json::json!({
            "metadata": {}, "nbformat": 4, "nbformat_minor": 5, "cells": cells
        });
        fs::write(dir.join(name), doc.to_string()).unwrap();
    }

    fn header() -> ReportHeader {
        ReportHeader {
            title: "Results".to_string(),
            source_dir: "models".to_string(),
            generator: "nbdigest".to_string(),
        }
    }

    async fn report_for(dir: &Path, runner: &mut FakeRunner) -> String {
        let notebooks = discover_notebooks(dir).unwrap();
        let mut builder = ReportBuilder::new(&header());
        build_report(runner, &notebooks, &mut builder, &RenderOptions::default()).await;
        builder.finish()
    }

    #[test]
    fn test_discovery_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        for name in ["b.ipynb", "a.ipynb", ".hidden.ipynb", "notes.txt", "c.ipynb.bak"] {
            fs::write(temp.path().join(name), "{}").unwrap();
        }
        fs::create_dir(temp.path().join("dir.ipynb")).unwrap();

        let found: Vec<String> = discover_notebooks(temp.path())
            .unwrap()
            .iter()
            .map(|p| file_name(p).to_string())
            .collect();
        assert_eq!(found, vec!["a.ipynb", "b.ipynb"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_discovery_follows_symlinks() {
        let temp = TempDir::new().unwrap();
        let models = temp.path().join("models");
        fs::create_dir(&models).unwrap();
        let target = temp.path().join("shared.ipynb");
        fs::write(&target, "{}").unwrap();
        std::os::unix::fs::symlink(&target, models.join("model.ipynb")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("gone.ipynb"), models.join("dangling.ipynb"))
            .unwrap();

        let found = discover_notebooks(&models).unwrap();
        assert_eq!(found, vec![models.join("model.ipynb")]);
    }

    #[tokio::test]
    async fn test_success_and_failure_scenario() {
        let temp = TempDir::new().unwrap();
        write_notebook(temp.path(), "a.ipynb", &["print('ok')"]);
        write_notebook(temp.path(), "b.ipynb", &["undefined_name"]);

        let mut runner = FakeRunner::default();
        let report = report_for(temp.path(), &mut runner).await;

        let a = report.find("# a\n").unwrap();
        let b = report.find("# b\n").unwrap();
        assert!(a < b);
        assert!(report[a..b].contains("```text\nok\n"));
        assert!(!report[a..b].contains(FAILURE_WARNING));

        let b_section = &report[b..];
        assert!(b_section.contains(FAILURE_WARNING));
        assert!(b_section.contains("> NameError: name 'undefined_name' is not defined"));
        assert_eq!(report.matches(SEPARATOR).count(), 2);
    }

    #[tokio::test]
    async fn test_working_dir_is_notebook_dir() {
        let temp = TempDir::new().unwrap();
        write_notebook(temp.path(), "a.ipynb", &["print('ok')"]);

        let mut runner = FakeRunner::default();
        report_for(temp.path(), &mut runner).await;

        assert_eq!(runner.seen, vec![temp.path().canonicalize().unwrap()]);
    }

    #[tokio::test]
    async fn test_bad_file_does_not_stop_the_batch() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.ipynb"), "not json at all").unwrap();
        write_notebook(temp.path(), "b.ipynb", &["explode()"]);
        write_notebook(temp.path(), "c.ipynb", &["print('ok')"]);

        let mut runner = FakeRunner::default();
        let report = report_for(temp.path(), &mut runner).await;

        assert!(report.contains("## a.ipynb\n\nCritical error processing notebook: "));
        assert!(report.contains(
            "## b.ipynb\n\nCritical error processing notebook: runner exploded\n"
        ));
        assert!(report.contains("# c\n"));
        assert_eq!(report.matches(SEPARATOR).count(), 1);
    }

    #[tokio::test]
    async fn test_same_input_gives_identical_report() {
        let temp = TempDir::new().unwrap();
        write_notebook(temp.path(), "z.ipynb", &["print('ok')"]);
        write_notebook(temp.path(), "m.ipynb", &["missing"]);

        let first = report_for(temp.path(), &mut FakeRunner::default()).await;
        let second = report_for(temp.path(), &mut FakeRunner::default()).await;
        assert_eq!(first, second);
        assert!(first.find("# m\n").unwrap() < first.find("# z\n").unwrap());
    }

    #[tokio::test]
    async fn test_missing_input_dir_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let config = ReportConfig {
            input_dir: temp.path().join("models"),
            output_file: temp.path().join("report.md"),
            ..Default::default()
        };

        assert_eq!(run(&config).await.unwrap(), RunOutcome::InputMissing);
        assert!(!config.output_file.exists());
    }

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "unknown panic");
    }
}
