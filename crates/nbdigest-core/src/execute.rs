//! Notebook execution.
//!
//! Runs a notebook's code cells top to bottom in one kernel session and
//! writes the produced outputs back into the document. A failing cell stops
//! execution of that notebook; the partially executed document is returned
//! together with a failure message instead of an error.

use std::path::Path;

use crate::error::{Error, Result};
use crate::kernel::{CellRun, KernelOptions, KernelSession, KernelSpec, ReplyStatus};
use crate::notebook::{ErrorOutput, Notebook};
use crate::text::strip_ansi;

/// A notebook after execution.
#[derive(Debug, Clone)]
pub struct ExecutedNotebook {
    /// The document, with outputs of every cell that ran.
    pub notebook: Notebook,
    /// Why execution stopped early, if it did.
    pub failure: Option<String>,
}

impl ExecutedNotebook {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Callback trait for execution progress reporting.
///
/// Positions are 1-based among the notebook's code cells.
pub trait ExecutionCallback: Send + Sync {
    /// Called when a cell is sent to the kernel.
    fn on_cell_started(&self, position: usize, total: usize);

    /// Called when a cell finishes without error.
    fn on_cell_completed(&self, position: usize, total: usize);

    /// Called when a cell stops the notebook.
    fn on_cell_error(&self, position: usize, total: usize, message: &str);
}

/// Something that can run one cell's code, keeping state between calls.
#[allow(async_fn_in_trait)]
pub trait CellSession {
    async fn run_code(&mut self, code: &str) -> Result<CellRun>;
}

impl CellSession for KernelSession {
    async fn run_code(&mut self, code: &str) -> Result<CellRun> {
        self.execute(code).await
    }
}

/// Executes whole notebooks.
///
/// `Err` is reserved for faults outside the notebook's own execution;
/// anything the notebook's code causes ends up in
/// [`ExecutedNotebook::failure`].
#[allow(async_fn_in_trait)]
pub trait NotebookRunner {
    async fn execute(&mut self, notebook: Notebook, working_dir: &Path)
    -> Result<ExecutedNotebook>;
}

/// Runs notebooks against a fresh kernel per notebook.
pub struct KernelExecutor {
    spec: KernelSpec,
    options: KernelOptions,
    callback: Option<Box<dyn ExecutionCallback>>,
}

impl KernelExecutor {
    pub fn new(spec: KernelSpec, options: KernelOptions) -> Self {
        Self {
            spec,
            options,
            callback: None,
        }
    }

    /// Set the execution callback for progress reporting.
    pub fn set_callback(&mut self, callback: impl ExecutionCallback + 'static) {
        self.callback = Some(Box::new(callback));
    }
}

impl NotebookRunner for KernelExecutor {
    async fn execute(
        &mut self,
        mut notebook: Notebook,
        working_dir: &Path,
    ) -> Result<ExecutedNotebook> {
        let mut session = match KernelSession::start(&self.spec, working_dir, &self.options).await
        {
            Ok(session) => session,
            Err(e @ Error::KernelLaunch(_)) => return Err(e),
            Err(e) => {
                tracing::warn!("Kernel '{}' failed to start: {}", self.spec.name, e);
                return Ok(ExecutedNotebook {
                    notebook,
                    failure: Some(format!(
                        "Kernel '{}' failed to start: {}",
                        self.spec.name, e
                    )),
                });
            }
        };

        let failure = execute_cells(&mut session, &mut notebook, self.callback.as_deref()).await;

        if let Err(e) = session.shutdown().await {
            tracing::warn!("Kernel '{}' did not shut down cleanly: {}", self.spec.name, e);
        }

        Ok(ExecutedNotebook { notebook, failure })
    }
}

/// Run every non-blank code cell of `notebook` in order.
///
/// Returns the failure message of the first cell that errored; later cells
/// are left exactly as they were read.
pub async fn execute_cells<S: CellSession>(
    session: &mut S,
    notebook: &mut Notebook,
    callback: Option<&dyn ExecutionCallback>,
) -> Option<String> {
    let total = notebook.code_cells_mut().count();

    for (position, (index, cell)) in notebook.code_cells_mut().enumerate() {
        let position = position + 1;
        if cell.source.trim().is_empty() {
            continue;
        }

        if let Some(cb) = callback {
            cb.on_cell_started(position, total);
        }

        let failure = match session.run_code(&cell.source).await {
            Ok(run) => {
                cell.outputs = run.outputs;
                cell.execution_count = run.execution_count;
                match run.status {
                    ReplyStatus::Ok => None,
                    ReplyStatus::Error(error) => Some(cell_error_message(&cell.source, &error)),
                    ReplyStatus::Aborted => Some(format!(
                        "Execution of cell {} was aborted by the kernel",
                        index + 1
                    )),
                    ReplyStatus::KernelDied(reason) => Some(format!(
                        "Kernel failure while executing cell {}: {}",
                        index + 1,
                        Error::KernelDied(reason)
                    )),
                }
            }
            Err(e) => {
                cell.outputs.clear();
                cell.execution_count = None;
                Some(format!("Kernel failure while executing cell {}: {}", index + 1, e))
            }
        };

        match failure {
            None => {
                if let Some(cb) = callback {
                    cb.on_cell_completed(position, total);
                }
            }
            Some(message) => {
                tracing::debug!("Cell {} failed, stopping notebook", index + 1);
                if let Some(cb) = callback {
                    cb.on_cell_error(position, total, &message);
                }
                return Some(message);
            }
        }
    }

    None
}

/// Failure text for a cell that raised, in the usual notebook-tooling layout.
pub fn cell_error_message(source: &str, error: &ErrorOutput) -> String {
    let traceback = if error.traceback.is_empty() {
        format!("{}: {}", error.ename, error.evalue)
    } else {
        strip_ansi(&error.traceback.join("\n")).into_owned()
    };

    format!(
        "An error occurred while executing the following cell:\n\
         ------------------\n\
         {source}\n\
         ------------------\n\
         \n\
         {traceback}\n"
    )
}
