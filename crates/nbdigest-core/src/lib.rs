//! Core engine for nbdigest.
//!
//! This crate provides:
//! - The nbformat v4 notebook document model
//! - Kernel discovery and the Jupyter messaging protocol over ZeroMQ
//! - Cell-by-cell notebook execution with partial results on failure
//!
//! # Architecture
//!
//! ```text
//! notebook.ipynb ──► Notebook ──► KernelExecutor ──► ExecutedNotebook
//!                                      │
//!                                      ▼
//!                               KernelSession (one kernel process per notebook)
//!                         shell / iopub / control sockets
//! ```

pub mod error;
pub mod execute;
pub mod kernel;
pub mod notebook;
pub mod text;

pub use error::{Error, Result};
pub use execute::{
    CellSession, ExecutedNotebook, ExecutionCallback, KernelExecutor, NotebookRunner,
    cell_error_message, execute_cells,
};
pub use kernel::{KernelOptions, KernelSession, KernelSpec};
pub use notebook::{
    Cell, CodeCell, DisplayData, ErrorOutput, ExecuteResult, MarkdownCell, MimeBundle, Notebook,
    Output, RawCell, StreamOutput,
};
