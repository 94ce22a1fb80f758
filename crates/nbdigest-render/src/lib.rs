//! Markdown reporting for executed notebooks.
//!
//! ```text
//! ExecutedNotebook ──► render_notebook ──► fragment ──► ReportBuilder ──► report.md
//! ```
//!
//! Everything here is pure: no I/O, inputs are only read.

mod markdown;
mod report;

pub use markdown::{FAILURE_WARNING, RenderOptions, render_notebook, render_output};
pub use report::{ReportBuilder, ReportHeader, SEPARATOR, critical_fragment};

/// Display name for a notebook file: its file name without `.ipynb`.
pub fn display_name(file_name: &str) -> &str {
    file_name.strip_suffix(".ipynb").unwrap_or(file_name)
}
