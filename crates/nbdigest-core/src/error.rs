//! Error types for nbdigest-core.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for nbdigest-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in nbdigest-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a notebook file.
    #[error("failed to read notebook {path}: {message}")]
    NotebookRead { path: PathBuf, message: String },

    /// Notebook JSON did not match the nbformat v4 shape.
    #[error("invalid notebook {path}: {source}")]
    InvalidNotebook {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// No kernel.json was found for the requested kernel name.
    #[error("no kernel spec named '{0}'")]
    KernelSpecNotFound(String),

    /// A required external executable or module is missing.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// Failed to spawn the kernel process.
    #[error("failed to launch kernel: {0}")]
    KernelLaunch(String),

    /// The kernel never answered `kernel_info_request`.
    #[error("kernel did not become ready within {0:?}")]
    KernelStartupTimeout(Duration),

    /// The kernel process exited while we were waiting on it.
    #[error("kernel died: {0}")]
    KernelDied(String),

    /// A malformed or unexpected wire message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// ZeroMQ transport error.
    #[error("transport error: {0}")]
    Transport(#[from] zeromq::ZmqError),

    /// Serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means the whole run cannot proceed.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Error::MissingDependency(_) | Error::KernelSpecNotFound(_)
        )
    }

    /// Format the error with a recovery hint where one is known.
    pub fn with_hint(&self) -> String {
        let hint = match self {
            Error::MissingDependency(what) if what.contains("ipykernel") => {
                Some("install it with: pip install ipykernel")
            }
            Error::MissingDependency(_) => {
                Some("make sure Python 3 is installed and on PATH")
            }
            Error::KernelSpecNotFound(_) => {
                Some("list installed kernels with: jupyter kernelspec list")
            }
            Error::KernelStartupTimeout(_) => {
                Some("raise --startup-timeout if the kernel is slow to import")
            }
            _ => None,
        };

        match hint {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}
