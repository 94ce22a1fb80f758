//! Kernel discovery.
//!
//! Locates `kernels/<name>/kernel.json` in the Jupyter data directories, or
//! synthesises an `ipykernel_launcher` spec for the default Python kernel.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Placeholder replaced with the connection file path in `argv`.
const CONNECTION_FILE: &str = "{connection_file}";
/// Placeholder replaced with the kernel's resource directory in `argv`.
const RESOURCE_DIR: &str = "{resource_dir}";

/// How to launch a kernel.
#[derive(Debug, Clone)]
pub struct KernelSpec {
    /// Kernel name (directory name under `kernels/`).
    pub name: String,
    /// Launch command with placeholders.
    pub argv: Vec<String>,
    /// Human readable name.
    pub display_name: String,
    /// Kernel language.
    pub language: String,
    /// Extra environment for the kernel process.
    pub env: HashMap<String, String>,
    /// Directory the spec was loaded from, if any.
    pub resource_dir: Option<PathBuf>,
}

/// On-disk `kernel.json`.
#[derive(Debug, Deserialize)]
struct KernelJson {
    argv: Vec<String>,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    env: HashMap<String, String>,
}

impl KernelSpec {
    /// Find a kernel by name.
    ///
    /// Searches the Jupyter data directories first. For `python3`/`python`
    /// falls back to `<python> -m ipykernel_launcher` using the interpreter
    /// on `PATH`.
    pub fn find(name: &str) -> Result<Self> {
        for dir in kernel_search_dirs() {
            let candidate = dir.join("kernels").join(name);
            if candidate.join("kernel.json").is_file() {
                tracing::debug!("Using kernel spec at {}", candidate.display());
                return Self::from_dir(name, &candidate);
            }
        }

        if matches!(name, "python3" | "python") {
            return Self::builtin_python(name);
        }

        Err(Error::KernelSpecNotFound(name.to_string()))
    }

    /// Load a spec from a kernel directory containing `kernel.json`.
    pub fn from_dir(name: &str, dir: &Path) -> Result<Self> {
        let content = fs::read_to_string(dir.join("kernel.json"))?;
        let json: KernelJson = serde_json::from_str(&content)?;
        if json.argv.is_empty() {
            return Err(Error::KernelLaunch(format!(
                "kernel spec '{}' has an empty argv",
                name
            )));
        }

        Ok(Self {
            name: name.to_string(),
            argv: json.argv,
            display_name: json.display_name,
            language: json.language,
            env: json.env,
            resource_dir: Some(dir.to_path_buf()),
        })
    }

    /// The default IPython kernel, launched through the `PATH` interpreter.
    fn builtin_python(name: &str) -> Result<Self> {
        let python = which::which("python3")
            .or_else(|_| which::which("python"))
            .map_err(|_| {
                Error::MissingDependency("no python3 or python executable on PATH".to_string())
            })?;

        Ok(Self {
            name: name.to_string(),
            argv: vec![
                python.to_string_lossy().into_owned(),
                "-m".to_string(),
                "ipykernel_launcher".to_string(),
                "-f".to_string(),
                CONNECTION_FILE.to_string(),
            ],
            display_name: "Python 3 (ipykernel)".to_string(),
            language: "python".to_string(),
            env: HashMap::new(),
            resource_dir: None,
        })
    }

    /// Verify the launch command can actually run.
    ///
    /// The executable must resolve, and an `ipykernel_launcher` spec must be
    /// able to import `ipykernel`.
    pub async fn check_available(&self) -> Result<()> {
        let program = self.argv.first().ok_or_else(|| {
            Error::KernelLaunch(format!("kernel spec '{}' has an empty argv", self.name))
        })?;
        let resolved = which::which(program).map_err(|_| {
            Error::MissingDependency(format!(
                "kernel '{}' needs '{}', which was not found",
                self.name, program
            ))
        })?;

        if self.argv.iter().any(|arg| arg == "ipykernel_launcher") {
            let status = Command::new(&resolved)
                .args(["-c", "import ipykernel"])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await?;
            if !status.success() {
                return Err(Error::MissingDependency(format!(
                    "ipykernel is not importable by {}",
                    resolved.display()
                )));
            }
        }

        Ok(())
    }

    /// `argv` with placeholders substituted.
    pub fn launch_argv(&self, connection_file: &Path) -> Vec<String> {
        let connection_file = connection_file.to_string_lossy();
        let resource_dir = self
            .resource_dir
            .as_deref()
            .map(|dir| dir.to_string_lossy())
            .unwrap_or_default();

        self.argv
            .iter()
            .map(|arg| {
                arg.replace(CONNECTION_FILE, &connection_file)
                    .replace(RESOURCE_DIR, &resource_dir)
            })
            .collect()
    }
}

/// Jupyter data directories, user first then system.
fn kernel_search_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();

    if let Some(data) = dirs::data_dir() {
        dirs.push(data.join("jupyter"));
    }
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join(".local").join("share").join("jupyter"));
        if cfg!(target_os = "macos") {
            dirs.push(home.join("Library").join("Jupyter"));
        }
    }
    dirs.push(PathBuf::from("/usr/local/share/jupyter"));
    dirs.push(PathBuf::from("/usr/share/jupyter"));

    let mut seen = Vec::new();
    dirs.retain(|dir| {
        if seen.contains(dir) {
            false
        } else {
            seen.push(dir.clone());
            true
        }
    });
    dirs
}
