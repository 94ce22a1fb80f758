//! Run configuration.

use std::path::PathBuf;
use std::time::Duration;

use nbdigest_core::KernelOptions;
use nbdigest_render::{RenderOptions, ReportHeader};

/// Name written into the report's `Generated` line.
pub const GENERATOR: &str = "nbdigest";

pub const DEFAULT_INPUT_DIR: &str = "models";
pub const DEFAULT_OUTPUT_FILE: &str = "Model_Results_And_Analysis.md";
pub const DEFAULT_KERNEL: &str = "python3";
pub const DEFAULT_TITLE: &str = "Classification Model Results & Analysis Summary (Auto-Run)";
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 60;

/// Everything one report run needs.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Directory scanned for `.ipynb` files (not recursive).
    pub input_dir: PathBuf,
    /// Report destination; overwritten if it exists.
    pub output_file: PathBuf,
    /// Kernelspec name used for every notebook.
    pub kernel_name: String,
    pub title: String,
    pub include_source: bool,
    pub startup_timeout: Duration,
    pub verbose: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output_file: PathBuf::from(DEFAULT_OUTPUT_FILE),
            kernel_name: DEFAULT_KERNEL.to_string(),
            title: DEFAULT_TITLE.to_string(),
            include_source: false,
            startup_timeout: Duration::from_secs(DEFAULT_STARTUP_TIMEOUT_SECS),
            verbose: false,
        }
    }
}

impl ReportConfig {
    pub fn header(&self) -> ReportHeader {
        ReportHeader {
            title: self.title.clone(),
            source_dir: self.input_dir.display().to_string(),
            generator: GENERATOR.to_string(),
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            include_source: self.include_source,
        }
    }

    pub fn kernel_options(&self) -> KernelOptions {
        KernelOptions {
            startup_timeout: self.startup_timeout,
            echo_stderr: self.verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReportConfig::default();
        assert_eq!(config.input_dir, PathBuf::from("models"));
        assert_eq!(
            config.output_file,
            PathBuf::from("Model_Results_And_Analysis.md")
        );
        assert_eq!(config.kernel_name, "python3");
        assert!(!config.include_source);
        assert_eq!(config.startup_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_header_uses_input_dir() {
        let config = ReportConfig {
            input_dir: PathBuf::from("experiments"),
            ..Default::default()
        };
        let header = config.header();
        assert_eq!(header.source_dir, "experiments");
        assert_eq!(header.generator, "nbdigest");
        assert_eq!(header.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_verbose_echoes_kernel_stderr() {
        let config = ReportConfig {
            verbose: true,
            ..Default::default()
        };
        assert!(config.kernel_options().echo_stderr);
        assert!(!ReportConfig::default().kernel_options().echo_stderr);
    }
}
