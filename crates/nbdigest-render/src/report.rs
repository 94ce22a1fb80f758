//! Report accumulation.
//!
//! The report is a header followed by one fragment per notebook, each
//! fragment trailed by a visual separator. Everything is held in memory and
//! joined once at the end.

/// Visual separator placed after every fragment.
pub const SEPARATOR: &str = "\n<br>\n\n---\n<br>\n";

/// Fixed header block of a report.
#[derive(Debug, Clone)]
pub struct ReportHeader {
    /// Run title, rendered as a level-1 heading.
    pub title: String,
    /// Directory the notebooks came from, as the user gave it.
    pub source_dir: String,
    /// Name of the generating program.
    pub generator: String,
}

/// Builds a report in notebook order.
#[derive(Debug)]
pub struct ReportBuilder {
    pieces: Vec<String>,
    critical: usize,
}

impl ReportBuilder {
    pub fn new(header: &ReportHeader) -> Self {
        let source_dir = header.source_dir.trim_end_matches('/');
        Self {
            pieces: vec![
                format!("# {}\n", header.title),
                format!("**Source Directory**: `{}/`\n", source_dir),
                format!("**Generated**: {}\n", header.generator),
                "---\n".to_string(),
            ],
            critical: 0,
        }
    }

    /// Append a rendered notebook fragment and its separator.
    pub fn push_fragment(&mut self, fragment: String) {
        self.pieces.push(fragment);
        self.pieces.push(SEPARATOR.to_string());
    }

    /// Append the stand-in for a notebook that could not be processed.
    pub fn push_critical(&mut self, file_name: &str, error: &str) {
        tracing::debug!("Recording critical failure for {}", file_name);
        self.pieces.push(critical_fragment(file_name, error));
        self.critical += 1;
    }

    /// Number of notebooks recorded as critical failures.
    pub fn critical_count(&self) -> usize {
        self.critical
    }

    /// The full report text.
    pub fn finish(self) -> String {
        self.pieces.join("\n")
    }
}

/// Minimal fragment naming a notebook and the fault that stopped it.
pub fn critical_fragment(file_name: &str, error: &str) -> String {
    format!(
        "## {}\n\nCritical error processing notebook: {}\n",
        file_name, error
    )
}
