//! Jupyter notebook (.ipynb) document model.
//!
//! Only the parts of nbformat v4 that execution and rendering need are
//! modelled; unknown fields are ignored on read.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A Jupyter notebook.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notebook {
    /// Notebook metadata
    #[serde(default)]
    pub metadata: NotebookMetadata,

    /// Format version
    #[serde(default = "default_nbformat")]
    pub nbformat: u32,

    /// Minor format version
    #[serde(default)]
    pub nbformat_minor: u32,

    /// Notebook cells, in document order
    #[serde(default)]
    pub cells: Vec<Cell>,
}

fn default_nbformat() -> u32 {
    4
}

/// Notebook-level metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotebookMetadata {
    /// Kernel the notebook was authored against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernelspec: Option<KernelSpecMetadata>,

    /// Language info written by the kernel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_info: Option<LanguageInfo>,
}

/// The `kernelspec` block of notebook metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelSpecMetadata {
    /// Kernel name (e.g. `python3`)
    #[serde(default)]
    pub name: String,

    /// Display name
    #[serde(default)]
    pub display_name: String,

    /// Language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// The `language_info` block of notebook metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageInfo {
    /// Language name
    #[serde(default)]
    pub name: String,
}

/// A notebook cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cell_type", rename_all = "lowercase")]
pub enum Cell {
    Markdown(MarkdownCell),
    Code(CodeCell),
    Raw(RawCell),
}

/// Prose cell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkdownCell {
    #[serde(default, with = "multiline")]
    pub source: String,
}

/// Source cell with the outputs its last execution produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeCell {
    #[serde(default, with = "multiline")]
    pub source: String,

    #[serde(default)]
    pub outputs: Vec<Output>,

    #[serde(default)]
    pub execution_count: Option<u32>,
}

/// Unrendered passthrough cell.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCell {
    #[serde(default, with = "multiline")]
    pub source: String,
}

/// Cell output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum Output {
    /// Standard output/error
    Stream(StreamOutput),

    /// Value of the last expression in a cell
    ExecuteResult(ExecuteResult),

    /// Rich display data
    DisplayData(DisplayData),

    /// Raised exception
    Error(ErrorOutput),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOutput {
    /// `stdout` or `stderr`
    #[serde(default = "default_stream_name")]
    pub name: String,

    #[serde(default, with = "multiline")]
    pub text: String,
}

fn default_stream_name() -> String {
    "stdout".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteResult {
    #[serde(default)]
    pub execution_count: Option<u32>,

    #[serde(default)]
    pub data: MimeBundle,

    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplayData {
    #[serde(default)]
    pub data: MimeBundle,

    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorOutput {
    #[serde(default = "default_ename")]
    pub ename: String,

    #[serde(default)]
    pub evalue: String,

    #[serde(default)]
    pub traceback: Vec<String>,
}

fn default_ename() -> String {
    "Error".to_string()
}

/// Output data keyed by MIME type.
///
/// Text payloads may be stored as a single string or as a list of lines;
/// [`MimeBundle::text`] hides the difference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MimeBundle(BTreeMap<String, serde_json::Value>);

impl MimeBundle {
    pub const TEXT_PLAIN: &'static str = "text/plain";
    pub const IMAGE_PNG: &'static str = "image/png";

    /// Whether a payload exists for `mime`.
    pub fn contains(&self, mime: &str) -> bool {
        self.0.contains_key(mime)
    }

    /// The payload for `mime` as a single string.
    ///
    /// Returns `None` if absent or not textual.
    pub fn text(&self, mime: &str) -> Option<String> {
        match self.0.get(mime)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(lines) => lines
                .iter()
                .map(|line| line.as_str())
                .collect::<Option<Vec<_>>>()
                .map(|lines| lines.concat()),
            _ => None,
        }
    }

    /// Insert a textual payload.
    pub fn insert(&mut self, mime: impl Into<String>, payload: impl Into<String>) {
        self.0
            .insert(mime.into(), serde_json::Value::String(payload.into()));
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MimeBundle {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bundle = MimeBundle::default();
        for (mime, payload) in iter {
            bundle.insert(mime, payload);
        }
        bundle
    }
}

impl Notebook {
    /// Read a notebook from a file.
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::NotebookRead {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let notebook: Self =
            serde_json::from_str(&content).map_err(|source| Error::InvalidNotebook {
                path: path.to_path_buf(),
                source,
            })?;

        if notebook.nbformat != 4 {
            tracing::warn!(
                "{} declares nbformat {}, reading it as v4",
                path.display(),
                notebook.nbformat
            );
        }

        Ok(notebook)
    }

    /// Source language, used to tag code fences.
    pub fn language(&self) -> &str {
        self.metadata
            .language_info
            .as_ref()
            .map(|info| info.name.as_str())
            .filter(|name| !name.is_empty())
            .or_else(|| {
                self.metadata
                    .kernelspec
                    .as_ref()
                    .and_then(|k| k.language.as_deref())
            })
            .unwrap_or("python")
    }

    /// Iterate mutably over code cells with their cell index.
    pub fn code_cells_mut(&mut self) -> impl Iterator<Item = (usize, &mut CodeCell)> {
        self.cells
            .iter_mut()
            .enumerate()
            .filter_map(|(index, cell)| match cell {
                Cell::Code(code) => Some((index, code)),
                _ => None,
            })
    }
}

/// nbformat multiline strings: either `"text"` or `["line\n", "line"]`.
mod multiline {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(text: &str, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            One(String),
            Lines(Vec<String>),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::One(text) => text,
            Repr::Lines(lines) => lines.concat(),
        })
    }
}
