//! Notebook document model.
//!
//! Only the fields the text codec needs are modelled. Outputs are carried as
//! opaque JSON so a notebook survives a trip through this crate untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cell or notebook metadata. Keys keep their insertion order.
pub type Metadata = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
    Raw,
}

impl CellType {
    pub fn as_str(self) -> &'static str {
        match self {
            CellType::Code => "code",
            CellType::Markdown => "markdown",
            CellType::Raw => "raw",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "code" => Some(CellType::Code),
            "markdown" | "md" => Some(CellType::Markdown),
            "raw" => Some(CellType::Raw),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub cell_type: CellType,
    pub source: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_count: Option<i64>,
}

impl Cell {
    pub fn new(cell_type: CellType, source: impl Into<String>) -> Self {
        Self {
            cell_type,
            source: source.into(),
            metadata: Metadata::new(),
            outputs: Vec::new(),
            execution_count: None,
        }
    }

    pub fn code(source: impl Into<String>) -> Self {
        Self::new(CellType::Code, source)
    }

    pub fn markdown(source: impl Into<String>) -> Self {
        Self::new(CellType::Markdown, source)
    }

    pub fn raw(source: impl Into<String>) -> Self {
        Self::new(CellType::Raw, source)
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<Value>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Build a cell from text lines; the lines are joined with `\n`.
    pub fn from_lines(cell_type: CellType, lines: &[String]) -> Self {
        Self::new(cell_type, lines.join("\n"))
    }

    /// The source as lines.
    ///
    /// An empty source is one empty line, and a source ending with a newline
    /// gets a trailing empty line, so that joining the lines with `\n` gives
    /// back the source exactly.
    pub fn source_lines(&self) -> Vec<String> {
        source_lines(&self.source)
    }
}

pub(crate) fn source_lines(source: &str) -> Vec<String> {
    if source.is_empty() {
        return vec![String::new()];
    }
    let mut lines: Vec<String> = source.lines().map(str::to_string).collect();
    if source.ends_with('\n') {
        lines.push(String::new());
    }
    lines
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    #[serde(default)]
    pub metadata: Metadata,
    pub cells: Vec<Cell>,
    #[serde(default = "default_nbformat")]
    pub nbformat: u32,
    #[serde(default = "default_nbformat_minor")]
    pub nbformat_minor: u32,
}

fn default_nbformat() -> u32 {
    4
}

fn default_nbformat_minor() -> u32 {
    4
}

impl Default for Notebook {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Notebook {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            metadata: Metadata::new(),
            cells,
            nbformat: default_nbformat(),
            nbformat_minor: default_nbformat_minor(),
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_lines_keep_trailing_newline() {
        assert_eq!(source_lines(""), vec![""]);
        assert_eq!(source_lines("a"), vec!["a"]);
        assert_eq!(source_lines("a\n"), vec!["a", ""]);
        assert_eq!(source_lines("a\n\nb"), vec!["a", "", "b"]);
        assert_eq!(source_lines("a\n\n"), vec!["a", "", ""]);
    }

    #[test]
    fn test_lines_join_back() {
        for source in ["", "x", "x\n", "x\n\ny\n"] {
            let cell = Cell::code(source);
            assert_eq!(cell.source_lines().join("\n"), source);
        }
    }

    #[test]
    fn test_cell_json_shape() {
        let json = r##"{"cell_type": "markdown", "source": "# Title", "metadata": {"b": 1, "a": 2}}"##;
        let cell: Cell = serde_json::from_str(json).unwrap();
        assert_eq!(cell.cell_type, CellType::Markdown);
        let keys: Vec<_> = cell.metadata.keys().cloned().collect();
        assert_eq!(keys, ["b", "a"]);
    }
}
