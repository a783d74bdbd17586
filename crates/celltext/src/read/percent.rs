//! Percent and Hydrogen scripts: every cell opens with `# %%`.

use super::{Block, CellReader, Extent};
use crate::error::Result;
use crate::format::FormatContext;
use crate::languages::{same_language, uncomment};
use crate::magics::{uncomment_magic, unescape_percent_start};
use crate::markers::{LineClassifier, LineShape, is_blank};
use crate::metadata::is_active;
use crate::metadata::options::double_percent_options_to_metadata;
use crate::notebook::{CellType, Metadata};
use serde_json::Value;

pub struct PercentReader<'a> {
    ctx: &'a FormatContext,
    classifier: LineClassifier,
}

impl<'a> PercentReader<'a> {
    pub fn new(ctx: &'a FormatContext) -> Result<Self> {
        Ok(Self {
            ctx,
            classifier: LineClassifier::new(ctx)?,
        })
    }

    /// Strip the string marker lines around a markdown or raw cell.
    fn unwrap_marker(&self, source: &[String], metadata: &mut Metadata) -> Option<Vec<String>> {
        let (first, last) = (source.first()?, source.last()?);
        if source.len() < 2 || !matches!(first.as_str(), "\"\"\"" | "'''") || first != last {
            return None;
        }
        if self.ctx.wrap_marker.as_deref() != Some(first.as_str()) {
            metadata.insert("cell_marker".into(), Value::String(first.clone()));
        }
        Some(source[1..source.len() - 1].to_vec())
    }
}

impl CellReader for PercentReader<'_> {
    fn context(&self) -> &FormatContext {
        self.ctx
    }

    fn open(&self, lines: &[String]) -> Result<Block> {
        let LineShape::StartMarker(options) = self.classifier.classify(&lines[0]) else {
            return Ok(Block::paragraph(CellType::Code));
        };
        let mut metadata = double_percent_options_to_metadata(options)?;
        let cell_type = match metadata.shift_remove("cell_type") {
            Some(Value::String(name)) => CellType::parse(&name).unwrap_or(CellType::Code),
            _ => CellType::Code,
        };
        Ok(Block::marked(cell_type, metadata))
    }

    fn find_end(&self, lines: &[String], _block: &Block) -> Extent {
        for (i, line) in lines.iter().enumerate().skip(1) {
            if !matches!(self.classifier.classify(line), LineShape::StartMarker(_)) {
                continue;
            }
            if i > 1 && is_blank(&lines[i - 1]) {
                if i > 2 && is_blank(&lines[i - 2]) {
                    return Extent::new(i - 2, i, false);
                }
                return Extent::new(i - 1, i, false);
            }
            return Extent::new(i, i, false);
        }
        Extent::new(lines.len(), lines.len(), false)
    }

    fn content(&self, source: Vec<String>, block: &Block, metadata: &mut Metadata) -> Vec<String> {
        let ctx = self.ctx;
        if block.cell_type != CellType::Code {
            if let Some(inner) = self.unwrap_marker(&source, metadata) {
                return inner;
            }
            return uncomment(&source, ctx.comment);
        }

        let foreign = block
            .language
            .as_deref()
            .is_some_and(|l| !same_language(l, &ctx.default_language));
        if !is_active(&ctx.extension, metadata) || (foreign && !metadata.contains_key("active")) {
            return uncomment(&source, ctx.comment);
        }
        let language = block.language.as_deref().unwrap_or(&ctx.default_language);
        let source = unescape_percent_start(&source, ctx.comment);
        uncomment_magic(&source, language, ctx.comment_magics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Dialect, FormatOptions};
    use crate::read::ReadCell;

    fn lines(text: &str) -> Vec<String> {
        text.split('\n').map(str::to_string).collect()
    }

    fn read_with(options: FormatOptions, dialect: Dialect, text: &str) -> (ReadCell, usize) {
        let ctx = FormatContext::new(&options, dialect, "python");
        PercentReader::new(&ctx).unwrap().read(&lines(text)).unwrap()
    }

    fn read(text: &str) -> (ReadCell, usize) {
        read_with(FormatOptions::new("py"), Dialect::Percent, text)
    }

    #[test]
    fn test_code_cell_ends_at_next_header() {
        let (cell, used) = read("# %%\nx = 1\n\n# %%\ny = 2");
        assert_eq!(cell.cell.cell_type, CellType::Code);
        assert_eq!(cell.cell.source, "x = 1");
        assert!(cell.cell.metadata.is_empty());
        assert_eq!(used, 3);
    }

    #[test]
    fn test_two_blank_lines_are_expected_after_functions() {
        let (cell, used) = read("# %%\ndef f():\n    pass\n\n\n# %%\nf()");
        assert_eq!(cell.cell.source, "def f():\n    pass");
        assert!(cell.cell.metadata.is_empty());
        assert_eq!(used, 5);

        let (cell, _) = read("# %%\nx = 1\n\n\n# %%\ny = 2");
        assert_eq!(cell.cell.metadata.get("lines_to_next_cell"), Some(&Value::from(2)));
    }

    #[test]
    fn test_header_options() {
        let (cell, _) = read("# %% Imports [markdown] {\"key\": \"value\"}\n# Some *text*");
        assert_eq!(cell.cell.cell_type, CellType::Markdown);
        assert_eq!(cell.cell.source, "Some *text*");
        assert_eq!(cell.cell.metadata.get("title"), Some(&Value::from("Imports")));
        assert_eq!(cell.cell.metadata.get("key"), Some(&Value::from("value")));
        assert!(!cell.cell.metadata.contains_key("cell_type"));

        let (cell, _) = read("# %%% Section\nx = 1");
        assert_eq!(cell.cell.metadata.get("cell_depth"), Some(&Value::from(1)));
        assert_eq!(cell.cell.metadata.get("title"), Some(&Value::from("Section")));
    }

    #[test]
    fn test_raw_and_foreign_cells() {
        let (cell, _) = read("# %% [raw]\n# raw text");
        assert_eq!(cell.cell.cell_type, CellType::Raw);
        assert_eq!(cell.cell.source, "raw text");

        let (cell, _) = read("# %% {\"language\": \"R\"}\n# ls()");
        assert_eq!(cell.language.as_deref(), Some("R"));
        assert_eq!(cell.cell.source, "ls()");
        assert!(cell.cell.metadata.is_empty());
    }

    #[test]
    fn test_magics_are_uncommented() {
        let (cell, _) = read("# %%\n# %matplotlib inline\nx = 1");
        assert_eq!(cell.cell.source, "%matplotlib inline\nx = 1");

        let (cell, _) = read_with(FormatOptions::new("py"), Dialect::Hydrogen, "# %%\n%matplotlib inline");
        assert_eq!(cell.cell.source, "%matplotlib inline");
    }

    #[test]
    fn test_text_before_first_header_is_code() {
        let (cell, used) = read("import os\n\n# %%\nx = 1");
        assert_eq!(cell.cell.cell_type, CellType::Code);
        assert_eq!(cell.cell.source, "import os");
        assert_eq!(used, 2);
    }

    #[test]
    fn test_string_markers_around_markdown() {
        let (cell, _) = read("# %% [markdown]\n\"\"\"\nSome text\n\"\"\"");
        assert_eq!(cell.cell.source, "Some text");
        assert_eq!(cell.cell.metadata.get("cell_marker"), Some(&Value::from("\"\"\"")));

        let options = FormatOptions::new("py").with_cell_markers("\"\"\"");
        let (cell, _) = read_with(options, Dialect::Percent, "# %% [markdown]\n\"\"\"\nSome text\n\"\"\"");
        assert_eq!(cell.cell.source, "Some text");
        assert!(cell.cell.metadata.is_empty());
    }

    #[test]
    fn test_escaped_headers_stay_in_the_cell() {
        let (cell, used) = read("# %%\ns = 1\n# # %% not a cell\n# # # %% already");
        assert_eq!(cell.cell.source, "s = 1\n# %% not a cell\n# # %% already");
        assert_eq!(used, 4);
    }

    #[test]
    fn test_empty_cell() {
        let (cell, used) = read("# %%\n# %%\nx = 1");
        assert_eq!(cell.cell.source, "");
        assert!(cell.lines.is_empty());
        assert_eq!(cell.cell.metadata.get("lines_to_next_cell"), Some(&Value::from(0)));
        assert_eq!(used, 1);
    }
}
