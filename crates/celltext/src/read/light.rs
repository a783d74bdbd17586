//! Light scripts: code paragraphs, comment paragraphs, and `# +` regions.

use super::{Block, CellReader, Extent, next_code_is_indented, trim_trailing_blanks};
use crate::error::Result;
use crate::format::FormatContext;
use crate::languages::{same_language, uncomment};
use crate::magics::{is_magic, uncomment_magic, unescape_code_start};
use crate::markers::{LineClassifier, LineShape, is_blank};
use crate::metadata::is_active;
use crate::metadata::options::{json_options_to_metadata, text_to_metadata};
use crate::notebook::{CellType, Metadata};
use crate::string_parser::StringParser;
use serde_json::Value;

pub struct LightReader<'a> {
    ctx: &'a FormatContext,
    classifier: LineClassifier,
}

impl<'a> LightReader<'a> {
    pub fn new(ctx: &'a FormatContext) -> Result<Self> {
        Ok(Self {
            ctx,
            classifier: LineClassifier::new(ctx)?,
        })
    }

    fn is_start(&self, line: &str) -> bool {
        matches!(self.classifier.classify(line), LineShape::StartMarker(_))
    }

    /// Every line up to the first blank one is a comment, and none of them
    /// is a commented magic.
    fn paragraph_is_fully_commented(&self, lines: &[String]) -> bool {
        let comment = self.ctx.comment;
        for (i, line) in lines.iter().enumerate() {
            let Some(rest) = line.strip_prefix(comment) else {
                return i > 0 && is_blank(line);
            };
            if rest.trim_start().starts_with(comment) {
                continue;
            }
            if is_magic(line, &self.ctx.default_language, self.ctx.comment_magics) {
                return false;
            }
        }
        true
    }

    fn markdown_end(&self, lines: &[String]) -> Extent {
        for (i, line) in lines.iter().enumerate() {
            if is_blank(line) {
                return Extent::new(i, i + 1, false);
            }
            if i > 0 && self.is_start(line) {
                return Extent::new(i, i, false);
            }
        }
        Extent::new(lines.len(), lines.len(), false)
    }

    fn code_end(&self, lines: &[String], block: &Block) -> Extent {
        let explicit = block.is_explicit();
        let endofcell = block
            .metadata
            .as_ref()
            .and_then(|m| m.get("endofcell"))
            .and_then(Value::as_str)
            .unwrap_or("-");
        let custom_end = self.ctx.light_markers.as_ref().map(|(_, end)| end.as_str());

        let mut parser = StringParser::new(Some(block.language.as_deref().unwrap_or(&self.ctx.default_language)));
        for (i, line) in lines.iter().enumerate() {
            if i < block.body_start {
                continue;
            }
            if parser.is_quoted() {
                parser.read_line(line);
                continue;
            }
            parser.read_line(line);
            match self.classifier.classify(line) {
                LineShape::StartMarker(_) => {
                    let end = trim_trailing_blanks(lines, block.body_start, i);
                    return Extent::new(end, i, false);
                }
                LineShape::EndMarker(token) if explicit && token == custom_end.unwrap_or(endofcell) => {
                    return Extent::new(i, i + 1, true);
                }
                LineShape::Blank if !explicit && !next_code_is_indented(&lines[i..]) => {
                    if i > 0 {
                        return Extent::new(i, i + 1, false);
                    }
                    return if lines.len() > 1 && !is_blank(&lines[1]) {
                        Extent::new(1, 1, false)
                    } else {
                        Extent::new(1, 2.min(lines.len()), false)
                    };
                }
                _ => {}
            }
        }
        if explicit {
            Extent::to_end(lines, block.body_start)
        } else {
            Extent::new(lines.len(), lines.len(), false)
        }
    }

    fn is_foreign(&self, block: &Block) -> bool {
        block
            .language
            .as_deref()
            .is_some_and(|l| !same_language(l, &self.ctx.default_language))
    }
}

impl CellReader for LightReader<'_> {
    fn context(&self) -> &FormatContext {
        self.ctx
    }

    fn open(&self, lines: &[String]) -> Result<Block> {
        let LineShape::StartMarker(options) = self.classifier.classify(&lines[0]) else {
            if self.paragraph_is_fully_commented(lines) {
                return Ok(Block::paragraph(CellType::Markdown));
            }
            return Ok(Block::paragraph(CellType::Code));
        };

        let mut metadata = if self.ctx.light_markers.is_some() {
            let (title, mut metadata) = text_to_metadata(options);
            if !title.is_empty() {
                metadata.insert("title".into(), Value::String(title));
            }
            metadata
        } else if options.trim().is_empty() {
            Metadata::new()
        } else {
            json_options_to_metadata(options)?
        };

        let cell_type = match metadata.get("cell_type").and_then(Value::as_str).and_then(CellType::parse) {
            Some(cell_type) => {
                metadata.shift_remove("cell_type");
                cell_type
            }
            None => CellType::Code,
        };
        Ok(Block::marked(cell_type, metadata))
    }

    fn find_end(&self, lines: &[String], block: &Block) -> Extent {
        if !block.is_explicit() && block.cell_type == CellType::Markdown {
            return self.markdown_end(lines);
        }
        self.code_end(lines, block)
    }

    fn content(&self, source: Vec<String>, block: &Block, metadata: &mut Metadata) -> Vec<String> {
        let ctx = self.ctx;
        let language = block.language.clone().unwrap_or_else(|| ctx.default_language.clone());
        if block.cell_type == CellType::Markdown {
            if block.is_explicit() {
                let source = unescape_code_start(&source, &ctx.extension, None);
                return uncomment(&source, ctx.comment);
            }
            let source = uncomment(&source, ctx.comment);
            return uncomment_magic(&source, &ctx.default_language, ctx.comment_magics);
        }

        let active = is_active(&ctx.extension, metadata);
        if !active || (self.is_foreign(block) && !metadata.contains_key("active")) {
            let source = uncomment(&source, ctx.comment);
            return unescape_code_start(&source, &ctx.extension, Some(&language));
        }
        let source = uncomment_magic(&source, &language, ctx.comment_magics);
        unescape_code_start(&source, &ctx.extension, Some(&language))
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

    fn read(options: FormatOptions, text: &str) -> (ReadCell, usize) {
        let ctx = FormatContext::new(&options, Dialect::Light, "python");
        LightReader::new(&ctx).unwrap().read(&lines(text)).unwrap()
    }

    #[test]
    fn test_code_paragraph_ends_at_blank_line() {
        let (cell, used) = read(FormatOptions::new("py"), "x = 1\ny = 2\n\nz = 3");
        assert_eq!(cell.cell.cell_type, CellType::Code);
        assert_eq!(cell.cell.source, "x = 1\ny = 2");
        assert_eq!(used, 3);
    }

    #[test]
    fn test_indented_code_continues_after_blank_line() {
        let (cell, used) = read(FormatOptions::new("py"), "def f(x):\n\n    return x\n\n\nf(1)");
        assert_eq!(cell.cell.source, "def f(x):\n\n    return x");
        assert_eq!(used, 5);
        assert!(cell.cell.metadata.is_empty());
    }

    #[test]
    fn test_comment_paragraph_is_markdown() {
        let (cell, used) = read(FormatOptions::new("py"), "# A title\n#\n# Text\n\nx = 1");
        assert_eq!(cell.cell.cell_type, CellType::Markdown);
        assert_eq!(cell.cell.source, "A title\n\nText");
        assert_eq!(used, 4);
    }

    #[test]
    fn test_commented_magic_is_code() {
        let (cell, _) = read(FormatOptions::new("py"), "# %matplotlib inline\nx = 1");
        assert_eq!(cell.cell.cell_type, CellType::Code);
        assert_eq!(cell.cell.source, "%matplotlib inline\nx = 1");
    }

    #[test]
    fn test_explicit_region_with_metadata() {
        let text = "# + {\"tags\": [\"a\"]}\nx = 1\n\ny = 2\n# -\n\nz = 3";
        let (cell, used) = read(FormatOptions::new("py"), text);
        assert_eq!(cell.cell.source, "x = 1\n\ny = 2");
        assert_eq!(cell.cell.metadata.get("tags"), Some(&serde_json::json!(["a"])));
        assert_eq!(used, 6);
    }

    #[test]
    fn test_escalated_end_marker() {
        let text = "# + {\"endofcell\": \"--\"}\nx = 1\n# -\ny = 2\n# --";
        let (cell, used) = read(FormatOptions::new("py"), text);
        assert_eq!(cell.cell.source, "x = 1\n# -\ny = 2");
        assert!(cell.cell.metadata.is_empty());
        assert_eq!(used, 5);
    }

    #[test]
    fn test_region_ended_by_next_start_marker() {
        let (cell, used) = read(FormatOptions::new("py"), "# +\nx = 1\n\ny = 2\n\n# +\nz = 3");
        assert_eq!(cell.cell.source, "x = 1\n\ny = 2");
        assert_eq!(used, 5);
    }

    #[test]
    fn test_markdown_region_and_inactive_code() {
        let (cell, _) = read(
            FormatOptions::new("py"),
            "# + {\"cell_type\": \"markdown\", \"key\": 1}\n# # Title\n# text\n# -",
        );
        assert_eq!(cell.cell.cell_type, CellType::Markdown);
        assert_eq!(cell.cell.source, "# Title\ntext");

        let (cell, _) = read(FormatOptions::new("py"), "# + {\"active\": \"ipynb\"}\n# %time\n# x = 1\n# -");
        assert_eq!(cell.cell.cell_type, CellType::Code);
        assert_eq!(cell.cell.source, "%time\nx = 1");

        let (cell, _) = read(FormatOptions::new("py"), "# + {\"active\": \"\"}\n# raw text\n# -");
        assert_eq!(cell.cell.cell_type, CellType::Raw);
        assert_eq!(cell.cell.source, "raw text");
        assert!(cell.cell.metadata.is_empty());
    }

    #[test]
    fn test_custom_markers() {
        let options = FormatOptions::new("py").with_cell_markers("{{{,}}}");
        let (cell, used) = read(options, "# {{{ Imports {\"k\": 1}\nimport os\n\nimport sys\n# }}}\n\nx = 1");
        assert_eq!(cell.cell.source, "import os\n\nimport sys");
        assert_eq!(cell.cell.metadata.get("title"), Some(&Value::from("Imports")));
        assert_eq!(cell.cell.metadata.get("k"), Some(&Value::from(1)));
        assert_eq!(used, 6);
    }

    #[test]
    fn test_markers_inside_strings_are_code() {
        let (cell, _) = read(FormatOptions::new("py"), "# +\nx = \"\"\"\n# -\n\"\"\"\n# -");
        assert_eq!(cell.cell.source, "x = \"\"\"\n# -\n\"\"\"");
    }
}
