//! knitr spin scripts: `#'` prose, `#+` chunk options, R code.

use super::{Block, CellReader, Extent, next_code_is_indented};
use crate::error::Result;
use crate::format::FormatContext;
use crate::languages::{same_language, uncomment};
use crate::magics::{uncomment_magic, unescape_code_start};
use crate::markers::{LineClassifier, LineShape, is_blank};
use crate::metadata::is_active;
use crate::metadata::options::rmd_options_to_metadata;
use crate::notebook::{CellType, Metadata};

const PROSE: &str = "#'";

pub struct RScriptReader<'a> {
    ctx: &'a FormatContext,
    classifier: LineClassifier,
}

impl<'a> RScriptReader<'a> {
    pub fn new(ctx: &'a FormatContext) -> Result<Self> {
        Ok(Self {
            ctx,
            classifier: LineClassifier::new(ctx)?,
        })
    }

    fn prose_end(&self, lines: &[String]) -> Extent {
        for (i, line) in lines.iter().enumerate() {
            match self.classifier.classify(line) {
                LineShape::Prose => {}
                LineShape::Blank => return Extent::new(i, i + 1, false),
                _ => return Extent::new(i, i, false),
            }
        }
        Extent::new(lines.len(), lines.len(), false)
    }

    fn code_end(&self, lines: &[String], block: &Block) -> Extent {
        for (i, line) in lines.iter().enumerate().skip(block.body_start) {
            match self.classifier.classify(line) {
                LineShape::ChunkHeader(_) | LineShape::Prose if i > 0 => {
                    if i > block.body_start && is_blank(&lines[i - 1]) {
                        return Extent::new(i - 1, i, false);
                    }
                    return Extent::new(i, i, false);
                }
                LineShape::Blank if !next_code_is_indented(&lines[i..]) => {
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
        Extent::to_end(lines, block.body_start)
    }
}

impl CellReader for RScriptReader<'_> {
    fn context(&self) -> &FormatContext {
        self.ctx
    }

    fn open(&self, lines: &[String]) -> Result<Block> {
        Ok(match self.classifier.classify(&lines[0]) {
            LineShape::Prose => Block::paragraph(CellType::Markdown),
            LineShape::ChunkHeader(options) => {
                let (_, metadata) = rmd_options_to_metadata(&format!("r {options}"));
                Block::marked(CellType::Code, metadata)
            }
            _ => Block::paragraph(CellType::Code),
        })
    }

    fn find_end(&self, lines: &[String], block: &Block) -> Extent {
        match block.cell_type {
            CellType::Markdown => self.prose_end(lines),
            _ => self.code_end(lines, block),
        }
    }

    fn content(&self, source: Vec<String>, block: &Block, metadata: &mut Metadata) -> Vec<String> {
        let ctx = self.ctx;
        if block.cell_type == CellType::Markdown {
            return uncomment(&source, PROSE);
        }
        let language = block.language.as_deref().unwrap_or(&ctx.default_language);
        let foreign = !same_language(language, &ctx.default_language);
        let source = if !is_active(&ctx.extension, metadata) || (foreign && !metadata.contains_key("active")) {
            uncomment(&source, ctx.comment)
        } else {
            uncomment_magic(&source, language, ctx.comment_magics)
        };
        unescape_code_start(&source, &ctx.extension, Some(language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Dialect, FormatOptions};
    use crate::read::ReadCell;
    use serde_json::Value;

    fn read(text: &str) -> (ReadCell, usize) {
        let ctx = FormatContext::new(&FormatOptions::new("R"), Dialect::RScript, "R");
        let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
        RScriptReader::new(&ctx).unwrap().read(&lines).unwrap()
    }

    #[test]
    fn test_prose() {
        let (cell, used) = read("#' # Title\n#'\n#' Text\n\nx <- 1");
        assert_eq!(cell.cell.cell_type, CellType::Markdown);
        assert_eq!(cell.cell.source, "# Title\n\nText");
        assert_eq!(used, 4);
    }

    #[test]
    fn test_prose_followed_by_code() {
        let (cell, used) = read("#' Text\nx <- 1");
        assert_eq!(cell.cell.source, "Text");
        assert_eq!(cell.cell.metadata.get("lines_to_next_cell"), Some(&Value::from(0)));
        assert_eq!(used, 1);
    }

    #[test]
    fn test_chunk_options() {
        let (cell, used) = read("#+ fig, echo=FALSE\nplot(x)\n\n#' Text");
        assert_eq!(cell.cell.cell_type, CellType::Code);
        assert_eq!(cell.cell.source, "plot(x)");
        assert_eq!(cell.cell.metadata.get("name"), Some(&Value::from("fig")));
        assert_eq!(cell.cell.metadata.get("hide_input"), Some(&Value::from(true)));
        assert_eq!(used, 3);
    }

    #[test]
    fn test_code_paragraph() {
        let (cell, used) = read("f <- function(x) {\n\n  x\n}\n\ny <- 2");
        assert_eq!(cell.cell.source, "f <- function(x) {\n\n  x\n}");
        assert_eq!(used, 5);
    }

    #[test]
    fn test_inactive_and_raw_chunks() {
        let (cell, _) = read("#+ active=\"ipynb\", eval=FALSE\n# %time\n# x <- 1");
        assert_eq!(cell.cell.cell_type, CellType::Code);
        assert_eq!(cell.cell.source, "%time\nx <- 1");
        assert_eq!(cell.cell.metadata.get("active"), Some(&Value::from("ipynb")));
        assert!(!cell.cell.metadata.contains_key("eval"));

        let (cell, _) = read("#+ active=\"\", eval=FALSE\n# raw");
        assert_eq!(cell.cell.cell_type, CellType::Raw);
        assert_eq!(cell.cell.source, "raw");
        assert!(cell.cell.metadata.is_empty());
    }

    #[test]
    fn test_escaped_chunk_header() {
        let (cell, _) = read("x <- 1\n# #+ not a header");
        assert_eq!(cell.cell.source, "x <- 1\n#+ not a header");
    }
}
