//! Markdown and R Markdown: prose paragraphs, code fences, and HTML comment
//! regions.

use super::{Block, CellReader, Extent};
use crate::error::Result;
use crate::format::{Dialect, FormatContext};
use crate::languages::same_language;
use crate::magics::{uncomment_magic, unescape_code_start};
use crate::markers::{LineClassifier, LineShape, backtick_run};
use crate::metadata::is_active;
use crate::metadata::options::{
    json_options_to_metadata, md_options_to_metadata, rmd_options_to_metadata, text_to_metadata,
};
use crate::notebook::{CellType, Metadata};
use serde_json::Value;

pub struct MarkdownReader<'a> {
    ctx: &'a FormatContext,
    classifier: LineClassifier,
}

impl<'a> MarkdownReader<'a> {
    pub fn new(ctx: &'a FormatContext) -> Result<Self> {
        Ok(Self {
            ctx,
            classifier: LineClassifier::new(ctx)?,
        })
    }

    fn is_rmd(&self) -> bool {
        self.ctx.dialect == Dialect::RMarkdown
    }

    /// The language and metadata of a line that opens a code cell.
    fn code_start(&self, shape: LineShape<'_>) -> Option<(String, Metadata)> {
        match shape {
            LineShape::ChunkHeader(options) => Some(rmd_options_to_metadata(options)),
            LineShape::FenceOpen(info) if !self.is_rmd() => {
                let (language, metadata) = md_options_to_metadata(info);
                let language = language.or_else(|| {
                    info.split_whitespace()
                        .next()
                        .filter(|first| same_language(first, &self.ctx.default_language))
                        .map(str::to_string)
                })?;
                Some((language, metadata))
            }
            _ => None,
        }
    }

    fn starts_cell(&self, shape: LineShape<'_>) -> bool {
        matches!(shape, LineShape::RegionStart { .. }) || self.code_start(shape).is_some()
    }

    fn paragraph_end(&self, lines: &[String]) -> Extent {
        let mut prev_blank = 0;
        let mut fence: Option<usize> = None;
        let mut last_nonblank: Option<&str> = None;
        for (i, line) in lines.iter().enumerate() {
            let shape = self.classifier.classify(line);
            if let Some(ticks) = fence {
                if closes_fence(line, ticks) {
                    fence = None;
                }
                prev_blank = 0;
                last_nonblank = Some(line);
                continue;
            }
            if shape == LineShape::Blank {
                prev_blank += 1;
                continue;
            }
            if i > 0 && self.starts_cell(shape) {
                return Extent::new(i - prev_blank, i, false);
            }
            if self.ctx.split_at_heading && line.starts_with('#') && prev_blank >= 1 {
                return Extent::new(i - prev_blank, i, false);
            }
            let indented = |l: &str| l.starts_with("    ");
            if prev_blank >= 2 && !(indented(line) && last_nonblank.is_some_and(indented)) {
                return Extent::new(i - prev_blank, i, true);
            }
            if matches!(shape, LineShape::FenceOpen(_) | LineShape::FenceClose | LineShape::ChunkHeader(_)) {
                fence = Some(backtick_run(line));
            }
            prev_blank = 0;
            last_nonblank = Some(line);
        }
        Extent::to_end(lines, 0)
    }

    /// Index of the first line after the opening one that matches `closes`.
    fn closing_line(lines: &[String], closes: impl Fn(&str) -> bool) -> Option<usize> {
        lines.iter().skip(1).position(|line| closes(line)).map(|j| j + 1)
    }
}

/// A bare fence of at least `ticks` backticks.
fn closes_fence(line: &str, ticks: usize) -> bool {
    let run = backtick_run(line);
    run >= ticks && line[run..].trim().is_empty()
}

impl CellReader for MarkdownReader<'_> {
    fn context(&self) -> &FormatContext {
        self.ctx
    }

    fn open(&self, lines: &[String]) -> Result<Block> {
        let shape = self.classifier.classify(&lines[0]);
        if let LineShape::RegionStart { raw, options } = shape {
            if raw {
                let metadata = if options.is_empty() {
                    Metadata::new()
                } else {
                    json_options_to_metadata(options)?
                };
                return Ok(Block::marked(CellType::Raw, metadata));
            }
            let (title, mut metadata) = text_to_metadata(options);
            if !title.is_empty() {
                metadata.insert("title".into(), Value::String(title));
            }
            return Ok(Block::marked(CellType::Markdown, metadata));
        }
        if let Some((language, metadata)) = self.code_start(shape) {
            return Ok(Block::marked(CellType::Code, metadata).with_language(Some(language)));
        }
        Ok(Block::paragraph(CellType::Markdown))
    }

    fn find_end(&self, lines: &[String], block: &Block) -> Extent {
        if !block.is_explicit() {
            return self.paragraph_end(lines);
        }
        let closing = match block.cell_type {
            CellType::Code => {
                let fence = &lines[0][..backtick_run(&lines[0])];
                Self::closing_line(lines, |line| line.trim_end() == fence)
            }
            cell_type => {
                let raw = cell_type == CellType::Raw;
                Self::closing_line(lines, |line| {
                    self.classifier.classify(line) == LineShape::RegionEnd { raw }
                })
            }
        };
        match closing {
            Some(j) => Extent::new(j, j + 1, true),
            None => Extent::to_end(lines, block.body_start),
        }
    }

    fn content(&self, source: Vec<String>, block: &Block, metadata: &mut Metadata) -> Vec<String> {
        if block.cell_type != CellType::Code {
            return source;
        }
        let ctx = self.ctx;
        let language = block.language.as_deref().unwrap_or(&ctx.default_language);
        let source = unescape_code_start(&source, &ctx.extension, Some(language));
        if self.is_rmd() && !is_active(&ctx.extension, metadata) {
            return source;
        }
        uncomment_magic(&source, language, ctx.comment_magics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::ReadCell;

    fn lines(text: &str) -> Vec<String> {
        text.split('\n').map(str::to_string).collect()
    }

    fn read_with(options: &str, text: &str) -> (ReadCell, usize) {
        let options: crate::format::FormatOptions = options.parse().unwrap();
        let dialect = crate::registry::lookup(&options.extension, options.format_name.as_deref()).unwrap();
        let default_language = if dialect == Dialect::RMarkdown { "R" } else { "python" };
        let ctx = FormatContext::new(&options, dialect, default_language);
        MarkdownReader::new(&ctx).unwrap().read(&lines(text)).unwrap()
    }

    fn read(text: &str) -> (ReadCell, usize) {
        read_with("md", text)
    }

    #[test]
    fn test_paragraphs_split_at_two_blank_lines() {
        let (cell, used) = read("# Title\n\nSome text\n\n\nMore text");
        assert_eq!(cell.cell.cell_type, CellType::Markdown);
        assert_eq!(cell.cell.source, "# Title\n\nSome text");
        assert!(cell.cell.metadata.is_empty());
        assert_eq!(used, 5);
    }

    #[test]
    fn test_paragraph_ends_at_code_fence() {
        let (cell, used) = read("Some text\n\n```python\nx = 1\n```");
        assert_eq!(cell.cell.source, "Some text");
        assert!(cell.cell.metadata.is_empty());
        assert_eq!(used, 2);
    }

    #[test]
    fn test_code_fence() {
        let (cell, used) = read("```python tags=[\"a\"]\nx = 1\n```\n\nText");
        assert_eq!(cell.cell.cell_type, CellType::Code);
        assert_eq!(cell.cell.source, "x = 1");
        assert_eq!(cell.language.as_deref(), Some("python"));
        assert_eq!(cell.cell.metadata.get("tags"), Some(&serde_json::json!(["a"])));
        assert_eq!(used, 4);

        let (cell, _) = read("```R\nls()\n```");
        assert_eq!(cell.language.as_deref(), Some("R"));
    }

    #[test]
    fn test_other_fences_stay_in_the_paragraph() {
        let text = "Example:\n\n```text\nnot code\n\n\nstill not\n```\n\nend";
        let (cell, used) = read(text);
        assert_eq!(cell.cell.cell_type, CellType::Markdown);
        assert_eq!(cell.cell.source, text);
        assert_eq!(used, 10);
    }

    #[test]
    fn test_indented_code_block_is_not_split() {
        let text = "Code:\n\n    x = 1\n\n\n    y = 2";
        let (cell, _) = read(text);
        assert_eq!(cell.cell.source, text);
    }

    #[test]
    fn test_regions() {
        let (cell, used) = read("<!-- #region Intro {\"key\": 1} -->\nA\n\n\nB\n<!-- #endregion -->\n\nx");
        assert_eq!(cell.cell.cell_type, CellType::Markdown);
        assert_eq!(cell.cell.source, "A\n\n\nB");
        assert_eq!(cell.cell.metadata.get("title"), Some(&Value::from("Intro")));
        assert_eq!(cell.cell.metadata.get("key"), Some(&Value::from(1)));
        assert_eq!(used, 7);

        let (cell, _) = read("<!-- #raw {\"format\": \"text/html\"} -->\n<b>raw</b>\n<!-- #endraw -->");
        assert_eq!(cell.cell.cell_type, CellType::Raw);
        assert_eq!(cell.cell.source, "<b>raw</b>");
        assert_eq!(cell.cell.metadata.get("format"), Some(&Value::from("text/html")));
    }

    #[test]
    fn test_split_at_heading() {
        let options = "md";
        let text = "Intro\n\n# Part";
        assert_eq!(read_with(options, text).0.cell.source, "Intro\n\n# Part");

        let options = crate::format::FormatOptions::new("md").with_split_at_heading(true);
        let ctx = FormatContext::new(&options, Dialect::Markdown, "python");
        let (cell, used) = MarkdownReader::new(&ctx).unwrap().read(&lines(text)).unwrap();
        assert_eq!(cell.cell.source, "Intro");
        assert!(cell.cell.metadata.is_empty());
        assert_eq!(used, 2);
    }

    #[test]
    fn test_rmarkdown_chunks() {
        let (cell, used) = read_with("Rmd", "```{r plot, echo=FALSE}\nplot(x)\n```");
        assert_eq!(cell.cell.cell_type, CellType::Code);
        assert_eq!(cell.language.as_deref(), Some("R"));
        assert_eq!(cell.cell.source, "plot(x)");
        assert_eq!(cell.cell.metadata.get("name"), Some(&Value::from("plot")));
        assert_eq!(cell.cell.metadata.get("hide_input"), Some(&Value::from(true)));
        assert_eq!(used, 3);

        let (cell, _) = read_with("Rmd", "```python\nx = 1\n```");
        assert_eq!(cell.cell.cell_type, CellType::Markdown);
    }

    #[test]
    fn test_escaped_fences_in_code() {
        let (cell, _) = read("```python\ns = \"\"\"\n# ```\n\"\"\"\n```");
        assert_eq!(cell.cell.source, "s = \"\"\"\n# ```\n\"\"\"");
        let (cell, _) = read("```python\n# ```\n```");
        assert_eq!(cell.cell.source, "```");
    }

    #[test]
    fn test_longer_fence_holds_shorter_ones() {
        let (cell, used) = read("````python\nx = '''\n```\n'''\n````\n\nText");
        assert_eq!(cell.cell.cell_type, CellType::Code);
        assert_eq!(cell.cell.source, "x = '''\n```\n'''");
        assert_eq!(used, 6);

        let (cell, used) = read_with("Rmd", "````{r}\ncat('\n```\n')\n````");
        assert_eq!(cell.cell.source, "cat('\n```\n')");
        assert_eq!(used, 5);
    }

    #[test]
    fn test_blank_tail_pads_the_last_cell() {
        let (cell, used) = read("<!-- #region -->\n\n<!-- #endregion -->\n\n");
        assert_eq!(cell.cell.source, "");
        assert_eq!(cell.cell.metadata.get("lines_to_next_cell"), Some(&Value::from(3)));
        assert_eq!(used, 5);
    }
}
