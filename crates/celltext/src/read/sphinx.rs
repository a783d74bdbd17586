//! Sphinx Gallery scripts.
//!
//! Prose lives in triple-quoted strings or in comment blocks under a rule of
//! twenty or more `#`. Everything else is Python code. A bare `""` separates
//! two consecutive code cells.

use super::{Block, CellReader, Extent};
use crate::error::Result;
use crate::format::FormatContext;
use crate::languages::uncomment;
use crate::magics::uncomment_magic;
use crate::markers::{LineClassifier, LineShape, is_blank};
use crate::notebook::{CellType, Metadata};
use crate::string_parser::StringParser;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

pub(crate) const DEFAULT_CELL_MARKER_WIDTH: usize = 79;

fn is_triple_quote(marker: &str) -> bool {
    matches!(marker, "\"\"\"" | "'''")
}

pub struct SphinxReader<'a> {
    ctx: &'a FormatContext,
    classifier: LineClassifier,
}

impl<'a> SphinxReader<'a> {
    pub fn new(ctx: &'a FormatContext) -> Result<Self> {
        Ok(Self {
            ctx,
            classifier: LineClassifier::new(ctx)?,
        })
    }

    fn is_start(&self, line: &str) -> bool {
        matches!(self.classifier.classify(line), LineShape::StartMarker(_))
    }

    /// Where a prose block closed by `i` resumes.
    fn after(lines: &[String], i: usize) -> usize {
        if i + 1 < lines.len() && is_blank(&lines[i + 1]) { i + 2 } else { i + 1 }
    }

    fn quoted_end(lines: &[String], marker: &str) -> Extent {
        for (i, line) in lines.iter().enumerate() {
            if (i > 0 || line.trim() != marker) && line.trim_end().ends_with(marker) {
                let next = Self::after(lines, i);
                return if line.trim() == marker {
                    Extent::new(i, next, true)
                } else {
                    Extent::new(i + 1, next, false)
                };
            }
        }
        Extent::new(lines.len(), lines.len(), false)
    }

    fn comment_block_end(&self, lines: &[String]) -> Extent {
        for (i, line) in lines.iter().enumerate().skip(1) {
            if !line.starts_with(self.ctx.comment) {
                return if is_blank(line) {
                    Extent::new(i, i + 1, false)
                } else {
                    Extent::new(i, i, false)
                };
            }
        }
        Extent::new(lines.len(), lines.len(), false)
    }

    fn code_end(&self, lines: &[String]) -> Extent {
        let mut parser = StringParser::new(Some("python"));
        for (i, line) in lines.iter().enumerate() {
            if parser.is_quoted() {
                parser.read_line(line);
                continue;
            }
            if i > 0 && self.is_start(line) {
                if is_blank(&lines[i - 1]) {
                    return Extent::new(i - 1, i, false);
                }
                return Extent::new(i, i, false);
            }
            parser.read_line(line);
        }
        Extent::new(lines.len(), lines.len(), false)
    }
}

impl CellReader for SphinxReader<'_> {
    fn context(&self) -> &FormatContext {
        self.ctx
    }

    fn open(&self, lines: &[String]) -> Result<Block> {
        let LineShape::StartMarker(line) = self.classifier.classify(&lines[0]) else {
            return Ok(Block::paragraph(CellType::Code));
        };
        let marker = if line.starts_with("\"\"\"") || line.starts_with("'''") {
            &line[..3]
        } else {
            line.trim_end()
        };

        let mut metadata = Metadata::new();
        let default_marker = "#".repeat(DEFAULT_CELL_MARKER_WIDTH);
        if !matches!(marker, "\"\"" | "''") && marker != default_marker {
            metadata.insert("cell_marker".into(), Value::String(marker.to_string()));
        }
        let mut block = Block::marked(CellType::Markdown, metadata);
        if is_triple_quote(marker) && line.trim() != marker {
            block.body_start = 0;
        }
        Ok(block)
    }

    fn find_end(&self, lines: &[String], block: &Block) -> Extent {
        if block.cell_type == CellType::Code {
            return self.code_end(lines);
        }
        let first = lines[0].trim_end();
        if first == "\"\"" || first == "''" {
            let next = if lines.len() > 1 && is_blank(&lines[1]) { 2 } else { 1 };
            return Extent::new(0, next, true);
        }
        if first.starts_with("\"\"\"") || first.starts_with("'''") {
            return Self::quoted_end(lines, &first[..3]);
        }
        self.comment_block_end(lines)
    }

    fn content(&self, source: Vec<String>, block: &Block, metadata: &mut Metadata) -> Vec<String> {
        let ctx = self.ctx;
        if block.cell_type == CellType::Code {
            return uncomment_magic(&source, "python", ctx.comment_magics);
        }

        let marker = metadata.get("cell_marker").and_then(Value::as_str).unwrap_or("");
        let mut source = if is_triple_quote(marker) {
            let mut source = source;
            if block.body_start == 0 {
                if let Some(first) = source.first_mut() {
                    *first = first[marker.len()..].to_string();
                }
            }
            if let Some(last) = source.last_mut() {
                if let Some(pos) = last.trim_end().rfind(marker) {
                    last.truncate(pos);
                }
            }
            source
        } else {
            uncomment(&source, ctx.comment)
        };
        if ctx.rst2md {
            source = rst2md(&source);
        }
        source
    }
}

// =============================================================================
// reStructuredText
// =============================================================================

fn inline_literal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"``([^`]+)``").unwrap())
}

/// Heading level of an underline such as `=====`.
fn underline_level(line: &str, title: &str) -> Option<usize> {
    let line = line.trim_end();
    let c = line.chars().next()?;
    let level = match c {
        '=' => 1,
        '-' => 2,
        '~' | '^' => 3,
        _ => return None,
    };
    let uniform = line.chars().all(|x| x == c);
    (uniform && line.chars().count() >= title.trim().chars().count().max(1)).then_some(level)
}

/// A light conversion of reStructuredText to Markdown: underlined titles
/// become `#` headings and inline literals lose one pair of backquotes.
pub fn rst2md(lines: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        let heading = lines
            .get(i + 1)
            .filter(|_| !is_blank(line))
            .and_then(|next| underline_level(next, line));
        match heading {
            Some(level) => {
                out.push(format!("{} {}", "#".repeat(level), line.trim()));
                i += 2;
            }
            None => {
                out.push(inline_literal().replace_all(line, "`$1`").into_owned());
                i += 1;
            }
        }
    }
    out
}
