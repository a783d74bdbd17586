//! Text to cells: one reader per dialect.
//!
//! A reader is handed the lines that remain in the document and recognises
//! the cell at their head. It reports the cell and how many lines it used,
//! including the blank lines that separate it from the next cell. The blank
//! lines it sees are recorded in the cell metadata only when they differ from
//! what the spacing policy would have written.

mod light;
mod markdown;
mod percent;
mod rscript;
mod sphinx;

pub use light::LightReader;
pub use markdown::MarkdownReader;
pub use percent::PercentReader;
pub use rscript::RScriptReader;
pub use sphinx::{SphinxReader, rst2md};
pub(crate) use sphinx::DEFAULT_CELL_MARKER_WIDTH;

use crate::error::Result;
use crate::format::{Dialect, FormatContext};
use crate::markers::is_blank;
use crate::metadata::{LINES_TO_END_OF_CELL_MARKER, LINES_TO_NEXT_CELL, is_active};
use crate::notebook::{Cell, CellType, Metadata};
use serde_json::Value;

/// A cell recognised in the text.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadCell {
    pub cell: Cell,
    /// Language named by the marker or the fence of the cell.
    pub language: Option<String>,
    /// The source as lines. An empty body and one empty line both join to
    /// `""`; the language pass needs to tell them apart.
    pub lines: Vec<String>,
}

/// What the first line of a cell says about it.
#[derive(Debug, Clone)]
pub struct Block {
    pub cell_type: CellType,
    /// Options of an explicit start marker; `None` when the cell has none.
    pub metadata: Option<Metadata>,
    pub language: Option<String>,
    /// Index of the first content line.
    pub body_start: usize,
}

impl Block {
    pub fn paragraph(cell_type: CellType) -> Self {
        Self {
            cell_type,
            metadata: None,
            language: None,
            body_start: 0,
        }
    }

    pub fn marked(cell_type: CellType, metadata: Metadata) -> Self {
        Self {
            cell_type,
            metadata: Some(metadata),
            language: None,
            body_start: 1,
        }
    }

    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }

    /// Explicit start marker, or fence.
    pub fn is_explicit(&self) -> bool {
        self.metadata.is_some()
    }

    /// `metadata["language"]` if the marker carried one, else the block
    /// language.
    pub(crate) fn take_language(&mut self) {
        if let Some(Value::String(language)) =
            self.metadata.as_mut().and_then(|m| m.shift_remove("language"))
        {
            self.language = Some(language);
        }
    }
}

/// Where the cell ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// One past the last content line.
    pub end: usize,
    /// First line of the next cell.
    pub next: usize,
    /// The cell was closed by an end marker at `end`.
    pub explicit_end: bool,
}

impl Extent {
    pub fn new(end: usize, next: usize, explicit_end: bool) -> Self {
        Self { end, next, explicit_end }
    }

    /// The cell runs to the end of `lines`, trailing blank lines aside.
    pub fn to_end(lines: &[String], body_start: usize) -> Self {
        let end = trim_trailing_blanks(lines, body_start, lines.len());
        Self::new(end, lines.len(), false)
    }
}

/// Move `end` back over blank lines, not past `floor`.
pub(crate) fn trim_trailing_blanks(lines: &[String], floor: usize, mut end: usize) -> usize {
    while end > floor && is_blank(&lines[end - 1]) {
        end -= 1;
    }
    end
}

/// Is the next non-blank line indented?
pub(crate) fn next_code_is_indented(lines: &[String]) -> bool {
    lines
        .iter()
        .find(|line| !is_blank(line))
        .is_some_and(|line| line.starts_with([' ', '\t']))
}

fn last_two_lines_blank(source: &[String]) -> bool {
    let n = source.len();
    n >= 3 && !is_blank(&source[n - 3]) && is_blank(&source[n - 2]) && is_blank(&source[n - 1])
}

fn count_lines_to_next_cell(end: usize, next: usize, total: usize, explicit_end: bool) -> usize {
    if end >= total {
        return 1;
    }
    let mut n = next - end;
    if explicit_end {
        n = n.saturating_sub(1);
    }
    if next >= total {
        n += 1;
    }
    n
}

/// A dialect reader.
///
/// Implementors recognise the first line and the extent of a cell and
/// undo the exporter's escaping; [`CellReader::read`] does the bookkeeping
/// shared by all dialects.
pub trait CellReader {
    fn context(&self) -> &FormatContext;

    /// Inspect the head of `lines`. `lines` is never empty.
    fn open(&self, lines: &[String]) -> Result<Block>;

    /// Find where the cell opened by `block` ends.
    fn find_end(&self, lines: &[String], block: &Block) -> Extent;

    /// Turn the lines between the markers into source lines. `metadata` is
    /// what the cell will carry.
    fn content(&self, source: Vec<String>, block: &Block, metadata: &mut Metadata) -> Vec<String>;

    /// Read the cell at the head of `lines`. Returns the cell and the number
    /// of lines it used.
    fn read(&self, lines: &[String]) -> Result<(ReadCell, usize)> {
        if lines.is_empty() {
            return Ok((
                ReadCell {
                    cell: Cell::code(""),
                    language: None,
                    lines: Vec::new(),
                },
                0,
            ));
        }
        let ctx = self.context();
        let mut block = self.open(lines)?;
        block.take_language();
        let extent = self.find_end(lines, &block);
        let Extent { end, mut next, explicit_end } = extent;

        let start = block.body_start.min(end);
        let mut source = lines[start..end].to_vec();
        let mut metadata = block.metadata.clone().unwrap_or_default();

        // Skip the blank lines that separate this cell from the next.
        if next + 1 < lines.len() && is_blank(&lines[next]) && !is_blank(&lines[next + 1]) {
            next += 1;
        } else if explicit_end
            && next + 2 < lines.len()
            && is_blank(&lines[next])
            && is_blank(&lines[next + 1])
            && !is_blank(&lines[next + 2])
        {
            next += 2;
        }
        // Blank lines at the end of the document pad the last cell.
        if lines[next.min(lines.len())..].iter().all(|line| is_blank(line)) {
            next = lines.len();
        }

        // Blank lines the light exporter puts before an end marker.
        if explicit_end
            && matches!(ctx.dialect, Dialect::Light | Dialect::Bare)
            && ctx.light_markers.is_none()
        {
            let eoc = if last_two_lines_blank(&source) {
                source.truncate(source.len() - 2);
                2
            } else {
                0
            };
            let expected = ctx.spacing.lines_before_end_marker(
                &lines[..end - eoc],
                &lines[next.min(lines.len())..],
                &ctx.extension,
            );
            if eoc != expected {
                metadata.insert(LINES_TO_END_OF_CELL_MARKER.into(), Value::from(eoc));
            }
        }

        let lines_to_next_cell = count_lines_to_next_cell(end, next, lines.len(), explicit_end);
        let marker_end = (end + usize::from(explicit_end)).min(lines.len());
        let expected = ctx.lines_between(&lines[..marker_end], &lines[next.min(lines.len())..]);
        if lines_to_next_cell != expected {
            metadata.insert(LINES_TO_NEXT_CELL.into(), Value::from(lines_to_next_cell));
        }

        let content = self.content(source, &block, &mut metadata);
        metadata.shift_remove("endofcell");

        let mut cell_type = block.cell_type;
        if cell_type == CellType::Code && !is_active("ipynb", &metadata) {
            if metadata.get("active").and_then(Value::as_str) == Some("") {
                metadata.shift_remove("active");
            }
            cell_type = CellType::Raw;
        }

        tracing::trace!(cell_type = cell_type.as_str(), end, next, "read cell");
        Ok((
            ReadCell {
                cell: Cell::from_lines(cell_type, &content).with_metadata(metadata),
                language: block.language,
                lines: content,
            },
            next,
        ))
    }
}

/// The reader for a dialect.
pub fn reader_for<'a>(ctx: &'a FormatContext) -> Result<Box<dyn CellReader + 'a>> {
    Ok(match ctx.dialect {
        Dialect::Light | Dialect::Bare => Box::new(LightReader::new(ctx)?),
        Dialect::Percent | Dialect::Hydrogen => Box::new(PercentReader::new(ctx)?),
        Dialect::RScript => Box::new(RScriptReader::new(ctx)?),
        Dialect::Markdown | Dialect::RMarkdown => Box::new(MarkdownReader::new(ctx)?),
        Dialect::Sphinx => Box::new(SphinxReader::new(ctx)?),
    })
}

/// Does `reader` read `text` back as a single cell of `cell_type` that
/// uses every line and has `source` for its body?
pub(crate) fn reads_back_as(
    reader: &dyn CellReader,
    text: &[String],
    cell_type: CellType,
    source: &[String],
) -> bool {
    match reader.read(text) {
        Ok((read, used)) => {
            used >= text.len()
                && read.cell.cell_type == cell_type
                && read.lines == source
                && read
                    .cell
                    .metadata
                    .keys()
                    .all(|k| k == LINES_TO_NEXT_CELL)
        }
        Err(_) => false,
    }
}
