//! Cells to text: one exporter per dialect, and the pass that joins them.
//!
//! Writing a document takes two passes. Every cell is first rendered on its
//! own into a [`RenderedCell`]. [`stitch`] then walks the rendered cells from
//! last to first, so that each cell sees the text that follows it, and
//! settles what depends on the neighbours: redundant end markers, the short
//! form of start markers, and the blank lines between cells.

mod light;
mod markdown;
mod percent;
mod rscript;
mod sphinx;

pub use light::LightExporter;
pub use markdown::MarkdownExporter;
pub use percent::PercentExporter;
pub use rscript::RScriptExporter;
pub use sphinx::SphinxExporter;

use crate::error::Result;
use crate::format::{Dialect, FormatContext};
use crate::languages::{cell_language, same_language};
use crate::markers::is_blank;
use crate::metadata::{LINES_TO_END_OF_CELL_MARKER, LINES_TO_NEXT_CELL, MetadataFilter, get_count};
use crate::notebook::{Cell, CellType, Metadata};
use serde_json::Value;

// =============================================================================
// Cell view
// =============================================================================

/// A cell as the exporters see it: filtered metadata, the `%%lang` line
/// moved into metadata, raw cells marked inactive.
#[derive(Debug, Clone)]
pub struct CellView<'a> {
    pub cell_type: CellType,
    pub source: Vec<String>,
    pub metadata: Metadata,
    /// The cell metadata before filtering.
    pub unfiltered: &'a Metadata,
    /// Language set by a `%%lang` line, when it differs from the default.
    pub detected_language: Option<String>,
    pub language: String,
    pub lines_to_next_cell: Option<usize>,
    pub lines_to_end_of_cell_marker: Option<usize>,
}

impl<'a> CellView<'a> {
    pub fn new(cell: &'a Cell, ctx: &FormatContext) -> Self {
        let mut source = cell.source_lines();
        let mut metadata = ctx.cell_filter.apply(&MetadataFilter::default_cell(), &cell.metadata);

        let mut detected_language = None;
        if cell.cell_type == CellType::Code && ctx.dialect.parses_cell_language() {
            if let Some(magic) =
                cell_language(&source).filter(|m| !same_language(&m.language, &ctx.default_language))
            {
                source.remove(0);
                if !magic.magic_args.is_empty() {
                    metadata.insert("magic_args".into(), Value::String(magic.magic_args));
                }
                if ctx.dialect != Dialect::RMarkdown {
                    metadata.insert("language".into(), Value::String(magic.language.clone()));
                }
                detected_language = Some(magic.language);
            }
        }
        if cell.cell_type == CellType::Raw && !metadata.contains_key("active") {
            metadata.insert("active".into(), Value::String(String::new()));
        }

        Self {
            cell_type: cell.cell_type,
            source,
            metadata,
            unfiltered: &cell.metadata,
            language: detected_language
                .clone()
                .unwrap_or_else(|| ctx.default_language.clone()),
            detected_language,
            lines_to_next_cell: get_count(&cell.metadata, LINES_TO_NEXT_CELL),
            lines_to_end_of_cell_marker: get_count(&cell.metadata, LINES_TO_END_OF_CELL_MARKER),
        }
    }

    /// Code, or a raw cell rendered as inactive code.
    pub fn is_code(&self) -> bool {
        match self.cell_type {
            CellType::Code => true,
            CellType::Raw => self.metadata.contains_key("active"),
            CellType::Markdown => false,
        }
    }

    /// Is the cell live code in the target document? A cell in another
    /// language than the document is only live when its `active` key says so.
    pub fn is_active_in(&self, ext: &str) -> bool {
        crate::metadata::is_active(ext, &self.metadata)
            && !(self.detected_language.is_some() && !self.metadata.contains_key("active"))
    }
}

// =============================================================================
// Rendering
// =============================================================================

/// One cell's text, before it is joined with its neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedCell {
    pub lines: Vec<String>,
    pub is_code: bool,
    /// Light-script region opened by `# + {...}` and closed by `# -`.
    pub region: bool,
    pub lines_to_next_cell: Option<usize>,
    pub lines_to_end_of_cell_marker: Option<usize>,
}

/// A dialect exporter.
pub trait CellExporter {
    /// Render one cell. `region` in the result is only set by the light
    /// exporter.
    fn render(&self, view: CellView<'_>) -> Result<RenderedCell>;
}

impl RenderedCell {
    pub(crate) fn new(view: &CellView<'_>, lines: Vec<String>) -> Self {
        Self {
            lines,
            is_code: view.is_code(),
            region: false,
            lines_to_next_cell: view.lines_to_next_cell,
            lines_to_end_of_cell_marker: view.lines_to_end_of_cell_marker,
        }
    }
}

/// The exporter for a dialect.
pub fn exporter_for<'a>(ctx: &'a FormatContext) -> Result<Box<dyn CellExporter + 'a>> {
    Ok(match ctx.dialect {
        Dialect::Light | Dialect::Bare => Box::new(LightExporter::new(ctx)?),
        Dialect::Percent | Dialect::Hydrogen => Box::new(PercentExporter::new(ctx)),
        Dialect::RScript => Box::new(RScriptExporter::new(ctx)),
        Dialect::Markdown | Dialect::RMarkdown => Box::new(MarkdownExporter::new(ctx)?),
        Dialect::Sphinx => Box::new(SphinxExporter::new(ctx)?),
    })
}

/// Render every cell of `cells` on its own.
pub fn render_cells(cells: &[Cell], ctx: &FormatContext) -> Result<Vec<RenderedCell>> {
    let exporter = exporter_for(ctx)?;
    cells
        .iter()
        .map(|cell| exporter.render(CellView::new(cell, ctx)))
        .collect()
}

// =============================================================================
// Stitching
// =============================================================================

/// Join rendered cells into the lines of the document body. `prefix` is the
/// text placed before the first cell (the header), used only to decide the
/// form of the first start marker.
pub fn stitch(ctx: &FormatContext, mut cells: Vec<RenderedCell>, prefix: &[String]) -> Vec<String> {
    let first_lines: Vec<Option<String>> = cells.iter().map(|c| c.lines.first().cloned()).collect();
    let is_code: Vec<bool> = cells.iter().map(|c| c.is_code).collect();
    let regions: Vec<bool> = cells.iter().map(|c| c.region).collect();
    let n = cells.len();

    let mut lines: Vec<String> = Vec::new();
    for i in (0..n).rev() {
        let cell = &mut cells[i];
        remove_end_marker(ctx, cell, &lines);
        let mut text = std::mem::take(&mut cell.lines);

        if i == 0
            && ctx.dialect == Dialect::Sphinx
            && (text == ["%matplotlib inline"] || text == ["# %matplotlib inline"])
        {
            continue;
        }

        let blank = cell
            .lines_to_next_cell
            .unwrap_or_else(|| ctx.lines_between(&text, &lines));
        text.extend(std::iter::repeat_n(String::new(), blank));

        let has_next = i + 1 < n;
        if ctx.dialect.is_markdown() && !is_code[i] && has_next && !is_code[i + 1] {
            let opens_region = |line: &Option<String>| {
                line.as_deref().is_some_and(|l| l.starts_with("<!-- #region"))
            };
            let next_is_heading = first_lines[i + 1].as_deref().is_some_and(|l| l.starts_with('#'));
            if !opens_region(&first_lines[i])
                && !opens_region(&first_lines[i + 1])
                && !(ctx.split_at_heading && next_is_heading)
            {
                text.push(String::new());
            }
        }

        if ctx.dialect == Dialect::Sphinx && is_code[i] && has_next && is_code[i + 1] {
            text.push("\"\"".to_string());
        }

        if has_next && regions[i + 1] {
            simplify_start_marker(ctx, &mut lines, &text);
        }
        text.extend(lines);
        lines = text;
    }
    if regions.first().copied().unwrap_or(false) {
        simplify_start_marker(ctx, &mut lines, prefix);
    }
    lines
}

/// Drop the `# -` that closes a light region when the next cell opens with
/// its own marker, or when nothing follows, unless the cell records blank
/// lines before its end marker. Otherwise pad the region with the blank
/// lines it should carry before its end marker.
fn remove_end_marker(ctx: &FormatContext, cell: &mut RenderedCell, next_text: &[String]) {
    let end_marker = format!("{} -", ctx.comment);
    if !cell.region || cell.lines.last() != Some(&end_marker) {
        return;
    }
    let n = cell.lines.len();
    let body_ends_blank = n >= 3 && is_blank(&cell.lines[n - 2]);
    let next_opens = format!("{} + {{", ctx.comment);
    let next_is_marker = next_text.first().is_none_or(|line| line.starts_with(&next_opens));

    // A recorded count before the marker can only be read back from the marker.
    if next_is_marker && !body_ends_blank && cell.lines_to_end_of_cell_marker.is_none() {
        cell.lines.pop();
        return;
    }

    let blank = cell.lines_to_end_of_cell_marker.unwrap_or_else(|| {
        ctx.spacing
            .lines_before_end_marker(&cell.lines[..n - 1], next_text, &ctx.extension)
    });
    let marker = cell.lines.pop().unwrap_or(end_marker);
    cell.lines.extend(std::iter::repeat_n(String::new(), blank));
    cell.lines.push(marker);
}

/// `# + {}` becomes `# +` after a blank line or at the top of the document.
fn simplify_start_marker(ctx: &FormatContext, lines: &mut [String], prev_text: &[String]) {
    let empty_marker = format!("{} + {{}}", ctx.comment);
    let Some(first) = lines.first_mut() else {
        return;
    };
    if *first == empty_marker && prev_text.last().is_none_or(|line| is_blank(line)) {
        *first = format!("{} +", ctx.comment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatOptions;
    use serde_json::json;

    fn context(options: &str) -> FormatContext {
        let options: FormatOptions = options.parse().unwrap();
        let dialect = options.validate(&mut Default::default()).unwrap();
        FormatContext::new(&options, dialect, "python")
    }

    fn meta(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_view_moves_cell_language_to_metadata() {
        let ctx = context("py");
        let cell = Cell::code("%%R -i x\nls()");
        let view = CellView::new(&cell, &ctx);
        assert_eq!(view.source, ["ls()"]);
        assert_eq!(view.language, "R");
        assert_eq!(view.metadata, meta(json!({"magic_args": "-i x", "language": "R"})));
        assert!(!view.is_active_in(".py"));

        let same = Cell::code("%%python\nx = 1");
        let view = CellView::new(&same, &ctx);
        assert_eq!(view.source, ["%%python", "x = 1"]);
        assert!(view.detected_language.is_none());
    }

    #[test]
    fn test_view_filters_and_marks_raw_cells() {
        let ctx = context("py");
        let cell = Cell::raw("text").with_metadata(meta(json!({"collapsed": true, "lines_to_next_cell": 2})));
        let view = CellView::new(&cell, &ctx);
        assert_eq!(view.metadata, meta(json!({"active": ""})));
        assert_eq!(view.lines_to_next_cell, Some(2));
        assert!(view.is_code());
    }

    #[test]
    fn test_hydrogen_keeps_cell_language_line() {
        let ctx = context("py:hydrogen");
        let cell = Cell::code("%%R\nls()");
        let view = CellView::new(&cell, &ctx);
        assert_eq!(view.source, ["%%R", "ls()"]);
        assert!(view.metadata.is_empty());
    }

    fn region(lines: &[&str]) -> RenderedCell {
        RenderedCell {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            is_code: true,
            region: true,
            lines_to_next_cell: None,
            lines_to_end_of_cell_marker: None,
        }
    }

    #[test]
    fn test_end_marker_is_dropped_before_next_region() {
        let ctx = context("py");
        let cells = vec![
            region(&["# + {}", "x = 1", "", "y = 2", "# -"]),
            region(&["# + {\"k\": 1}", "z = 3", "", "w = 4", "# -"]),
        ];
        let text = stitch(&ctx, cells, &[]).join("\n");
        assert_eq!(text, "# +\nx = 1\n\ny = 2\n\n# + {\"k\": 1}\nz = 3\n\nw = 4\n");
    }

    #[test]
    fn test_recorded_blank_lines_keep_the_end_marker() {
        let ctx = context("py");
        let mut first = region(&["# + {\"k\": 1}", "x = 1", "", "y = 2", "# -"]);
        first.lines_to_end_of_cell_marker = Some(2);
        first.lines_to_next_cell = Some(1);
        let second = region(&["# + {\"k\": 2}", "z = 3", "", "w = 4", "# -"]);
        let text = stitch(&ctx, vec![first, second], &[]).join("\n");
        assert_eq!(
            text,
            "# + {\"k\": 1}\nx = 1\n\ny = 2\n\n\n# -\n\n# + {\"k\": 2}\nz = 3\n\nw = 4\n"
        );
    }

    #[test]
    fn test_end_marker_is_kept_before_plain_code() {
        let ctx = context("py");
        let mut plain = region(&["z = 3"]);
        plain.region = false;
        let cells = vec![region(&["# + {}", "x = 1", "", "y = 2", "# -"]), plain];
        let text = stitch(&ctx, cells, &[]).join("\n");
        assert_eq!(text, "# +\nx = 1\n\ny = 2\n# -\n\nz = 3\n");
    }

    #[test]
    fn test_markdown_paragraphs_get_two_blank_lines() {
        let ctx = context("md");
        let prose = |text: &str| RenderedCell {
            lines: vec![text.to_string()],
            is_code: false,
            region: false,
            lines_to_next_cell: None,
            lines_to_end_of_cell_marker: None,
        };
        let text = stitch(&ctx, vec![prose("A"), prose("# B")], &[]).join("\n");
        assert_eq!(text, "A\n\n\n# B\n");
    }
}
