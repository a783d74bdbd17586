//! Sphinx Gallery scripts.

use super::{CellExporter, CellView, RenderedCell};
use crate::error::{Error, Result};
use crate::format::FormatContext;
use crate::languages::comment_lines;
use crate::magics::comment_magic;
use crate::notebook::CellType;
use crate::read::DEFAULT_CELL_MARKER_WIDTH;
use serde_json::Value;

pub struct SphinxExporter<'a> {
    ctx: &'a FormatContext,
    default_marker: String,
}

impl<'a> SphinxExporter<'a> {
    pub fn new(ctx: &'a FormatContext) -> Result<Self> {
        if ctx.rst2md {
            return Err(Error::config(
                "rst2md",
                "The 'rst2md' option is a read only option. The reverse conversion is not implemented. \
                 Please either deactivate the option, or save to another format.",
            ));
        }
        Ok(Self {
            ctx,
            default_marker: "#".repeat(DEFAULT_CELL_MARKER_WIDTH),
        })
    }

    fn prose(&self, view: &CellView<'_>) -> Vec<String> {
        let marker = view
            .unfiltered
            .get("cell_marker")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_marker);

        if view.source == [""] {
            let empty = if matches!(marker, "\"\"" | "''") { marker } else { "\"\"" };
            return vec![empty.to_string()];
        }
        if matches!(marker, "\"\"\"" | "'''") {
            let mut lines = Vec::with_capacity(view.source.len() + 2);
            lines.push(marker.to_string());
            lines.extend(view.source.iter().cloned());
            lines.push(marker.to_string());
            return lines;
        }
        let rule = if marker.starts_with(&"#".repeat(20)) { marker } else { self.default_marker.as_str() };
        let mut lines = vec![rule.to_string()];
        lines.extend(comment_lines(&view.source, self.ctx.comment));
        lines
    }
}

impl CellExporter for SphinxExporter<'_> {
    fn render(&self, view: CellView<'_>) -> Result<RenderedCell> {
        let lines = match view.cell_type {
            CellType::Code => comment_magic(&view.source, &view.language, self.ctx.comment_magics),
            CellType::Markdown | CellType::Raw => self.prose(&view),
        };
        Ok(RenderedCell::new(&view, lines))
    }
}
