//! Percent and Hydrogen scripts.

use super::{CellExporter, CellView, RenderedCell};
use crate::error::Result;
use crate::format::FormatContext;
use crate::languages::comment_lines;
use crate::magics::{comment_magic, escape_percent_start};
use crate::metadata::options::metadata_to_double_percent_options;
use crate::notebook::CellType;
use serde_json::Value;

pub struct PercentExporter<'a> {
    ctx: &'a FormatContext,
}

impl<'a> PercentExporter<'a> {
    pub fn new(ctx: &'a FormatContext) -> Self {
        Self { ctx }
    }
}

impl CellExporter for PercentExporter<'_> {
    fn render(&self, view: CellView<'_>) -> Result<RenderedCell> {
        let ctx = self.ctx;
        let active = view.is_active_in(&ctx.extension);
        let mut metadata = view.metadata.clone();
        if view.cell_type != CellType::Code {
            metadata.insert("cell_type".into(), Value::String(view.cell_type.as_str().into()));
        }
        if view.cell_type == CellType::Raw && metadata.get("active").and_then(Value::as_str) == Some("") {
            metadata.shift_remove("active");
        }
        let cell_marker = view
            .unfiltered
            .get("cell_marker")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| ctx.wrap_marker.clone());
        metadata.shift_remove("cell_marker");

        let options = metadata_to_double_percent_options(&metadata)?;
        let c = ctx.comment;
        let mut lines = if options.is_empty() || options.starts_with('%') {
            vec![format!("{c} %%{options}")]
        } else {
            vec![format!("{c} %% {options}")]
        };

        if view.cell_type == CellType::Code && active {
            if view.source != [""] {
                let source = comment_magic(&view.source, &view.language, ctx.comment_magics);
                lines.extend(escape_percent_start(&source, c));
            }
        } else if let Some(marker) = cell_marker.filter(|_| view.cell_type != CellType::Code) {
            lines.push(marker.clone());
            lines.extend(view.source.iter().cloned());
            lines.push(marker);
        } else {
            lines.extend(comment_lines(&view.source, c));
        }
        Ok(RenderedCell::new(&view, lines))
    }
}
