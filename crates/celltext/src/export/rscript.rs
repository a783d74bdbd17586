//! knitr spin scripts.

use super::{CellExporter, CellView, RenderedCell};
use crate::error::Result;
use crate::format::FormatContext;
use crate::languages::comment_lines;
use crate::magics::{comment_magic, escape_code_start};
use crate::metadata::is_active;
use crate::metadata::options::metadata_to_rmd_options;
use crate::notebook::CellType;
use serde_json::Value;

pub struct RScriptExporter<'a> {
    ctx: &'a FormatContext,
}

impl<'a> RScriptExporter<'a> {
    pub fn new(ctx: &'a FormatContext) -> Self {
        Self { ctx }
    }
}

impl CellExporter for RScriptExporter<'_> {
    fn render(&self, view: CellView<'_>) -> Result<RenderedCell> {
        let ctx = self.ctx;
        if view.cell_type == CellType::Markdown {
            let lines = comment_lines(&view.source, "#'");
            return Ok(RenderedCell::new(&view, lines));
        }

        let source = escape_code_start(&view.source, &ctx.extension, Some(&view.language));
        let source = if view.is_active_in(&ctx.extension) {
            comment_magic(&source, &view.language, ctx.comment_magics)
        } else {
            comment_lines(&source, ctx.comment)
        };

        let mut metadata = view.metadata.clone();
        if !is_active(&ctx.extension, &metadata) {
            metadata.insert("eval".into(), Value::Bool(false));
        }
        let options = metadata_to_rmd_options(None, &metadata);
        let mut lines = Vec::with_capacity(source.len() + 1);
        if !options.is_empty() {
            lines.push(format!("#+ {options}"));
        }
        lines.extend(source);
        Ok(RenderedCell::new(&view, lines))
    }
}
