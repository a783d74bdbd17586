//! Light scripts, and their marker-free variant.

use super::{CellExporter, CellView, RenderedCell};
use crate::error::Result;
use crate::format::{Dialect, FormatContext};
use crate::languages::comment_lines;
use crate::magics::{comment_magic, escape_code_start};
use crate::markers::endofcell_marker;
use crate::metadata::options::metadata_to_json_options;
use crate::notebook::{CellType, Metadata};
use crate::read::{LightReader, reads_back_as};
use serde_json::Value;

pub struct LightExporter<'a> {
    ctx: &'a FormatContext,
    reader: LightReader<'a>,
}

impl<'a> LightExporter<'a> {
    pub fn new(ctx: &'a FormatContext) -> Result<Self> {
        Ok(Self {
            ctx,
            reader: LightReader::new(ctx)?,
        })
    }

    fn uses_markers(&self) -> bool {
        self.ctx.dialect == Dialect::Light
    }

    /// Does the code need `# +` and `# -` to be read back as one cell?
    fn needs_region(&self, view: &CellView<'_>, body: &[String]) -> bool {
        if !view.metadata.is_empty() {
            return true;
        }
        if view.source.iter().all(|line| line.starts_with(self.ctx.comment)) {
            return true;
        }
        !reads_back_as(&self.reader, body, CellType::Code, &view.source)
    }

    /// Wrap `body` between a start marker carrying `metadata` and an end
    /// marker that no line of the body spells.
    fn region(&self, mut metadata: Metadata, body: Vec<String>) -> Result<Vec<String>> {
        let c = self.ctx.comment;
        let mut lines = Vec::with_capacity(body.len() + 2);
        let endofcell = match &self.ctx.light_markers {
            Some((start, end)) => {
                let mut header = vec![c.to_string(), start.clone()];
                if let Some(Value::String(title)) = metadata.get("title") {
                    if !title.contains('{') {
                        header.push(title.clone());
                        metadata.shift_remove("title");
                    }
                }
                if !metadata.is_empty() {
                    header.push(metadata_to_json_options(&metadata)?);
                }
                lines.push(header.join(" "));
                end.clone()
            }
            None => {
                let endofcell = endofcell_marker(&body, c);
                if endofcell != "-" {
                    metadata.insert("endofcell".into(), Value::String(endofcell.clone()));
                }
                lines.push(format!("{c} + {}", metadata_to_json_options(&metadata)?));
                endofcell
            }
        };
        lines.extend(body);
        lines.push(format!("{c} {endofcell}"));
        Ok(lines)
    }

    fn markdown(&self, view: &CellView<'_>) -> Result<RenderedCell> {
        let ctx = self.ctx;
        if view.metadata.is_empty() {
            let source = comment_magic(&view.source, &view.language, ctx.comment_magics);
            let text = comment_lines(&source, ctx.comment);
            if !self.uses_markers() || reads_back_as(&self.reader, &text, CellType::Markdown, &view.source) {
                return Ok(RenderedCell::new(view, text));
            }
        }
        let body = escape_code_start(&comment_lines(&view.source, ctx.comment), &ctx.extension, None);
        if !self.uses_markers() {
            return Ok(RenderedCell::new(view, body));
        }
        let mut metadata = view.metadata.clone();
        metadata.insert("cell_type".into(), Value::String("markdown".into()));
        let mut rendered = RenderedCell::new(view, self.region(metadata, body)?);
        rendered.region = true;
        Ok(rendered)
    }
}

impl CellExporter for LightExporter<'_> {
    fn render(&self, view: CellView<'_>) -> Result<RenderedCell> {
        if view.cell_type == CellType::Markdown {
            return self.markdown(&view);
        }

        let ctx = self.ctx;
        let source = escape_code_start(&view.source, &ctx.extension, Some(&view.language));
        let body = if view.is_active_in(&ctx.extension) {
            comment_magic(&source, &view.language, ctx.comment_magics)
        } else {
            comment_lines(&source, ctx.comment)
        };

        if !self.uses_markers() || !self.needs_region(&view, &body) {
            return Ok(RenderedCell::new(&view, body));
        }
        let lines = self.region(view.metadata.clone(), body)?;
        let mut rendered = RenderedCell::new(&view, lines);
        rendered.region = ctx.light_markers.is_none();
        Ok(rendered)
    }
}
