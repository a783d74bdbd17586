//! Markdown and R Markdown.

use super::{CellExporter, CellView, RenderedCell};
use crate::error::Result;
use crate::format::{Dialect, FormatContext};
use crate::magics::{comment_magic, escape_code_start};
use crate::markers::code_fence;
use crate::metadata::is_active;
use crate::metadata::options::{metadata_to_json_options, metadata_to_md_options, metadata_to_rmd_options};
use crate::notebook::{CellType, Metadata};
use crate::read::{MarkdownReader, reads_back_as};
use serde_json::Value;

pub struct MarkdownExporter<'a> {
    ctx: &'a FormatContext,
    reader: MarkdownReader<'a>,
}

impl<'a> MarkdownExporter<'a> {
    pub fn new(ctx: &'a FormatContext) -> Result<Self> {
        Ok(Self {
            ctx,
            reader: MarkdownReader::new(ctx)?,
        })
    }

    /// `<!-- #region -->` ... `<!-- #endregion -->`, or the `raw` variant.
    fn html_comment(kind: &str, mut metadata: Metadata, source: &[String]) -> Result<Vec<String>> {
        let mut start = vec![format!("<!-- #{kind}")];
        if let Some(Value::String(title)) = metadata.get("title") {
            if !title.contains('{') {
                start.push(title.clone());
                metadata.shift_remove("title");
            }
        }
        if !metadata.is_empty() {
            start.push(metadata_to_json_options(&metadata)?);
        }
        start.push("-->".into());

        let mut lines = Vec::with_capacity(source.len() + 2);
        lines.push(start.join(" "));
        lines.extend(source.iter().cloned());
        lines.push(format!("<!-- #end{kind} -->"));
        Ok(lines)
    }

    fn markdown(&self, view: &CellView<'_>) -> Result<Vec<String>> {
        if view.metadata.is_empty() && reads_back_as(&self.reader, &view.source, CellType::Markdown, &view.source) {
            return Ok(view.source.clone());
        }
        Self::html_comment("region", view.metadata.clone(), &view.source)
    }

    fn code(&self, view: &CellView<'_>) -> Result<Vec<String>> {
        let ctx = self.ctx;
        let source = escape_code_start(&view.source, &ctx.extension, Some(&view.language));
        let mut metadata = view.metadata.clone();

        if ctx.dialect == Dialect::RMarkdown {
            // knitr runs chunks in other languages, so only `active` counts.
            let active = is_active(&ctx.extension, &view.metadata);
            let source = if active {
                comment_magic(&source, &view.language, ctx.comment_magics)
            } else {
                source
            };
            if !active {
                metadata.insert("eval".into(), Value::Bool(false));
            }
            let options = metadata_to_rmd_options(Some(&view.language), &metadata);
            let fence = code_fence(&source);
            let mut lines = vec![format!("{fence}{{{options}}}")];
            lines.extend(source);
            lines.push(fence);
            return Ok(lines);
        }

        metadata.shift_remove("active");
        metadata.shift_remove("language");
        if view.cell_type == CellType::Raw {
            return Self::html_comment("raw", metadata, &view.source);
        }

        let mut info = vec![view.language.clone()];
        if !metadata.is_empty() {
            info.push(metadata_to_md_options(&metadata)?);
        }
        let body = comment_magic(&source, &view.language, ctx.comment_magics);
        let fence = code_fence(&body);
        let mut lines = vec![format!("{fence}{}", info.join(" "))];
        lines.extend(body);
        lines.push(fence);
        Ok(lines)
    }
}

impl CellExporter for MarkdownExporter<'_> {
    fn render(&self, view: CellView<'_>) -> Result<RenderedCell> {
        let lines = match view.cell_type {
            CellType::Markdown => self.markdown(&view)?,
            CellType::Code | CellType::Raw => self.code(&view)?,
        };
        Ok(RenderedCell::new(&view, lines))
    }
}
