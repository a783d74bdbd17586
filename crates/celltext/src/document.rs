//! Whole documents: header, cells, and the notebook language.
//!
//! Writing renders the body first, then decides whether the header must
//! name the main language: it does so only when a reader could not infer
//! it from the kernel, the extension, or the code fences of the body.

use crate::error::{Error, Result};
use crate::export::{render_cells, stitch};
use crate::format::{Diagnostics, Dialect, FormatContext, FormatOptions};
use crate::header::{read_header, write_header};
use crate::languages::{CellMagic, canonical_language, same_language, script_language};
use crate::markers::is_blank;
use crate::metadata::{LINES_TO_NEXT_CELL, MetadataFilter};
use crate::notebook::{Cell, CellType, Metadata, Notebook};
use crate::read::{ReadCell, reader_for};
use serde_json::Value;

const MAIN_LANGUAGE: &str = "main_language";

// =============================================================================
// Language inference
// =============================================================================

fn canonical(name: &str) -> String {
    canonical_language(name).unwrap_or(name).to_string()
}

fn base_language(dialect: Dialect, ext: &str) -> &'static str {
    match script_language(ext) {
        Some(script) => script.language,
        None if dialect == Dialect::RMarkdown => "R",
        None => "python",
    }
}

/// The most frequent language among the code fences of a Markdown body.
/// `base` wins ties.
fn fence_language(body: &[String], base: &str) -> String {
    let mut counts: Vec<(String, f64)> = vec![(base.to_string(), 0.5)];
    let mut in_fence = false;
    for line in body {
        let Some(info) = line.strip_prefix("```") else {
            continue;
        };
        if in_fence {
            in_fence = false;
            continue;
        }
        in_fence = true;
        let token = info
            .trim_start_matches('{')
            .split([' ', ',', '}'])
            .next()
            .unwrap_or_default();
        let Some(language) = canonical_language(token) else {
            continue;
        };
        match counts.iter_mut().find(|(l, _)| same_language(l, language)) {
            Some((_, count)) => *count += 1.0,
            None => counts.push((language.to_string(), 1.0)),
        }
    }
    let mut best = (base.to_string(), f64::MIN);
    for (language, count) in counts {
        if count > best.1 {
            best = (language, count);
        }
    }
    best.0
}

fn main_language(metadata: &Metadata) -> Option<&str> {
    metadata
        .get("jupytext")
        .and_then(|j| j.get(MAIN_LANGUAGE))
        .and_then(Value::as_str)
}

fn kernel_language(metadata: &Metadata) -> Option<&str> {
    metadata
        .get("kernelspec")
        .and_then(|k| k.get("language"))
        .and_then(Value::as_str)
}

/// The default language of a document: `jupytext.main_language`, then the
/// kernel language, then for Markdown the most frequent fence language,
/// then the language of the extension.
pub fn infer_language(metadata: &Metadata, dialect: Dialect, ext: &str, body: &[String]) -> String {
    if let Some(name) = main_language(metadata).or_else(|| kernel_language(metadata)) {
        return canonical(name);
    }
    let base = base_language(dialect, ext);
    if dialect.is_markdown() {
        return fence_language(body, base);
    }
    base.to_string()
}

fn set_main_language(metadata: &mut Metadata, language: Option<&str>) {
    match language {
        Some(language) => {
            let section = metadata
                .entry("jupytext")
                .or_insert_with(|| Value::Object(Metadata::new()));
            if let Value::Object(section) = section {
                section.insert(MAIN_LANGUAGE.into(), Value::String(language.to_string()));
            }
        }
        None => {
            if let Some(Value::Object(section)) = metadata.get_mut("jupytext") {
                section.shift_remove(MAIN_LANGUAGE);
                if section.is_empty() {
                    metadata.shift_remove("jupytext");
                }
            }
        }
    }
}

// =============================================================================
// Writing
// =============================================================================

/// Write `notebook` in the text format described by `options`, with the
/// warnings raised on the way.
pub fn write_notebook(notebook: &Notebook, options: &FormatOptions) -> Result<(String, Diagnostics)> {
    let mut diagnostics = Diagnostics::default();
    let dialect = options.validate(&mut diagnostics)?;
    let ext = options.normalized_extension();
    let language = infer_language(&notebook.metadata, dialect, &ext, &[]);
    let ctx = FormatContext::new(options, dialect, &language);
    tracing::debug!(%dialect, %language, cells = notebook.cells.len(), "writing notebook");

    let (header, merged) = write_header(&notebook.metadata, notebook.cells.first(), &ctx)?;
    let cells = &notebook.cells[usize::from(merged)..];
    let body = stitch(&ctx, render_cells(cells, &ctx)?, &header);

    let mut visible = ctx
        .notebook_filter
        .apply(&MetadataFilter::default_notebook(), &notebook.metadata);
    set_main_language(&mut visible, None);
    let inferred = infer_language(&visible, dialect, &ext, &body);

    let mut metadata = notebook.metadata.clone();
    set_main_language(&mut metadata, (inferred != language).then_some(language.as_str()));
    let (mut lines, _) = write_header(&metadata, notebook.cells.first(), &ctx)?;
    lines.extend(body);
    Ok((lines.join("\n"), diagnostics))
}

/// Write `notebook` as text.
pub fn writes(notebook: &Notebook, options: &FormatOptions) -> Result<String> {
    write_notebook(notebook, options).map(|(text, _)| text)
}

// =============================================================================
// Reading
// =============================================================================

/// Put back the `%%lang` line of a cell in another language than the
/// document.
fn restore_language(read: ReadCell, ctx: &FormatContext) -> Cell {
    let ReadCell { mut cell, language, lines } = read;
    let Some(language) = language.filter(|l| !same_language(l, &ctx.default_language)) else {
        return cell;
    };
    match canonical_language(&language) {
        Some(canonical) if cell.cell_type == CellType::Code => {
            let magic_args = match cell.metadata.shift_remove("magic_args") {
                Some(Value::String(args)) => args,
                _ => String::new(),
            };
            let magic = CellMagic {
                language: canonical.to_string(),
                magic_args,
            };
            let mut source = vec![magic.line()];
            source.extend(lines);
            cell.source = source.join("\n");
        }
        _ => {
            cell.metadata.insert("language".into(), Value::String(language));
        }
    }
    cell
}

fn is_empty_prose(cell: &Cell) -> bool {
    cell.cell_type == CellType::Markdown
        && cell.source.is_empty()
        && cell.metadata.keys().all(|key| key == LINES_TO_NEXT_CELL)
}

/// Drop the `""` separators a Sphinx Gallery script places between two
/// code cells.
fn drop_sphinx_separators(cells: Vec<Cell>) -> Vec<Cell> {
    let kinds: Vec<(CellType, bool)> = cells.iter().map(|c| (c.cell_type, is_empty_prose(c))).collect();
    cells
        .into_iter()
        .enumerate()
        .filter(|&(i, _)| {
            let separator = kinds[i].1
                && i > 0
                && i + 1 < kinds.len()
                && kinds[i - 1].0 != CellType::Markdown
                && kinds[i + 1].0 != CellType::Markdown;
            !separator
        })
        .map(|(_, cell)| cell)
        .collect()
}

/// Read a notebook from `text` in the format described by `options`, with
/// the warnings raised on the way.
pub fn read_notebook(text: &str, options: &FormatOptions) -> Result<(Notebook, Diagnostics)> {
    let mut diagnostics = Diagnostics::default();
    let dialect = options.validate(&mut diagnostics)?;
    let ext = options.normalized_extension();
    let lines: Vec<String> = text.lines().map(str::to_string).collect();

    let header = read_header(&lines, &FormatContext::new(options, dialect, base_language(dialect, &ext)))?;
    let body = &lines[header.body_start..];
    let language = infer_language(&header.metadata, dialect, &ext, body);
    let ctx = FormatContext::new(options, dialect, &language);
    tracing::debug!(%dialect, %language, lines = lines.len(), "reading notebook");

    let reader = reader_for(&ctx)?;
    let mut cells = Vec::new();
    let mut pos = 0;
    while body[pos..].iter().any(|line| !is_blank(line)) {
        let (read, used) = reader.read(&body[pos..])?;
        if used == 0 {
            return Err(Error::Blocked {
                line: header.body_start + pos,
            });
        }
        pos += used;
        cells.push(restore_language(read, &ctx));
    }

    if dialect == Dialect::Sphinx {
        cells = drop_sphinx_separators(cells);
        cells.insert(0, Cell::code("%matplotlib inline"));
    }
    if let Some(raw) = header.raw_cell {
        cells.insert(0, raw);
    }

    let notebook = Notebook::new(cells).with_metadata(header.metadata);
    Ok((notebook, diagnostics))
}

/// Read a notebook from text.
pub fn reads(text: &str, options: &FormatOptions) -> Result<Notebook> {
    read_notebook(text, options).map(|(notebook, _)| notebook)
}
