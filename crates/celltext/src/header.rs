//! The document header: shebang, encoding line, and the YAML block that
//! holds the notebook metadata under a `jupyter:` key.
//!
//! In scripts every header line is commented with the dialect's header
//! prefix. A YAML block without a `jupyter:` key, or the keys next to it,
//! is front matter that belongs to the document and becomes a raw cell.

use crate::error::Result;
use crate::format::FormatContext;
use crate::languages::comment_lines;
use crate::markers::is_blank;
use crate::metadata::{LINES_TO_NEXT_CELL, MetadataFilter, get_count};
use crate::notebook::{Cell, CellType, Metadata, source_lines};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;

const DELIMITER: &str = "---";

fn encoding_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[ \t\f]*#.*?coding[:=][ \t]*[-_.a-zA-Z0-9]+").unwrap())
}

#[derive(Deserialize)]
struct JupyterSection {
    #[serde(default)]
    jupyter: Option<Metadata>,
}

/// What the head of a document held.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub metadata: Metadata,
    /// Front matter that is not notebook metadata.
    pub raw_cell: Option<Cell>,
    /// Index of the first line after the header and its blank lines.
    pub body_start: usize,
}

fn uncommented<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(line);
    }
    let rest = line.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix(' ')
    }
}

fn insert_jupytext(metadata: &mut Metadata, key: &str, value: String) {
    let section = metadata
        .entry("jupytext")
        .or_insert_with(|| Value::Object(Metadata::new()));
    if let Value::Object(section) = section {
        section.insert(key.to_string(), Value::String(value));
    }
}

/// Split the YAML lines into the `jupyter:` section and everything else.
fn split_jupyter(yaml: &[&str]) -> (Vec<String>, Vec<String>) {
    let mut jupyter = Vec::new();
    let mut rest = Vec::new();
    let mut inside = false;
    for line in yaml {
        if line.starts_with("jupyter:") {
            inside = true;
        } else if inside && !(line.is_empty() || line.starts_with([' ', '\t'])) {
            inside = false;
        }
        if inside {
            jupyter.push(line.to_string());
        } else {
            rest.push(line.to_string());
        }
    }
    (jupyter, rest)
}

/// Read the header at the top of `lines`.
pub fn read_header(lines: &[String], ctx: &FormatContext) -> Result<Header> {
    let mut header = Header::default();
    let mut pos = 0;

    if !ctx.comment.is_empty() {
        if let Some(executable) = lines.first().and_then(|l| l.strip_prefix("#!")) {
            insert_jupytext(&mut header.metadata, "executable", executable.to_string());
            pos += 1;
        }
        if let Some(line) = lines.get(pos).filter(|l| encoding_re().is_match(l)) {
            insert_jupytext(&mut header.metadata, "encoding", line.clone());
            pos += 1;
        }
    }

    let prefix = ctx.header_prefix();
    let opens = lines
        .get(pos)
        .is_some_and(|l| uncommented(l, prefix).is_some_and(|l| l.trim_end() == DELIMITER));
    if opens {
        let mut yaml = Vec::new();
        let mut close = None;
        for (i, line) in lines.iter().enumerate().skip(pos + 1) {
            let Some(line) = uncommented(line, prefix) else {
                break;
            };
            if line.trim_end() == DELIMITER {
                close = Some(i);
                break;
            }
            yaml.push(line);
        }

        if let Some(close) = close {
            let (jupyter, rest) = split_jupyter(&yaml);
            if !jupyter.is_empty() {
                let section: JupyterSection = serde_yaml::from_str(&jupyter.join("\n"))?;
                for (key, value) in section.jupyter.unwrap_or_default() {
                    match (header.metadata.get_mut(&key), value) {
                        (Some(Value::Object(existing)), Value::Object(value)) => existing.extend(value),
                        (_, value) => {
                            header.metadata.insert(key, value);
                        }
                    }
                }
            }
            if jupyter.is_empty() || !rest.is_empty() {
                let mut front = vec![DELIMITER.to_string()];
                front.extend(rest);
                front.push(DELIMITER.to_string());
                header.raw_cell = Some(Cell::from_lines(CellType::Raw, &front));
            }
            pos = close + 1;
        }
    }

    if pos > 0 {
        let mut end = pos;
        while end < lines.len() && is_blank(&lines[end]) {
            end += 1;
        }
        let blank = end - pos;
        if let Some(cell) = header.raw_cell.as_mut() {
            if blank != 1 {
                cell.metadata.insert(LINES_TO_NEXT_CELL.into(), Value::from(blank));
            }
        }
        pos = end;
    }
    header.body_start = pos;

    tracing::debug!(
        keys = header.metadata.len(),
        front_matter = header.raw_cell.is_some(),
        body_start = header.body_start,
        "read header"
    );
    Ok(header)
}

/// Inner lines of a raw `---` cell that can merge into the header.
fn front_matter(cell: &Cell) -> Option<Vec<String>> {
    if cell.cell_type != CellType::Raw {
        return None;
    }
    let lines = source_lines(&cell.source);
    let n = lines.len();
    (n >= 2 && lines[0] == DELIMITER && lines[n - 1] == DELIMITER).then(|| lines[1..n - 1].to_vec())
}

/// Render the header for `metadata`. When `first` is front matter it is
/// merged into the YAML block; the returned flag says so.
pub fn write_header(metadata: &Metadata, first: Option<&Cell>, ctx: &FormatContext) -> Result<(Vec<String>, bool)> {
    let mut metadata = ctx.notebook_filter.apply(&MetadataFilter::default_notebook(), metadata);

    let mut executable = None;
    let mut encoding = None;
    if let Some(Value::Object(jupytext)) = metadata.get_mut("jupytext") {
        if !ctx.comment.is_empty() {
            executable = jupytext.shift_remove("executable");
            encoding = jupytext.shift_remove("encoding");
        }
        if jupytext.is_empty() {
            metadata.shift_remove("jupytext");
        }
    }

    let front = first.and_then(front_matter);
    let mut lines = Vec::new();
    if let Some(Value::String(executable)) = executable {
        lines.push(format!("#!{executable}"));
    }
    if let Some(Value::String(encoding)) = encoding {
        lines.push(encoding);
    }

    if !metadata.is_empty() || front.is_some() {
        let mut block = vec![DELIMITER.to_string()];
        if let Some(front) = &front {
            block.extend(front.iter().cloned());
        }
        if !metadata.is_empty() {
            let mut section = Metadata::new();
            section.insert("jupyter".into(), Value::Object(metadata));
            let yaml = serde_yaml::to_string(&section)?;
            block.extend(yaml.lines().map(str::to_string));
        }
        block.push(DELIMITER.to_string());
        lines.extend(comment_lines(&block, ctx.header_prefix()));
    }

    if !lines.is_empty() {
        let blank = first
            .filter(|_| front.is_some())
            .and_then(|cell| get_count(&cell.metadata, LINES_TO_NEXT_CELL))
            .unwrap_or(1);
        lines.extend(std::iter::repeat_n(String::new(), blank));
    }
    Ok((lines, front.is_some()))
}
