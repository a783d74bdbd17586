//! Registry of text formats: which dialects each extension supports.

use crate::error::{Error, Result};
use crate::format::Dialect;
use crate::languages::SCRIPT_EXTENSIONS;
use std::sync::OnceLock;

/// A format a document can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatEntry {
    pub extension: &'static str,
    pub name: &'static str,
    pub dialect: Dialect,
}

/// Alternative format names.
const ALIASES: &[(&str, &str)] = &[("bare", "nomarker"), ("md", "markdown"), ("rmd", "rmarkdown")];

static FORMATS: OnceLock<Vec<FormatEntry>> = OnceLock::new();

/// All registered formats. The first entry for an extension is its default.
pub fn formats() -> &'static [FormatEntry] {
    FORMATS.get_or_init(|| {
        let entry = |extension: &'static str, dialect: Dialect| FormatEntry {
            extension,
            name: dialect.name(),
            dialect,
        };
        let mut formats = vec![
            entry(".md", Dialect::Markdown),
            entry(".markdown", Dialect::Markdown),
            entry(".Rmd", Dialect::RMarkdown),
        ];
        for &(ext, _) in SCRIPT_EXTENSIONS {
            for dialect in [Dialect::Light, Dialect::Bare, Dialect::Percent, Dialect::Hydrogen] {
                formats.push(entry(ext, dialect));
            }
            match ext {
                ".py" => formats.push(entry(ext, Dialect::Sphinx)),
                ".R" | ".r" => formats.push(entry(ext, Dialect::RScript)),
                _ => {}
            }
        }
        formats
    })
}

/// Format names available for `ext`, default first.
pub fn formats_for_extension(ext: &str) -> Vec<&'static str> {
    formats()
        .iter()
        .filter(|f| f.extension == ext)
        .map(|f| f.name)
        .collect()
}

/// Resolve `ext` and an optional format name to a dialect.
pub fn lookup(ext: &str, name: Option<&str>) -> Result<Dialect> {
    let Some(default) = formats().iter().find(|f| f.extension == ext) else {
        return Err(Error::UnknownExtension(ext.to_string()));
    };
    let Some(name) = name.filter(|n| !n.is_empty()) else {
        return Ok(default.dialect);
    };
    let name = ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
        .map_or(name, |(_, canonical)| *canonical);
    formats()
        .iter()
        .find(|f| f.extension == default.extension && f.name == name)
        .map(|f| f.dialect)
        .ok_or_else(|| Error::UnknownFormat(format!("{}:{name}", ext.trim_start_matches('.'))))
}
