//! Text formats: the dialect to use and the options that tune it.
//!
//! A format is picked by extension and optional format name (`py:percent`).
//! [`FormatOptions`] is what callers hand in; [`FormatContext`] is the
//! resolved, per-document view the exporters and readers work from.

use crate::error::{Error, Result};
use crate::languages::script_language;
use crate::metadata::MetadataFilter;
use crate::pep8::SpacingPolicy;
use crate::registry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Dialect
// =============================================================================

/// One plain-text representation of a notebook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `# +` / `# -` markers, only where a cell needs them.
    Light,
    /// Light without any marker.
    Bare,
    /// `# %%` headers.
    Percent,
    /// `# %%` headers, magics left alone.
    Hydrogen,
    /// Sphinx Gallery: `#` rules or triple-quoted strings hold the prose.
    Sphinx,
    /// knitr spin: `#'` prose, `#+` chunk options.
    RScript,
    Markdown,
    RMarkdown,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Light => "light",
            Dialect::Bare => "nomarker",
            Dialect::Percent => "percent",
            Dialect::Hydrogen => "hydrogen",
            Dialect::Sphinx => "sphinx",
            Dialect::RScript => "spin",
            Dialect::Markdown => "markdown",
            Dialect::RMarkdown => "rmarkdown",
        }
    }

    /// Whether magics are commented out when `comment_magics` is not set.
    pub fn default_comment_magics(self) -> bool {
        !matches!(self, Dialect::Markdown | Dialect::Hydrogen)
    }

    /// Whether a leading `%%lang` line switches the cell language. Where it
    /// does not, the line stays in the source as a magic.
    pub fn parses_cell_language(self) -> bool {
        !matches!(self, Dialect::Hydrogen | Dialect::Sphinx)
    }

    pub fn is_markdown(self) -> bool {
        matches!(self, Dialect::Markdown | Dialect::RMarkdown)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// `cell_markers` did not have the shape the dialect expects.
    IgnoredCellMarkers,
}

/// A recoverable problem. The conversion went on without the offending input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Warnings collected during one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn warn(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(?kind, "{message}");
        self.0.push(Diagnostic { kind, message });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}

// =============================================================================
// Options
// =============================================================================

/// Caller-facing format configuration.
///
/// Deserializes from a mapping such as
/// `{"extension": ".py", "format_name": "percent", "comment_magics": false}`;
/// unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FormatOptions {
    pub extension: String,
    pub format_name: Option<String>,
    pub comment_magics: Option<bool>,
    /// `start,end` for light scripts, a wrapping `"""` for percent scripts.
    pub cell_markers: Option<String>,
    pub cell_metadata_filter: Option<String>,
    pub notebook_metadata_filter: Option<String>,
    pub split_at_heading: bool,
    pub rst2md: bool,
    pub spacing: SpacingPolicy,
}

/// Resolved custom cell markers.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CellMarkers {
    Pair(String, String),
    Wrap(String),
}

impl FormatOptions {
    pub fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            ..Self::default()
        }
    }

    pub fn with_format_name(mut self, name: impl Into<String>) -> Self {
        self.format_name = Some(name.into());
        self
    }

    pub fn with_comment_magics(mut self, comment_magics: bool) -> Self {
        self.comment_magics = Some(comment_magics);
        self
    }

    pub fn with_cell_markers(mut self, markers: impl Into<String>) -> Self {
        self.cell_markers = Some(markers.into());
        self
    }

    pub fn with_cell_metadata_filter(mut self, filter: impl Into<String>) -> Self {
        self.cell_metadata_filter = Some(filter.into());
        self
    }

    pub fn with_notebook_metadata_filter(mut self, filter: impl Into<String>) -> Self {
        self.notebook_metadata_filter = Some(filter.into());
        self
    }

    pub fn with_split_at_heading(mut self, split: bool) -> Self {
        self.split_at_heading = split;
        self
    }

    pub fn with_rst2md(mut self, rst2md: bool) -> Self {
        self.rst2md = rst2md;
        self
    }

    pub fn with_spacing(mut self, spacing: SpacingPolicy) -> Self {
        self.spacing = spacing;
        self
    }

    /// The extension with its leading dot.
    pub fn normalized_extension(&self) -> String {
        if self.extension.starts_with('.') {
            self.extension.clone()
        } else {
            format!(".{}", self.extension)
        }
    }

    /// Resolve the dialect and check the option combination.
    ///
    /// Contradictory options are an error. Malformed `cell_markers` are
    /// reported in `diagnostics` and then ignored.
    pub fn validate(&self, diagnostics: &mut Diagnostics) -> Result<Dialect> {
        let ext = self.normalized_extension();
        let dialect = registry::lookup(&ext, self.format_name.as_deref())?;

        if self.rst2md && dialect != Dialect::Sphinx {
            return Err(Error::config(
                "rst2md",
                format!("only the sphinx format reads reStructuredText, not '{dialect}'"),
            ));
        }
        if self.split_at_heading && !dialect.is_markdown() {
            return Err(Error::config(
                "split_at_heading",
                format!("the '{dialect}' format has no headings to split at"),
            ));
        }
        if let Some(markers) = &self.cell_markers {
            if !matches!(dialect, Dialect::Light | Dialect::Percent | Dialect::Hydrogen) {
                return Err(Error::config(
                    "cell_markers",
                    format!("the '{dialect}' format does not support custom cell markers"),
                ));
            }
            if parse_cell_markers(dialect, markers).is_none() {
                let expected = if dialect == Dialect::Light {
                    "'start,end'"
                } else {
                    "'\"\"\"' or \"'''\""
                };
                diagnostics.warn(
                    DiagnosticKind::IgnoredCellMarkers,
                    format!("Ignored cell markers '{markers}' as it does not match the expected {expected} pattern"),
                );
            }
        }
        Ok(dialect)
    }
}

fn parse_cell_markers(dialect: Dialect, markers: &str) -> Option<CellMarkers> {
    match dialect {
        Dialect::Light => {
            let (start, end) = markers.split_once(',')?;
            let (start, end) = (start.trim(), end.trim());
            (!start.is_empty() && !end.is_empty())
                .then(|| CellMarkers::Pair(start.to_string(), end.to_string()))
        }
        Dialect::Percent | Dialect::Hydrogen => {
            matches!(markers, "\"\"\"" | "'''").then(|| CellMarkers::Wrap(markers.to_string()))
        }
        _ => None,
    }
}

impl FromStr for FormatOptions {
    type Err = Error;

    /// Parse `ext` or `ext:format_name`, e.g. `py`, `py:percent`, `.R`, `Rmd`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (ext, name) = match s.split_once(':') {
            Some((ext, name)) => (ext, Some(name)),
            None => (s, None),
        };
        if ext.is_empty() {
            return Err(Error::UnknownFormat(s.to_string()));
        }
        let mut options = FormatOptions::new(ext);
        options.extension = options.normalized_extension();
        if let Some(name) = name {
            options.format_name = Some(name.to_string());
        }
        registry::lookup(&options.extension, options.format_name.as_deref())?;
        Ok(options)
    }
}

// =============================================================================
// Context
// =============================================================================

/// Everything the exporters and readers need to know about the document.
#[derive(Debug, Clone)]
pub struct FormatContext {
    pub dialect: Dialect,
    pub extension: String,
    /// Line comment of the script language; empty for Markdown.
    pub comment: &'static str,
    pub default_language: String,
    pub comment_magics: bool,
    /// Custom light-script markers, when they differ from `+,-`.
    pub light_markers: Option<(String, String)>,
    /// Percent-script string marker wrapping markdown and raw cells.
    pub wrap_marker: Option<String>,
    pub cell_filter: MetadataFilter,
    pub notebook_filter: MetadataFilter,
    pub split_at_heading: bool,
    pub rst2md: bool,
    pub spacing: SpacingPolicy,
}

impl FormatContext {
    pub fn new(options: &FormatOptions, dialect: Dialect, default_language: &str) -> Self {
        let extension = options.normalized_extension();
        let comment = match dialect {
            Dialect::Markdown | Dialect::RMarkdown => "",
            Dialect::Sphinx => "#",
            _ => script_language(&extension).map_or("#", |s| s.comment),
        };
        let markers = options
            .cell_markers
            .as_deref()
            .and_then(|m| parse_cell_markers(dialect, m));
        let (light_markers, wrap_marker) = match markers {
            Some(CellMarkers::Pair(start, end)) if (start.as_str(), end.as_str()) != ("+", "-") => {
                (Some((start, end)), None)
            }
            Some(CellMarkers::Wrap(marker)) => (None, Some(marker)),
            _ => (None, None),
        };
        Self {
            dialect,
            extension,
            comment,
            default_language: default_language.to_string(),
            comment_magics: options
                .comment_magics
                .unwrap_or_else(|| dialect.default_comment_magics()),
            light_markers,
            wrap_marker,
            cell_filter: options
                .cell_metadata_filter
                .as_deref()
                .map(MetadataFilter::parse)
                .unwrap_or_default(),
            notebook_filter: options
                .notebook_metadata_filter
                .as_deref()
                .map(MetadataFilter::parse)
                .unwrap_or_default(),
            split_at_heading: options.split_at_heading,
            rst2md: options.rst2md,
            spacing: options.spacing,
        }
    }

    /// Prefix of the YAML header lines.
    pub fn header_prefix(&self) -> &'static str {
        match self.dialect {
            Dialect::RScript => "#'",
            _ => self.comment,
        }
    }

    /// Blank lines the spacing policy expects between two blocks of text.
    pub fn lines_between(&self, prev: &[String], next: &[String]) -> usize {
        self.spacing.lines_between_cells(prev, next, &self.extension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(options: &FormatOptions) -> (Result<Dialect>, Diagnostics) {
        let mut diagnostics = Diagnostics::default();
        let dialect = options.validate(&mut diagnostics);
        (dialect, diagnostics)
    }

    #[test]
    fn test_short_forms() {
        let percent: FormatOptions = "py:percent".parse().unwrap();
        assert_eq!(percent.extension, ".py");
        assert_eq!(percent.format_name.as_deref(), Some("percent"));
        assert_eq!(validate(&percent).0.unwrap(), Dialect::Percent);

        for (short, dialect) in [
            ("py", Dialect::Light),
            ("md", Dialect::Markdown),
            ("Rmd", Dialect::RMarkdown),
            (".R", Dialect::Light),
            ("R:spin", Dialect::RScript),
            ("py:sphinx", Dialect::Sphinx),
            ("jl:nomarker", Dialect::Bare),
            ("py:bare", Dialect::Bare),
        ] {
            let options: FormatOptions = short.parse().unwrap();
            assert_eq!(validate(&options).0.unwrap(), dialect, "{short}");
        }
    }

    #[test]
    fn test_unknown_formats() {
        assert!(matches!("xyz".parse::<FormatOptions>(), Err(Error::UnknownExtension(_))));
        assert!(matches!("md:percent".parse::<FormatOptions>(), Err(Error::UnknownFormat(_))));
        assert!(matches!("R:sphinx".parse::<FormatOptions>(), Err(Error::UnknownFormat(_))));
    }

    #[test]
    fn test_deserialize_rejects_unknown_keys() {
        let options: FormatOptions =
            serde_json::from_str(r#"{"extension": ".py", "format_name": "percent", "comment_magics": false}"#)
                .unwrap();
        assert_eq!(options.comment_magics, Some(false));
        assert!(serde_json::from_str::<FormatOptions>(r#"{"extension": ".py", "colour": 1}"#).is_err());
    }

    #[test]
    fn test_contradictory_options() {
        let rst = FormatOptions::new("py").with_rst2md(true);
        assert!(matches!(validate(&rst).0, Err(Error::Config { option: "rst2md", .. })));
        let sphinx = FormatOptions::new("py").with_format_name("sphinx").with_rst2md(true);
        assert_eq!(validate(&sphinx).0.unwrap(), Dialect::Sphinx);

        let split = FormatOptions::new("py").with_split_at_heading(true);
        assert!(matches!(validate(&split).0, Err(Error::Config { option: "split_at_heading", .. })));

        let markers = FormatOptions::new("md").with_cell_markers("{{{,}}}");
        assert!(matches!(validate(&markers).0, Err(Error::Config { option: "cell_markers", .. })));
    }

    #[test]
    fn test_malformed_cell_markers_warn() {
        let options = FormatOptions::new("py").with_cell_markers("{{{");
        let (dialect, diagnostics) = validate(&options);
        assert_eq!(dialect.unwrap(), Dialect::Light);
        assert_eq!(diagnostics.len(), 1);
        let diagnostic = diagnostics.iter().next().unwrap();
        assert_eq!(diagnostic.kind, DiagnosticKind::IgnoredCellMarkers);
        assert!(diagnostic.message.contains("'start,end'"));

        let ctx = FormatContext::new(&options, Dialect::Light, "python");
        assert_eq!(ctx.light_markers, None);
    }

    #[test]
    fn test_context_markers() {
        let light = FormatOptions::new("py").with_cell_markers("{{{,}}}");
        let ctx = FormatContext::new(&light, Dialect::Light, "python");
        assert_eq!(ctx.light_markers, Some(("{{{".into(), "}}}".into())));

        let default = FormatOptions::new("py").with_cell_markers("+,-");
        assert_eq!(FormatContext::new(&default, Dialect::Light, "python").light_markers, None);

        let percent = FormatOptions::new("py").with_format_name("percent").with_cell_markers("\"\"\"");
        let ctx = FormatContext::new(&percent, Dialect::Percent, "python");
        assert_eq!(ctx.wrap_marker.as_deref(), Some("\"\"\""));
        assert!(ctx.comment_magics);
    }

    #[test]
    fn test_context_comment_and_magics() {
        let ctx = FormatContext::new(&FormatOptions::new("md"), Dialect::Markdown, "python");
        assert_eq!(ctx.comment, "");
        assert!(!ctx.comment_magics);
        let ctx = FormatContext::new(&FormatOptions::new(".cpp"), Dialect::Light, "c++");
        assert_eq!(ctx.comment, "//");
        let ctx = FormatContext::new(&FormatOptions::new("R"), Dialect::RScript, "R");
        assert_eq!(ctx.header_prefix(), "#'");
    }
}
