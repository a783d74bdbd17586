//! Cell boundary lines.
//!
//! Every reader sees the document through a [`LineClassifier`], which sorts a
//! line into one of a few shapes according to the grammar of the dialect:
//!
//! | Dialect | Start | End | Other |
//! |---|---|---|---|
//! | light | `# +`, `# + {json}`, or custom `# <start> [title] [json]` | `# -`, `# --`, ... or custom `# <end>` | |
//! | percent, hydrogen | `# %%[%...] [title] [[type]] [json]`, `# <codecell>`, `# In[1]:` | | |
//! | spin | `#+ options` (chunk header) | | `#'` prose |
//! | markdown | `<!-- #region ... -->`, `<!-- #raw ... -->`, `` ```info `` | `<!-- #endregion -->`, `<!-- #endraw -->`, `` ``` `` | |
//! | R Markdown | as markdown, plus `` ```{r options} `` (chunk header) | | |
//! | sphinx | `""`, `''`, `"""...`, `'''...`, a rule of 20 or more `#` | | |

use crate::error::Result;
use crate::format::{Dialect, FormatContext};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineShape<'a> {
    Blank,
    /// Opens a cell. Carries the options text that follows the marker.
    StartMarker(&'a str),
    /// Closes a light-script cell. Carries the end token.
    EndMarker(&'a str),
    /// Opening code fence with an info string.
    FenceOpen(&'a str),
    /// A bare code fence.
    FenceClose,
    /// R chunk header: `` ```{r options} `` or `#+ options`.
    ChunkHeader(&'a str),
    RegionStart { raw: bool, options: &'a str },
    RegionEnd { raw: bool },
    /// knitr spin prose line, `#'`.
    Prose,
    Plain,
}

pub(crate) fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Sorts lines into [`LineShape`]s for one dialect.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    dialect: Dialect,
    start: Option<Regex>,
    end: Option<Regex>,
    alternative_start: Option<Regex>,
}

impl LineClassifier {
    pub fn new(ctx: &FormatContext) -> Result<Self> {
        let c = regex::escape(ctx.comment);
        let mut classifier = Self {
            dialect: ctx.dialect,
            start: None,
            end: None,
            alternative_start: None,
        };
        match ctx.dialect {
            Dialect::Light | Dialect::Bare => match &ctx.light_markers {
                Some((start, end)) => {
                    let (start, end) = (regex::escape(start), regex::escape(end));
                    classifier.start = Some(Regex::new(&format!(r"^{c}\s*{start}\s*(.*)$"))?);
                    classifier.end = Some(Regex::new(&format!(r"^{c}\s*({end})\s*$"))?);
                }
                None => {
                    classifier.start = Some(Regex::new(&format!(r"^{c}\s*\+(?:\s(.*))?$"))?);
                    classifier.end = Some(Regex::new(&format!(r"^{c} (-+)\s*$"))?);
                }
            },
            Dialect::Percent | Dialect::Hydrogen => {
                classifier.start = Some(Regex::new(&format!(r"^\s*{c}\s*%%(%*(?:\s.*)?)$"))?);
                classifier.alternative_start =
                    Some(Regex::new(&format!(r"^\s*{c}\s*(<codecell>|In\[[0-9 ]*\]:?)\s*$"))?);
            }
            _ => {}
        }
        Ok(classifier)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn classify<'a>(&self, line: &'a str) -> LineShape<'a> {
        if is_blank(line) {
            return LineShape::Blank;
        }
        match self.dialect {
            Dialect::Light | Dialect::Bare | Dialect::Percent | Dialect::Hydrogen => self.classify_script(line),
            Dialect::RScript => classify_spin(line),
            Dialect::Markdown => classify_markdown(line, false),
            Dialect::RMarkdown => classify_markdown(line, true),
            Dialect::Sphinx => classify_sphinx(line),
        }
    }

    fn classify_script<'a>(&self, line: &'a str) -> LineShape<'a> {
        let group = |re: &Option<Regex>| {
            re.as_ref()
                .and_then(|re| re.captures(line))
                .map(|caps| caps.get(1).map_or("", |m| m.as_str()))
        };
        if let Some(options) = group(&self.start) {
            return LineShape::StartMarker(options);
        }
        if self.alternative_start.as_ref().is_some_and(|re| re.is_match(line)) {
            return LineShape::StartMarker("");
        }
        if let Some(token) = group(&self.end) {
            return LineShape::EndMarker(token);
        }
        LineShape::Plain
    }
}

fn classify_spin(line: &str) -> LineShape<'_> {
    if let Some(options) = line.strip_prefix("#+") {
        return LineShape::ChunkHeader(options.trim());
    }
    if line.starts_with("#'") {
        return LineShape::Prose;
    }
    LineShape::Plain
}

fn region_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<!--\s*#(region|raw)(.*)-->\s*$").unwrap())
}

fn region_end() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<!--\s*#end(region|raw)\s*-->\s*$").unwrap())
}

fn rmd_chunk() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^`{3,}\{(.*)\}\s*$").unwrap())
}

fn classify_markdown(line: &str, rmd: bool) -> LineShape<'_> {
    if let Some(caps) = region_start().captures(line) {
        let raw = &caps[1] == "raw";
        let options = caps.get(2).map_or("", |m| m.as_str()).trim();
        return LineShape::RegionStart { raw, options };
    }
    if let Some(caps) = region_end().captures(line) {
        return LineShape::RegionEnd { raw: &caps[1] == "raw" };
    }
    if rmd {
        if let Some(caps) = rmd_chunk().captures(line) {
            return LineShape::ChunkHeader(caps.get(1).map_or("", |m| m.as_str()).trim());
        }
    }
    let ticks = backtick_run(line);
    if ticks >= 3 {
        let info = line[ticks..].trim();
        return if info.is_empty() {
            LineShape::FenceClose
        } else {
            LineShape::FenceOpen(info)
        };
    }
    LineShape::Plain
}

/// Number of backticks `line` starts with.
pub(crate) fn backtick_run(line: &str) -> usize {
    line.len() - line.trim_start_matches('`').len()
}

/// A code fence that no line of `body` closes: three backticks, or one more
/// than the longest run a body line starts with.
pub fn code_fence(body: &[String]) -> String {
    let longest = body.iter().map(|line| backtick_run(line.trim_start())).max().unwrap_or(0);
    "`".repeat(if longest >= 3 { longest + 1 } else { 3 })
}

fn twenty_hash() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^#( |)#{19,}\s*$").unwrap())
}

fn classify_sphinx(line: &str) -> LineShape<'_> {
    if line == "\"\"" || line == "''" || line.starts_with("\"\"\"") || line.starts_with("'''") {
        return LineShape::StartMarker(line);
    }
    if twenty_hash().is_match(line) {
        return LineShape::StartMarker(line);
    }
    LineShape::Plain
}

/// The shortest end-of-cell token, `-`, `--`, ..., that no line of `source`
/// spells as `<comment> <token>`.
pub fn endofcell_marker(source: &[String], comment: &str) -> String {
    let mut token = String::from("-");
    while source.iter().any(|line| is_end_marker(line, comment, &token)) {
        token.push('-');
    }
    token
}

fn is_end_marker(line: &str, comment: &str, token: &str) -> bool {
    line.strip_prefix(comment)
        .and_then(|rest| rest.strip_prefix(' '))
        .is_some_and(|rest| rest.trim_end() == token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FormatOptions;

    fn classifier(options: FormatOptions, dialect: Dialect) -> LineClassifier {
        LineClassifier::new(&FormatContext::new(&options, dialect, "python")).unwrap()
    }

    fn lines(text: &str) -> Vec<String> {
        text.split('\n').map(str::to_string).collect()
    }

    #[test]
    fn test_light_shapes() {
        let c = classifier(FormatOptions::new("py"), Dialect::Light);
        assert_eq!(c.classify("# +"), LineShape::StartMarker(""));
        assert_eq!(c.classify(r#"# + {"tags": []}"#), LineShape::StartMarker(r#"{"tags": []}"#));
        assert_eq!(c.classify("# -"), LineShape::EndMarker("-"));
        assert_eq!(c.classify("# --  "), LineShape::EndMarker("--"));
        assert_eq!(c.classify("# - item"), LineShape::Plain);
        assert_eq!(c.classify("x = 1"), LineShape::Plain);
        assert_eq!(c.classify("   "), LineShape::Blank);
    }

    #[test]
    fn test_custom_light_markers() {
        let c = classifier(FormatOptions::new("py").with_cell_markers("{{{,}}}"), Dialect::Light);
        assert_eq!(c.classify("# {{{ Title"), LineShape::StartMarker("Title"));
        assert_eq!(c.classify("# }}}"), LineShape::EndMarker("}}}"));
        assert_eq!(c.classify("# +"), LineShape::Plain);
    }

    #[test]
    fn test_percent_shapes() {
        let c = classifier(FormatOptions::new("py"), Dialect::Percent);
        assert_eq!(c.classify("# %%"), LineShape::StartMarker(""));
        assert_eq!(c.classify("# %% [markdown]"), LineShape::StartMarker(" [markdown]"));
        assert_eq!(c.classify("# %%% Sub"), LineShape::StartMarker("% Sub"));
        assert_eq!(c.classify("  #%%"), LineShape::StartMarker(""));
        assert_eq!(c.classify("# In[12]:"), LineShape::StartMarker(""));
        assert_eq!(c.classify("# <codecell>"), LineShape::StartMarker(""));
        assert_eq!(c.classify("# %%time"), LineShape::Plain);
        assert_eq!(c.classify("%%bash"), LineShape::Plain);
    }

    #[test]
    fn test_markdown_shapes() {
        let md = classifier(FormatOptions::new("md"), Dialect::Markdown);
        assert_eq!(md.classify("```python tags=[]"), LineShape::FenceOpen("python tags=[]"));
        assert_eq!(md.classify("```"), LineShape::FenceClose);
        assert_eq!(
            md.classify(r#"<!-- #region Title {"key": 1} -->"#),
            LineShape::RegionStart { raw: false, options: r#"Title {"key": 1}"# }
        );
        assert_eq!(md.classify("<!-- #raw -->"), LineShape::RegionStart { raw: true, options: "" });
        assert_eq!(md.classify("<!-- #endraw -->"), LineShape::RegionEnd { raw: true });
        assert_eq!(md.classify("```{r}"), LineShape::FenceOpen("{r}"));

        let rmd = classifier(FormatOptions::new("Rmd"), Dialect::RMarkdown);
        assert_eq!(rmd.classify("```{r name, echo=FALSE}"), LineShape::ChunkHeader("r name, echo=FALSE"));
        assert_eq!(rmd.classify("````{r}"), LineShape::ChunkHeader("r"));
    }

    #[test]
    fn test_longer_fences() {
        let md = classifier(FormatOptions::new("md"), Dialect::Markdown);
        assert_eq!(md.classify("````python"), LineShape::FenceOpen("python"));
        assert_eq!(md.classify("`````"), LineShape::FenceClose);
        assert_eq!(md.classify("``not a fence"), LineShape::Plain);

        assert_eq!(code_fence(&lines("x = 1")), "```");
        assert_eq!(code_fence(&lines("x = '''\n```\n'''")), "````");
        assert_eq!(code_fence(&lines("  ````text\n```")), "`````");
        assert_eq!(code_fence(&lines("a = `b`")), "```");
    }

    #[test]
    fn test_spin_and_sphinx_shapes() {
        let spin = classifier(FormatOptions::new("R"), Dialect::RScript);
        assert_eq!(spin.classify("#+ echo=FALSE"), LineShape::ChunkHeader("echo=FALSE"));
        assert_eq!(spin.classify("#' Prose"), LineShape::Prose);
        assert_eq!(spin.classify("# comment"), LineShape::Plain);

        let sphinx = classifier(FormatOptions::new("py"), Dialect::Sphinx);
        let rule = "#".repeat(79);
        assert_eq!(sphinx.classify(&rule), LineShape::StartMarker(rule.as_str()));
        assert_eq!(sphinx.classify("\"\"\"Title"), LineShape::StartMarker("\"\"\"Title"));
        assert_eq!(sphinx.classify("\"\""), LineShape::StartMarker("\"\""));
        assert_eq!(sphinx.classify("# short"), LineShape::Plain);
    }

    #[test]
    fn test_endofcell_escalation() {
        assert_eq!(endofcell_marker(&lines("x = 1\n\ny = 2"), "#"), "-");
        assert_eq!(endofcell_marker(&lines("x = 1\n# -\ny = 2"), "#"), "--");
        assert_eq!(endofcell_marker(&lines("# -\n# --  \n# ---x"), "#"), "---");
        assert_eq!(endofcell_marker(&lines("// -"), "//"), "--");
    }
}
