//! Escaping of Jupyter magics and of lines that look like cell markers.
//!
//! A magic is a line meant for the kernel (`%time`, `%%bash`, `!ls`, `?obj`)
//! rather than for the host language. Exporters comment the leading magics of
//! a cell out so the script stays valid; readers remove exactly one level of
//! commenting from the same lines.

use crate::languages::{SCRIPT_EXTENSIONS, comment_for_language};
use crate::string_parser::StringParser;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

struct MagicPatterns {
    magic: Regex,
    force_escape: Regex,
    no_escape: Regex,
    code_start: Regex,
    percent_start: Regex,
}

impl MagicPatterns {
    fn new(comment: &str) -> Self {
        let c = regex::escape(comment);
        let prefix = format!("^({c} |{c})*(%|%%|%%%)[a-zA-Z]");
        Self {
            magic: compile(&prefix),
            force_escape: compile(&format!(r"{prefix}(.*){c}\s*escape")),
            no_escape: compile(&format!(r"{prefix}(.*){c}\s*noescape")),
            code_start: compile(&format!(r"^({c} |{c})*({c}|{c} )\+")),
            percent_start: compile(&format!(
                r"^\s*({c} \s*)*{c}\s*(%%%*(\s.*)?|<codecell>\s*|In\[[0-9 ]*\]:?\s*)$"
            )),
        }
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("magic patterns are built from escaped literals")
}

static PATTERNS: OnceLock<HashMap<&'static str, MagicPatterns>> = OnceLock::new();

fn patterns(comment: &str) -> &'static MagicPatterns {
    let map = PATTERNS.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert("#", MagicPatterns::new("#"));
        for (_, script) in SCRIPT_EXTENSIONS {
            map.entry(script.comment)
                .or_insert_with(|| MagicPatterns::new(script.comment));
        }
        map
    });
    map.get(comment).unwrap_or_else(|| &map["#"])
}

fn python_help_or_bang() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compile(r"^(# |#)*(\?|!)\s*[A-Za-z]"))
}

fn python_shell_command() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        compile(
            r"^(# |#)*(cat|cp|mv|rm|rmdir|mkdir|copy|ddir|echo|ls|ldir|ren)($|\s$|\s[^=,])",
        )
    })
}

fn markdown_code_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| compile(r"^(# |#)*```"))
}

fn never_magic(language: &str) -> bool {
    matches!(language, "octave" | "matlab")
}

/// Whether `line` is a (possibly already commented) magic that should be
/// commented out for `language`.
///
/// `escape` is the `comment_magics` policy; a trailing `#escape` or
/// `#noescape` comment on the line overrides it.
pub fn is_magic(line: &str, language: &str, escape: bool) -> bool {
    if never_magic(language) {
        return false;
    }
    let p = patterns(comment_for_language(language));
    if p.force_escape.is_match(line) {
        return true;
    }
    if !escape || p.no_escape.is_match(line) {
        return false;
    }
    is_magic_shaped(line, language)
}

fn is_magic_shaped(line: &str, language: &str) -> bool {
    if never_magic(language) {
        return false;
    }
    if patterns(comment_for_language(language)).magic.is_match(line) {
        return true;
    }
    language == "python"
        && (python_help_or_bang().is_match(line) || python_shell_command().is_match(line))
}

fn ends_with_continuation(line: &str) -> bool {
    line.trim_end().ends_with('\\')
}

/// Apply `rewrite` to the magics that open the cell.
///
/// Scanning stops at the first line that is neither blank nor magic-shaped,
/// or that starts inside a string literal. A Python magic ending with `\`
/// carries on to the next line.
fn rewrite_leading_magics(
    source: &[String],
    language: &str,
    escape: bool,
    rewrite: impl Fn(&str) -> String,
) -> Vec<String> {
    let mut parser = StringParser::new(Some(language));
    let mut scanning = true;
    let mut continuation = false;
    let mut out = Vec::with_capacity(source.len());
    for line in source {
        if scanning && parser.is_quoted() {
            scanning = false;
        }
        if scanning {
            if continuation || is_magic(line, language, escape) {
                out.push(rewrite(line));
                continuation = language == "python" && ends_with_continuation(line);
                parser.read_line(line);
                continue;
            }
            continuation = false;
            if !line.trim().is_empty() && !is_magic_shaped(line, language) {
                scanning = false;
            }
        }
        out.push(line.clone());
        parser.read_line(line);
    }
    out
}

/// Comment out the leading magics of a cell.
pub fn comment_magic(source: &[String], language: &str, escape: bool) -> Vec<String> {
    let comment = comment_for_language(language);
    rewrite_leading_magics(source, language, escape, |line| format!("{comment} {line}"))
}

/// Remove one level of commenting from the leading magics of a cell.
pub fn uncomment_magic(source: &[String], language: &str, escape: bool) -> Vec<String> {
    rewrite_leading_magics(source, language, escape, |line| unesc(line, language))
}

/// Remove one `comment ` (or bare `comment`) prefix from a line.
pub fn unesc(line: &str, language: &str) -> String {
    let comment = comment_for_language(language);
    line.strip_prefix(comment)
        .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
        .unwrap_or(line)
        .to_string()
}

fn code_start_pattern(ext: &str) -> Option<&'static Regex> {
    match ext {
        ".md" | ".markdown" | ".Rmd" => Some(markdown_code_start()),
        _ => crate::languages::script_language(ext).map(|s| &patterns(s.comment).code_start),
    }
}

/// Whether `line`, possibly already commented, would be read as a cell start
/// in a document with extension `ext`.
pub fn is_escaped_code_start(line: &str, ext: &str) -> bool {
    code_start_pattern(ext).is_some_and(|re| re.is_match(line))
}

/// Comment out every line that a reader would take for a cell start.
pub fn escape_code_start(source: &[String], ext: &str, language: Option<&str>) -> Vec<String> {
    let comment = crate::languages::script_language(ext)
        .map(|s| s.comment)
        .unwrap_or("#");
    let mut parser = StringParser::new(language);
    source
        .iter()
        .map(|line| {
            let out = if !parser.is_quoted() && is_escaped_code_start(line, ext) {
                format!("{comment} {line}")
            } else {
                line.clone()
            };
            parser.read_line(line);
            out
        })
        .collect()
}

/// Inverse of [`escape_code_start`]. A line is only unescaped when the result
/// still looks like a cell start.
pub fn unescape_code_start(source: &[String], ext: &str, language: Option<&str>) -> Vec<String> {
    let comment = crate::languages::script_language(ext)
        .map(|s| s.comment)
        .unwrap_or("#");
    let mut parser = StringParser::new(language);
    source
        .iter()
        .map(|line| {
            let mut out = line.clone();
            if !parser.is_quoted() && is_escaped_code_start(line, ext) {
                if let Some(rest) = line.strip_prefix(comment) {
                    let unescaped = rest.strip_prefix(' ').unwrap_or(rest);
                    if is_escaped_code_start(unescaped, ext) {
                        out = unescaped.to_string();
                    }
                }
            }
            parser.read_line(line);
            out
        })
        .collect()
}

/// Comment out the lines of a percent-script code cell that would be read
/// as a `# %%` header, including those already commented that way.
pub fn escape_percent_start(source: &[String], comment: &str) -> Vec<String> {
    let re = &patterns(comment).percent_start;
    source
        .iter()
        .map(|line| {
            if re.is_match(line) {
                format!("{comment} {line}")
            } else {
                line.clone()
            }
        })
        .collect()
}

/// Inverse of [`escape_percent_start`].
pub fn unescape_percent_start(source: &[String], comment: &str) -> Vec<String> {
    let re = &patterns(comment).percent_start;
    source
        .iter()
        .map(|line| {
            let unescaped = line
                .strip_prefix(comment)
                .and_then(|rest| rest.strip_prefix(' '))
                .filter(|rest| re.is_match(rest));
            unescaped.unwrap_or(line).to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(line: &str) -> Vec<String> {
        vec![line.to_string()]
    }

    fn lines(text: &str) -> Vec<String> {
        text.split('\n').map(str::to_string).collect()
    }

    #[test]
    fn test_unesc() {
        assert_eq!(unesc("# comment", "python"), "comment");
        assert_eq!(unesc("#comment", "python"), "comment");
        assert_eq!(unesc("comment", "python"), "comment");
        assert_eq!(unesc(";; x", "scheme"), "x");
    }

    #[test]
    fn test_escape_magics() {
        for line in [
            "%matplotlib inline",
            "#%matplotlib inline",
            "##%matplotlib inline",
            "%%HTML",
            "%autoreload",
            "%store",
        ] {
            let escaped = comment_magic(&one(line), "python", true);
            assert_eq!(escaped, one(&format!("# {line}")));
            assert_eq!(uncomment_magic(&escaped, "python", true), one(line));
        }
    }

    #[test]
    fn test_decorator_is_not_magic() {
        assert_eq!(comment_magic(&one("@pytest.fixture"), "python", true), one("@pytest.fixture"));
    }

    #[test]
    fn test_escape_overrides() {
        let line = "%matplotlib inline #noescape";
        assert_eq!(comment_magic(&one(line), "python", true), one(line));
        let line = "%matplotlib inline #escape";
        assert_eq!(
            comment_magic(&one(line), "python", false),
            one(&format!("# {line}"))
        );
    }

    #[test]
    fn test_bash_commands_in_python() {
        for cmd in [
            "ls",
            "!ls",
            "ls -al",
            "!whoami",
            "# ls",
            "# mv a b",
            "! mkdir tmp",
            "cat",
            "cat ",
            "cat hello.txt",
            "cat --option=value hello.txt",
        ] {
            assert_eq!(comment_magic(&one(cmd), "python", true), one(&format!("# {cmd}")));
            assert_eq!(uncomment_magic(&one(&format!("# {cmd}")), "python", true), one(cmd));
        }
    }

    #[test]
    fn test_python_statements_are_not_commands() {
        for code in ["copy(a)", "copy.deepcopy", "cat = 3", "cat=5", "cat, other = 5,3", "cat(5)"] {
            assert_eq!(comment_magic(&one(code), "python", true), one(code));
            assert_eq!(uncomment_magic(&one(code), "python", true), one(code));
        }
    }

    #[test]
    fn test_bash_commands_in_r_are_left_alone() {
        for cmd in ["ls", "!ls", "ls -al", "!whoami", "# ls", "# mv a b"] {
            assert_eq!(comment_magic(&one(cmd), "R", true), one(cmd));
            assert_eq!(uncomment_magic(&one(cmd), "R", true), one(cmd));
        }
    }

    #[test]
    fn test_markdown_image_is_not_magic() {
        assert!(is_magic("# !cmd", "python", true));
        assert!(!is_magic("# ![Image name](image.png", "python", true));
        assert!(!is_magic("%matplotlib", "matlab", true));
    }

    #[test]
    fn test_only_leading_magics_are_escaped() {
        let source = lines("%load_ext watermark\n%watermark -u \\\n    -p jupytext\n\ndef g(x):\n    return x\n%time g(1)");
        let escaped = comment_magic(&source, "python", true);
        assert_eq!(
            escaped,
            lines("# %load_ext watermark\n# %watermark -u \\\n#     -p jupytext\n\ndef g(x):\n    return x\n%time g(1)")
        );
        assert_eq!(uncomment_magic(&escaped, "python", true), source);
    }

    #[test]
    fn test_escape_and_unescape_are_inverse() {
        let source = lines("# %time already commented\n%time x = 1\nx");
        let escaped = comment_magic(&source, "python", true);
        assert_eq!(escaped[0], "# # %time already commented");
        assert_eq!(uncomment_magic(&escaped, "python", true), source);

        let plain = lines("x = 1\ny = 2");
        assert_eq!(comment_magic(&plain, "python", true), plain);
        assert_eq!(uncomment_magic(&plain, "python", true), plain);
    }

    #[test]
    fn test_magics_inside_strings_are_not_escaped() {
        let source = lines("x = \"\"\"\n%not a magic\n\"\"\"");
        assert_eq!(comment_magic(&source, "python", true), source);
    }

    #[test]
    fn test_escape_code_start() {
        let source = lines("# +\nx = 1\n#+ option");
        let escaped = escape_code_start(&source, ".py", Some("python"));
        assert_eq!(escaped, lines("# # +\nx = 1\n# #+ option"));
        assert_eq!(unescape_code_start(&escaped, ".py", Some("python")), source);

        let fence = lines("```python");
        let escaped = escape_code_start(&fence, ".md", Some("python"));
        assert_eq!(escaped, lines("# ```python"));
        assert_eq!(unescape_code_start(&escaped, ".md", Some("python")), fence);

        assert!(is_escaped_code_start("```{r}", ".Rmd"));
        assert!(is_escaped_code_start("```", ".Rmd"));
        assert!(!is_escaped_code_start("x = 1", ".Rmd"));
        assert!(is_escaped_code_start("// +", ".cpp"));
    }

    #[test]
    fn test_percent_start_escaping() {
        let source = lines("# %% x\n    # %%\n# <codecell>\n# %%time\n## %%\nx = 1");
        let escaped = escape_percent_start(&source, "#");
        assert_eq!(
            escaped,
            lines("# # %% x\n#     # %%\n# # <codecell>\n# %%time\n## %%\nx = 1")
        );
        assert_eq!(unescape_percent_start(&escaped, "#"), source);
        assert_eq!(unescape_percent_start(&escape_percent_start(&escaped, "#"), "#"), escaped);
    }

    #[test]
    fn test_unescape_keeps_lines_that_would_break() {
        // "#+" unescaped would no longer be a code start
        let source = lines("#+");
        assert_eq!(unescape_code_start(&source, ".py", Some("python")), source);
    }
}
