//! Script languages, their comment prefixes, and cell language detection.

use std::collections::HashMap;
use std::sync::OnceLock;

/// A script language reachable through a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLanguage {
    pub language: &'static str,
    pub comment: &'static str,
}

const fn script(language: &'static str, comment: &'static str) -> ScriptLanguage {
    ScriptLanguage { language, comment }
}

/// Script extensions, with the language and line-comment prefix they imply.
pub static SCRIPT_EXTENSIONS: &[(&str, ScriptLanguage)] = &[
    (".py", script("python", "#")),
    (".R", script("R", "#")),
    (".r", script("R", "#")),
    (".jl", script("julia", "#")),
    (".cpp", script("c++", "//")),
    (".ss", script("scheme", ";;")),
    (".scm", script("scheme", ";;")),
    (".clj", script("clojure", ";;")),
    (".sh", script("bash", "#")),
    (".ps1", script("powershell", "#")),
    (".q", script("q", "/")),
    (".m", script("matlab", "%")),
    (".pro", script("idl", ";")),
    (".js", script("javascript", "//")),
    (".ts", script("typescript", "//")),
    (".scala", script("scala", "//")),
    (".rs", script("rust", "//")),
    (".robot", script("robotframework", "#")),
    (".cs", script("csharp", "//")),
    (".fsx", script("fsharp", "//")),
    (".fs", script("fsharp", "//")),
    (".java", script("java", "//")),
];

/// Languages a `%%lang` cell magic can switch to.
const JUPYTER_LANGUAGES: &[&str] = &[
    "R",
    "bash",
    "sh",
    "python",
    "python2",
    "python3",
    "javascript",
    "js",
    "perl",
    "html",
    "latex",
    "markdown",
    "pypy",
    "ruby",
    "script",
    "svg",
    "matlab",
    "octave",
    "idl",
    "robotframework",
    "spark",
    "sql",
    "cython",
    "haskell",
    "tcl",
    "gnuplot",
];

static EXTENSION_MAP: OnceLock<HashMap<&'static str, ScriptLanguage>> = OnceLock::new();

fn extension_map() -> &'static HashMap<&'static str, ScriptLanguage> {
    EXTENSION_MAP.get_or_init(|| SCRIPT_EXTENSIONS.iter().copied().collect())
}

/// Look up the script language for an extension such as `.py`.
pub fn script_language(ext: &str) -> Option<ScriptLanguage> {
    extension_map().get(ext).copied()
}

/// Line-comment prefix used by `language`; `#` when the language is unknown.
pub fn comment_for_language(language: &str) -> &'static str {
    SCRIPT_EXTENSIONS
        .iter()
        .find(|(_, s)| s.language.eq_ignore_ascii_case(language))
        .map(|(_, s)| s.comment)
        .unwrap_or("#")
}

/// The canonical spelling of a language name, matched case-insensitively
/// against the cell magic languages and the script languages.
pub fn canonical_language(name: &str) -> Option<&'static str> {
    JUPYTER_LANGUAGES
        .iter()
        .copied()
        .chain(SCRIPT_EXTENSIONS.iter().map(|(_, s)| s.language))
        .find(|lang| lang.eq_ignore_ascii_case(name))
}

pub fn same_language(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// A `%%lang [args]` directive on the first source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellMagic {
    pub language: String,
    pub magic_args: String,
}

impl CellMagic {
    /// Render the directive line back.
    pub fn line(&self) -> String {
        if self.magic_args.is_empty() {
            format!("%%{}", self.language)
        } else {
            format!("%%{} {}", self.language, self.magic_args)
        }
    }
}

/// Parse a cell language directive from the first line of `source`.
pub fn cell_language(source: &[String]) -> Option<CellMagic> {
    let magic = source.first()?.strip_prefix("%%")?;
    let (language, magic_args) = match magic.split_once(' ') {
        Some((language, args)) => (language, args),
        None => (magic, ""),
    };
    let language = canonical_language(language).filter(|l| *l == language)?;
    Some(CellMagic {
        language: language.to_string(),
        magic_args: magic_args.to_string(),
    })
}

/// Prefix every line with `prefix`; empty lines get the bare prefix.
pub fn comment_lines(lines: &[String], prefix: &str) -> Vec<String> {
    if prefix.is_empty() {
        return lines.to_vec();
    }
    lines
        .iter()
        .map(|line| {
            if line.is_empty() {
                prefix.to_string()
            } else {
                format!("{prefix} {line}")
            }
        })
        .collect()
}

/// Remove one `prefix ` (or bare `prefix`) from the start of each line.
pub fn uncomment(lines: &[String], prefix: &str) -> Vec<String> {
    if prefix.is_empty() {
        return lines.to_vec();
    }
    let spaced = format!("{prefix} ");
    lines
        .iter()
        .map(|line| {
            line.strip_prefix(spaced.as_str())
                .or_else(|| line.strip_prefix(prefix))
                .unwrap_or(line)
                .to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.split('\n').map(str::to_string).collect()
    }

    #[test]
    fn test_script_language_lookup() {
        assert_eq!(script_language(".py").unwrap().language, "python");
        assert_eq!(script_language(".ss").unwrap().comment, ";;");
        assert!(script_language(".md").is_none());
        assert_eq!(comment_for_language("c++"), "//");
        assert_eq!(comment_for_language("unknown"), "#");
    }

    #[test]
    fn test_cell_language() {
        let magic = cell_language(&lines("%%R -i x\nls()")).unwrap();
        assert_eq!(magic.language, "R");
        assert_eq!(magic.magic_args, "-i x");
        assert_eq!(magic.line(), "%%R -i x");

        assert_eq!(cell_language(&lines("%%html")).unwrap().magic_args, "");
        assert!(cell_language(&lines("%%time\nx = 1")).is_none());
        assert!(cell_language(&lines("x = 1\n%%R")).is_none());
    }

    #[test]
    fn test_canonical_language() {
        assert_eq!(canonical_language("IDL"), Some("idl"));
        assert_eq!(canonical_language("r"), Some("R"));
        assert_eq!(canonical_language("julia"), Some("julia"));
        assert_eq!(canonical_language("{.python}"), None);
    }

    #[test]
    fn test_comment_and_uncomment() {
        let text = lines("a\n\nb");
        let commented = comment_lines(&text, "#");
        assert_eq!(commented, ["# a", "#", "# b"]);
        assert_eq!(uncomment(&commented, "#"), text);
        assert_eq!(uncomment(&lines("#a\nb"), "#"), ["a", "b"]);
        assert_eq!(comment_lines(&text, ""), text);
    }
}
