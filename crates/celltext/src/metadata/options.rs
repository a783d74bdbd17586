//! The four metadata options grammars.
//!
//! | Grammar | Used by | Shape |
//! |---|---|---|
//! | JSON | light script start marker, Markdown regions | `{"key": "value"}` |
//! | Markdown | code fence info string | `python key="value" tags=["a", "b"]` |
//! | R Markdown | chunk header, `#+` line | `r name, echo=FALSE, key="value"` |
//! | double percent | `# %%` header | `%% Title [markdown] {"key": "value"}` |
//!
//! Each grammar has an encoder and a decoder; decoding an encoded mapping
//! gives the mapping back, except that structural keys are routed by the
//! exporters before they get here.

use crate::error::Result;
use crate::languages::canonical_language;
use crate::notebook::Metadata;
use regex::Regex;
use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::{Number, Value};
use std::io;
use std::sync::OnceLock;

// =============================================================================
// JSON
// =============================================================================

/// JSON with `", "` and `": "` separators, on one line.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn metadata_to_json_options(metadata: &Metadata) -> Result<String> {
    to_json(metadata)
}

pub fn json_options_to_metadata(text: &str) -> Result<Metadata> {
    Ok(serde_json::from_str(text)?)
}

/// Split `title {json}` into its title and metadata.
///
/// Text that is not followed by a valid JSON object is all title.
pub fn text_to_metadata(text: &str) -> (String, Metadata) {
    let text = text.trim();
    if let Some(brace) = text.find('{') {
        match json_options_to_metadata(&text[brace..]) {
            Ok(metadata) => return (text[..brace].trim().to_string(), metadata),
            Err(err) => tracing::debug!(%err, text, "options are not JSON, reading them as a title"),
        }
    }
    (text.to_string(), Metadata::new())
}

// =============================================================================
// Markdown code fence options
// =============================================================================

pub fn metadata_to_md_options(metadata: &Metadata) -> Result<String> {
    let mut options = Vec::with_capacity(metadata.len());
    for (key, value) in metadata {
        options.push(format!("{key}={}", to_json(value)?));
    }
    Ok(options.join(" "))
}

/// Decode a fence info string such as `python tags=["x"]` into the language
/// (if the first token names one) and the metadata.
pub fn md_options_to_metadata(options: &str) -> (Option<String>, Metadata) {
    let mut language = None;
    let mut metadata = Metadata::new();
    for (i, token) in split_top_level(options, char::is_whitespace, &['"']).into_iter().enumerate() {
        match split_key_value(token, &['"']) {
            Some((key, raw)) => {
                let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
                metadata.insert(key.to_string(), value);
            }
            None if i == 0 && canonical_language(token).is_some() => {
                language = canonical_language(token).map(str::to_string);
            }
            None => tracing::debug!(token, "ignoring fence option without a value"),
        }
    }
    (language, metadata)
}

// =============================================================================
// R Markdown chunk options
// =============================================================================

/// Boolean metadata that knitr spells with the opposite meaning.
const INVERTED_OPTIONS: &[(&str, &str)] = &[("hide_input", "echo"), ("hide_output", "include")];

fn r_logical(b: bool) -> &'static str {
    if b { "TRUE" } else { "FALSE" }
}

fn rmd_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => r_logical(*b).to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => match s.strip_prefix("#R_CODE#") {
            Some(code) => code.to_string(),
            None if s.contains('"') && !s.contains('\'') => r_string(s, '\''),
            None => r_string(s, '"'),
        },
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(rmd_value).collect();
            format!("c({})", items.join(", "))
        }
        Value::Object(map) => {
            let items: Vec<String> = map.iter().map(|(k, v)| format!("{k}={}", rmd_value(v))).collect();
            format!("list({})", items.join(", "))
        }
    }
}

/// Quote `s` as an R string literal, escaping backslashes and `quote`.
fn r_string(s: &str, quote: char) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        if c == '\\' || c == quote {
            out.push('\\');
        }
        out.push(c);
    }
    out.push(quote);
    out
}

fn r_unescape(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

/// Encode chunk options. The language comes first (`R` when `None`, and then
/// dropped again so that only the options remain, as on a `#+` line), then
/// the chunk name, then the `key=value` pairs.
pub fn metadata_to_rmd_options(language: Option<&str>, metadata: &Metadata) -> String {
    let mut metadata = metadata.clone();
    let mut options = language.unwrap_or("R").to_lowercase();

    if let Some(Value::String(name)) = metadata.get("name") {
        options.push_str(&format!(" {name},"));
        metadata.shift_remove("name");
    }
    for (key, knitr_name) in INVERTED_OPTIONS {
        if let Some(Value::Bool(hidden)) = metadata.get(*key) {
            options.push_str(&format!(" {knitr_name}={},", r_logical(!hidden)));
            metadata.shift_remove(*key);
        }
    }
    for (key, value) in &metadata {
        options.push_str(&format!(" {}={},", key.trim(), rmd_value(value)));
    }

    let options = options.trim_matches(',').trim();
    if language.is_some() {
        options.to_string()
    } else {
        options.get(2..).unwrap_or("").to_string()
    }
}

fn parse_r_value(raw: &str) -> Value {
    let raw = raw.trim();
    match raw {
        "TRUE" | "T" => return Value::Bool(true),
        "FALSE" | "F" => return Value::Bool(false),
        "NULL" => return Value::Null,
        _ => {}
    }
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return Value::String(r_unescape(&raw[1..raw.len() - 1]));
        }
    }
    if let Some(inner) = raw.strip_prefix("c(").and_then(|r| r.strip_suffix(')')) {
        return Value::Array(
            split_top_level(inner, |c| c == ',', &['"', '\''])
                .into_iter()
                .map(parse_r_value)
                .collect(),
        );
    }
    if let Some(inner) = raw.strip_prefix("list(").and_then(|r| r.strip_suffix(')')) {
        let mut map = Metadata::new();
        for item in split_top_level(inner, |c| c == ',', &['"', '\'']) {
            if let Some((key, value)) = split_key_value(item, &['"', '\'']) {
                map.insert(key.to_string(), parse_r_value(value));
            }
        }
        return Value::Object(map);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(format!("#R_CODE#{raw}"))
}

/// Decode a chunk header body such as `r name, echo=FALSE` into the
/// language and the metadata.
pub fn rmd_options_to_metadata(options: &str) -> (String, Metadata) {
    let options = options.trim();
    let (language, rest) = match options.find(|c: char| c.is_whitespace() || c == ',') {
        Some(i) => (&options[..i], &options[i + 1..]),
        None => (options, ""),
    };
    let language = if language == "r" { "R" } else { language };

    let mut metadata = Metadata::new();
    for (i, token) in split_top_level(rest, |c| c == ',', &['"', '\'']).into_iter().enumerate() {
        let Some((key, raw)) = split_key_value(token, &['"', '\'']) else {
            if i == 0 {
                metadata.insert("name".into(), Value::String(token.to_string()));
            } else {
                tracing::debug!(token, "ignoring chunk option without a value");
            }
            continue;
        };
        let value = parse_r_value(raw);
        match INVERTED_OPTIONS.iter().find(|(_, knitr_name)| *knitr_name == key) {
            Some((name, _)) if value.is_boolean() => {
                metadata.insert(name.to_string(), Value::Bool(value != Value::Bool(true)));
            }
            _ => {
                metadata.insert(key.to_string(), value);
            }
        }
    }

    let frozen = metadata
        .get("run_control")
        .and_then(|rc| rc.get("frozen"))
        .and_then(Value::as_bool)
        == Some(true);
    if metadata.contains_key("active") || frozen {
        metadata.shift_remove("eval");
    }
    (language.to_string(), metadata)
}

// =============================================================================
// Double percent
// =============================================================================

/// Deeper `cell_depth` values stay in the JSON part of the header.
const MAX_CELL_DEPTH: u64 = 32;

pub fn metadata_to_double_percent_options(metadata: &Metadata) -> Result<String> {
    let mut metadata = metadata.clone();
    let mut options = Vec::new();
    let depth = metadata
        .get("cell_depth")
        .and_then(Value::as_u64)
        .filter(|depth| (1..=MAX_CELL_DEPTH).contains(depth));
    if let Some(depth) = depth {
        options.push("%".repeat(depth as usize));
        metadata.shift_remove("cell_depth");
    }
    if let Some(title) = metadata.get("title").and_then(Value::as_str) {
        options.push(title.to_string());
        metadata.shift_remove("title");
    }
    if let Some(cell_type) = metadata.get("cell_type").and_then(Value::as_str) {
        options.push(format!("[{cell_type}]"));
        metadata.shift_remove("cell_type");
    }
    let json = metadata_to_json_options(&metadata)?;
    if json != "{}" {
        options.push(json);
    }
    Ok(options.join(" "))
}

fn percent_options_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^\{\[]*)(|\[raw\]|\[markdown\]|\[md\])([^\{\[]*)(|\{.*\})\s*$")
            .expect("valid regex")
    })
}

/// Decode what follows `%%` on a double percent header line.
pub fn double_percent_options_to_metadata(options: &str) -> Result<Metadata> {
    let Some(caps) = percent_options_re().captures(options) else {
        let mut metadata = Metadata::new();
        let title = options.trim();
        if !title.is_empty() {
            metadata.insert("title".into(), Value::String(title.to_string()));
        }
        return Ok(metadata);
    };
    let group = |i: usize| caps.get(i).map_or("", |m| m.as_str());

    let mut metadata = if group(4).is_empty() {
        Metadata::new()
    } else {
        json_options_to_metadata(group(4))?
    };
    let cell_type = group(2);
    if !cell_type.is_empty() {
        let name = &cell_type[1..cell_type.len() - 1];
        let name = if name == "md" { "markdown" } else { name };
        metadata.insert("cell_type".into(), Value::String(name.to_string()));
    }

    let title: Vec<&str> = [group(1).trim(), group(3).trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect();
    let title = title.join(" ");
    let depth = title.chars().take_while(|c| *c == '%').count();
    if depth > 0 {
        metadata.insert("cell_depth".into(), Value::Number(depth.into()));
    }
    let title = title[depth..].trim();
    if !title.is_empty() {
        metadata.insert("title".into(), Value::String(title.to_string()));
    }
    Ok(metadata)
}

// =============================================================================
// Tokenizing helpers
// =============================================================================

/// Split on separators that sit outside quotes and brackets. Empty pieces
/// are dropped and the others trimmed.
fn split_top_level<'a>(text: &'a str, is_sep: impl Fn(char) -> bool, quotes: &[char]) -> Vec<&'a str> {
    let mut pieces = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if quotes.contains(&c) {
            quote = Some(c);
        } else if matches!(c, '(' | '[' | '{') {
            depth += 1;
        } else if matches!(c, ')' | ']' | '}') {
            depth = depth.saturating_sub(1);
        } else if depth == 0 && is_sep(c) {
            pieces.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    pieces.push(&text[start..]);
    pieces.into_iter().map(str::trim).filter(|p| !p.is_empty()).collect()
}

/// Split `key=value` at the first `=` outside quotes.
fn split_key_value<'a>(token: &'a str, quotes: &[char]) -> Option<(&'a str, &'a str)> {
    let mut quote: Option<char> = None;
    for (i, c) in token.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if quotes.contains(&c) => quote = Some(c),
            None if c == '=' => {
                let key = token[..i].trim();
                return (!key.is_empty()).then(|| (key, token[i + 1..].trim()));
            }
            None => {}
        }
    }
    None
}
