//! Line-by-line tracking of string literals.
//!
//! Magic escaping and boundary detection must leave the inside of multi-line
//! strings alone, so the scanners ask a `StringParser` whether the line they
//! are about to look at starts inside a string.

#[derive(Debug, Clone)]
pub struct StringParser {
    enabled: bool,
    python: bool,
    single: Option<u8>,
    triple: Option<u8>,
}

impl StringParser {
    /// A parser for `language`; `None` gives a parser that never reports a
    /// quoted line.
    pub fn new(language: Option<&str>) -> Self {
        Self {
            enabled: language.is_some(),
            python: !matches!(language, Some("R")),
            single: None,
            triple: None,
        }
    }

    pub fn is_quoted(&self) -> bool {
        self.enabled && (self.single.is_some() || self.triple.is_some())
    }

    pub fn read_line(&mut self, line: &str) {
        if !self.enabled {
            return;
        }
        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            let c = bytes[i];
            if self.single.is_none() && self.triple.is_none() && c == b'#' {
                break;
            }
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c != b'"' && c != b'\'' {
                i += 1;
                continue;
            }
            if let Some(open) = self.single {
                if open == c {
                    self.single = None;
                }
                i += 1;
                continue;
            }
            if let Some(open) = self.triple {
                if open == c && bytes[i..].starts_with(&[c, c, c]) {
                    self.triple = None;
                    i += 3;
                } else {
                    i += 1;
                }
                continue;
            }
            if self.python && bytes[i..].starts_with(&[c, c, c]) {
                self.triple = Some(c);
                i += 3;
                continue;
            }
            self.single = Some(c);
            i += 1;
        }
        // Only triple-quoted strings span lines in Python.
        if self.python {
            self.single = None;
        }
    }
}
