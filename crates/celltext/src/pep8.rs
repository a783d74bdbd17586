//! Blank lines between cells.
//!
//! When a cell does not record how many blank lines follow it, the writer
//! asks the spacing policy. The readers ask the same policy for the count
//! they expect, and only record a count that differs from it.

use crate::string_parser::StringParser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpacingPolicy {
    /// Two blank lines around top-level Python functions and classes, one
    /// otherwise. Other extensions always get one.
    #[default]
    Pep8,
    /// Always one blank line.
    Uniform,
}

impl SpacingPolicy {
    /// Blank lines expected between `prev` and `next` in a `ext` document.
    pub fn lines_between_cells(self, prev: &[String], next: &[String], ext: &str) -> usize {
        match self {
            SpacingPolicy::Pep8 => pep8_lines_between_cells(prev, next, ext),
            SpacingPolicy::Uniform => {
                if next.is_empty() || !prev.is_empty() { 1 } else { 0 }
            }
        }
    }

    /// Blank lines to insert before an explicit end-of-cell marker: none,
    /// unless the policy wants two lines between the cells.
    pub fn lines_before_end_marker(self, prev: &[String], next: &[String], ext: &str) -> usize {
        if self.lines_between_cells(prev, next, ext) < 2 { 0 } else { 2 }
    }
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_def(line: &str) -> bool {
    line.starts_with("def ") || line.starts_with("class ")
}

/// Is the first instruction in `lines` a function or class definition?
pub fn next_instruction_is_function_or_class(lines: &[String]) -> bool {
    for (i, line) in lines.iter().enumerate() {
        if is_blank(line) {
            if i > 0 && is_blank(&lines[i - 1]) {
                return false;
            }
            continue;
        }
        if is_def(line) {
            return true;
        }
        if line.starts_with(['#', '@', ' ']) {
            continue;
        }
        return false;
    }
    false
}

/// Does the cell end with a function or class definition?
pub fn cell_ends_with_function_or_class(lines: &[String]) -> bool {
    let mut parser = StringParser::new(Some("python"));
    let mut unquoted = Vec::with_capacity(lines.len());
    for line in lines {
        if !parser.is_quoted() {
            unquoted.push(line.as_str());
        }
        parser.read_line(line);
    }

    let reversed: Vec<&str> = unquoted.into_iter().rev().collect();
    for (i, line) in reversed.iter().enumerate() {
        if is_blank(line) {
            if i > 0 && is_blank(reversed[i - 1]) {
                return false;
            }
            continue;
        }
        if line.starts_with(['#', ' ']) {
            continue;
        }
        return is_def(line);
    }
    false
}

/// Is the last line of the cell code (not blank, not a comment)?
pub fn cell_ends_with_code(lines: &[String]) -> bool {
    match lines.last() {
        Some(last) => !is_blank(last) && !last.starts_with('#'),
        None => false,
    }
}

/// Does the cell contain anything other than comments and blank lines?
pub fn cell_has_code(lines: &[String]) -> bool {
    lines.iter().any(|line| {
        let stripped = line.trim();
        !stripped.is_empty() && !stripped.starts_with('#')
    })
}

/// PEP8 blank lines between two cells of a `ext` document.
pub fn pep8_lines_between_cells(prev: &[String], next: &[String], ext: &str) -> usize {
    if next.is_empty() {
        return 1;
    }
    if prev.is_empty() {
        return 0;
    }
    if ext != ".py" {
        return 1;
    }
    if cell_ends_with_function_or_class(prev) {
        return if cell_has_code(next) { 2 } else { 1 };
    }
    if cell_ends_with_code(prev) && next_instruction_is_function_or_class(next) {
        return 2;
    }
    1
}
