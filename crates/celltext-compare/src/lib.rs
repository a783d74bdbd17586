//! Structural comparison of notebooks.
//!
//! Used to check that a notebook survives a trip through a text format.
//! By default the comparison tolerates what a text format is expected to
//! lose: one final newline at the end of a cell, editor-only metadata,
//! outputs, and the `%matplotlib inline` cell a Sphinx Gallery reader adds.

use celltext::metadata::MetadataFilter;
use celltext::{Cell, CellType, Dialect, FormatOptions, Metadata, Notebook, reads, writes};
use serde::Serialize;
use serde_json::Value;
use similar::TextDiff;
use std::fmt;

// ============================================================================
// Errors
// ============================================================================

/// One difference between a reference notebook and a test notebook. Cell
/// indices are 1-based.
#[derive(Debug, Clone, PartialEq)]
pub enum Difference {
    NotebookMetadata { keys: Vec<String> },
    CellCount { reference: usize, test: usize },
    CellType { index: usize, reference: CellType, test: CellType },
    CellMetadata { index: usize, key: String, reference: Option<Value>, test: Option<Value> },
    CellSource { index: usize, diff: String },
    CellOutputs { index: usize },
}

impl Difference {
    /// The cell the difference is about.
    pub fn cell(&self) -> Option<usize> {
        match self {
            Difference::CellType { index, .. }
            | Difference::CellMetadata { index, .. }
            | Difference::CellSource { index, .. }
            | Difference::CellOutputs { index } => Some(*index),
            Difference::NotebookMetadata { .. } | Difference::CellCount { .. } => None,
        }
    }
}

fn show(value: &Option<Value>) -> String {
    value.as_ref().map_or_else(|| "(missing)".to_string(), Value::to_string)
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difference::NotebookMetadata { keys } => write!(f, "Notebook metadata differ: {}", keys.join(", ")),
            Difference::CellCount { reference, test } => {
                write!(f, "Notebooks have {reference} and {test} cells")
            }
            Difference::CellType { index, reference, test } => write!(
                f,
                "Cell {index}: cell type differ: {} != {}",
                reference.as_str(),
                test.as_str()
            ),
            Difference::CellMetadata { index, key, reference, test } => write!(
                f,
                "Cell {index}: Cell metadata '{key}' differ: {} != {}",
                show(reference),
                show(test)
            ),
            Difference::CellSource { index, diff } => write!(f, "Cell {index}: source differ\n{diff}"),
            Difference::CellOutputs { index } => write!(f, "Cell {index}: outputs differ"),
        }
    }
}

/// The notebooks are not equivalent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub struct NotebookDifference {
    pub differences: Vec<Difference>,
    /// Number of cells compared.
    pub cells: usize,
}

impl NotebookDifference {
    /// The cells that differ, in order, without repetition.
    pub fn cell_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.differences.iter().filter_map(Difference::cell).collect();
        indices.dedup();
        indices
    }
}

impl fmt::Display for NotebookDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indices = self.cell_indices();
        if !indices.is_empty() {
            let list: Vec<String> = indices.iter().map(usize::to_string).collect();
            writeln!(f, "Cells {} differ ({}/{})", list.join(","), indices.len(), self.cells)?;
        }
        let lines: Vec<String> = self.differences.iter().map(Difference::to_string).collect();
        f.write_str(&lines.join("\n"))
    }
}

/// Error raised by [`compare`] and [`round_trip`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("values differ\n{diff}")]
    Mismatch { diff: String },

    #[error(transparent)]
    Difference(#[from] NotebookDifference),

    #[error(transparent)]
    Codec(#[from] celltext::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone)]
pub struct CompareOptions {
    /// The text format the test notebook went through, if any.
    pub fmt: Option<FormatOptions>,
    /// Tolerate what a text format is expected to lose.
    pub allow_expected_differences: bool,
    /// Stop at the first difference rather than collecting them all.
    pub raise_on_first_difference: bool,
    pub compare_outputs: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            fmt: None,
            allow_expected_differences: true,
            raise_on_first_difference: true,
            compare_outputs: false,
        }
    }
}

impl CompareOptions {
    pub fn new(fmt: FormatOptions) -> Self {
        Self {
            fmt: Some(fmt),
            ..Self::default()
        }
    }

    pub fn strict(mut self) -> Self {
        self.allow_expected_differences = false;
        self
    }

    pub fn collect_all(mut self) -> Self {
        self.raise_on_first_difference = false;
        self
    }

    pub fn with_outputs(mut self) -> Self {
        self.compare_outputs = true;
        self
    }

    fn dialect(&self) -> Option<Dialect> {
        let fmt = self.fmt.as_ref()?;
        fmt.validate(&mut Default::default()).ok()
    }

    fn filter(&self, notebook: bool) -> MetadataFilter {
        let filter = self.fmt.as_ref().and_then(|fmt| {
            if notebook {
                fmt.notebook_metadata_filter.as_deref()
            } else {
                fmt.cell_metadata_filter.as_deref()
            }
        });
        filter.map(MetadataFilter::parse).unwrap_or_default()
    }
}

// ============================================================================
// Comparison
// ============================================================================

/// Line diff of two texts, in unified format.
fn unified_diff(first: &str, second: &str, headers: (&str, &str)) -> String {
    TextDiff::from_lines(first, second)
        .unified_diff()
        .header(headers.0, headers.1)
        .to_string()
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> Result<String, Error> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}

/// Compare two values through their JSON form.
///
/// On a mismatch the error carries a unified diff of the pretty-printed
/// JSON, with `first` and `second` as headers.
pub fn compare<T: Serialize + ?Sized>(first: &T, second: &T) -> Result<(), Error> {
    let (first, second) = (pretty(first)?, pretty(second)?);
    if first == second {
        return Ok(());
    }
    Err(Error::Mismatch {
        diff: unified_diff(&first, &second, ("first", "second")),
    })
}

struct Collector {
    differences: Vec<Difference>,
    fail_fast: bool,
}

impl Collector {
    /// Record `difference`. Returns `true` when the comparison should stop.
    fn push(&mut self, difference: Difference) -> bool {
        tracing::debug!(%difference, "notebooks differ");
        self.differences.push(difference);
        self.fail_fast
    }
}

fn notebook_metadata(notebook: &Notebook, options: &CompareOptions) -> Metadata {
    if !options.allow_expected_differences {
        return notebook.metadata.clone();
    }
    let mut metadata = options
        .filter(true)
        .apply(&MetadataFilter::default_notebook(), &notebook.metadata);
    if let Some(Value::Object(jupytext)) = metadata.get_mut("jupytext") {
        jupytext.shift_remove("main_language");
        if jupytext.is_empty() {
            metadata.shift_remove("jupytext");
        }
    }
    metadata
}

fn cell_metadata(cell: &Cell, options: &CompareOptions) -> Metadata {
    if !options.allow_expected_differences {
        return cell.metadata.clone();
    }
    options
        .filter(false)
        .apply(&MetadataFilter::default_cell(), &cell.metadata)
}

/// The cell source, less one final newline when differences are tolerated.
fn source<'a>(cell: &'a Cell, options: &CompareOptions) -> &'a str {
    if options.allow_expected_differences {
        cell.source.strip_suffix('\n').unwrap_or(&cell.source)
    } else {
        &cell.source
    }
}

/// Differing keys of two mappings, in the order they are first met.
fn differing_keys(reference: &Metadata, test: &Metadata) -> Vec<String> {
    reference
        .keys()
        .chain(test.keys().filter(|k| !reference.contains_key(*k)))
        .filter(|k| reference.get(*k) != test.get(*k))
        .cloned()
        .collect()
}

fn is_matplotlib_cell(cell: Option<&Cell>) -> bool {
    cell.is_some_and(|c| c.cell_type == CellType::Code && c.source.trim() == "%matplotlib inline")
}

/// Compare `test` to `reference`.
pub fn compare_notebooks(
    reference: &Notebook,
    test: &Notebook,
    options: &CompareOptions,
) -> Result<(), NotebookDifference> {
    let mut collector = Collector {
        differences: Vec::new(),
        fail_fast: options.raise_on_first_difference,
    };
    let dialect = options.dialect();

    let mut test_cells = test.cells.as_slice();
    if options.allow_expected_differences
        && dialect == Some(Dialect::Sphinx)
        && is_matplotlib_cell(test_cells.first())
        && !is_matplotlib_cell(reference.cells.first())
    {
        test_cells = &test_cells[1..];
    }
    let total = reference.cells.len().max(test_cells.len());
    let done = |collector: Collector| {
        if collector.differences.is_empty() {
            Ok(())
        } else {
            Err(NotebookDifference {
                differences: collector.differences,
                cells: total,
            })
        }
    };

    if reference.cells.len() != test_cells.len()
        && collector.push(Difference::CellCount {
            reference: reference.cells.len(),
            test: test_cells.len(),
        })
    {
        return done(collector);
    }

    for (i, (ref_cell, test_cell)) in reference.cells.iter().zip(test_cells).enumerate() {
        let index = i + 1;
        if ref_cell.cell_type != test_cell.cell_type {
            if collector.push(Difference::CellType {
                index,
                reference: ref_cell.cell_type,
                test: test_cell.cell_type,
            }) {
                return done(collector);
            }
            continue;
        }

        let (ref_source, test_source) = (source(ref_cell, options), source(test_cell, options));
        if ref_source != test_source {
            let diff = unified_diff(
                &format!("{ref_source}\n"),
                &format!("{test_source}\n"),
                ("reference", "test"),
            );
            if collector.push(Difference::CellSource { index, diff }) {
                return done(collector);
            }
        }

        let (ref_meta, test_meta) = (cell_metadata(ref_cell, options), cell_metadata(test_cell, options));
        for key in differing_keys(&ref_meta, &test_meta) {
            let difference = Difference::CellMetadata {
                index,
                reference: ref_meta.get(&key).cloned(),
                test: test_meta.get(&key).cloned(),
                key,
            };
            if collector.push(difference) {
                return done(collector);
            }
        }

        let outputs_differ = ref_cell.outputs != test_cell.outputs || ref_cell.execution_count != test_cell.execution_count;
        if options.compare_outputs && outputs_differ && collector.push(Difference::CellOutputs { index }) {
            return done(collector);
        }
    }

    let keys = differing_keys(&notebook_metadata(reference, options), &notebook_metadata(test, options));
    if !keys.is_empty() {
        collector.push(Difference::NotebookMetadata { keys });
    }
    done(collector)
}

/// Write `notebook` in `fmt`, read it back and compare. The text written
/// from the notebook read back must also be the same text.
pub fn round_trip(notebook: &Notebook, fmt: &FormatOptions) -> Result<Notebook, Error> {
    let text = writes(notebook, fmt)?;
    let back = reads(&text, fmt)?;
    compare_notebooks(notebook, &back, &CompareOptions::new(fmt.clone()))?;

    let again = writes(&back, fmt)?;
    if again != text {
        return Err(Error::Mismatch {
            diff: unified_diff(&text, &again, ("first", "second")),
        });
    }
    Ok(back)
}
