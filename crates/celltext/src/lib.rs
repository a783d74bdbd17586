//! Lossless conversion between notebooks and plain-text documents.
//!
//! A notebook is written as a script (light, percent, hydrogen, Sphinx
//! Gallery, knitr spin) or as Markdown / R Markdown, and read back with its
//! cell boundaries, cell types and metadata intact.
//!
//! ```
//! use celltext::{Cell, FormatOptions, Notebook, reads, writes};
//!
//! let options: FormatOptions = "py:percent".parse().unwrap();
//! let notebook = Notebook::new(vec![Cell::markdown("# Title"), Cell::code("x = 1")]);
//! let text = writes(&notebook, &options).unwrap();
//! assert_eq!(text, "# %% [markdown]\n# # Title\n\n# %%\nx = 1\n");
//! assert_eq!(reads(&text, &options).unwrap().cells, notebook.cells);
//! ```

pub mod document;
pub mod error;
pub mod export;
pub mod format;
pub mod header;
pub mod languages;
pub mod magics;
pub mod markers;
pub mod metadata;
pub mod notebook;
pub mod pep8;
pub mod read;
pub mod registry;
pub mod string_parser;

pub use document::{infer_language, read_notebook, reads, write_notebook, writes};
pub use error::{Error, Result};
pub use format::{Diagnostic, DiagnosticKind, Diagnostics, Dialect, FormatContext, FormatOptions};
pub use metadata::{MetadataFilter, is_active};
pub use notebook::{Cell, CellType, Metadata, Notebook};
pub use pep8::SpacingPolicy;
