//! Cell metadata: activity rules, filtering, and the options grammars.

pub mod filter;
pub mod options;

pub use filter::{KeySet, MetadataFilter};

use crate::notebook::Metadata;
use serde_json::Value;

/// Keys the exporters place in their own syntactic slot rather than in the
/// generic options string.
pub const STRUCTURAL_KEYS: &[&str] = &[
    "active",
    "language",
    "magic_args",
    "cell_type",
    "title",
    "endofcell",
    "cell_marker",
];

/// Blank-line bookkeeping keys written by the readers.
pub const LINES_TO_NEXT_CELL: &str = "lines_to_next_cell";
pub const LINES_TO_END_OF_CELL_MARKER: &str = "lines_to_end_of_cell_marker";

/// Is the cell live code when the document has extension `ext`?
///
/// `ext` may be given with or without its leading dot. `run_control.frozen`
/// restricts a cell to the notebook itself, an `active-<ext>-<ext>` tag or an
/// `active` key (`"py,R"`, `"ipynb.Rmd"`) restricts it to the listed
/// extensions, and a cell without any of these is active everywhere.
pub fn is_active(ext: &str, metadata: &Metadata) -> bool {
    let ext = ext.trim_start_matches('.');
    let frozen = metadata
        .get("run_control")
        .and_then(|rc| rc.get("frozen"))
        .and_then(Value::as_bool);
    if frozen == Some(true) {
        return ext == "ipynb";
    }
    if let Some(tags) = metadata.get("tags").and_then(Value::as_array) {
        for tag in tags.iter().filter_map(Value::as_str) {
            if tag.starts_with("active-") {
                return tag.split('-').any(|part| part == ext);
            }
        }
    }
    match metadata.get("active") {
        None => true,
        Some(Value::String(active)) => active.split(['.', ',']).any(|part| part == ext),
        Some(other) => other.to_string().split(['.', ',']).any(|part| part == ext),
    }
}

/// Read a non-negative integer stored under `key`.
pub(crate) fn get_count(metadata: &Metadata, key: &str) -> Option<usize> {
    metadata
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(value: Value) -> Metadata {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_active_everywhere_by_default() {
        assert!(is_active(".py", &Metadata::new()));
        assert!(is_active("ipynb", &Metadata::new()));
    }

    #[test]
    fn test_active_key() {
        let m = meta(json!({"active": "py,R"}));
        assert!(is_active(".py", &m));
        assert!(is_active("R", &m));
        assert!(!is_active("ipynb", &m));
        assert!(!is_active(".py", &meta(json!({"active": ""}))));
        assert!(is_active("Rmd", &meta(json!({"active": "ipynb.Rmd"}))));
    }

    #[test]
    fn test_active_tags_and_frozen() {
        let m = meta(json!({"tags": ["other", "active-py-md"]}));
        assert!(is_active("py", &m));
        assert!(is_active(".md", &m));
        assert!(!is_active("ipynb", &m));

        let frozen = meta(json!({"run_control": {"frozen": true}}));
        assert!(is_active("ipynb", &frozen));
        assert!(!is_active("py", &frozen));
    }
}
