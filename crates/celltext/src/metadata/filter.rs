//! Metadata filters: `"key1,key2"`, `"-key"`, `"all"`, `"-all"`, `"all,-key"`.
//!
//! A filter has an `additional` and an `excluded` part. It is always applied
//! together with a default filter: the cell default drops a fixed list of
//! keys and keeps the rest, while the notebook default keeps only a fixed
//! list. The user filter can widen or narrow either.

use crate::notebook::Metadata;
use std::convert::Infallible;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySet {
    All,
    Keys(Vec<String>),
}

impl Default for KeySet {
    fn default() -> Self {
        KeySet::Keys(Vec::new())
    }
}

impl KeySet {
    pub fn contains(&self, key: &str) -> bool {
        match self {
            KeySet::All => true,
            KeySet::Keys(keys) => keys.iter().any(|k| k == key),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, KeySet::Keys(keys) if keys.is_empty())
    }

    fn push(&mut self, key: &str) {
        if key == "all" {
            *self = KeySet::All;
        } else if let KeySet::Keys(keys) = self {
            keys.push(key.to_string());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    pub additional: KeySet,
    pub excluded: KeySet,
}

impl FromStr for MetadataFilter {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut filter = MetadataFilter::default();
        for key in s.split(',').map(str::trim) {
            if let Some(excluded) = key.strip_prefix('-') {
                let excluded = excluded.trim();
                if !excluded.is_empty() {
                    filter.excluded.push(excluded);
                }
            } else if !key.is_empty() {
                filter.additional.push(key);
            }
        }
        Ok(filter)
    }
}

impl MetadataFilter {
    pub fn parse(s: &str) -> Self {
        match s.parse() {
            Ok(filter) => filter,
            Err(never) => match never {},
        }
    }

    /// Default cell filter: drop editor state and the blank-line bookkeeping.
    pub fn default_cell() -> Self {
        Self {
            additional: KeySet::default(),
            excluded: KeySet::Keys(
                [
                    "autoscroll",
                    "collapsed",
                    "scrolled",
                    "trusted",
                    "ExecuteTime",
                    "skipline",
                    "endofcell",
                    super::LINES_TO_NEXT_CELL,
                    super::LINES_TO_END_OF_CELL_MARKER,
                ]
                .map(String::from)
                .to_vec(),
            ),
        }
    }

    /// Default notebook filter: keep only the `jupytext` and `kernelspec`
    /// sections.
    pub fn default_notebook() -> Self {
        Self {
            additional: KeySet::Keys(vec!["jupytext".into(), "kernelspec".into()]),
            excluded: KeySet::default(),
        }
    }

    /// Does this filter, combined with `default`, keep `key`?
    pub fn keeps(&self, default: &MetadataFilter, key: &str) -> bool {
        let mut default = default.clone();
        if self.excluded == KeySet::All {
            default.additional = KeySet::default();
        }
        if self.additional == KeySet::All {
            default.excluded = KeySet::default();
        }

        if !default.additional.is_empty() {
            // Allow-list default: nothing passes unless named.
            if self.additional == KeySet::All {
                return !self.excluded.contains(key);
            }
            return (self.additional.contains(key) || default.additional.contains(key))
                && !self.excluded.contains(key);
        }

        if self.excluded == KeySet::All {
            return self.additional.contains(key);
        }
        let dropped = self.excluded.contains(key) || default.excluded.contains(key);
        !dropped || self.additional.contains(key)
    }

    /// Copy of `metadata` holding only the keys kept by this filter and
    /// `default`.
    pub fn apply(&self, default: &MetadataFilter, metadata: &Metadata) -> Metadata {
        metadata
            .iter()
            .filter(|(key, _)| self.keeps(default, key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
