use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::equality::{EqualityBasedOnSerialization, LazyBytes};
use crate::error::FilterError;
use crate::traits::SerializableFileFilter;

// ---------------------------------------------------------------------------
// FileFilter
// ---------------------------------------------------------------------------

/// A serializable file filter.
///
/// The set of rules is closed: values are only obtainable through the named
/// constructors below, and each rule carries nothing but plain data. Equality
/// and hashing come from the canonical bytes (see
/// [`EqualityBasedOnSerialization`]), so two filters built independently from
/// the same arguments are interchangeable to any cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFilter {
    rule: FilterRule,
    #[serde(skip)]
    bytes: LazyBytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum FilterRule {
    SkipFilesNamed { name: String },
}

impl FileFilter {
    fn from_rule(rule: FilterRule) -> Self {
        Self {
            rule,
            bytes: LazyBytes::new(),
        }
    }

    /// Accept every file except those whose final path component is exactly
    /// `name`.
    ///
    /// The comparison is case-sensitive and byte-exact. Any string is
    /// accepted; an empty `name` matches no file, because no path has an empty
    /// final component, so such a filter accepts everything.
    pub fn skip_files_named(name: impl Into<String>) -> Self {
        Self::from_rule(FilterRule::SkipFilesNamed { name: name.into() })
    }

    /// The name skipped by a `skip_files_named` filter.
    pub fn skipped_name(&self) -> Option<&str> {
        match &self.rule {
            FilterRule::SkipFilesNamed { name } => Some(name),
        }
    }
}

impl SerializableFileFilter for FileFilter {
    fn accepts(&self, path: &Path) -> bool {
        match &self.rule {
            FilterRule::SkipFilesNamed { name } => match path.file_name() {
                Some(file_name) => file_name.as_encoded_bytes() != name.as_bytes(),
                None => true,
            },
        }
    }

    fn to_bytes(&self) -> Result<Arc<[u8]>, FilterError> {
        EqualityBasedOnSerialization::to_bytes(self)
    }
}

impl EqualityBasedOnSerialization for FileFilter {
    fn lazy_bytes(&self) -> &LazyBytes {
        &self.bytes
    }
}

crate::equality_based_on_serialization!(FileFilter);
