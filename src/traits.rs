use std::path::Path;
use std::sync::Arc;

use crate::error::FilterError;

/// Decides whether a file takes part in a pipeline step.
///
/// Every implementation must be able to produce a canonical byte
/// representation of itself through [`to_bytes`](Self::to_bytes). That
/// requirement is the point of the trait: a caching layer compares filters by
/// their bytes, so a filter built around an opaque closure, which has no
/// stable byte form, cannot implement it honestly.
///
/// The crate's own implementation is [`FileFilter`](crate::FileFilter),
/// built through named constructors such as
/// [`skip_files_named`](crate::skip_files_named). There is deliberately no
/// constructor that wraps an arbitrary `Fn(&Path) -> bool`.
///
/// # Thread Safety
///
/// `Send + Sync` are required: filters are stored in step configurations and
/// consulted from whichever thread walks the files.
///
/// # Example
///
/// ```rust
/// use std::path::Path;
/// use canonfilter::{skip_files_named, SerializableFileFilter};
///
/// fn keep<'a>(filter: &impl SerializableFileFilter, paths: &[&'a str]) -> Vec<&'a str> {
///     paths.iter().copied().filter(|p| filter.accepts(Path::new(p))).collect()
/// }
///
/// let filter = skip_files_named("Cargo.lock");
/// assert_eq!(keep(&filter, &["a/Cargo.lock", "a/lib.rs"]), vec!["a/lib.rs"]);
/// ```
pub trait SerializableFileFilter: Send + Sync {
    /// Returns `true` if the file at `path` should be processed.
    ///
    /// Pure and total: no filesystem access, no panics, defined for every path.
    fn accepts(&self, path: &Path) -> bool;

    /// Canonical bytes describing everything inside this filter.
    fn to_bytes(&self) -> Result<Arc<[u8]>, FilterError>;
}
