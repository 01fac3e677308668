//! # canonfilter
//!
//! Serializable file filters and step configurations whose equality is
//! derived from a canonical byte representation.
//!
//! Incremental pipelines skip a step when its configuration has not changed.
//! That only works if "not changed" can be decided across process boundaries:
//! two filters configured the same way must compare equal and hash equal even
//! though they were built in different runs. canonfilter makes that hold by
//! construction. Filters come from a closed set of named constructors carrying
//! plain data, and equality compares lazily derived, memoized canonical bytes.
//!
//! canonfilter does not walk the filesystem or run any formatting. Those
//! belong to the caller.
//!
//! # Quick Start
//!
//! ```rust
//! use std::path::Path;
//! use canonfilter::{skip_files_named, SerializableFileFilter};
//!
//! let filter = skip_files_named("build.log");
//!
//! assert!(!filter.accepts(Path::new("/src/build.log")));
//! assert!(filter.accepts(Path::new("/src/main.rs")));
//!
//! // Built separately, compared by content.
//! assert_eq!(filter, skip_files_named("build.log"));
//! assert_ne!(filter, skip_files_named("BUILD.log"));
//! ```
//!
//! # Step Configuration
//!
//! ```rust
//! use canonfilter::{skip_files_named, FormatterStep};
//!
//! let configure = || -> Result<FormatterStep, canonfilter::FilterError> {
//!     Ok(FormatterStep::create("indent", &4u8)?
//!         .filter_by_file(skip_files_named("Makefile")))
//! };
//!
//! let previous = configure().unwrap();
//! let current = configure().unwrap();
//! assert_eq!(previous, current); // safe to reuse previous results
//! ```
//!
//! # Custom Types
//!
//! Any serde type can adopt the same equality: own a [`LazyBytes`], implement
//! [`EqualityBasedOnSerialization`], and invoke
//! [`equality_based_on_serialization!`]. With the `test-support` feature,
//! [`testing::SerializableEqualityTester`] checks the result.

#![forbid(unsafe_code)]

pub mod canonical;
pub mod equality;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

mod error;
mod filter;
mod traits;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use canonical::Fingerprint;
pub use equality::{EqualityBasedOnSerialization, LazyBytes};
pub use error::FilterError;
pub use filter::FileFilter;
pub use step::FormatterStep;
pub use traits::SerializableFileFilter;

// ── Entry point ───────────────────────────────────────────────────────────────

/// Create a filter that accepts every file except those named exactly `name`.
///
/// Shorthand for [`FileFilter::skip_files_named`].
///
/// # Example
///
/// ```rust
/// use std::path::Path;
/// use canonfilter::{skip_files_named, SerializableFileFilter};
///
/// let filter = skip_files_named("package-lock.json");
/// assert!(!filter.accepts(Path::new("web/package-lock.json")));
/// assert!(filter.accepts(Path::new("web/package.json")));
/// ```
pub fn skip_files_named(name: impl Into<String>) -> FileFilter {
    FileFilter::skip_files_named(name)
}
