//! Structural equality base: equality and hashing defined by canonical bytes.
//!
//! A participating type owns a [`LazyBytes`] cell, implements
//! [`EqualityBasedOnSerialization`], and invokes
//! [`equality_based_on_serialization!`](crate::equality_based_on_serialization)
//! to get `PartialEq`, `Eq` and `Hash`. Two values are equal exactly when they
//! have the same concrete type and the same canonical bytes. Identity, field
//! layout and allocation history play no part.
//!
//! # Example
//!
//! ```rust
//! use canonfilter::{equality_based_on_serialization, EqualityBasedOnSerialization, LazyBytes};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Indent {
//!     width: u8,
//!     #[serde(skip)]
//!     bytes: LazyBytes,
//! }
//!
//! impl EqualityBasedOnSerialization for Indent {
//!     fn lazy_bytes(&self) -> &LazyBytes {
//!         &self.bytes
//!     }
//! }
//!
//! equality_based_on_serialization!(Indent);
//!
//! let a = Indent { width: 4, bytes: LazyBytes::new() };
//! let b = Indent { width: 4, bytes: LazyBytes::new() };
//! assert_eq!(a, b);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, error, trace};

use crate::canonical::{self, Fingerprint};
use crate::error::FilterError;

// ---------------------------------------------------------------------------
// LazyBytes
// ---------------------------------------------------------------------------

/// Per-instance memo cell for canonical bytes.
///
/// Initialised at most once, even under concurrent first access. A failed
/// derivation leaves the cell empty, so the error surfaces again on the next
/// request instead of being replaced by some fallback.
///
/// `Clone` shares already-computed bytes; the owning value is immutable, so
/// the clone's bytes would be identical anyway.
#[derive(Clone, Default)]
pub struct LazyBytes(OnceCell<Arc<[u8]>>);

impl LazyBytes {
    pub const fn new() -> Self {
        Self(OnceCell::new())
    }

    /// Whether the bytes have been derived yet.
    pub fn is_computed(&self) -> bool {
        self.0.get().is_some()
    }

    /// Return the cached bytes, deriving them from `owner` on first use.
    pub fn get_or_derive<T: Serialize + ?Sized>(&self, owner: &T) -> Result<Arc<[u8]>, FilterError> {
        self.0
            .get_or_try_init(|| match canonical::derive_bytes(owner) {
                Ok(bytes) => {
                    trace!(
                        type_name = std::any::type_name::<T>(),
                        len = bytes.len(),
                        "derived canonical bytes"
                    );
                    Ok(Arc::from(bytes))
                }
                Err(err) => {
                    debug!(error = %err, "canonical byte derivation failed");
                    Err(err)
                }
            })
            .map(Arc::clone)
    }
}

impl fmt::Debug for LazyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.get() {
            Some(bytes) => write!(f, "LazyBytes(computed, {} bytes)", bytes.len()),
            None => f.write_str("LazyBytes(pending)"),
        }
    }
}

// ---------------------------------------------------------------------------
// EqualityBasedOnSerialization
// ---------------------------------------------------------------------------

/// Equality and hashing derived from a value's canonical bytes.
///
/// Implementors provide only [`lazy_bytes`](Self::lazy_bytes); the cell must
/// be excluded from serialization with `#[serde(skip)]`. Everything else is
/// derived here.
pub trait EqualityBasedOnSerialization: Serialize + Any + Send + Sync + Sized {
    /// The instance's memo cell.
    fn lazy_bytes(&self) -> &LazyBytes;

    /// Canonical bytes of this value, derived once and cached.
    fn to_bytes(&self) -> Result<Arc<[u8]>, FilterError> {
        self.lazy_bytes().get_or_derive(self)
    }

    /// Compare against a value of unknown type.
    ///
    /// Returns `Ok(false)` when `other` is not a `Self`, without deriving any
    /// bytes. Otherwise compares canonical bytes.
    fn try_equals(&self, other: &dyn Any) -> Result<bool, FilterError> {
        match other.downcast_ref::<Self>() {
            Some(other) => self.try_eq(other),
            None => Ok(false),
        }
    }

    /// Compare against another `Self` by canonical bytes.
    fn try_eq(&self, other: &Self) -> Result<bool, FilterError> {
        Ok(self.to_bytes()? == other.to_bytes()?)
    }

    /// A 64-bit hash of the canonical bytes, stable across processes.
    fn try_hash_code(&self) -> Result<u64, FilterError> {
        let digest = self.fingerprint()?;
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        Ok(u64::from_le_bytes(head))
    }

    /// Collision-resistant digest of the canonical bytes.
    fn fingerprint(&self) -> Result<Fingerprint, FilterError> {
        Ok(canonical::fingerprint(&self.to_bytes()?))
    }
}

/// Raised from inside `PartialEq`/`Hash`, which cannot return a `Result`.
#[doc(hidden)]
#[cold]
#[track_caller]
pub fn derivation_failed(err: &FilterError) -> ! {
    error!(error = %err, "equality requested on a value without canonical bytes");
    match std::error::Error::source(err) {
        Some(source) => panic!("{err}: {source}"),
        None => panic!("{err}"),
    }
}

/// Implement `PartialEq`, `Eq` and `Hash` for a type in terms of
/// [`EqualityBasedOnSerialization`].
///
/// # Panics
///
/// The generated `eq` and `hash` panic when the canonical bytes cannot be
/// derived. They never fall back to identity or field comparison; use
/// [`EqualityBasedOnSerialization::try_eq`] to handle the error instead.
#[macro_export]
macro_rules! equality_based_on_serialization {
    ($ty:ty) => {
        impl ::core::cmp::PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                match $crate::EqualityBasedOnSerialization::try_eq(self, other) {
                    Ok(eq) => eq,
                    Err(err) => $crate::equality::derivation_failed(&err),
                }
            }
        }

        impl ::core::cmp::Eq for $ty {}

        impl ::core::hash::Hash for $ty {
            fn hash<H: ::core::hash::Hasher>(&self, state: &mut H) {
                match $crate::EqualityBasedOnSerialization::to_bytes(self) {
                    Ok(bytes) => ::core::hash::Hash::hash(&bytes[..], state),
                    Err(err) => $crate::equality::derivation_failed(&err),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;
    use serde::Serializer;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Serialize)]
    struct Counted {
        label: String,
        #[serde(skip)]
        bytes: LazyBytes,
        #[serde(skip)]
        derivations: Arc<AtomicUsize>,
    }

    impl Counted {
        fn new(label: &str) -> Self {
            Self {
                label: label.to_string(),
                bytes: LazyBytes::new(),
                derivations: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    // Serialize is how the deriver sees a value, so counting calls here counts
    // derivations.
    #[derive(Debug)]
    struct CountingSer<'a>(&'a Counted);

    impl EqualityBasedOnSerialization for Counted {
        fn lazy_bytes(&self) -> &LazyBytes {
            &self.bytes
        }

        fn to_bytes(&self) -> Result<Arc<[u8]>, FilterError> {
            self.lazy_bytes().get_or_derive(&CountingSer(self))
        }
    }

    impl Serialize for CountingSer<'_> {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            self.0.derivations.fetch_add(1, Ordering::SeqCst);
            self.0.serialize(serializer)
        }
    }

    equality_based_on_serialization!(Counted);

    #[derive(Debug, Serialize)]
    struct Other {
        label: String,
        #[serde(skip)]
        bytes: LazyBytes,
    }

    impl EqualityBasedOnSerialization for Other {
        fn lazy_bytes(&self) -> &LazyBytes {
            &self.bytes
        }
    }

    #[derive(Debug)]
    struct Unserializable {
        bytes: LazyBytes,
    }

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("captured state has no canonical form"))
        }
    }

    impl EqualityBasedOnSerialization for Unserializable {
        fn lazy_bytes(&self) -> &LazyBytes {
            &self.bytes
        }
    }

    equality_based_on_serialization!(Unserializable);

    #[test]
    fn bytes_are_derived_once_per_instance() {
        let a = Counted::new("a");
        let alias = &a;
        assert!(!a.bytes.is_computed());
        for _ in 0..5 {
            assert!(a == *alias);
            a.try_hash_code().unwrap();
        }
        assert!(a.bytes.is_computed());
        assert_eq!(a.derivations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_first_access_derives_once() {
        let a = Counted::new("shared");
        let results: Vec<Arc<[u8]>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| a.to_bytes().unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(a.derivations.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn independent_instances_are_equal_and_hash_equal() {
        let a = Counted::new("same");
        let b = Counted::new("same");
        assert_eq!(a, b);
        assert_eq!(a.try_hash_code().unwrap(), b.try_hash_code().unwrap());
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());

        let set: HashSet<Counted> = [a, b, Counted::new("different")].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn different_concrete_types_are_never_equal() {
        let a = Counted::new("x");
        let b = Other { label: "x".into(), bytes: LazyBytes::new() };
        // Same bytes, different type.
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
        assert!(!a.try_equals(&b).unwrap());
        assert!(a.try_equals(&Counted::new("x")).unwrap());
        assert!(!a.try_equals(&"x").unwrap());
    }

    #[test]
    fn derivation_error_propagates_and_is_not_cached() {
        let u = Unserializable { bytes: LazyBytes::new() };
        let err = u.to_bytes().unwrap_err();
        assert!(matches!(err, FilterError::Serialization { .. }));
        assert!(u.try_eq(&u).is_err());
        assert!(u.try_hash_code().is_err());
        assert!(!u.bytes.is_computed());
    }

    #[test]
    #[should_panic(expected = "cannot derive canonical bytes")]
    fn partial_eq_panics_instead_of_falling_back_to_identity() {
        let u = Unserializable { bytes: LazyBytes::new() };
        let alias = &u;
        let _ = u == *alias;
    }

    #[test]
    fn debug_shows_cache_state() {
        let a = Counted::new("a");
        assert_eq!(format!("{:?}", a.bytes), "LazyBytes(pending)");
        a.to_bytes().unwrap();
        assert!(format!("{:?}", a.bytes).starts_with("LazyBytes(computed"));
    }
}
