//! Equality verification for types built on [`EqualityBasedOnSerialization`].
//!
//! Enabled with the `test-support` feature. Describe the configurations a type
//! can take as groups of construction recipes: recipes within a group must
//! produce equal values, values from different groups must differ.
//!
//! ```rust
//! use canonfilter::skip_files_named;
//! use canonfilter::testing::SerializableEqualityTester;
//!
//! SerializableEqualityTester::new()
//!     .recipe(|| skip_files_named("a"))
//!     .recipe(|| skip_files_named(String::from("a")))
//!     .are_different_than()
//!     .recipe(|| skip_files_named("b"))
//!     .test_equals()
//!     .unwrap();
//! ```

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::canonical;
use crate::equality::EqualityBasedOnSerialization;
use crate::error::FilterError;

/// Position of an instance: group index, recipe index within the group, and
/// which of the two independent constructions it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub group: usize,
    pub recipe: usize,
    pub copy: usize,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group {} recipe {} (copy {})", self.group, self.recipe, self.copy)
    }
}

#[derive(Error, Debug)]
pub enum EqualityViolation {
    #[error("no recipes were registered")]
    NoRecipes,

    #[error("{0} is not equal to itself")]
    NotReflexive(Slot),

    #[error("{0} gives different results on repeated equality or hash calls")]
    Unstable(Slot),

    #[error("{left} and {right} should be equal")]
    NotEqual { left: Slot, right: Slot },

    #[error("{left} and {right} are equal but hash differently")]
    HashMismatch { left: Slot, right: Slot },

    #[error("{left} and {right} belong to different groups but are equal")]
    EqualAcrossGroups { left: Slot, right: Slot },

    #[error("{0} does not survive a byte round trip")]
    RoundTrip(Slot),

    #[error("{slot} has no canonical bytes")]
    Bytes {
        slot: Slot,
        #[source]
        source: FilterError,
    },
}

type Recipe<T> = Box<dyn Fn() -> T>;

/// Builder for an equality check over groups of construction recipes.
pub struct SerializableEqualityTester<T> {
    closed: Vec<Vec<Recipe<T>>>,
    open: Vec<Recipe<T>>,
}

impl<T> Default for SerializableEqualityTester<T> {
    fn default() -> Self {
        Self {
            closed: Vec::new(),
            open: Vec::new(),
        }
    }
}

impl<T> SerializableEqualityTester<T>
where
    T: EqualityBasedOnSerialization + DeserializeOwned + Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recipe to the current group.
    pub fn recipe(mut self, recipe: impl Fn() -> T + 'static) -> Self {
        self.open.push(Box::new(recipe));
        self
    }

    /// Close the current group. Recipes added afterwards must build values
    /// different from everything registered so far.
    pub fn are_different_than(mut self) -> Self {
        if !self.open.is_empty() {
            self.closed.push(std::mem::take(&mut self.open));
        }
        self
    }

    /// Build every recipe twice and check the equality contract.
    ///
    /// # Errors
    ///
    /// The first [`EqualityViolation`] found.
    pub fn test_equals(self) -> Result<(), EqualityViolation> {
        let groups = self.are_different_than().closed;
        if groups.is_empty() {
            return Err(EqualityViolation::NoRecipes);
        }

        let built: Vec<Vec<(Slot, T)>> = groups
            .iter()
            .enumerate()
            .map(|(group, recipes)| {
                recipes
                    .iter()
                    .enumerate()
                    .flat_map(|(recipe, make)| {
                        (0..2).map(move |copy| (Slot { group, recipe, copy }, make()))
                    })
                    .collect()
            })
            .collect();

        for (slot, value) in built.iter().flatten() {
            check_instance(*slot, value)?;
        }

        for group in &built {
            for (i, (left, a)) in group.iter().enumerate() {
                for (right, b) in &group[i + 1..] {
                    if !(a == b && bytes_eq(*left, a, *right, b)?) {
                        return Err(EqualityViolation::NotEqual { left: *left, right: *right });
                    }
                    let hashes_match = std_hash(a) == std_hash(b)
                        && hash_code(*left, a)? == hash_code(*right, b)?;
                    if !hashes_match {
                        return Err(EqualityViolation::HashMismatch { left: *left, right: *right });
                    }
                }
            }
        }

        for (gi, group) in built.iter().enumerate() {
            for other in &built[gi + 1..] {
                for (left, a) in group {
                    for (right, b) in other {
                        if a == b || bytes_eq(*left, a, *right, b)? {
                            return Err(EqualityViolation::EqualAcrossGroups { left: *left, right: *right });
                        }
                    }
                }
            }
        }

        debug!(
            groups = built.len(),
            instances = built.iter().map(Vec::len).sum::<usize>(),
            "equality contract holds"
        );
        Ok(())
    }
}

fn check_instance<T>(slot: Slot, value: &T) -> Result<(), EqualityViolation>
where
    T: EqualityBasedOnSerialization + DeserializeOwned + Eq + Hash,
{
    let bytes = value.to_bytes().map_err(|source| EqualityViolation::Bytes { slot, source })?;

    let alias = value;
    if !(value == alias && bytes_eq(slot, value, slot, alias)?) {
        return Err(EqualityViolation::NotReflexive(slot));
    }

    let first = (std_hash(value), hash_code(slot, value)?, value.try_equals(alias));
    let second = (std_hash(value), hash_code(slot, value)?, value.try_equals(alias));
    let stable = first.0 == second.0
        && first.1 == second.1
        && matches!((first.2, second.2), (Ok(true), Ok(true)));
    if !stable {
        return Err(EqualityViolation::Unstable(slot));
    }

    let decoded: T = canonical::decode(&bytes).map_err(|source| EqualityViolation::Bytes { slot, source })?;
    let reencoded = decoded
        .to_bytes()
        .map_err(|source| EqualityViolation::Bytes { slot, source })?;
    if reencoded != bytes {
        return Err(EqualityViolation::RoundTrip(slot));
    }
    Ok(())
}

fn bytes_eq<T: EqualityBasedOnSerialization>(
    left: Slot,
    a: &T,
    right: Slot,
    b: &T,
) -> Result<bool, EqualityViolation> {
    let a = a.to_bytes().map_err(|source| EqualityViolation::Bytes { slot: left, source })?;
    let b = b.to_bytes().map_err(|source| EqualityViolation::Bytes { slot: right, source })?;
    Ok(a == b)
}

fn hash_code<T: EqualityBasedOnSerialization>(slot: Slot, value: &T) -> Result<u64, EqualityViolation> {
    value
        .try_hash_code()
        .map_err(|source| EqualityViolation::Bytes { slot, source })
}

fn std_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equality::LazyBytes;
    use crate::skip_files_named;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn skip_files_named_honours_the_contract() {
        SerializableEqualityTester::new()
            .recipe(|| skip_files_named("a"))
            .recipe(|| skip_files_named(String::from("a")))
            .are_different_than()
            .recipe(|| skip_files_named("b"))
            .are_different_than()
            .recipe(|| skip_files_named("A"))
            .are_different_than()
            .recipe(|| skip_files_named(""))
            .test_equals()
            .unwrap();
    }

    #[test]
    fn empty_tester_is_an_error() {
        let err = SerializableEqualityTester::<crate::FileFilter>::new()
            .are_different_than()
            .test_equals()
            .unwrap_err();
        assert!(matches!(err, EqualityViolation::NoRecipes));
    }

    #[test]
    fn same_config_in_two_groups_is_caught() {
        let err = SerializableEqualityTester::new()
            .recipe(|| skip_files_named("a"))
            .are_different_than()
            .recipe(|| skip_files_named("a"))
            .test_equals()
            .unwrap_err();
        assert!(matches!(err, EqualityViolation::EqualAcrossGroups { .. }), "{err}");
    }

    #[test]
    fn different_configs_in_one_group_are_caught() {
        let err = SerializableEqualityTester::new()
            .recipe(|| skip_files_named("a"))
            .recipe(|| skip_files_named("b"))
            .test_equals()
            .unwrap_err();
        assert!(matches!(err, EqualityViolation::NotEqual { .. }), "{err}");
    }

    static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

    /// Leaks per-instance identity into its bytes, the way a serialized
    /// closure leaks its address.
    #[derive(Debug, Serialize, Deserialize)]
    struct IdentityLeak {
        name: String,
        instance: usize,
        #[serde(skip)]
        bytes: LazyBytes,
    }

    impl IdentityLeak {
        fn new(name: &str) -> Self {
            Self {
                name: name.into(),
                instance: NEXT_ID.fetch_add(1, Ordering::SeqCst),
                bytes: LazyBytes::new(),
            }
        }
    }

    impl EqualityBasedOnSerialization for IdentityLeak {
        fn lazy_bytes(&self) -> &LazyBytes {
            &self.bytes
        }
    }

    crate::equality_based_on_serialization!(IdentityLeak);

    #[test]
    fn identity_in_bytes_is_caught_by_the_twin_construction() {
        let err = SerializableEqualityTester::new()
            .recipe(|| IdentityLeak::new("x"))
            .test_equals()
            .unwrap_err();
        assert!(
            matches!(err, EqualityViolation::NotEqual { left, right } if left.copy == 0 && right.copy == 1),
            "{err}"
        );
    }

    /// Forgets to serialize part of its configuration.
    #[derive(Debug, Serialize, Deserialize)]
    struct ForgetfulStep {
        name: String,
        // Never read: it only exists to be left out of the bytes.
        #[allow(dead_code)]
        #[serde(skip)]
        width: u8,
        #[serde(skip)]
        bytes: LazyBytes,
    }

    impl EqualityBasedOnSerialization for ForgetfulStep {
        fn lazy_bytes(&self) -> &LazyBytes {
            &self.bytes
        }
    }

    crate::equality_based_on_serialization!(ForgetfulStep);

    #[test]
    fn unserialized_config_is_caught_across_groups() {
        let make = |width| move || ForgetfulStep { name: "indent".into(), width, bytes: LazyBytes::new() };
        let err = SerializableEqualityTester::new()
            .recipe(make(2))
            .are_different_than()
            .recipe(make(4))
            .test_equals()
            .unwrap_err();
        assert!(matches!(err, EqualityViolation::EqualAcrossGroups { .. }), "{err}");
    }
}
