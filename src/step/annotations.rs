//! Configuration of the format-annotations step.
//!
//! The step moves type annotations onto the same line as the type they
//! annotate. Its configuration is the set of simple names treated as type
//! annotations. Only the configuration lives here.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::FormatterStep;
use crate::error::FilterError;

pub const NAME: &str = "formatAnnotations";

/// Simple names recognised as type annotations unless configured otherwise.
pub const DEFAULT_TYPE_ANNOTATIONS: &[&str] = &[
    "Initialized",
    "Interned",
    "KeyFor",
    "LTLengthOf",
    "Localized",
    "MinLen",
    "MonotonicNonNull",
    "NonNegative",
    "NonNull",
    "Nonnull",
    "NotNull",
    "Nullable",
    "PolyNull",
    "Positive",
    "Regex",
    "Signed",
    "Tainted",
    "UnderInitialization",
    "UnknownInitialization",
    "Unsigned",
    "Untainted",
];

/// Serialized state of the step. Sorted, so the order in which names were
/// supplied never changes equality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredAnnotations")]
pub struct AnnotationsState {
    type_annotations: BTreeSet<String>,
}

impl AnnotationsState {
    pub fn type_annotations(&self) -> &BTreeSet<String> {
        &self.type_annotations
    }
}

#[derive(Deserialize)]
struct StoredAnnotations {
    type_annotations: BTreeSet<String>,
}

impl TryFrom<StoredAnnotations> for AnnotationsState {
    type Error = FilterError;

    fn try_from(stored: StoredAnnotations) -> Result<Self, Self::Error> {
        let type_annotations: BTreeSet<String> = stored
            .type_annotations
            .into_iter()
            .map(validated)
            .collect::<Result<_, _>>()?;
        Ok(Self { type_annotations })
    }
}

/// The step with the default type annotations.
pub fn format_annotations() -> Result<FormatterStep, FilterError> {
    format_annotations_with(std::iter::empty::<&str>(), std::iter::empty::<&str>())
}

/// The step with `added` names added to the defaults, then `removed` names
/// taken away.
///
/// # Errors
///
/// [`FilterError::Construction`] when a name is empty or is not a plain
/// identifier.
pub fn format_annotations_with<A, R>(added: A, removed: R) -> Result<FormatterStep, FilterError>
where
    A: IntoIterator,
    A::Item: Into<String>,
    R: IntoIterator,
    R::Item: Into<String>,
{
    let mut type_annotations: BTreeSet<String> =
        DEFAULT_TYPE_ANNOTATIONS.iter().map(|s| s.to_string()).collect();

    for name in added {
        type_annotations.insert(validated(name.into())?);
    }
    for name in removed {
        type_annotations.remove(&validated(name.into())?);
    }

    FormatterStep::create(NAME, &AnnotationsState { type_annotations })
}

fn validated(name: String) -> Result<String, FilterError> {
    let is_identifier = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if is_identifier {
        Ok(name)
    } else {
        Err(FilterError::Construction(format!(
            "type annotation {name:?} is not a simple identifier"
        )))
    }
}
