//! Pipeline step configuration with equality derived from canonical bytes.
//!
//! A [`FormatterStep`] is what a pipeline remembers about a step between
//! runs: its name, its serialized state, and optionally a [`FileFilter`]
//! restricting which files it touches. If the stored step equals the freshly
//! configured one, previous results can be reused. The transform a step
//! performs is not modelled here.

pub mod annotations;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::canonical;
use crate::equality::{EqualityBasedOnSerialization, LazyBytes};
use crate::error::FilterError;
use crate::filter::FileFilter;
use crate::traits::SerializableFileFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "StoredStep")]
pub struct FormatterStep {
    name: String,
    state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filter: Option<FileFilter>,
    #[serde(skip)]
    bytes: LazyBytes,
}

/// A step as read back from bytes, before the constructor's checks.
#[derive(Deserialize)]
struct StoredStep {
    name: String,
    state: Value,
    #[serde(default)]
    filter: Option<FileFilter>,
}

impl TryFrom<StoredStep> for FormatterStep {
    type Error = FilterError;

    fn try_from(stored: StoredStep) -> Result<Self, Self::Error> {
        validate(&stored.name, &stored.state)?;
        Ok(Self {
            name: stored.name,
            state: stored.state,
            filter: stored.filter,
            bytes: LazyBytes::new(),
        })
    }
}

/// Checks shared by construction and decoding.
fn validate(name: &str, state: &Value) -> Result<(), FilterError> {
    if name.is_empty() {
        return Err(FilterError::Construction("step name must not be empty".into()));
    }
    if name == annotations::NAME {
        annotations::AnnotationsState::deserialize(state).map_err(|source| FilterError::Decode {
            type_name: std::any::type_name::<annotations::AnnotationsState>(),
            source,
        })?;
    }
    Ok(())
}

impl FormatterStep {
    /// Create a step from its name and configuration state.
    ///
    /// `state` is serialized right away so that a value with no serialized
    /// form is rejected here rather than at the first cache lookup.
    ///
    /// # Errors
    ///
    /// - [`FilterError::Construction`] if `name` is empty.
    /// - [`FilterError::Serialization`] if `state` cannot be serialized, or
    ///   holds a NaN or infinite float.
    pub fn create<S: Serialize + ?Sized>(name: impl Into<String>, state: &S) -> Result<Self, FilterError> {
        let name = name.into();
        let state = canonical::to_canonical_value(state)?;
        validate(&name, &state)?;

        debug!(step = %name, "created formatter step");
        Ok(Self {
            name,
            state,
            filter: None,
            bytes: LazyBytes::new(),
        })
    }

    /// Restrict this step to the files `filter` accepts.
    ///
    /// Replaces any filter set earlier. The result is a new configuration,
    /// so it never equals the unfiltered step.
    pub fn filter_by_file(self, filter: FileFilter) -> Self {
        Self {
            filter: Some(filter),
            bytes: LazyBytes::new(),
            ..self
        }
    }

    /// Whether this step should run on the file at `path`.
    pub fn applies_to(&self, path: &Path) -> bool {
        self.filter.as_ref().map_or(true, |f| f.accepts(path))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn filter(&self) -> Option<&FileFilter> {
        self.filter.as_ref()
    }

    /// Decode the state back into the type it was created from.
    pub fn state_as<S: DeserializeOwned>(&self) -> Result<S, FilterError> {
        S::deserialize(&self.state).map_err(|source| FilterError::Decode {
            type_name: std::any::type_name::<S>(),
            source,
        })
    }
}

impl EqualityBasedOnSerialization for FormatterStep {
    fn lazy_bytes(&self) -> &LazyBytes {
        &self.bytes
    }
}

crate::equality_based_on_serialization!(FormatterStep);
