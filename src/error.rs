use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    // Byte derivation
    #[error("cannot derive canonical bytes for {type_name}")]
    Serialization {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot decode canonical bytes into {type_name}")]
    Decode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    // Config
    #[error("invalid configuration: {0}")]
    Construction(String),
}

impl FilterError {
    /// The type whose bytes could not be derived or decoded, if applicable.
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            Self::Serialization { type_name, .. } | Self::Decode { type_name, .. } => Some(*type_name),
            Self::Construction(_) => None,
        }
    }

    /// Whether this error came out of the byte deriver rather than a constructor.
    ///
    /// Neither kind is recoverable: derivation is deterministic, so a retry
    /// produces the same failure. Callers use this to decide whether to blame
    /// the value's contents or the arguments it was built from.
    pub fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. } | Self::Decode { .. })
    }
}
