//! Error types for the shadow runtime
//!
//! Contract violations between the host's tagging and the shadow model
//! surface as [`ShadowError::Underflow`] and [`ShadowError::InvalidState`].
//! Partial instrumentation is never an error; it degrades to UNKNOWN
//! provenance instead.

use crate::ids::SiteId;
use thiserror::Error;

/// Main error type for the shadow runtime
#[derive(Error, Debug)]
pub enum ShadowError {
    /// Pop or peek past the bottom of a shadow operand stack.
    ///
    /// A category was attached to a node whose real stack behavior does not
    /// match the category's assumed contract.
    #[error("shadow stack underflow at {site}: requested {requested}, available {available}")]
    Underflow {
        site: SiteLabel,
        requested: usize,
        available: usize,
    },

    /// Call nesting or depth-marker bookkeeping was violated
    #[error("invalid shadow state: {0}")]
    InvalidState(String),

    /// A shadow table lock was poisoned by a panicking listener
    #[error("shadow lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// Tracer configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O error (configuration files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShadowError {
    pub fn underflow(site: impl Into<SiteLabel>, requested: usize, available: usize) -> Self {
        ShadowError::Underflow {
            site: site.into(),
            requested,
            available,
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        ShadowError::InvalidState(message.into())
    }

    /// Attach a site to an underflow raised below the router.
    pub fn at_site(self, id: SiteId) -> Self {
        match self {
            ShadowError::Underflow {
                site: SiteLabel::Detached,
                requested,
                available,
            } => ShadowError::Underflow {
                site: SiteLabel::Site(id),
                requested,
                available,
            },
            other => other,
        }
    }

    /// True for the two contract-violation classes.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            ShadowError::Underflow { .. } | ShadowError::InvalidState(_)
        )
    }
}

/// Where an underflow was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteLabel {
    Site(SiteId),
    Detached,
}

impl From<SiteId> for SiteLabel {
    fn from(value: SiteId) -> Self {
        SiteLabel::Site(value)
    }
}

impl From<Option<SiteId>> for SiteLabel {
    fn from(value: Option<SiteId>) -> Self {
        value.map(SiteLabel::Site).unwrap_or(SiteLabel::Detached)
    }
}

impl std::fmt::Display for SiteLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SiteLabel::Site(id) => write!(f, "{}", id),
            SiteLabel::Detached => write!(f, "<no site>"),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ShadowError>;
