//! The single failure taxonomy for marketplace operations.
//!
//! Every variant except `Backend` is raised before any write happens, so a
//! caller that sees one of them knows no record was mutated.

use rhm_schemas::{Actor, UnknownStatus};

/// Returned when an event cannot legally be applied in the current status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    /// `order`, `house` or `appointment`.
    pub entity: &'static str,
    pub id: i64,
    /// Status token the record was in when the event arrived.
    pub from: String,
    /// Event name that was rejected.
    pub action: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid state: cannot {} {} {} in status {}",
            self.action, self.entity, self.id, self.from
        )
    }
}

impl std::error::Error for TransitionError {}

#[derive(Debug)]
pub enum MarketError {
    /// Missing or malformed input.
    Validation(String),
    /// No usable caller identity.
    Unauthorized(String),
    /// Caller is not owner / landlord / admin of the resource.
    Forbidden { actor: Actor, reason: String },
    /// Operation not valid for the current status.
    InvalidState(TransitionError),
    NotFound { entity: &'static str, id: i64 },
    /// The resource is taken (e.g. a house already occupied by another lease).
    Conflict(String),
    /// Persistence failure. Details are for logs, not for callers.
    Backend(anyhow::Error),
}

impl MarketError {
    pub fn validation(msg: impl Into<String>) -> Self {
        MarketError::Validation(msg.into())
    }

    pub fn forbidden(actor: &Actor, reason: impl Into<String>) -> Self {
        MarketError::Forbidden {
            actor: *actor,
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        MarketError::NotFound { entity, id }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        MarketError::Conflict(msg.into())
    }

    pub fn invalid_state(
        entity: &'static str,
        id: i64,
        from: impl std::fmt::Display,
        action: impl Into<String>,
    ) -> Self {
        MarketError::InvalidState(TransitionError {
            entity,
            id,
            from: from.to_string(),
            action: action.into(),
        })
    }

    /// Stable machine-readable kind, surfaced in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::Validation(_) => "validation",
            MarketError::Unauthorized(_) => "unauthorized",
            MarketError::Forbidden { .. } => "forbidden",
            MarketError::InvalidState(_) => "invalid_state",
            MarketError::NotFound { .. } => "not_found",
            MarketError::Conflict(_) => "conflict",
            MarketError::Backend(_) => "backend",
        }
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, MarketError::InvalidState(_))
    }
}

impl std::fmt::Display for MarketError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MarketError::Validation(msg) => write!(f, "validation failed: {msg}"),
            MarketError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            MarketError::Forbidden { actor, reason } => {
                write!(f, "forbidden for {actor}: {reason}")
            }
            MarketError::InvalidState(e) => write!(f, "{e}"),
            MarketError::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
            MarketError::Conflict(msg) => write!(f, "conflict: {msg}"),
            MarketError::Backend(e) => write!(f, "backend failure: {e:#}"),
        }
    }
}

impl std::error::Error for MarketError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MarketError::InvalidState(e) => Some(e),
            MarketError::Backend(e) => Some(&**e),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for MarketError {
    fn from(e: anyhow::Error) -> Self {
        MarketError::Backend(e)
    }
}

impl From<UnknownStatus> for MarketError {
    fn from(e: UnknownStatus) -> Self {
        MarketError::Validation(e.to_string())
    }
}
