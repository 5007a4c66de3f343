//! Error taxonomy surfaced by the relay, the engine and the facade.

use empire_rules::{PlanetId, StoreError, UserId};
use thiserror::Error;

/// A planet that could not be advanced, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickFailure {
    pub planet: PlanetId,
    pub reason: String,
}

impl std::fmt::Display for TickFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "planet {}: {}", self.planet, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum EmpireError {
    /// An id in the request does not resolve to a suitable entity.
    #[error("invalid reference: {0}")]
    InvalidReference(String),
    /// Negative, non-finite or otherwise malformed request data.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("user {user} is not authorized: {reason}")]
    NotAuthorized { user: UserId, reason: String },
    /// An out-of-order protocol call.
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("{pending} command(s) from {owner} are still in flight")]
    CommandsPending { owner: UserId, pending: usize },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    /// A tick was rolled back; carries every planet that failed.
    #[error("tick for {owner} aborted: {}", join_failures(.failures))]
    TickAborted {
        owner: UserId,
        failures: Vec<TickFailure>,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn join_failures(failures: &[TickFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl EmpireError {
    pub(crate) fn unknown(entity: &str, id: impl std::fmt::Display) -> Self {
        EmpireError::InvalidReference(format!("unknown {entity} {id}"))
    }

    pub(crate) fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        EmpireError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn not_authorized(user: UserId, reason: impl Into<String>) -> Self {
        EmpireError::NotAuthorized {
            user,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EmpireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_aborted_lists_failures() {
        let err = EmpireError::TickAborted {
            owner: UserId::nil(),
            failures: vec![
                TickFailure {
                    planet: PlanetId::nil(),
                    reason: "unknown upgrade".into(),
                },
                TickFailure {
                    planet: PlanetId::nil(),
                    reason: "store offline".into(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("unknown upgrade"));
        assert!(text.contains("; "));
        assert!(text.contains("store offline"));
    }

    #[test]
    fn test_store_errors_pass_through() {
        let err: EmpireError = StoreError::Unavailable("disk on fire".into()).into();
        assert!(matches!(err, EmpireError::Store(StoreError::Unavailable(_))));
        assert_eq!(err.to_string(), "entity store unavailable: disk on fire");
    }
}
