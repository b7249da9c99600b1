use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("no signed-in user")]
    Unauthenticated,
    #[error("permission denied")]
    PermissionDenied,
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("stored {kind} {id} is malformed: {reason}")]
    Corrupt {
        kind: &'static str,
        id: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<StoreError> for Error {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { collection, id } => Error::NotFound {
                kind: kind_of(&collection),
                id,
            },
            StoreError::PermissionDenied(_) => Error::PermissionDenied,
            StoreError::Unavailable(reason) => Error::StoreUnavailable(reason),
        }
    }
}

fn kind_of(collection: &str) -> &'static str {
    match collection {
        crate::store::LISTS => "list",
        crate::store::TODOS => "task",
        _ => "document",
    }
}

impl Error {
    /// The single notification shown when `action` (e.g. "add task") fails.
    pub fn user_message(&self, action: &str) -> String {
        match self {
            Error::Unauthenticated => "You must be logged in to perform this action".to_string(),
            Error::PermissionDenied => {
                format!("Permission denied: you cannot {} here", action)
            }
            Error::NotFound { kind, .. } => format!("Failed to {}: {} no longer exists", action, kind),
            Error::InvalidInput(reason) => format!("Failed to {}: {}", action, reason),
            Error::StoreUnavailable(_) | Error::Corrupt { .. } => format!("Failed to {}", action),
        }
    }

    pub fn is_permission(&self) -> bool {
        matches!(self, Error::PermissionDenied | Error::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_taxonomy() {
        let err: Error = StoreError::NotFound {
            collection: "todos".into(),
            id: "t1".into(),
        }
        .into();
        assert_eq!(
            err,
            Error::NotFound {
                kind: "task",
                id: "t1".into()
            }
        );

        let err: Error = StoreError::PermissionDenied("rules".into()).into();
        assert_eq!(err, Error::PermissionDenied);

        let err: Error = StoreError::Unavailable("timeout".into()).into();
        assert_eq!(err, Error::StoreUnavailable("timeout".into()));
    }

    #[test]
    fn permission_messages_are_distinct() {
        let denied = Error::PermissionDenied.user_message("delete list");
        let generic = Error::StoreUnavailable("x".into()).user_message("delete list");
        assert_ne!(denied, generic);
        assert!(denied.starts_with("Permission denied"));
        assert_eq!(generic, "Failed to delete list");
        assert!(Error::PermissionDenied.is_permission());
        assert!(Error::Unauthenticated.is_permission());
        assert!(!Error::StoreUnavailable("x".into()).is_permission());
    }
}
