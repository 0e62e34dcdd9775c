use thiserror::Error;
use xrelay_types::TypesError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("database is corrupted: {0}")]
    Corruption(String),

    /// A process-state update that would move a row backwards or sideways.
    #[error("{entity} {id}: illegal state transition {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        id: u64,
        from: String,
        to: String,
    },

    #[error(transparent)]
    Types(#[from] TypesError),
}

impl StoreError {
    pub fn invalid_transition(
        entity: &'static str,
        id: u64,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            id,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
