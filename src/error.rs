//! Error types for durq.

use thiserror::Error;

use crate::model::Identity;

#[derive(Debug, Error)]
pub enum Error {
    /// Enqueue named an entity type the store has no schema for.
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    /// Enqueue supplied a property the entity type does not define.
    #[error("entity type {entity_type} has no field {field:?}")]
    UnknownField {
        entity_type: String,
        field: String,
    },

    /// Invariant violation: an identity was leased twice. The offending call
    /// aborts; shared state is rolled back by the caller.
    #[error("identity {identity} of type {entity_type} is already leased")]
    AlreadyLeased {
        entity_type: String,
        identity: Identity,
    },

    #[error("work item not found: {0}")]
    NotFound(Identity),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
