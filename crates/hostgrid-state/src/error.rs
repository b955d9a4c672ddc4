//! Error types for the hostgrid record store.
//!
//! redb and serde_json errors are flattened to strings by the store's
//! `map_err!` macro, keyed by the stage that failed.

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open record store: {0}")]
    Open(String),

    /// Beginning or committing a redb transaction failed.
    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    /// A record could not be encoded as JSON.
    #[error("failed to encode record: {0}")]
    Serialize(String),

    /// A stored row is not valid JSON for its record type.
    #[error("corrupt record: {0}")]
    Deserialize(String),

    /// A record identity cannot be turned into a table key.
    #[error("invalid record key: {0}")]
    InvalidKey(String),

    /// An update targeted a record that does not exist.
    #[error("{0} not found")]
    NotFound(String),
}
