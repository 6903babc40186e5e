//! Error type for the crate's fallible public surface.
//!
//! Most of the pipeline recovers locally (backoff, unresolved columns, silent
//! re-entrancy drops); only the session lifecycle reports errors outward.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OverlayError {
    /// `initialize` was called on an already initialized session.
    #[error("session already initialized")]
    AlreadyInitialized,

    /// The host URL does not belong to the managed application.
    #[error("not on a managed application page: {0}")]
    OutsideManagedContext(String),

    /// The page never presented the table and date-range anchors.
    #[error("page did not become ready within {0:?}")]
    PageNotReady(std::time::Duration),

    /// An operation that needs a live session was called before `initialize`.
    #[error("session not initialized")]
    NotInitialized,

    /// Configuration could not be loaded or persisted.
    #[error("configuration error: {0}")]
    Config(#[from] anyhow::Error),
}
