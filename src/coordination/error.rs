use thiserror::Error;

/// Failure reported by a coordination service operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinationError {
    /// The addressed node (or the parent of a node being created) does not exist.
    #[error("coordination: no node at {0}")]
    NoNode(String),
    /// A node already exists at the path being created.
    #[error("coordination: node already exists at {0}")]
    NodeExists(String),
    /// A node with children cannot be deleted.
    #[error("coordination: node at {0} has children")]
    NotEmpty(String),
    /// The session backing this client has ended; its ephemeral nodes are gone.
    #[error("coordination: session expired")]
    SessionExpired,
    /// The connection dropped before the outcome of an operation was known.
    #[error("coordination: connection lost")]
    ConnectionLoss,
    /// The path is not absolute, has an empty segment, or ends with `/`.
    #[error("coordination: invalid path {0:?}")]
    InvalidPath(String),
}

impl CoordinationError {
    /// Whether the session behind the client is gone for good.
    ///
    /// A lock handle that sees one of these cannot keep its queue position:
    /// the service has already removed its candidate node.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, CoordinationError::SessionExpired)
    }
}
