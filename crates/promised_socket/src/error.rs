//! Error types for the socket middleware

/// Errors surfaced by the acknowledgment protocol.
#[derive(Debug, thiserror::Error)]
pub enum AckError {
    /// The acknowledgment for this invocation was already delivered.
    ///
    /// Each invocation settles its callback at most once; later attempts
    /// (a second handler on the same event, or a handler racing the
    /// bridge) land here instead of reaching the transport twice.
    #[error("acknowledgment already settled")]
    AlreadySettled,
}

/// Errors that can occur while applying a middleware chain.
#[derive(Debug, thiserror::Error)]
pub enum MiddlewareError {
    /// A stage returned without advancing its continuation token.
    #[error("middleware stage '{0}' returned without advancing the chain")]
    Stalled(String),

    /// A stage failed to install itself on the socket.
    #[error("middleware stage '{stage}' failed to install: {reason}")]
    InstallFailed {
        /// Name of the failing stage
        stage: String,
        /// Failure description
        reason: String,
    },
}
