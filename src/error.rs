//! Error types for Cartographer operations.

use thiserror::Error;

/// Main error type for Cartographer operations
#[derive(Error, Debug)]
pub enum CartographerError {
    /// Malformed command name, path or argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Root command is not an executable, produced no help, or the path was never added
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// Lookup of a path that is not in the definition store
    #[error("not found: {0}")]
    NotFound(String),

    /// A single process invocation exceeded its timeout
    #[error("'{0}' timed out after {1}ms")]
    TimedOut(String, u128),

    /// Process ran and exited non-zero
    #[error("'{0}' exited with code {1}: {2}")]
    CommandFailed(String, i32, String),

    /// Strict mode rejected a flag the command never advertised
    #[error("unknown option for '{0}': {1}")]
    UnknownOption(String, String),

    /// The process could not be started or its output could not be read
    #[error("failed to execute '{0}': {1}")]
    Spawn(String, String),

    /// Invalid configuration value
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl CartographerError {
    /// True for errors caused by the caller's input rather than by the service.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            CartographerError::InvalidArgument(_)
                | CartographerError::CommandNotFound(_)
                | CartographerError::NotFound(_)
                | CartographerError::UnknownOption(_, _)
        )
    }
}

/// Result type alias for Cartographer operations
pub type Result<T> = std::result::Result<T, CartographerError>;
