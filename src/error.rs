//! Typed error kinds for the parts of the system that are expected to fail
//! in ways an operator needs to tell apart.

use thiserror::Error;

/// Everything that can go wrong while loading the channel configuration
/// file. The loader surfaces which rule was violated, and on which line,
/// rather than a single opaque "bad config" error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: expected `<keyword> <name> <port> <capacity>`, found {text:?}")]
    Malformed {
        path: String,
        line: usize,
        text: String,
    },

    #[error("{path}:{line}: channel name {name:?} starts with a digit")]
    NameStartsWithDigit {
        path: String,
        line: usize,
        name: String,
    },

    #[error("{path}:{line}: capacity must be at least 5, got {capacity}")]
    CapacityTooSmall {
        path: String,
        line: usize,
        capacity: i64,
    },

    #[error("{path}:{line}: port must be positive, got 0")]
    PortNotPositive { path: String, line: usize },

    #[error("duplicate channel name {name:?}")]
    DuplicateName { name: String },

    #[error("duplicate port {port}")]
    DuplicatePort { port: u16 },

    #[error("at least 3 channels are required, found {found}")]
    TooFewChannels { found: usize },
}
