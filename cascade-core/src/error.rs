//! Error Types
//!
//! Every fallible operation in the crate returns [`Result`]. Errors raised by
//! user callbacks (observers and algorithm updates) travel back to whoever
//! called `set` or `unblock`, interrupting the rest of that notification pass.

use thiserror::Error;

/// Errors produced by cells, links and algorithms.
#[derive(Debug, Error)]
pub enum Error {
    /// A variable was asked to track itself.
    #[error("a variable cannot track itself")]
    SelfTracking,

    /// A variable was asked to link with itself.
    #[error("a variable cannot be linked to itself")]
    SelfLink,

    /// An algorithm was asked for a port it does not declare.
    #[error("algorithm `{algorithm}` has no port named `{name}`")]
    UnknownPort { algorithm: String, name: String },

    /// A port exists but holds a different value type.
    #[error("port `{name}` of algorithm `{algorithm}` does not hold a `{expected}`")]
    PortType {
        algorithm: String,
        name: String,
        expected: &'static str,
    },

    /// Two ports of one algorithm were declared with the same name.
    #[error("algorithm `{algorithm}` declares port `{name}` twice")]
    DuplicatePort { algorithm: String, name: String },

    /// An error returned by a user observer or update function.
    #[error("callback failed: {0}")]
    Callback(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap a user error so it can be returned from a callback.
    pub fn callback<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Callback(error.into())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
