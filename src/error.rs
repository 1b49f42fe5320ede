use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while configuring or starting the asset engine and server.
///
/// Per-request failures never show up here: a request that cannot be served
/// becomes an HTTP response (404, 416, 500) or an aborted body stream.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be loaded or deserialized
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// The served root does not exist or cannot be canonicalized
    #[error("invalid served root {}: {source}", path.display())]
    InvalidRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Walking the served root failed while building the index
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// A caller-supplied ignore pattern is not a valid regular expression
    #[error("invalid ignore pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The listen address could not be parsed
    #[error("invalid listen address: {0}")]
    InvalidAddress(String),

    /// Binding or serving connections failed
    #[error("server error: {0}")]
    Hyper(#[from] hyper::Error),

    /// Wrapper for standard I/O errors
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Type alias for Results using [`Error`] as the error type
pub type Result<T> = std::result::Result<T, Error>;
