use std::io;
use thiserror::Error;

/// Failures while building the invocation context. All of them happen before
/// anything is written to stdout.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid CONTENT_LENGTH {0:?}")]
    InvalidContentLength(String),

    #[error("error reading request body: {0}")]
    Read(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response has no Content-Type header")]
    MissingContentType,

    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid value for header {0}")]
    InvalidHeaderValue(String),

    #[error("header {0} is computed when the response is encoded")]
    ReservedHeader(String),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("error serializing json body: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Response(#[from] ResponseError),
}

#[derive(Debug, Error)]
pub enum OutputError {
    /// Nothing reached the output stream, the server can still answer for us.
    #[error("no response bytes written: {0}")]
    NothingWritten(#[source] io::Error),

    /// Part of the response is already out and cannot be taken back.
    #[error("response truncated after {written} bytes: {source}")]
    Truncated {
        written: usize,
        #[source]
        source: io::Error,
    },
}
