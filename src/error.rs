//! Error types for the audiencegate sidecar.

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::{Response, StatusCode};
use thiserror::Error;

/// Boxed error type used at the body/transport boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while proxying and filtering a request.
#[derive(Error, Debug)]
pub enum GateError {
    /// HTTP protocol error
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// I/O error during connection or streaming
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid URI or target
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Connection error to upstream
    #[error("Connection error: {0}")]
    Connection(String),

    /// Request body exceeded the buffering limit
    #[error("Payload too large: limit is {0} bytes")]
    PayloadTooLarge(usize),

    /// Client-side error while buffering or streaming a body
    #[error("Client error: {0}")]
    Client(String),

    /// The downstream sink rejected a write
    #[error("Sink error: {0}")]
    Sink(String),
}

/// Result type alias for gate operations.
pub type GateResult<T> = Result<T, GateError>;

impl GateError {
    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateError::InvalidUri(_) => StatusCode::BAD_REQUEST,
            GateError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GateError::Connection(_) => StatusCode::BAD_GATEWAY,
            GateError::Http(_) | GateError::Io(_) | GateError::Client(_) | GateError::Sink(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Convert this error into a plain-text HTTP response.
    ///
    /// Used at the connection layer so a failed request still produces a
    /// well-formed response instead of tearing the connection down.
    pub fn to_response(&self) -> Response<BoxBody<Bytes, BoxError>> {
        let body = Full::new(Bytes::from(self.to_string()))
            .map_err(|never| match never {})
            .boxed();
        Response::builder()
            .status(self.status_code())
            .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .expect("static response construction cannot fail")
    }
}
