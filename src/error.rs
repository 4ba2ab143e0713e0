use reqwest::{header::HeaderMap, StatusCode};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the protocol core.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A URL supplied or received is not absolute HTTPS (or permitted HTTP in
    /// test mode).
    #[error("invalid URL: {0:?}")]
    InvalidUrl(String),

    /// The private key algorithm or curve is not recognized.
    #[error("unsupported private key: {0}")]
    UnsupportedKey(String),

    /// The nonce pool could not produce a replay nonce.
    #[error("unable to obtain a replay nonce")]
    NonceExhausted,

    /// The server answered with an error status.
    #[error("HTTP error: {status}")]
    HttpStatus {
        status: StatusCode,
        headers: Box<HeaderMap>,
        /// Raw `application/problem+json` body, when the server sent one.
        problem_body: Option<String>,
    },

    /// The response status is outside the set the operation accepts.
    #[error("unexpected status code: {0}")]
    UnexpectedStatus(StatusCode),

    /// The response media type does not match what the operation demanded.
    #[error("unexpected content type: {0:?}")]
    UnexpectedContentType(String),

    /// JSON decoding or structural validation failed.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The server requires agreement with terms of service the caller has not
    /// pre-accepted. Add the URI to the accepted set and retry to resolve.
    #[error("registration requires agreement with {uri:?}")]
    Agreement { uri: String },

    /// The operation's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// Producing the JWS signature failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// A responder could not be created or started.
    #[error("responder error: {0}")]
    Responder(String),

    /// The underlying HTTP transport failed.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}
