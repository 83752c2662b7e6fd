use std::fmt;

/// Errors surfaced by the client API.
///
/// Broker operations themselves are infallible: malformed input is rejected
/// at the HTTP surface and backpressure is handled by dropping, so only the
/// request/response client returns errors to application code.
#[derive(Debug)]
pub enum PulseError {
    /// The bus URL could not be parsed or has an unsupported scheme.
    InvalidUrl(String),
    /// The HTTP request could not be sent or the response not read.
    Request(hyper::Error),
    /// The server answered with a status the operation does not accept.
    UnexpectedStatus(u16),
    /// The response body did not match the expected shape.
    UnexpectedResponse(String),
    /// A message body could not be decoded as JSON.
    Decode(serde_json::Error),
}

impl std::error::Error for PulseError {}

impl fmt::Display for PulseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PulseError::InvalidUrl(url) => write!(f, "invalid bus url: {url}"),
            PulseError::Request(e) => write!(f, "request failed: {e}"),
            PulseError::UnexpectedStatus(code) => {
                write!(f, "unexpected non-200 response: {code}")
            }
            PulseError::UnexpectedResponse(body) => {
                write!(f, "unexpected non-matching response: {body}")
            }
            PulseError::Decode(e) => write!(f, "error decoding message: {e}"),
        }
    }
}

impl From<hyper::Error> for PulseError {
    fn from(e: hyper::Error) -> Self {
        PulseError::Request(e)
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(e: serde_json::Error) -> Self {
        PulseError::Decode(e)
    }
}
