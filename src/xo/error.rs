use crate::error::ErrorKind;
use reqwest::StatusCode;
use std::error::Error as StdError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XoError {
    #[error("Connection to Xen Orchestra failed: {0}")]
    Connection(String),

    #[error("Request to Xen Orchestra timed out: {0}")]
    Timeout(String),

    #[error("Authentication rejected: {0} - {1}")]
    Auth(StatusCode, String),

    #[error("Resource not found: {0} - {1}")]
    NotFound(StatusCode, String),

    #[error("API request failed: {0} - {1}")]
    Api(StatusCode, String),

    #[error("Malformed response body: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl XoError {
    /// Classifies a non-success HTTP response.
    pub fn from_status(status: StatusCode, text: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => XoError::Auth(status, text),
            StatusCode::NOT_FOUND => XoError::NotFound(status, text),
            _ => XoError::Api(status, text),
        }
    }

    /// Classifies a transport-level failure raised by reqwest.
    pub fn from_transport(err: reqwest::Error) -> Self {
        let message = source_chain(&err);
        if err.is_timeout() {
            XoError::Timeout(message)
        } else if err.is_decode() {
            XoError::Malformed(message)
        } else {
            XoError::Connection(message)
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            XoError::Connection(_) => ErrorKind::ConnectionFailure,
            XoError::Timeout(_) => ErrorKind::TimeoutFailure,
            XoError::Auth(..) => ErrorKind::AuthFailure,
            XoError::NotFound(..) => ErrorKind::NotFoundFailure,
            XoError::Api(..) | XoError::Malformed(_) | XoError::Json(_) | XoError::Url(_) => {
                ErrorKind::UpstreamFailure
            }
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            XoError::Auth(s, _) | XoError::NotFound(s, _) | XoError::Api(s, _) => Some(*s),
            _ => None,
        }
    }
}

// reqwest's Display hides the underlying cause (DNS, refused, TLS), so walk the chain.
fn source_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

pub type Result<T> = std::result::Result<T, XoError>;
