use crate::xo::error::XoError;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Error kinds reported back to the protocol host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidArgument,
    UnknownTool,
    AuthFailure,
    NotFoundFailure,
    UpstreamFailure,
    ConnectionFailure,
    TimeoutFailure,
    ProtocolError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::UnknownTool => "UnknownTool",
            ErrorKind::AuthFailure => "AuthFailure",
            ErrorKind::NotFoundFailure => "NotFoundFailure",
            ErrorKind::UpstreamFailure => "UpstreamFailure",
            ErrorKind::ConnectionFailure => "ConnectionFailure",
            ErrorKind::TimeoutFailure => "TimeoutFailure",
            ErrorKind::ProtocolError => "ProtocolError",
        };
        f.write_str(name)
    }
}

/// Failure of a single tool invocation.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error(transparent)]
    Upstream(#[from] XoError),

    /// An upstream call failed after earlier calls of the same tool had
    /// already changed upstream state.
    #[error("{source} (already applied: {})", .applied.join(", "))]
    PartiallyApplied { source: XoError, applied: Vec<String> },
}

impl ToolError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolError::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            ToolError::UnknownTool(_) => ErrorKind::UnknownTool,
            ToolError::Upstream(e) | ToolError::PartiallyApplied { source: e, .. } => e.kind(),
        }
    }

    /// Upstream HTTP status, when the failure came from an HTTP response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ToolError::Upstream(e) | ToolError::PartiallyApplied { source: e, .. } => {
                e.status().map(|s| s.as_u16())
            }
            _ => None,
        }
    }

    pub fn to_payload(&self) -> Value {
        let mut error = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Some(status) = self.status() {
            error["status"] = json!(status);
        }
        match self {
            ToolError::InvalidArgument { field, .. } => error["field"] = json!(field),
            ToolError::PartiallyApplied { applied, .. } => error["applied"] = json!(applied),
            _ => {}
        }
        json!({ "error": error })
    }
}
