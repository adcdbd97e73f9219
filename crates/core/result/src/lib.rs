#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;

use std::fmt;

/// Result type with custom Error
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Error information
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    /// Type of error and additional information
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub error_type: ErrorType,

    /// Where this error occurred
    pub location: String,
}

/// Possible error types
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorType {
    // ? Subscriber related errors
    MissingAppUserId,
    InvalidSubscriberAttributes {
        errors: Vec<AttributeError>,
    },

    // ? Backend related errors
    NetworkError {
        message: String,
    },
    BackendError {
        status: u16,
        code: Option<i64>,
        message: Option<String>,
    },
    UnexpectedBackendResponse {
        reason: String,
    },

    // ? Queue related errors
    QueueFull {
        max: usize,
    },
    QueueClosed,

    // ? General errors
    InternalError,
}

/// Single rejected attribute as reported by the backend
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeError {
    pub key_name: String,
    pub message: String,
}

impl Error {
    /// Whether this error came from the backend rejecting the request
    /// rather than from the transport or the caller
    pub fn is_backend_error(&self) -> bool {
        matches!(
            self.error_type,
            ErrorType::BackendError { .. } | ErrorType::InvalidSubscriberAttributes { .. }
        )
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorType::MissingAppUserId => write!(f, "App user id is missing or invalid"),
            ErrorType::InvalidSubscriberAttributes { errors } => {
                write!(f, "Backend rejected {} subscriber attribute(s)", errors.len())
            }
            ErrorType::NetworkError { message } => write!(f, "Network error: {message}"),
            ErrorType::BackendError {
                status,
                code,
                message,
            } => {
                write!(f, "Backend responded with status {status}")?;
                if let Some(code) = code {
                    write!(f, " (code {code})")?;
                }
                if let Some(message) = message {
                    write!(f, ": {message}")?;
                }
                Ok(())
            }
            ErrorType::UnexpectedBackendResponse { reason } => {
                write!(f, "Unexpected backend response: {reason}")
            }
            ErrorType::QueueFull { max } => write!(f, "Operation queue is full ({max} queued)"),
            ErrorType::QueueClosed => write!(f, "Operation queue is no longer running"),
            ErrorType::InternalError => write!(f, "Internal error"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.error_type, self.location)
    }
}

impl std::error::Error for Error {}

#[macro_export]
macro_rules! create_error {
    ( $error: ident $( $tt:tt )? ) => {
        $crate::Error {
            error_type: $crate::ErrorType::$error $( $tt )?,
            location: format!("{}:{}:{}", file!(), line!(), column!()),
        }
    };
}

#[macro_export]
macro_rules! create_network_error {
    ( $message: expr ) => {
        $crate::create_error!(NetworkError {
            message: $message.to_string()
        })
    };
}
