//! Errors for every fallible operation of the crate.
//!
//! Nothing inside a traversal can fail: by the time rules and traversers run, all input has been
//! validated. Errors therefore describe rejected input, calls made in the wrong state, and the
//! loading/persistence boundary.

use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// A parameter value or name was rejected before any computation was attempted.
    InvalidParameter(String),
    DimensionMismatch {
        expected: usize,
        found: usize,
    },
    NotTrained,
    InvalidState(String),
    Parse {
        line: usize,
        message: String,
    },
    ShapeMismatch(String),
    Io(std::io::Error),
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        return Error::InvalidParameter(message.into());
    }

    /// True for input that was rejected before any tree was built or traversed.
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Error::InvalidParameter(_) | Error::DimensionMismatch { .. } => true,
            _ => false,
        }
    }
}

impl fmt::Display for Error {

    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidParameter(message) => write!(f, "invalid parameter: {}", message),
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimensionality mismatch: expected {} dimensions, found {}", expected, found)
            },
            Error::NotTrained => write!(f, "model has not been trained"),
            Error::InvalidState(message) => write!(f, "invalid state: {}", message),
            Error::Parse { line, message } => write!(f, "parse error on line {}: {}", line, message),
            Error::ShapeMismatch(message) => write!(f, "shape mismatch: {}", message),
            Error::Io(e) => write!(f, "io error: {}", e),
            Error::Serialization(message) => write!(f, "serialization error: {}", message),
        }
    }
}

impl std::error::Error for Error {

    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl std::convert::From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::Io(e)
    }
}

impl std::convert::From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Error {
        Error::Serialization(e.to_string())
    }
}

impl std::convert::From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Error {
        Error::Serialization(e.to_string())
    }
}
