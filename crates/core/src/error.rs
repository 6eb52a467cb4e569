use std::path::PathBuf;

/// Result alias that carries the custom [`LuxError`] type.
pub type Result<T> = std::result::Result<T, LuxError>;

/// Common error type for the core crate.
///
/// Interpretation errors abort the current script evaluation only; the show
/// keeps rendering whatever state the World reached. Fatal errors are raised
/// while building the rig or opening the cue directory and stop startup.
#[derive(Debug, thiserror::Error)]
pub enum LuxError {
    /// A statement targeted a parameter the fixture does not own.
    #[error("parameter `{parameter}` is not valid for fixture {fixture}")]
    InvalidParameter { fixture: u32, parameter: String },

    /// A tuple's keys did not line up with the group's declared children.
    #[error("tuple for `{parameter}` expected {expected} but found {found}")]
    TupleArityMismatch {
        parameter: String,
        expected: String,
        found: String,
    },

    /// Named and positional keys were mixed inside one tuple.
    #[error("do not mix anonymous tuple keys with named keys")]
    MixedTupleKind,

    #[error("cannot convert color from {from} to {to}")]
    UnsupportedColorConversion { from: String, to: String },

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("undefined variable `{0}`")]
    UndefinedVariable(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid value for `{parameter}`: {reason}")]
    InvalidValue { parameter: String, reason: String },

    /// Raised by the script front end.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid fixture definition: {0}")]
    InvalidFixture(String),

    #[error("cue directory `{}` does not exist", .0.display())]
    MissingCueDirectory(PathBuf),

    #[error("show commands nested deeper than {0} levels")]
    CommandDepth(usize),

    #[error("{0}")]
    Message(String),

    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl LuxError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invalid_fixture(msg: impl Into<String>) -> Self {
        Self::InvalidFixture(msg.into())
    }

    /// Errors that leave no valid World to render and must stop startup.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidFixture(_) | Self::MissingCueDirectory(_)
        )
    }
}

impl From<&str> for LuxError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for LuxError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_item() {
        let err = LuxError::InvalidParameter {
            fixture: 4,
            parameter: "pan".to_string(),
        };
        assert_eq!(err.to_string(), "parameter `pan` is not valid for fixture 4");

        let err = LuxError::UndefinedVariable("A".to_string());
        assert!(err.to_string().contains("`A`"));
    }

    #[test]
    fn only_startup_errors_are_fatal() {
        assert!(LuxError::invalid_fixture("dup").is_fatal());
        assert!(LuxError::MissingCueDirectory(PathBuf::from("cues")).is_fatal());
        assert!(!LuxError::MixedTupleKind.is_fatal());
        assert!(!LuxError::from("boom").is_fatal());
    }
}
