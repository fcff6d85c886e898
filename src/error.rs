use std::error::Error as StdError;
use std::fmt;
use std::result::Result as StdResult;

pub type BridgeResult<T> = StdResult<T, BridgeError>;

/// An error originating from bridge usage, as opposed to an exception thrown by script code.
#[derive(Debug)]
pub enum BridgeError {
    /// A forward call needed a context, but none was passed, entered, or active.
    NoContext,
    /// A value crossing the boundary was not of the type the operation requires.
    WrongType {
        /// Name of the engine type that was expected.
        expected: &'static str,
    },
    /// A byte buffer handed across the boundary was not valid UTF-8.
    InvalidUtf8,
    /// The configuration document could not be parsed.
    Config(serde_json::Error),
    /// The engine or the platform adapter was already initialized.
    AlreadyInitialized,
    /// An operation needed the engine to be initialized first.
    NotInitialized,
    /// A timeout was requested for a script run nested inside a callback.
    InvalidTimeout,
    /// An internal field index past the object's field count.
    FieldOutOfRange { index: i32, count: usize },
    /// A custom error raised outside the engine.
    External(anyhow::Error),
}

impl BridgeError {
    pub(crate) fn wrong_type(expected: &'static str) -> BridgeError {
        BridgeError::WrongType { expected }
    }

    /// Raises the error as a JavaScript exception in the current scope.
    ///
    /// Type mismatches become `TypeError`s and bad field indices `RangeError`s. Anything else is
    /// a plain `Error`.
    pub(crate) fn throw(&self, scope: &mut v8::HandleScope) {
        let message = match v8::String::new(scope, &self.to_string()) {
            Some(message) => message,
            None => v8::String::empty(scope),
        };
        let exception = match self {
            BridgeError::WrongType { .. } | BridgeError::InvalidUtf8 => {
                v8::Exception::type_error(scope, message)
            }
            BridgeError::FieldOutOfRange { .. } => v8::Exception::range_error(scope, message),
            _ => v8::Exception::error(scope, message),
        };
        scope.throw_exception(exception);
    }
}

impl StdError for BridgeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            BridgeError::Config(err) => Some(err),
            BridgeError::External(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BridgeError::NoContext => write!(fmt, "no context is entered"),
            BridgeError::WrongType { expected } => write!(fmt, "value is not a {}", expected),
            BridgeError::InvalidUtf8 => write!(fmt, "buffer is not valid UTF-8"),
            BridgeError::Config(err) => write!(fmt, "invalid configuration: {}", err),
            BridgeError::AlreadyInitialized => write!(fmt, "already initialized"),
            BridgeError::NotInitialized => write!(fmt, "engine is not initialized"),
            BridgeError::InvalidTimeout => write!(fmt, "invalid request for evaluation timeout"),
            BridgeError::FieldOutOfRange { index, count } => {
                write!(fmt, "internal field {} out of range ({} fields)", index, count)
            }
            BridgeError::External(ref err) => err.fmt(fmt),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Config(err)
    }
}

impl From<anyhow::Error> for BridgeError {
    fn from(err: anyhow::Error) -> Self {
        BridgeError::External(err)
    }
}
