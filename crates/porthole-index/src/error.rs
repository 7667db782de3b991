use std::fmt;

/// Result type for porthole-index operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failures the store can raise.
///
/// Money columns are TEXT holding fixed-point decimals and the kind/level
/// columns hold closed enums, so reading a row can fail in ways a plain
/// SQLite error never would; those get their own variants instead of being
/// flattened into strings.
#[derive(Debug)]
pub enum Error {
    /// Database operation failed
    Database(rusqlite::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// A money column no longer parses as a fixed-point decimal
    CorruptDecimal {
        value: String,
        source: rust_decimal::Error,
    },

    /// An item kind column holds a value outside the known enum
    UnknownKind(String),

    /// A display level column holds a value outside the known enum
    UnknownLevel(String),

    /// An update tried to move a session's ingestion cursor backwards
    CursorRegression { session_id: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Database(err) => write!(f, "Database error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::CorruptDecimal { value, source } => {
                write!(f, "Corrupt decimal column '{}': {}", value, source)
            }
            Error::UnknownKind(value) => write!(f, "Unknown item kind '{}'", value),
            Error::UnknownLevel(value) => write!(f, "Unknown display level '{}'", value),
            Error::CursorRegression { session_id } => write!(
                f,
                "Refusing to move ingestion cursor backwards for session {}",
                session_id
            ),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::CorruptDecimal { source, .. } => Some(source),
            Error::UnknownKind(_) | Error::UnknownLevel(_) | Error::CursorRegression { .. } => {
                None
            }
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
