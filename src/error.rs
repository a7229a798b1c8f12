use std::{error, fmt, io};

/// The error type shared by every fallible operation in the engine.
///
/// Kept as a hand-rolled enum (rather than a `thiserror` derive) to match
/// this codebase's existing error style; see [`crate::types::DbResult`].
#[derive(Debug)]
pub enum DbError {
    /// `set`'s key exceeded [`crate::consts::BTREE_MAX_KEY_SIZE`].
    KeyTooLarge,
    /// `set`'s value exceeded [`crate::consts::BTREE_MAX_VAL_SIZE`].
    ValueTooLarge,
    /// The transaction was already committed or rolled back.
    TxClosed,
    /// A file read, write, or fsync failed or returned a short count.
    Io(io::Error),
    /// A page read back from disk violates a structural invariant (bad
    /// signature, impossible `nkeys`, etc). Constructed only at sites that
    /// immediately panic; never returned to a caller (see design doc §7).
    Corrupt(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DbError::KeyTooLarge => write!(f, "key exceeds maximum size"),
            DbError::ValueTooLarge => write!(f, "value exceeds maximum size"),
            DbError::TxClosed => write!(f, "transaction is already closed"),
            DbError::Io(e) => write!(f, "io error: {}", e),
            DbError::Corrupt(msg) => write!(f, "structural corruption: {}", msg),
        }
    }
}

impl error::Error for DbError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            DbError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DbError {
    fn from(e: io::Error) -> Self {
        DbError::Io(e)
    }
}
