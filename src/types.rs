use crate::error::DbError;

/// Result alias used throughout the crate, mirroring the `SimpleResult`
/// convention this codebase already used for its error type.
pub type DbResult<T> = Result<T, DbError>;

/// A 64-bit page identifier. Id 0 is reserved for the meta page.
pub type PageId = u64;

/// Callback passed to `scan`; returning `false` stops the scan early.
pub type ScanFn<'a> = dyn FnMut(&[u8], &[u8]) -> bool + 'a;
