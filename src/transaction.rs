//! A write transaction: stage `set`/`del` calls against a snapshot, then
//! `commit` them atomically or `rollback` to discard them.

use log::debug;

use crate::btree;
use crate::concurrency::WriterPermit;
use crate::error::DbError;
use crate::pager::WriteTxn as PagerTxn;
use crate::types::DbResult;

/// Bundles the concurrency controller's writer permit with the pager's own
/// write-transaction handle, so dropping either half alone can't happen.
pub struct Transaction<'db> {
    permit: Option<WriterPermit<'db>>,
    inner: Option<PagerTxn<'db>>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(permit: WriterPermit<'db>, inner: PagerTxn<'db>) -> Transaction<'db> {
        Transaction {
            permit: Some(permit),
            inner: Some(inner),
        }
    }

    fn inner_mut(&mut self) -> DbResult<&mut PagerTxn<'db>> {
        self.inner.as_mut().ok_or(DbError::TxClosed)
    }

    pub fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        let inner = self.inner.as_ref().ok_or(DbError::TxClosed)?;
        btree::get(inner, inner.root(), key)
    }

    pub fn set(&mut self, key: &[u8], val: &[u8]) -> DbResult<()> {
        btree::insert(self.inner_mut()?, key, val)
    }

    pub fn del(&mut self, key: &[u8]) -> DbResult<bool> {
        btree::delete(self.inner_mut()?, key)
    }

    pub fn commit(mut self) -> DbResult<()> {
        let inner = self.inner.take().ok_or(DbError::TxClosed)?;
        let result = inner.commit();
        debug!("transaction: committed ({:?})", result.is_ok());
        self.permit.take();
        result
    }

    pub fn rollback(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.rollback();
        }
        self.permit.take();
    }

    /// Run `f`, committing on success and rolling back if it returns an
    /// error.
    pub fn run<F, T>(mut self, f: F) -> DbResult<T>
    where
        F: FnOnce(&mut Transaction<'db>) -> DbResult<T>,
    {
        match f(&mut self) {
            Ok(v) => {
                self.commit()?;
                Ok(v)
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }
}
