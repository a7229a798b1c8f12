//! The public database handle: owns the pager and the concurrency
//! controller together, per-instance rather than in a process-wide
//! registry (see the design doc's redesign notes).

use std::path::Path;

use log::info;

use crate::btree;
use crate::concurrency::ConcurrencyController;
use crate::iter::Iter;
use crate::options::Options;
use crate::pager::Pager;
use crate::transaction::Transaction;
use crate::types::{DbResult, PageId, ScanFn};

pub struct Database {
    pager: Pager,
    cc: ConcurrencyController,
}

impl Database {
    pub fn open<O: Into<Options>>(opts: O) -> DbResult<Database> {
        let opts = opts.into();
        let pager = Pager::open(&opts.path, opts.create_if_missing, opts.cache_capacity)?;
        info!("database: opened {}", opts.path.display());
        Ok(Database {
            pager,
            cc: ConcurrencyController::new(),
        })
    }

    pub fn open_path(path: &Path) -> DbResult<Database> {
        Database::open(Options::new(path))
    }

    pub fn close(self) {}

    pub fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        let (root, _) = self.pager.snapshot();
        btree::get(&self.pager, root, key)
    }

    pub fn set(&self, key: &[u8], val: &[u8]) -> DbResult<()> {
        let mut txn = self.begin_write()?;
        txn.set(key, val)?;
        txn.commit()
    }

    pub fn del(&self, key: &[u8]) -> DbResult<bool> {
        let mut txn = self.begin_write()?;
        let existed = txn.del(key)?;
        txn.commit()?;
        Ok(existed)
    }

    pub fn scan(&self, lo: &[u8], hi: Option<&[u8]>, callback: &mut ScanFn<'_>) -> DbResult<()> {
        let (root, _) = self.pager.snapshot();
        scan_from(&self.pager, root, lo, hi, callback)
    }

    /// Begin a write transaction; alias for [`Database::begin_write`] that
    /// matches the abstract interface's naming.
    pub fn begin(&self) -> DbResult<Transaction<'_>> {
        self.begin_write()
    }

    pub fn begin_write(&self) -> DbResult<Transaction<'_>> {
        let permit = self.cc.begin_write();
        let oldest = self.cc.oldest_active_reader_seq();
        let inner = self.pager.begin_write(oldest)?;
        Ok(Transaction::new(permit, inner))
    }

    pub fn begin_read(&self) -> Reader<'_> {
        let (root, seq) = self.pager.snapshot();
        let guard = self.cc.begin_read(seq);
        Reader { db: self, root, guard }
    }
}

fn scan_from<S: btree::NodeSource>(src: &S, root: PageId, lo: &[u8], hi: Option<&[u8]>, callback: &mut ScanFn<'_>) -> DbResult<()> {
    let mut it = Iter::new(src);
    if !it.seek_ge(root, lo, hi)? {
        return Ok(());
    }
    while it.valid() {
        if !callback(it.key(), it.val()) {
            break;
        }
        it.next()?;
    }
    Ok(())
}

/// A pinned, read-only snapshot of the database as of the moment it began.
/// Concurrent writer commits are invisible to it until it ends and a fresh
/// reader begins.
pub struct Reader<'db> {
    db: &'db Database,
    root: PageId,
    guard: crate::concurrency::ReaderGuard<'db>,
}

impl<'db> Reader<'db> {
    pub fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        btree::get(&self.db.pager, self.root, key)
    }

    pub fn scan(&self, lo: &[u8], hi: Option<&[u8]>, callback: &mut ScanFn<'_>) -> DbResult<()> {
        scan_from(&self.db.pager, self.root, lo, hi, callback)
    }

    pub fn seq(&self) -> u64 {
        self.guard.seq()
    }

    pub fn end(self) {}
}
