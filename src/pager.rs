//! The pager: maps page ids to fixed-size buffers backed by a single file.
//!
//! Two maps sit in front of the file: `cache`, a read-through cache of
//! durable pages shared by the writer and every active reader, and
//! `updates`, the current write transaction's staging area. Only the
//! writer ever sees `updates`; readers and the writer's own committed
//! reads fall through to `cache` then the file.

use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock};

use log::{debug, error};

use crate::consts::{META_PAGE_SIZE, PAGE_SIZE};
use crate::error::DbError;
use crate::free_list::{self, FreeCursors, ListPageIo};
use crate::meta::Meta;
use crate::node::BNode;
use crate::types::{DbResult, PageId};
use crate::util::HandyRwLock;

/// The read-through cache of durable pages. `capacity` is a soft cap:
/// once exceeded, the oldest-inserted page not otherwise pinned is evicted.
struct PageCache {
    map: HashMap<PageId, Vec<u8>>,
    order: VecDeque<PageId>,
    capacity: Option<usize>,
}

impl PageCache {
    fn new(capacity: Option<usize>) -> PageCache {
        PageCache {
            map: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, pid: PageId) -> Option<Vec<u8>> {
        self.map.get(&pid).cloned()
    }

    fn insert(&mut self, pid: PageId, buf: Vec<u8>) {
        if !self.map.contains_key(&pid) {
            self.order.push_back(pid);
        }
        self.map.insert(pid, buf);
        if let Some(cap) = self.capacity {
            while self.map.len() > cap {
                match self.order.pop_front() {
                    Some(old) => {
                        self.map.remove(&old);
                    }
                    None => break,
                }
            }
        }
    }
}

fn read_raw(file: &File, cache: &RwLock<PageCache>, pid: PageId) -> DbResult<Vec<u8>> {
    if let Some(buf) = cache.rl().get(pid) {
        return Ok(buf);
    }
    debug!("pager: page {} not cached, reading from file", pid);
    let mut buf = vec![0u8; PAGE_SIZE];
    file.read_exact_at(&mut buf, pid * PAGE_SIZE as u64).map_err(|e| {
        error!("pager: short read at page {}: {}", pid, e);
        DbError::Io(e)
    })?;
    cache.wl().insert(pid, buf.clone());
    Ok(buf)
}

struct WriterState {
    /// The meta page as last durably committed.
    stable_meta: Meta,
    /// Free-list cursors, live across transactions; `free_stable` is the
    /// pre-transaction snapshot used to revert an aborted write.
    free: FreeCursors,
    free_stable: FreeCursors,
    /// Pages staged by the in-flight write transaction, keyed by page id.
    updates: HashMap<PageId, Vec<u8>>,
    /// Pages appended (not reused) by the in-flight transaction.
    n_append: u64,
    /// Set after a commit failed partway through; the next commit first
    /// rewrites the stable meta from `stable_meta` before staging anything
    /// new, per the recovery ordering in the design doc.
    failed: bool,
}

pub struct Pager {
    file: File,
    cache: RwLock<PageCache>,
    writer: Mutex<WriterState>,
}

impl Pager {
    pub fn open(path: &Path, create_if_missing: bool, cache_capacity: Option<usize>) -> DbResult<Pager> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create_if_missing)
            .open(path)?;

        let len = file.metadata()?.len();
        let stable_meta = if len == 0 {
            let meta = Meta::fresh();
            file.write_at(&meta.to_bytes(), 0).map_err(DbError::Io)?;
            // page 1: the initial free-list page, zeroed.
            file.write_at(&[0u8; PAGE_SIZE], PAGE_SIZE as u64).map_err(DbError::Io)?;
            file.sync_all()?;
            meta
        } else {
            let mut buf = vec![0u8; META_PAGE_SIZE.max(64)];
            file.read_exact_at(&mut buf, 0)?;
            match Meta::from_bytes(&buf)? {
                Some(meta) => meta,
                None => {
                    return Err(DbError::Corrupt(
                        "data file is non-empty but its meta page signature is unrecognized".into(),
                    ))
                }
            }
        };

        let free = FreeCursors {
            head_page: stable_meta.free_head_page,
            head_seq: stable_meta.free_head_seq,
            tail_page: stable_meta.free_tail_page,
            tail_seq: stable_meta.free_tail_seq,
            // Nothing is in doubt across a restart: every page the stable
            // meta remembers as freed is free to reuse immediately.
            max_seq: stable_meta.free_tail_seq,
        };

        Ok(Pager {
            file,
            cache: RwLock::new(PageCache::new(cache_capacity)),
            writer: Mutex::new(WriterState {
                stable_meta,
                free,
                free_stable: free,
                updates: HashMap::new(),
                n_append: 0,
                failed: false,
            }),
        })
    }

    /// Read a durable (committed) page. Used by read-only scans and as the
    /// fallback for a write transaction's own reads.
    pub fn read_committed(&self, pid: PageId) -> DbResult<BNode> {
        read_raw(&self.file, &self.cache, pid).map(BNode::from_bytes)
    }

    /// Capture the current root and tail sequence number together, under
    /// one lock, so a reader's pinned snapshot is internally consistent.
    pub fn snapshot(&self) -> (PageId, u64) {
        let w = self.writer.lock().unwrap();
        (w.stable_meta.root, w.free.tail_seq)
    }

    pub fn current_tail_seq(&self) -> u64 {
        self.writer.lock().unwrap().free.tail_seq
    }

    pub fn begin_write(&self, oldest_reader_seq: u64) -> DbResult<WriteTxn<'_>> {
        let mut guard = self.writer.lock().unwrap();
        if guard.failed {
            self.rewrite_stable_meta(&guard.stable_meta)?;
            guard.failed = false;
        }
        let working_meta = guard.stable_meta;
        let free_stable = guard.free;
        Ok(WriteTxn {
            pager: self,
            guard,
            working_meta,
            free_stable,
            oldest_reader_seq,
        })
    }

    fn rewrite_stable_meta(&self, meta: &Meta) -> DbResult<()> {
        self.file.write_at(&meta.to_bytes(), 0).map_err(DbError::Io)?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Borrows the pieces a [`ListPageIo`] implementation needs out of an
/// in-flight write transaction: the durable file/cache for reads that miss
/// the staging map, and the staging map and append counter for writes.
struct TxnIo<'a> {
    file: &'a File,
    cache: &'a RwLock<PageCache>,
    updates: &'a mut HashMap<PageId, Vec<u8>>,
    flushed: u64,
    n_append: &'a mut u64,
}

impl<'a> TxnIo<'a> {
    fn page(&self, pid: PageId) -> Vec<u8> {
        if let Some(buf) = self.updates.get(&pid) {
            return buf.clone();
        }
        read_raw(self.file, self.cache, pid).expect("free-list page read failed")
    }

    fn page_mut(&mut self, pid: PageId) -> &mut Vec<u8> {
        if !self.updates.contains_key(&pid) {
            let buf = read_raw(self.file, self.cache, pid).expect("free-list page read failed");
            self.updates.insert(pid, buf);
        }
        self.updates.get_mut(&pid).unwrap()
    }
}

impl ListPageIo for TxnIo<'_> {
    fn get_next(&mut self, pid: PageId) -> PageId {
        let buf = self.page(pid);
        crate::util::le_u64(&buf[0..8])
    }

    fn get_ptr(&mut self, pid: PageId, idx: usize) -> PageId {
        let buf = self.page(pid);
        let pos = crate::consts::FREE_LIST_HEADER + idx * 8;
        crate::util::le_u64(&buf[pos..pos + 8])
    }

    fn set_next(&mut self, pid: PageId, next: PageId) {
        let buf = self.page_mut(pid);
        crate::util::put_le_u64(&mut buf[0..8], next);
    }

    fn set_ptr(&mut self, pid: PageId, idx: usize, val: PageId) {
        let buf = self.page_mut(pid);
        let pos = crate::consts::FREE_LIST_HEADER + idx * 8;
        crate::util::put_le_u64(&mut buf[pos..pos + 8], val);
    }

    fn new_list_page(&mut self) -> PageId {
        let pid = self.flushed + *self.n_append;
        *self.n_append += 1;
        self.updates.insert(pid, vec![0u8; PAGE_SIZE]);
        pid
    }
}

/// The exclusive write-transaction handle. Callers obtain one via
/// [`Pager::begin_write`], mutate the tree through `read`/`alloc`/`free`,
/// track the new root with `set_root`, and finish with `commit` or
/// `rollback`.
pub struct WriteTxn<'p> {
    pager: &'p Pager,
    guard: MutexGuard<'p, WriterState>,
    working_meta: Meta,
    free_stable: FreeCursors,
    oldest_reader_seq: u64,
}

impl<'p> WriteTxn<'p> {
    pub fn root(&self) -> PageId {
        self.working_meta.root
    }

    pub fn set_root(&mut self, root: PageId) {
        self.working_meta.root = root;
    }

    pub fn read(&self, pid: PageId) -> DbResult<BNode> {
        if let Some(buf) = self.guard.updates.get(&pid) {
            return Ok(BNode::from_bytes(buf.clone()));
        }
        self.pager.read_committed(pid)
    }

    /// Allocate a page for `node`, reusing a free-list id when the MVCC
    /// gate allows it, otherwise appending a brand-new one.
    pub fn alloc(&mut self, node: BNode) -> DbResult<PageId> {
        let gate = self.guard.free.max_seq.min(self.oldest_reader_seq);
        let flushed = self.working_meta.flushed;
        let pid = {
            let WriterState { free, updates, n_append, .. } = &mut *self.guard;
            let mut io = TxnIo {
                file: &self.pager.file,
                cache: &self.pager.cache,
                updates,
                flushed,
                n_append,
            };
            free_list::pop_head_le(free, &mut io, gate)
        };
        let reused = pid != 0;
        let pid = if reused {
            pid
        } else {
            let pid = flushed + self.guard.n_append;
            self.guard.n_append += 1;
            pid
        };
        self.guard.updates.insert(pid, node.into_page().0);
        debug!("pager: alloc page {} ({})", pid, if reused { "reused" } else { "append" });
        Ok(pid)
    }

    /// Push a page id onto the free list's tail; it becomes reusable once
    /// this transaction commits and `max_seq` advances past it.
    pub fn free(&mut self, pid: PageId) {
        let flushed = self.working_meta.flushed;
        let WriterState { free, updates, n_append, .. } = &mut *self.guard;
        let mut io = TxnIo {
            file: &self.pager.file,
            cache: &self.pager.cache,
            updates,
            flushed,
            n_append,
        };
        free_list::push_tail(free, &mut io, pid);
        debug!("pager: freed page {}", pid);
    }

    /// Shadow-paging commit: write staged pages, fsync, rewrite meta,
    /// fsync, then advance `max_seq` so this transaction's freed pages
    /// become eligible for reuse.
    pub fn commit(mut self) -> DbResult<()> {
        if let Err(e) = self.write_staged_pages() {
            self.abort();
            return Err(e);
        }
        if let Err(e) = self.pager.file.sync_all() {
            self.abort();
            return Err(DbError::Io(e));
        }

        self.working_meta.flushed += self.guard.n_append;
        self.working_meta.free_head_page = self.guard.free.head_page;
        self.working_meta.free_head_seq = self.guard.free.head_seq;
        self.working_meta.free_tail_page = self.guard.free.tail_page;
        self.working_meta.free_tail_seq = self.guard.free.tail_seq;

        if let Err(e) = self.pager.rewrite_stable_meta(&self.working_meta) {
            self.abort();
            return Err(e);
        }

        self.guard.free.max_seq = self.guard.free.tail_seq;
        self.guard.stable_meta = self.working_meta;
        self.guard.n_append = 0;
        self.guard.updates.clear();
        self.guard.failed = false;
        Ok(())
    }

    fn write_staged_pages(&self) -> DbResult<()> {
        let mut cache = self.pager.cache.wl();
        for (&pid, buf) in self.guard.updates.iter() {
            let n = self
                .pager
                .file
                .write_at(buf, pid * PAGE_SIZE as u64)
                .map_err(DbError::Io)?;
            if n != buf.len() {
                return Err(DbError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    format!("short write at page {}: wrote {} of {} bytes", pid, n, buf.len()),
                )));
            }
            cache.insert(pid, buf.clone());
        }
        Ok(())
    }

    fn abort(&mut self) {
        error!("pager: commit failed, reverting to stable meta");
        self.guard.failed = true;
        self.guard.free = self.free_stable;
        self.guard.updates.clear();
        self.guard.n_append = 0;
    }

    pub fn rollback(mut self) {
        self.guard.free = self.free_stable;
        self.guard.updates.clear();
        self.guard.n_append = 0;
    }
}
