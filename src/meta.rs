//! The 64-byte meta page (page id 0): signature, tree root, durability
//! counter, and the four free-list cursors. See the on-disk format section
//! of the design doc for the exact field order.

use crate::consts::{DB_SIG, META_PAGE_SIZE, PAGE_SIZE};
use crate::error::DbError;
use crate::types::{DbResult, PageId};
use crate::util::{le_u64, put_le_u64};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Meta {
    pub root: PageId,
    pub flushed: u64,
    pub free_head_page: PageId,
    pub free_head_seq: u64,
    pub free_tail_page: PageId,
    pub free_tail_seq: u64,
}

impl Meta {
    /// The meta written to a brand-new, empty data file: an empty tree
    /// (root 0), two pages already accounted for (meta + one reserved
    /// page), and head/tail list pages both pointing at page 1.
    pub fn fresh() -> Meta {
        Meta {
            root: 0,
            flushed: 2,
            free_head_page: 1,
            free_head_seq: 0,
            free_tail_page: 1,
            free_tail_seq: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; PAGE_SIZE] {
        let mut buf = [0u8; PAGE_SIZE];
        buf[0..16].copy_from_slice(DB_SIG);
        put_le_u64(&mut buf[16..24], self.root);
        put_le_u64(&mut buf[24..32], self.flushed);
        put_le_u64(&mut buf[32..40], self.free_head_page);
        put_le_u64(&mut buf[40..48], self.free_head_seq);
        put_le_u64(&mut buf[48..56], self.free_tail_page);
        put_le_u64(&mut buf[56..64], self.free_tail_seq);
        buf
    }

    /// Parse a meta page. Returns `Ok(None)` for a page whose signature
    /// doesn't match (a brand-new, zero-filled file) and `Err` for a
    /// signature match with otherwise impossible field values.
    pub fn from_bytes(buf: &[u8]) -> DbResult<Option<Meta>> {
        if buf.len() < META_PAGE_SIZE || &buf[0..16] != DB_SIG {
            return Ok(None);
        }
        let meta = Meta {
            root: le_u64(&buf[16..24]),
            flushed: le_u64(&buf[24..32]),
            free_head_page: le_u64(&buf[32..40]),
            free_head_seq: le_u64(&buf[40..48]),
            free_tail_page: le_u64(&buf[48..56]),
            free_tail_seq: le_u64(&buf[56..64]),
        };
        if meta.flushed < 2 {
            return Err(DbError::Corrupt(format!(
                "meta.flushed {} is impossible for an initialized file",
                meta.flushed
            )));
        }
        Ok(Some(meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let meta = Meta {
            root: 7,
            flushed: 42,
            free_head_page: 1,
            free_head_seq: 3,
            free_tail_page: 9,
            free_tail_seq: 100,
        };
        let bytes = meta.to_bytes();
        let parsed = Meta::from_bytes(&bytes).unwrap().unwrap();
        assert_eq!(meta, parsed);
    }

    #[test]
    fn rejects_bad_signature() {
        let buf = [0u8; PAGE_SIZE];
        assert!(Meta::from_bytes(&buf).unwrap().is_none());
    }
}
