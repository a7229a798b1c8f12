//! `BNode`: byte layout and pure accessors for a single B+-tree page.
//!
//! A node is either an `INTERNAL` node (keys + child page ids, no values) or
//! a `LEAF` node (keys + values). Both share one physical layout:
//!
//! ```text
//! offset  size       meaning
//! 0       2          kind (BNODE_INTERNAL | BNODE_LEAF)
//! 2       2          nkeys
//! 4       8*nkeys    child page ids (0 for leaves)
//! 4+8n    2*nkeys    offsets of entries, relative to the first entry
//! ...     var        packed entries: klen(2) vlen(2) key val
//! ```
//!
//! `offset(0)` is always 0 and is never stored; the stored table holds
//! `offset(1)..=offset(nkeys)`, so `offset(nkeys)` is the total size of the
//! packed entry region.

use crate::consts::{BNODE_INTERNAL, BNODE_LEAF, NODE_HEADER, PAGE_SIZE};
use crate::util::{le_u16, le_u64, put_le_u16, put_le_u64};

/// An owned, resizable page buffer. Normally exactly [`PAGE_SIZE`] bytes;
/// during a split the tree builds a double-sized scratch node first, so the
/// buffer is allowed to grow past that.
#[derive(Clone)]
pub struct BNode(pub Vec<u8>);

impl BNode {
    /// A zeroed buffer of the given capacity, header not yet set.
    pub fn new(capacity: usize) -> BNode {
        BNode(vec![0u8; capacity])
    }

    pub fn kind(&self) -> u16 {
        le_u16(&self.0[0..2])
    }

    pub fn nkeys(&self) -> u16 {
        le_u16(&self.0[2..4])
    }

    pub fn is_leaf(&self) -> bool {
        self.kind() == BNODE_LEAF
    }

    pub fn set_header(&mut self, kind: u16, nkeys: u16) {
        put_le_u16(&mut self.0[0..2], kind);
        put_le_u16(&mut self.0[2..4], nkeys);
    }

    pub fn ptr(&self, idx: u16) -> u64 {
        let pos = NODE_HEADER + 8 * idx as usize;
        le_u64(&self.0[pos..pos + 8])
    }

    pub fn set_ptr(&mut self, idx: u16, val: u64) {
        let pos = NODE_HEADER + 8 * idx as usize;
        put_le_u64(&mut self.0[pos..pos + 8], val);
    }

    fn offset_pos(&self, idx: u16) -> usize {
        debug_assert!(idx >= 1 && idx <= self.nkeys());
        NODE_HEADER + 8 * self.nkeys() as usize + 2 * (idx as usize - 1)
    }

    /// The relative byte offset of entry `idx` within the packed entry
    /// region. `offset(0)` is always 0.
    pub fn offset(&self, idx: u16) -> u16 {
        if idx == 0 {
            return 0;
        }
        let pos = self.offset_pos(idx);
        le_u16(&self.0[pos..pos + 2])
    }

    fn set_offset(&mut self, idx: u16, val: u16) {
        let pos = self.offset_pos(idx);
        put_le_u16(&mut self.0[pos..pos + 2], val);
    }

    /// Byte position, within this node's buffer, where entry `idx` begins.
    fn kv_pos(&self, idx: u16) -> usize {
        NODE_HEADER + 8 * self.nkeys() as usize + 2 * self.nkeys() as usize + self.offset(idx) as usize
    }

    pub fn key(&self, idx: u16) -> &[u8] {
        let pos = self.kv_pos(idx);
        let klen = le_u16(&self.0[pos..pos + 2]) as usize;
        &self.0[pos + 4..pos + 4 + klen]
    }

    pub fn val(&self, idx: u16) -> &[u8] {
        let pos = self.kv_pos(idx);
        let klen = le_u16(&self.0[pos..pos + 2]) as usize;
        let vlen = le_u16(&self.0[pos + 2..pos + 4]) as usize;
        &self.0[pos + 4 + klen..pos + 4 + klen + vlen]
    }

    /// Total bytes used by this node: header + pointer table + offset table
    /// + packed entries.
    pub fn nbytes(&self) -> usize {
        self.kv_pos(self.nkeys())
    }

    /// Append a single entry at slot `idx` of `dst`. `dst` must already have
    /// its header set with `nkeys() >= idx + 1`.
    pub fn append_kv(dst: &mut BNode, idx: u16, ptr: u64, key: &[u8], val: &[u8]) {
        dst.set_ptr(idx, ptr);
        let pos = dst.kv_pos(idx);
        let needed = pos + 4 + key.len() + val.len();
        if dst.0.len() < needed {
            dst.0.resize(needed, 0);
        }
        put_le_u16(&mut dst.0[pos..pos + 2], key.len() as u16);
        put_le_u16(&mut dst.0[pos + 2..pos + 4], val.len() as u16);
        dst.0[pos + 4..pos + 4 + key.len()].copy_from_slice(key);
        dst.0[pos + 4 + key.len()..pos + 4 + key.len() + val.len()].copy_from_slice(val);
        dst.set_offset(idx + 1, (pos + 4 + key.len() + val.len() - dst.entries_start()) as u16);
    }

    fn entries_start(&self) -> usize {
        NODE_HEADER + 8 * self.nkeys() as usize + 2 * self.nkeys() as usize
    }

    /// Bulk-copy `n` consecutive entries from `src[src_from..]` into
    /// `dst[dst_from..]`, preserving pointers and recomputing offsets.
    pub fn append_range(dst: &mut BNode, src: &BNode, dst_from: u16, src_from: u16, n: u16) {
        for i in 0..n {
            let ptr = src.ptr(src_from + i);
            let key = src.key(src_from + i).to_vec();
            let val = src.val(src_from + i).to_vec();
            BNode::append_kv(dst, dst_from + i, ptr, &key, &val);
        }
    }

    /// The greatest `i` such that `key(i) <= search`. Nodes are small
    /// (bounded by [`PAGE_SIZE`]) so a linear scan is simplest and fast
    /// enough; returns 0 for an empty node.
    pub fn lookup_le(&self, search: &[u8]) -> u16 {
        let nkeys = self.nkeys();
        if nkeys == 0 {
            return 0;
        }
        let mut i: i32 = 0;
        while i < nkeys as i32 {
            match self.key(i as u16).cmp(search) {
                std::cmp::Ordering::Equal => return i as u16,
                std::cmp::Ordering::Greater => return (i - 1).max(0) as u16,
                std::cmp::Ordering::Less => i += 1,
            }
        }
        (i - 1) as u16
    }

    /// Truncate (or leave) the buffer at exactly [`PAGE_SIZE`] bytes, the
    /// on-disk page size.
    pub fn into_page(mut self) -> BNode {
        self.0.resize(PAGE_SIZE, 0);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_bytes(buf: Vec<u8>) -> BNode {
        BNode(buf)
    }
}

pub fn is_internal(kind: u16) -> bool {
    kind == BNODE_INTERNAL
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_with(entries: &[(&[u8], &[u8])]) -> BNode {
        let mut node = BNode::new(PAGE_SIZE);
        node.set_header(BNODE_LEAF, entries.len() as u16);
        for (i, (k, v)) in entries.iter().enumerate() {
            BNode::append_kv(&mut node, i as u16, 0, k, v);
        }
        node
    }

    #[test]
    fn round_trips_keys_and_values() {
        let node = leaf_with(&[(b"a", b"1"), (b"bb", b"22"), (b"ccc", b"333")]);
        assert_eq!(node.nkeys(), 3);
        assert_eq!(node.key(0), b"a");
        assert_eq!(node.val(1), b"22");
        assert_eq!(node.key(2), b"ccc");
        assert_eq!(node.val(2), b"333");
    }

    #[test]
    fn lookup_le_matches_linear_scan() {
        let node = leaf_with(&[(b"b", b""), (b"d", b""), (b"f", b"")]);
        assert_eq!(node.lookup_le(b"a"), 0);
        assert_eq!(node.lookup_le(b"b"), 0);
        assert_eq!(node.lookup_le(b"c"), 0);
        assert_eq!(node.lookup_le(b"d"), 1);
        assert_eq!(node.lookup_le(b"z"), 2);
    }

    #[test]
    fn append_range_preserves_pointers() {
        let mut src = BNode::new(PAGE_SIZE);
        src.set_header(BNODE_INTERNAL, 2);
        BNode::append_kv(&mut src, 0, 10, b"a", b"");
        BNode::append_kv(&mut src, 1, 20, b"b", b"");

        let mut dst = BNode::new(PAGE_SIZE);
        dst.set_header(BNODE_INTERNAL, 2);
        BNode::append_range(&mut dst, &src, 0, 0, 2);

        assert_eq!(dst.ptr(0), 10);
        assert_eq!(dst.ptr(1), 20);
        assert_eq!(dst.key(1), b"b");
    }
}
