//! Copy-on-write B+-tree operations: `get`/`insert`/`delete`, parameterized
//! over a page source so the same traversal code serves both a live write
//! transaction and a read-only snapshot.
//!
//! Every mutation builds brand new pages for the nodes on the path from the
//! touched leaf to the root; the old pages are handed to the free list
//! rather than overwritten, which is what makes concurrent readers safe.

use log::debug;

use crate::consts::{BNODE_INTERNAL, BNODE_LEAF, BTREE_MAX_KEY_SIZE, BTREE_MAX_VAL_SIZE, NODE_HEADER, PAGE_SIZE};
use crate::error::DbError;
use crate::node::{is_internal, BNode};
use crate::pager::{Pager, WriteTxn};
use crate::types::{DbResult, PageId};

/// Anything that can resolve a page id to a node. Implemented by [`Pager`]
/// (committed pages only, for readers) and by [`WriteTxn`] (staged pages
/// first, for the writer's own traversal).
pub trait NodeSource {
    fn get_node(&self, pid: PageId) -> DbResult<BNode>;
}

impl NodeSource for Pager {
    fn get_node(&self, pid: PageId) -> DbResult<BNode> {
        self.read_committed(pid)
    }
}

impl NodeSource for WriteTxn<'_> {
    fn get_node(&self, pid: PageId) -> DbResult<BNode> {
        self.read(pid)
    }
}

fn check_limit(key: &[u8], val: &[u8]) -> DbResult<()> {
    if key.len() > BTREE_MAX_KEY_SIZE {
        return Err(DbError::KeyTooLarge);
    }
    if val.len() > BTREE_MAX_VAL_SIZE {
        return Err(DbError::ValueTooLarge);
    }
    Ok(())
}

/// Point lookup. Works against any [`NodeSource`], so the same code path
/// serves a live transaction's own reads and a reader's pinned snapshot.
pub fn get<S: NodeSource>(src: &S, root: PageId, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
    if root == 0 {
        return Ok(None);
    }
    let mut node = src.get_node(root)?;
    loop {
        let idx = node.lookup_le(key);
        if node.is_leaf() {
            if idx < node.nkeys() && node.key(idx) == key {
                return Ok(Some(node.val(idx).to_vec()));
            }
            return Ok(None);
        }
        let ptr = node.ptr(idx);
        node = src.get_node(ptr)?;
    }
}

/// Insert or update `key`. Creates the root on an empty tree.
pub fn insert(txn: &mut WriteTxn, key: &[u8], val: &[u8]) -> DbResult<()> {
    check_limit(key, val)?;

    if txn.root() == 0 {
        let mut root = BNode::new(PAGE_SIZE);
        root.set_header(BNODE_LEAF, 2);
        BNode::append_kv(&mut root, 0, 0, b"", b"");
        BNode::append_kv(&mut root, 1, 0, key, val);
        let pid = txn.alloc(root)?;
        debug!("btree: created root leaf at page {}", pid);
        txn.set_root(pid);
        return Ok(());
    }

    let old_root = txn.root();
    let node = txn.read(old_root)?;
    let node = tree_insert(txn, node, key, val)?;
    let split = split3(node);
    txn.free(old_root);

    let new_root = if split.len() > 1 {
        debug!("btree: root split into {} pages", split.len());
        let mut root = BNode::new(PAGE_SIZE);
        root.set_header(BNODE_INTERNAL, split.len() as u16);
        for (i, kid) in split.iter().enumerate() {
            let key0 = kid.key(0).to_vec();
            let ptr = txn.alloc(kid.clone())?;
            BNode::append_kv(&mut root, i as u16, ptr, &key0, &[]);
        }
        txn.alloc(root)?
    } else {
        txn.alloc(split.into_iter().next().expect("split3 always yields at least one node"))?
    };
    txn.set_root(new_root);
    Ok(())
}

/// Delete `key`. Returns whether it was present.
pub fn delete(txn: &mut WriteTxn, key: &[u8]) -> DbResult<bool> {
    if txn.root() == 0 {
        return Ok(false);
    }
    let old_root = txn.root();
    let node = txn.read(old_root)?;
    let updated = match tree_delete(txn, node, key)? {
        Some(u) => u,
        None => return Ok(false),
    };
    txn.free(old_root);

    if updated.nkeys() == 0 {
        txn.set_root(0);
        return Ok(true);
    }

    // An internal root left with a single child after repeated merges
    // doesn't need its own page; the child becomes the new root directly.
    if is_internal(updated.kind()) && updated.nkeys() == 1 {
        txn.set_root(updated.ptr(0));
        return Ok(true);
    }

    let pid = txn.alloc(updated)?;
    txn.set_root(pid);
    Ok(true)
}

fn tree_insert(txn: &mut WriteTxn, node: BNode, key: &[u8], val: &[u8]) -> DbResult<BNode> {
    let idx = node.lookup_le(key);
    if node.is_leaf() {
        if idx < node.nkeys() && node.key(idx) == key {
            Ok(leaf_update(&node, idx, key, val))
        } else {
            Ok(leaf_insert(&node, idx + 1, key, val))
        }
    } else {
        let kptr = node.ptr(idx);
        let knode = txn.read(kptr)?;
        let knode = tree_insert(txn, knode, key, val)?;
        let split = split3(knode);
        txn.free(kptr);
        node_replace_kid_n(txn, &node, idx, &split)
    }
}

fn tree_delete(txn: &mut WriteTxn, node: BNode, key: &[u8]) -> DbResult<Option<BNode>> {
    let idx = node.lookup_le(key);
    if node.is_leaf() {
        if idx < node.nkeys() && node.key(idx) == key {
            Ok(Some(leaf_delete(&node, idx)))
        } else {
            Ok(None)
        }
    } else {
        node_delete(txn, node, idx, key)
    }
}

enum MergeDir {
    None,
    Left(BNode),
    Right(BNode),
}

fn should_merge(txn: &mut WriteTxn, node: &BNode, idx: u16, updated: &BNode) -> DbResult<MergeDir> {
    if updated.nbytes() > PAGE_SIZE / 4 {
        return Ok(MergeDir::None);
    }
    if idx > 0 {
        let sib = txn.read(node.ptr(idx - 1))?;
        if sib.nbytes() + updated.nbytes() - NODE_HEADER <= PAGE_SIZE {
            return Ok(MergeDir::Left(sib));
        }
    }
    if idx + 1 < node.nkeys() {
        let sib = txn.read(node.ptr(idx + 1))?;
        if sib.nbytes() + updated.nbytes() - NODE_HEADER <= PAGE_SIZE {
            return Ok(MergeDir::Right(sib));
        }
    }
    Ok(MergeDir::None)
}

fn node_delete(txn: &mut WriteTxn, node: BNode, idx: u16, key: &[u8]) -> DbResult<Option<BNode>> {
    let kptr = node.ptr(idx);
    let child = txn.read(kptr)?;
    let updated = match tree_delete(txn, child, key)? {
        Some(u) => u,
        None => return Ok(None),
    };
    txn.free(kptr);

    let new_node = match should_merge(txn, &node, idx, &updated)? {
        MergeDir::Left(sib) => {
            debug!("btree: merging with left sibling at index {}", idx);
            let merged = node_merge(&sib, &updated);
            let min_key = merged.key(0).to_vec();
            txn.free(node.ptr(idx - 1));
            let ptr = txn.alloc(merged)?;
            node_replace2kid(&node, idx - 1, ptr, &min_key)
        }
        MergeDir::Right(sib) => {
            debug!("btree: merging with right sibling at index {}", idx);
            let merged = node_merge(&updated, &sib);
            let min_key = merged.key(0).to_vec();
            txn.free(node.ptr(idx + 1));
            let ptr = txn.alloc(merged)?;
            node_replace2kid(&node, idx, ptr, &min_key)
        }
        MergeDir::None if updated.nkeys() == 0 => {
            let mut n = BNode::new(PAGE_SIZE);
            n.set_header(BNODE_INTERNAL, 0);
            n
        }
        MergeDir::None => node_replace_kid_n(txn, &node, idx, std::slice::from_ref(&updated))?,
    };
    Ok(Some(new_node))
}

fn leaf_insert(old: &BNode, idx: u16, key: &[u8], val: &[u8]) -> BNode {
    let mut new = BNode::new(2 * PAGE_SIZE);
    new.set_header(BNODE_LEAF, old.nkeys() + 1);
    BNode::append_range(&mut new, old, 0, 0, idx);
    BNode::append_kv(&mut new, idx, 0, key, val);
    BNode::append_range(&mut new, old, idx + 1, idx, old.nkeys() - idx);
    new
}

fn leaf_update(old: &BNode, idx: u16, key: &[u8], val: &[u8]) -> BNode {
    let mut new = BNode::new(2 * PAGE_SIZE);
    new.set_header(BNODE_LEAF, old.nkeys());
    BNode::append_range(&mut new, old, 0, 0, idx);
    BNode::append_kv(&mut new, idx, 0, key, val);
    BNode::append_range(&mut new, old, idx + 1, idx + 1, old.nkeys() - (idx + 1));
    new
}

fn leaf_delete(old: &BNode, idx: u16) -> BNode {
    let mut new = BNode::new(PAGE_SIZE);
    new.set_header(BNODE_LEAF, old.nkeys() - 1);
    if idx > 0 {
        BNode::append_range(&mut new, old, 0, 0, idx);
    }
    if idx + 1 <= old.nkeys() {
        BNode::append_range(&mut new, old, idx, idx + 1, old.nkeys() - (idx + 1));
    }
    new
}

fn node_merge(left: &BNode, right: &BNode) -> BNode {
    let mut new = BNode::new(PAGE_SIZE);
    new.set_header(left.kind(), left.nkeys() + right.nkeys());
    BNode::append_range(&mut new, left, 0, 0, left.nkeys());
    BNode::append_range(&mut new, right, left.nkeys(), 0, right.nkeys());
    new
}

fn node_replace2kid(old: &BNode, idx: u16, ptr: PageId, key: &[u8]) -> BNode {
    let mut new = BNode::new(PAGE_SIZE);
    new.set_header(BNODE_INTERNAL, old.nkeys() - 1);
    if idx > 0 {
        BNode::append_range(&mut new, old, 0, 0, idx);
    }
    BNode::append_kv(&mut new, idx, ptr, key, &[]);
    if idx + 2 <= old.nkeys() {
        BNode::append_range(&mut new, old, idx + 1, idx + 2, old.nkeys() - (idx + 2));
    }
    new
}

fn node_replace_kid_n(txn: &mut WriteTxn, old: &BNode, idx: u16, kids: &[BNode]) -> DbResult<BNode> {
    let inc = kids.len() as u16;
    let mut new = BNode::new(2 * PAGE_SIZE);
    new.set_header(BNODE_INTERNAL, old.nkeys() + inc - 1);
    BNode::append_range(&mut new, old, 0, 0, idx);
    for (i, kid) in kids.iter().enumerate() {
        let key0 = kid.key(0).to_vec();
        let ptr = txn.alloc(kid.clone())?;
        BNode::append_kv(&mut new, idx + i as u16, ptr, &key0, &[]);
    }
    BNode::append_range(&mut new, old, idx + inc, idx + 1, old.nkeys() - (idx + 1));
    Ok(new)
}

fn split2(left_cap: usize, right_cap: usize, old: &BNode) -> (BNode, BNode) {
    let mut nleft = old.nkeys() / 2;
    let left_bytes = |n: u16| -> usize { NODE_HEADER + 8 * n as usize + 2 * n as usize + old.offset(n) as usize };
    while left_bytes(nleft) > PAGE_SIZE {
        nleft -= 1;
    }
    debug_assert!(nleft >= 1);
    while old.nbytes() - left_bytes(nleft) + NODE_HEADER > PAGE_SIZE {
        nleft += 1;
    }
    debug_assert!(nleft < old.nkeys());
    let nright = old.nkeys() - nleft;

    let mut left = BNode::new(left_cap);
    left.set_header(old.kind(), nleft);
    BNode::append_range(&mut left, old, 0, 0, nleft);

    let mut right = BNode::new(right_cap);
    right.set_header(old.kind(), nright);
    BNode::append_range(&mut right, old, 0, nleft, nright);

    debug_assert!(right.nbytes() <= PAGE_SIZE);
    (left, right)
}

/// Split `old` into 1, 2, or 3 page-sized nodes, whichever is fewest.
fn split3(old: BNode) -> Vec<BNode> {
    if old.nbytes() <= PAGE_SIZE {
        return vec![old.into_page()];
    }
    let (left, right) = split2(2 * PAGE_SIZE, PAGE_SIZE, &old);
    if left.nbytes() <= PAGE_SIZE {
        return vec![left.into_page(), right.into_page()];
    }
    let (leftleft, middle) = split2(PAGE_SIZE, PAGE_SIZE, &left);
    debug_assert!(leftleft.nbytes() <= PAGE_SIZE);
    vec![leftleft.into_page(), middle.into_page(), right.into_page()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::BNODE_LEAF;

    fn leaf_with(entries: &[(&[u8], &[u8])]) -> BNode {
        let mut node = BNode::new(PAGE_SIZE);
        node.set_header(BNODE_LEAF, entries.len() as u16);
        for (i, (k, v)) in entries.iter().enumerate() {
            BNode::append_kv(&mut node, i as u16, 0, k, v);
        }
        node
    }

    #[test]
    fn leaf_insert_shifts_tail_entries() {
        let old = leaf_with(&[(b"a", b"1"), (b"c", b"3")]);
        let new = leaf_insert(&old, 1, b"b", b"2");
        assert_eq!(new.nkeys(), 3);
        assert_eq!(new.key(1), b"b");
        assert_eq!(new.val(1), b"2");
        assert_eq!(new.key(2), b"c");
    }

    #[test]
    fn leaf_update_keeps_key_count() {
        let old = leaf_with(&[(b"a", b"1"), (b"b", b"2")]);
        let new = leaf_update(&old, 1, b"b", b"22");
        assert_eq!(new.nkeys(), 2);
        assert_eq!(new.val(1), b"22");
    }

    #[test]
    fn leaf_delete_removes_entry() {
        let old = leaf_with(&[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")]);
        let new = leaf_delete(&old, 1);
        assert_eq!(new.nkeys(), 2);
        assert_eq!(new.key(0), b"a");
        assert_eq!(new.key(1), b"c");
    }

    #[test]
    fn node_merge_concatenates_entries() {
        let left = leaf_with(&[(b"a", b"1")]);
        let right = leaf_with(&[(b"b", b"2")]);
        let merged = node_merge(&left, &right);
        assert_eq!(merged.nkeys(), 2);
        assert_eq!(merged.key(0), b"a");
        assert_eq!(merged.key(1), b"b");
    }

    #[test]
    fn split3_keeps_one_node_when_it_already_fits() {
        let small = leaf_with(&[(b"a", b"1"), (b"b", b"2")]);
        let split = split3(small);
        assert_eq!(split.len(), 1);
    }

    #[test]
    fn split3_splits_an_oversized_node_into_two() {
        // A value big enough that two entries overflow one page but each
        // half comfortably fits.
        let big_val = vec![7u8; 3000];
        let old = leaf_with(&[(b"a", &big_val), (b"b", &big_val)]);
        let split = split3(old);
        assert_eq!(split.len(), 2);
        for n in &split {
            assert!(n.nbytes() <= PAGE_SIZE);
        }
    }
}
