//! In-order range iterator over a snapshot of the tree.
//!
//! Holds a stack of `(pageId, childIndex)` frames down to the current leaf.
//! `advance` walks up the stack to the nearest ancestor with an unvisited
//! child, then descends that subtree's leftmost path — starting at entry
//! index 1, since index 0 is only ever a real data entry except at the
//! tree's single global-leftmost leaf, where it's the sentinel.

use crate::btree::NodeSource;
use crate::node::BNode;
use crate::types::{DbResult, PageId};

struct Frame {
    ptr: PageId,
    idx: u16,
}

pub struct Iter<'s, S: NodeSource> {
    src: &'s S,
    stack: Vec<Frame>,
    leaf: Option<BNode>,
    idx: u16,
    hi: Option<Vec<u8>>,
    ok: bool,
}

impl<'s, S: NodeSource> Iter<'s, S> {
    pub fn new(src: &'s S) -> Iter<'s, S> {
        Iter {
            src,
            stack: Vec::new(),
            leaf: None,
            idx: 0,
            hi: None,
            ok: false,
        }
    }

    /// Position the cursor at the first entry `>= lo`. If `hi` is given and
    /// that entry is already `>= hi`, the range is empty and the iterator
    /// starts invalid.
    pub fn seek_ge(&mut self, root: PageId, lo: &[u8], hi: Option<&[u8]>) -> DbResult<bool> {
        self.stack.clear();
        self.hi = hi.map(|h| h.to_vec());
        if root == 0 {
            self.ok = false;
            return Ok(false);
        }

        let mut ptr = root;
        loop {
            let node = self.src.get_node(ptr)?;
            if node.is_leaf() {
                let found = node.lookup_le(lo);
                let mut start = found;
                if !(found < node.nkeys() && node.key(found) >= lo) {
                    start = found + 1;
                }
                if start >= node.nkeys() {
                    self.leaf = Some(node);
                    self.idx = start;
                    self.ok = self.advance()?;
                    return Ok(self.ok);
                }
                self.ok = true;
                self.idx = start;
                if self.past_hi(node.key(start)) {
                    self.ok = false;
                }
                self.leaf = Some(node);
                return Ok(self.ok);
            }
            let idx = node.lookup_le(lo);
            let child = node.ptr(idx);
            self.stack.push(Frame { ptr, idx });
            ptr = child;
        }
    }

    fn past_hi(&self, key: &[u8]) -> bool {
        match &self.hi {
            Some(hi) => key >= hi.as_slice(),
            None => false,
        }
    }

    pub fn valid(&self) -> bool {
        self.ok
    }

    pub fn key(&self) -> &[u8] {
        self.leaf.as_ref().expect("valid() checked before key()").key(self.idx)
    }

    pub fn val(&self) -> &[u8] {
        self.leaf.as_ref().expect("valid() checked before val()").val(self.idx)
    }

    pub fn next(&mut self) -> DbResult<bool> {
        if !self.ok {
            return Ok(false);
        }
        self.idx += 1;
        let leaf = self.leaf.as_ref().unwrap();
        if self.idx < leaf.nkeys() {
            if self.past_hi(leaf.key(self.idx)) {
                self.ok = false;
                return Ok(false);
            }
            return Ok(true);
        }
        self.ok = self.advance()?;
        Ok(self.ok)
    }

    fn advance(&mut self) -> DbResult<bool> {
        loop {
            let top = match self.stack.last() {
                Some(f) => Frame { ptr: f.ptr, idx: f.idx },
                None => return Ok(false),
            };
            let parent = self.src.get_node(top.ptr)?;
            let next_idx = top.idx + 1;
            if next_idx < parent.nkeys() {
                self.stack.last_mut().unwrap().idx = next_idx;
                let mut ptr = parent.ptr(next_idx);
                loop {
                    let node = self.src.get_node(ptr)?;
                    if node.is_leaf() {
                        self.idx = 1;
                        if self.idx >= node.nkeys() {
                            self.leaf = Some(node);
                            break;
                        }
                        if self.past_hi(node.key(self.idx)) {
                            return Ok(false);
                        }
                        self.leaf = Some(node);
                        return Ok(true);
                    }
                    let child = node.ptr(0);
                    self.stack.push(Frame { ptr, idx: 0 });
                    ptr = child;
                }
            } else {
                self.stack.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::PAGE_SIZE;
    use crate::node::BNode;
    use std::collections::HashMap;

    struct FakeSrc(HashMap<PageId, BNode>);

    impl NodeSource for FakeSrc {
        fn get_node(&self, pid: PageId) -> DbResult<BNode> {
            Ok(self.0.get(&pid).unwrap().clone())
        }
    }

    fn leaf(entries: &[(&[u8], &[u8])]) -> BNode {
        let mut node = BNode::new(PAGE_SIZE);
        node.set_header(crate::consts::BNODE_LEAF, entries.len() as u16);
        for (i, (k, v)) in entries.iter().enumerate() {
            BNode::append_kv(&mut node, i as u16, 0, k, v);
        }
        node
    }

    #[test]
    fn single_leaf_scan_yields_entries_in_order() {
        let root = leaf(&[(b"", b""), (b"a", b"1"), (b"b", b"2"), (b"c", b"3")]);
        let mut pages = HashMap::new();
        pages.insert(1u64, root);
        let src = FakeSrc(pages);

        let mut it = Iter::new(&src);
        assert!(it.seek_ge(1, b"a", None).unwrap());
        let mut seen = Vec::new();
        while it.valid() {
            seen.push((it.key().to_vec(), it.val().to_vec()));
            it.next().unwrap();
        }
        assert_eq!(
            seen,
            vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec()), (b"c".to_vec(), b"3".to_vec())]
        );
    }

    #[test]
    fn upper_bound_excludes_matching_key() {
        let root = leaf(&[(b"", b""), (b"a", b"1"), (b"b", b"2"), (b"c", b"3")]);
        let mut pages = HashMap::new();
        pages.insert(1u64, root);
        let src = FakeSrc(pages);

        let mut it = Iter::new(&src);
        assert!(it.seek_ge(1, b"a", Some(b"c")).unwrap());
        let mut seen = Vec::new();
        while it.valid() {
            seen.push(it.key().to_vec());
            it.next().unwrap();
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn empty_tree_is_never_valid() {
        let src = FakeSrc(HashMap::new());
        let mut it = Iter::new(&src);
        assert!(!it.seek_ge(0, b"a", None).unwrap());
        assert!(!it.valid());
    }
}
