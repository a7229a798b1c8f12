//! A depth-first pretty-printer for test failure messages and ad hoc
//! diagnostics. Not part of the durable format; only ever called with a
//! [`NodeSource`] over pages that are actually reachable from `root`.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::btree::NodeSource;
use crate::node::BNode;
use crate::types::PageId;

const SHOW_LIMIT: usize = 64;

pub fn pretty_print<S: NodeSource>(src: &S, root: PageId) -> String {
    if root == 0 {
        return "(empty)\n".to_string();
    }
    let mut out = String::new();
    let mut seen = HashSet::new();
    pretty_at(src, root, 0, &mut out, &mut seen);
    out
}

fn pretty_at<S: NodeSource>(src: &S, page: PageId, depth: usize, out: &mut String, seen: &mut HashSet<PageId>) {
    let indent = "  ".repeat(depth);
    if !seen.insert(page) {
        let _ = writeln!(out, "{}#{} (cycle)", indent, page);
        return;
    }
    let node = match src.get_node(page) {
        Ok(n) => n,
        Err(e) => {
            let _ = writeln!(out, "{}#{} <unreadable: {}>", indent, page, e);
            return;
        }
    };
    let kind = if node.is_leaf() { "leaf" } else { "internal" };
    let _ = writeln!(out, "{}#{} {} nkeys={} used={}", indent, page, kind, node.nkeys(), node.nbytes());
    for i in 0..node.nkeys() {
        let k = show_bytes(node.key(i));
        if node.is_leaf() {
            let v = show_bytes(node.val(i));
            let _ = writeln!(out, "{}  [{}] key={} val={}", indent, i, k, v);
        } else {
            let _ = writeln!(out, "{}  [{}] key={} -> #{}", indent, i, k, node.ptr(i));
        }
    }
    if !node.is_leaf() {
        for i in 0..node.nkeys() {
            pretty_at(src, node.ptr(i), depth + 1, out, seen);
        }
    }
}

fn show_bytes(b: &[u8]) -> String {
    if is_printable(b) {
        if b.len() > SHOW_LIMIT {
            return format!("{:?}...({})", String::from_utf8_lossy(&b[..SHOW_LIMIT]), b.len());
        }
        return format!("{:?}", String::from_utf8_lossy(b));
    }
    if b.len() > SHOW_LIMIT / 2 {
        return format!("{}...({})", hex::encode(&b[..SHOW_LIMIT / 2]), b.len());
    }
    hex::encode(b)
}

fn is_printable(b: &[u8]) -> bool {
    b.iter().all(|&c| (32..=126).contains(&c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{BNODE_LEAF, PAGE_SIZE};
    use crate::types::DbResult;
    use std::collections::HashMap;

    struct FakeSrc(HashMap<PageId, BNode>);

    impl NodeSource for FakeSrc {
        fn get_node(&self, pid: PageId) -> DbResult<BNode> {
            Ok(self.0.get(&pid).unwrap().clone())
        }
    }

    #[test]
    fn empty_tree_prints_a_placeholder() {
        let src = FakeSrc(HashMap::new());
        assert_eq!(pretty_print(&src, 0), "(empty)\n");
    }

    #[test]
    fn single_leaf_lists_its_entries() {
        let mut node = BNode::new(PAGE_SIZE);
        node.set_header(BNODE_LEAF, 1);
        BNode::append_kv(&mut node, 0, 0, b"a", b"1");
        let mut pages = HashMap::new();
        pages.insert(1u64, node);
        let src = FakeSrc(pages);

        let out = pretty_print(&src, 1);
        assert!(out.contains("leaf nkeys=1"));
        assert!(out.contains("key=\"a\" val=\"1\""));
    }
}
