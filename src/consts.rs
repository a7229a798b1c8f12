//! Fixed, book-keeping constants for the on-disk layout.
//!
//! These mirror the invariants in the design doc: a single page size, hard
//! caps on key/value size (chosen so a one-entry node always fits), and the
//! on-disk signature used to recognize a previously-initialized data file.

/// Page size in bytes. Every page on disk, B+-tree or free-list, is exactly
/// this many bytes.
pub const PAGE_SIZE: usize = 4096;

/// Node header: 2 bytes kind + 2 bytes nkeys.
pub const NODE_HEADER: usize = 4;

/// Maximum key length, in bytes.
pub const BTREE_MAX_KEY_SIZE: usize = 1000;

/// Maximum value length, in bytes.
pub const BTREE_MAX_VAL_SIZE: usize = 3000;

pub const BNODE_INTERNAL: u16 = 1;
pub const BNODE_LEAF: u16 = 2;

/// 16-byte ASCII signature written at the start of the meta page. Anything
/// else there means the file is either new or foreign.
pub const DB_SIG: &[u8; 16] = b"NanoDBv1Shadow00";

/// Meta page layout: signature(16) + root(8) + flushed(8) + 4 free-list
/// cursors(8 each) = 64 bytes. The rest of the 4096-byte page is reserved
/// and must be zero.
pub const META_PAGE_SIZE: usize = 16 + 8 + 8 + 8 * 4;

/// Page id of the meta page; always the first page in the file.
pub const META_PAGE_ID: u64 = 0;

/// Free-list list-page header: 8-byte `next` pointer.
pub const FREE_LIST_HEADER: usize = 8;

/// Number of page-id slots per free-list page.
pub const FREE_LIST_CAP: usize = (PAGE_SIZE - FREE_LIST_HEADER) / 8;

const _ASSERT_ONE_ENTRY_NODE_FITS: [(); 1] = [(); {
    let node1max = NODE_HEADER + 8 + 2 + 4 + BTREE_MAX_KEY_SIZE + BTREE_MAX_VAL_SIZE;
    (node1max <= PAGE_SIZE) as usize
}];
