//! A single-file, copy-on-write B+-tree key/value engine with snapshot
//! isolation: one writer and many readers share a single data file, with
//! readers never blocked by and never blocking the writer.

mod btree;
mod concurrency;
mod consts;
pub mod database;
pub mod debug;
mod error;
mod free_list;
mod iter;
mod log;
mod meta;
mod node;
mod pager;
pub mod options;
pub mod transaction;
mod types;
mod util;

pub use crate::database::{Database, Reader};
pub use crate::error::DbError;
pub use crate::options::Options;
pub use crate::transaction::Transaction;
pub use crate::types::DbResult;
pub use crate::log::init_log;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;
    use tempfile::tempdir;

    static INIT: Once = Once::new();

    fn setup() {
        INIT.call_once(init_log);
    }

    #[test]
    fn set_and_get_round_trip() {
        setup();
        let dir = tempdir().unwrap();
        let db = Database::open(Options::new(dir.path().join("data"))).unwrap();

        db.set(b"k1", b"hi").unwrap();
        db.set(b"k3", b"hello").unwrap();

        assert_eq!(db.get(b"k1").unwrap(), Some(b"hi".to_vec()));
        assert_eq!(db.get(b"k2").unwrap(), None);
        assert_eq!(db.get(b"k3").unwrap(), Some(b"hello".to_vec()));
    }

    #[test]
    fn scan_respects_range_after_deletes() {
        setup();
        let dir = tempdir().unwrap();
        let db = Database::open(Options::new(dir.path().join("data"))).unwrap();

        for i in 0..240 {
            let key = format!("k{:04}", i);
            db.set(key.as_bytes(), b"v").unwrap();
        }
        for i in 0..140 {
            let key = format!("k{:04}", i);
            assert!(db.del(key.as_bytes()).unwrap());
        }

        let mut seen = Vec::new();
        db.scan(b"k", Some(b"l"), &mut |k, _v| {
            seen.push(String::from_utf8(k.to_vec()).unwrap());
            true
        })
        .unwrap();

        assert_eq!(seen.len(), 100);
        assert_eq!(seen[0], "k0140");
        assert_eq!(seen[99], "k0239");
    }

    #[test]
    fn value_too_large_leaves_the_tree_unchanged() {
        setup();
        let dir = tempdir().unwrap();
        let db = Database::open(Options::new(dir.path().join("data"))).unwrap();

        let big = vec![0u8; 4001];
        let err = db.set(b"k", &big).unwrap_err();
        assert!(matches!(err, DbError::ValueTooLarge));
        assert_eq!(db.get(b"k").unwrap(), None);
    }

    #[test]
    fn rollback_discards_staged_writes() {
        setup();
        let dir = tempdir().unwrap();
        let db = Database::open(Options::new(dir.path().join("data"))).unwrap();

        let size_before = std::fs::metadata(dir.path().join("data")).unwrap().len();

        let mut txn = db.begin().unwrap();
        txn.set(b"a", b"1").unwrap();
        txn.rollback();

        assert_eq!(db.get(b"a").unwrap(), None);
        let size_after = std::fs::metadata(dir.path().join("data")).unwrap().len();
        assert_eq!(size_before, size_after);
    }

    #[test]
    fn random_key_value_batch_round_trips() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        use std::collections::HashMap;

        setup();
        let dir = tempdir().unwrap();
        let db = Database::open(Options::new(dir.path().join("data"))).unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        let mut model = HashMap::new();
        for _ in 0..500 {
            let key = format!("key-{:08}", rng.gen_range(0, 2000));
            let val: Vec<u8> = (0..rng.gen_range(1, 200)).map(|_| rng.gen()).collect();
            db.set(key.as_bytes(), &val).unwrap();
            model.insert(key, val);
        }

        for (key, val) in &model {
            assert_eq!(db.get(key.as_bytes()).unwrap().as_ref(), Some(val));
        }
    }

    #[test]
    fn reader_is_isolated_from_a_concurrent_writers_commit() {
        setup();
        let dir = tempdir().unwrap();
        let db = Database::open(Options::new(dir.path().join("data"))).unwrap();

        for i in 0..4000 {
            let key = format!("k{:06}", i);
            db.set(key.as_bytes(), &[b'a'; 64]).unwrap();
        }

        let reader = db.begin_read();
        let size_at_seed = std::fs::metadata(dir.path().join("data")).unwrap().len();

        for i in 0..4000 {
            let key = format!("k{:06}", i);
            db.set(key.as_bytes(), &[b'b'; 96]).unwrap();
        }

        let mut count = 0;
        reader
            .scan(b"k", None, &mut |_k, v| {
                assert_eq!(v, &[b'a'; 64][..]);
                count += 1;
                true
            })
            .unwrap();
        assert_eq!(count, 4000);

        let size_while_reader_alive = std::fs::metadata(dir.path().join("data")).unwrap().len();
        assert!(size_while_reader_alive > size_at_seed);

        reader.end();

        let fresh = db.begin_read();
        let mut seen_new_value = false;
        fresh
            .scan(b"k000000", Some(b"k000001"), &mut |_k, v| {
                seen_new_value = v == &[b'b'; 96][..];
                true
            })
            .unwrap();
        assert!(seen_new_value);
    }
}
