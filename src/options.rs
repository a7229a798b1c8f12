//! Open-time configuration for a [`crate::database::Database`].

use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Options {
    pub(crate) path: PathBuf,
    pub(crate) create_if_missing: bool,
    pub(crate) cache_capacity: Option<usize>,
}

impl Options {
    pub fn new<P: Into<PathBuf>>(path: P) -> Options {
        Options {
            path: path.into(),
            create_if_missing: true,
            cache_capacity: None,
        }
    }

    pub fn create_if_missing(mut self, yes: bool) -> Options {
        self.create_if_missing = yes;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Options {
        self.cache_capacity = Some(capacity);
        self
    }
}

impl From<&Path> for Options {
    fn from(path: &Path) -> Options {
        Options::new(path)
    }
}

impl From<PathBuf> for Options {
    fn from(path: PathBuf) -> Options {
        Options::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_create_the_file_and_leave_the_cache_unbounded() {
        let opts = Options::new("/tmp/whatever.db");
        assert!(opts.create_if_missing);
        assert_eq!(opts.cache_capacity, None);
    }

    #[test]
    fn builder_setters_override_defaults() {
        let opts = Options::new("/tmp/whatever.db").create_if_missing(false).cache_capacity(64);
        assert!(!opts.create_if_missing);
        assert_eq!(opts.cache_capacity, Some(64));
    }
}
