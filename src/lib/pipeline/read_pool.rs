//! An LRU pool of open alignment readers.
//!
//! Alignment files can outnumber the process file-descriptor budget, so
//! readers are opened lazily and recycled least-recently-used first, with
//! larger files evicted ahead of smaller ones on ties. The pool is the
//! only mutably shared state in the pipeline; a single mutex guards it.

use crate::core::errors::Result;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

struct PoolEntry<R> {
    reader: R,
    file_size: u64,
    last_used: u64,
}

struct PoolInner<R> {
    readers: FxHashMap<PathBuf, PoolEntry<R>>,
    tick: u64,
}

pub struct OpenFilePool<R> {
    max_open_files: usize,
    inner: Mutex<PoolInner<R>>,
}

impl<R> OpenFilePool<R> {
    pub fn new(max_open_files: usize) -> Self {
        OpenFilePool {
            max_open_files: max_open_files.max(1),
            inner: Mutex::new(PoolInner {
                readers: FxHashMap::default(),
                tick: 0,
            }),
        }
    }

    pub fn num_open(&self) -> usize {
        self.inner.lock().readers.len()
    }

    /// Run `f` against the pooled reader for `path`, opening it with
    /// `open` if needed and evicting another reader when the pool is
    /// full.
    pub fn with_reader<T>(
        &self,
        path: &Path,
        open: impl FnOnce(&Path) -> Result<R>,
        f: impl FnOnce(&mut R) -> Result<T>,
    ) -> Result<T> {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;
        if !inner.readers.contains_key(path) {
            if inner.readers.len() >= self.max_open_files {
                // least recently used; ties go to the larger file
                if let Some(victim) = inner
                    .readers
                    .iter()
                    .min_by(|(_, a), (_, b)| {
                        a.last_used
                            .cmp(&b.last_used)
                            .then(b.file_size.cmp(&a.file_size))
                    })
                    .map(|(p, _)| p.clone())
                {
                    log::debug!("closing pooled reader for {}", victim.display());
                    inner.readers.remove(&victim);
                }
            }
            let reader = open(path)?;
            let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            inner.readers.insert(
                path.to_path_buf(),
                PoolEntry {
                    reader,
                    file_size,
                    last_used: tick,
                },
            );
        }
        let entry = inner
            .readers
            .get_mut(path)
            .expect("reader was just inserted");
        entry.last_used = tick;
        f(&mut entry.reader)
    }
}
