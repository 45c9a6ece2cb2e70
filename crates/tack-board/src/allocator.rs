//! Directory number allocation.
//!
//! Numbers come from a scan, not an atomic counter: start one past the
//! highest number the index knows and skip every number the store already
//! has a container for. That is only collision-free while no other writer
//! runs the same scan, so allocation demands a [`WriteGuard`].

use std::time::Duration;

use tracing::debug;

use tack_core::article::Dir;
use tack_core::error::BoardError;
use tack_index::IndexManager;
use tack_store::{DocumentStore, FileLock};

/// Proof that the board-wide write lock is held. Released on drop.
#[derive(Debug)]
pub struct WriteGuard {
    _lock: FileLock,
}

impl WriteGuard {
    /// Block (up to `timeout`) until no other writer holds the lock.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Lock`] on timeout.
    pub fn acquire(store: &DocumentStore, timeout: Duration) -> Result<Self, BoardError> {
        let lock = store.lock_writes(timeout)?;
        Ok(Self { _lock: lock })
    }
}

/// Picks the directory number for the next article.
pub struct Allocator<'a> {
    store: &'a DocumentStore,
    index: &'a IndexManager,
}

impl<'a> Allocator<'a> {
    pub fn new(store: &'a DocumentStore, index: &'a IndexManager) -> Self {
        Self { store, index }
    }

    /// First free number after the index's maximum (1 on an empty index).
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Allocation`] if the index or the store cannot
    /// be read.
    pub fn allocate(&self, guard: &WriteGuard) -> Result<Dir, BoardError> {
        let start = match self
            .index
            .max_dir()
            .map_err(|e| BoardError::Allocation(format!("reading highest index number: {e}")))?
        {
            Some(max) => max.next()?,
            None => Dir::FIRST,
        };
        self.first_free_from(start, guard)
    }

    /// First number `>= start` with no container in the store.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Allocation`] if the store cannot be checked.
    pub fn first_free_from(&self, start: Dir, _guard: &WriteGuard) -> Result<Dir, BoardError> {
        let mut candidate = start;
        while self
            .store
            .exists(candidate)
            .map_err(|e| BoardError::Allocation(format!("checking container {candidate}: {e}")))?
        {
            debug!(dir = %candidate, "container taken, skipping");
            candidate = candidate.next()?;
        }
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tack_core::article::{Article, Timestamp};

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn dir(n: u64) -> Dir {
        Dir::new(n).unwrap()
    }

    fn setup() -> (tempfile::TempDir, DocumentStore, IndexManager) {
        let tmp = tempfile::tempdir().unwrap();
        let store = DocumentStore::init(tmp.path()).unwrap();
        let index = IndexManager::in_memory().unwrap();
        (tmp, store, index)
    }

    #[test]
    fn empty_board_starts_at_one() {
        let (_tmp, store, index) = setup();
        let guard = WriteGuard::acquire(&store, TIMEOUT).unwrap();
        assert_eq!(Allocator::new(&store, &index).allocate(&guard).unwrap(), dir(1));
    }

    #[test]
    fn starts_past_index_maximum() {
        let (_tmp, store, index) = setup();
        index
            .insert(&Article::new(dir(7), "seven", Timestamp::now()))
            .unwrap();
        let guard = WriteGuard::acquire(&store, TIMEOUT).unwrap();
        assert_eq!(Allocator::new(&store, &index).allocate(&guard).unwrap(), dir(8));
    }

    #[test]
    fn skips_containers_unknown_to_the_index() {
        let (_tmp, store, index) = setup();
        for n in [1, 2, 4] {
            store.create_container(dir(n)).unwrap();
        }
        let guard = WriteGuard::acquire(&store, TIMEOUT).unwrap();
        let got = Allocator::new(&store, &index).allocate(&guard).unwrap();
        assert_eq!(got, dir(3));
        assert!(!store.exists(got).unwrap());
    }

    #[test]
    fn write_guard_excludes_a_second_writer() {
        let (_tmp, store, _index) = setup();
        let _guard = WriteGuard::acquire(&store, TIMEOUT).unwrap();
        assert!(matches!(
            WriteGuard::acquire(&store, Duration::from_millis(30)),
            Err(BoardError::Lock(_))
        ));
    }
}
