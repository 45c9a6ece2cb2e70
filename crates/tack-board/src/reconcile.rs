//! Rebuilding the index from container sidecars.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use tack_core::article::Sidecar;
use tack_core::error::BoardError;
use tack_index::IndexManager;
use tack_store::DocumentStore;

use crate::allocator::WriteGuard;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Rows written from sidecars.
    pub imported: usize,
    /// Containers without a usable sidecar.
    pub skipped: usize,
    /// Rows dropped before importing (reset only).
    pub removed: u64,
}

/// Repopulates the index from the store.
pub struct Reconciler<'a> {
    store: &'a DocumentStore,
    index: &'a mut IndexManager,
    lock_timeout: Duration,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a DocumentStore, index: &'a mut IndexManager, lock_timeout: Duration) -> Self {
        Self {
            store,
            index,
            lock_timeout,
        }
    }

    /// Upsert a row for every container with a valid sidecar.
    ///
    /// Rows with no container are left alone. Running this twice with no
    /// writes in between leaves the index unchanged the second time.
    ///
    /// # Errors
    ///
    /// Fails only if the store cannot be listed, the write lock cannot be
    /// taken, or the index transaction fails. Bad sidecars are skipped.
    pub fn rebuild_index(&mut self) -> Result<ReconcileReport, BoardError> {
        self.run(false)
    }

    /// Drop every row, then rebuild. Rows whose container is gone disappear.
    ///
    /// # Errors
    ///
    /// As [`Reconciler::rebuild_index`]; on failure the old rows are kept.
    pub fn reset_and_rebuild(&mut self) -> Result<ReconcileReport, BoardError> {
        self.run(true)
    }

    fn run(&mut self, reset: bool) -> Result<ReconcileReport, BoardError> {
        // Creation writes the sidecar before its index insert; holding the
        // write lock keeps a half-created article out of the scan. Replies
        // do not take it, so a reply may refresh a row after its sidecar was
        // read; the upsert keeps the newer `updated_at` in that case.
        let _guard = WriteGuard::acquire(self.store, self.lock_timeout)?;

        let (sidecars, skipped) = self.collect_sidecars()?;

        let tx = self.index.transaction()?;
        let removed = if reset { tx.clear()? } else { 0 };
        for sidecar in &sidecars {
            tx.upsert(sidecar)?;
        }
        tx.commit()?;

        let report = ReconcileReport {
            imported: sidecars.len(),
            skipped,
            removed,
        };
        info!(
            op = if reset { "reset_and_rebuild" } else { "rebuild_index" },
            imported = report.imported,
            skipped = report.skipped,
            removed = report.removed,
            "index rebuilt from sidecars"
        );
        Ok(report)
    }

    fn collect_sidecars(&self) -> Result<(Vec<Sidecar>, usize), BoardError> {
        let mut sidecars = Vec::new();
        let mut skipped = 0;
        for dir in self.store.list_dirs()? {
            match self.store.read_sidecar(dir) {
                Ok(Some(sidecar)) if sidecar.dir == dir => sidecars.push(sidecar),
                Ok(Some(sidecar)) => {
                    warn!(%dir, op = "rebuild_index", claimed = %sidecar.dir, "sidecar names another article, skipping");
                    skipped += 1;
                }
                Ok(None) => {
                    warn!(%dir, op = "rebuild_index", "container has no sidecar, skipping");
                    skipped += 1;
                }
                Err(e) => {
                    warn!(%dir, op = "rebuild_index", error = %e, "unreadable sidecar, skipping");
                    skipped += 1;
                }
            }
        }
        Ok((sidecars, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tack_core::article::{Article, Dir, Timestamp};

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn dir(n: u64) -> Dir {
        Dir::new(n).unwrap()
    }

    fn container(store: &DocumentStore, n: u64, subject: &str) -> Article {
        let article = Article::new(dir(n), subject, Timestamp::now());
        store.create_container(dir(n)).unwrap();
        store.write_sidecar(&article).unwrap();
        article
    }

    #[test]
    fn imports_valid_sidecars_and_skips_bad_ones() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DocumentStore::init(tmp.path()).unwrap();
        let mut index = IndexManager::in_memory().unwrap();

        let one = container(&store, 1, "one");
        let three = container(&store, 3, "three");
        store.create_container(dir(4)).unwrap();
        store.create_container(dir(5)).unwrap();
        fs::write(store.sidecar_path(dir(5)), "garbage").unwrap();
        store.create_container(dir(6)).unwrap();
        let foreign = serde_json::to_string(&Article::new(dir(2), "moved", Timestamp::now())).unwrap();
        fs::write(store.sidecar_path(dir(6)), foreign).unwrap();

        let report = Reconciler::new(&store, &mut index, TIMEOUT)
            .rebuild_index()
            .unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped, 3);
        assert_eq!(index.all_rows().unwrap(), vec![one, three]);
    }

    #[test]
    fn rebuild_keeps_unrelated_rows_but_reset_drops_them() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DocumentStore::init(tmp.path()).unwrap();
        let mut index = IndexManager::in_memory().unwrap();
        container(&store, 1, "kept");
        index
            .insert(&Article::new(dir(8), "ghost", Timestamp::now()))
            .unwrap();

        Reconciler::new(&store, &mut index, TIMEOUT)
            .rebuild_index()
            .unwrap();
        assert_eq!(index.count().unwrap(), 2);

        let report = Reconciler::new(&store, &mut index, TIMEOUT)
            .reset_and_rebuild()
            .unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(report.imported, 1);
        assert!(index.get(dir(8)).unwrap().is_none());
    }

    #[test]
    fn sidecar_values_overwrite_stale_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DocumentStore::init(tmp.path()).unwrap();
        let mut index = IndexManager::in_memory().unwrap();
        let article = container(&store, 1, "fresh");
        index
            .insert(&Article {
                subject: "stale".to_string(),
                ..article.clone()
            })
            .unwrap();

        Reconciler::new(&store, &mut index, TIMEOUT)
            .rebuild_index()
            .unwrap();
        assert_eq!(index.get(dir(1)).unwrap(), Some(article));
    }

    #[test]
    fn newer_row_recency_survives_an_older_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DocumentStore::init(tmp.path()).unwrap();
        let mut index = IndexManager::in_memory().unwrap();
        let article = container(&store, 1, "replied");
        let replied_at = Timestamp::now_after(article.updated_at);
        index
            .insert(&Article {
                updated_at: replied_at,
                ..article.clone()
            })
            .unwrap();

        Reconciler::new(&store, &mut index, TIMEOUT)
            .rebuild_index()
            .unwrap();
        let row = index.get(dir(1)).unwrap().unwrap();
        assert_eq!(row.updated_at, replied_at);
        assert_eq!(row.created_at, article.created_at);
    }

    #[test]
    fn waits_for_the_write_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DocumentStore::init(tmp.path()).unwrap();
        let mut index = IndexManager::in_memory().unwrap();
        let _writer = WriteGuard::acquire(&store, TIMEOUT).unwrap();

        let err = Reconciler::new(&store, &mut index, Duration::from_millis(30))
            .rebuild_index()
            .unwrap_err();
        assert!(matches!(err, BoardError::Lock(_)));
    }
}
