//! # tack-index
//!
//! SQLite listing index for tack.
//!
//! Holds one summary row per article (`dir`, subject, timestamps) so the
//! board can be listed by recency without touching the article store. The
//! table is a derived cache: every row can be rebuilt from container
//! sidecars.

use std::path::Path;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;

use tack_core::article::{Article, Dir, ListedArticle, Timestamp};
use tack_core::error::BoardError;

fn index_err(e: rusqlite::Error) -> BoardError {
    BoardError::Index(e.to_string())
}

/// The IndexManager owns the connection to the index database.
pub struct IndexManager {
    conn: Connection,
}

impl IndexManager {
    /// Open or create an index database at the given path.
    ///
    /// `busy_timeout` bounds how long a statement waits for another
    /// connection's write lock.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the database cannot be opened.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, BoardError> {
        let conn = Connection::open(path).map_err(index_err)?;
        conn.busy_timeout(busy_timeout).map_err(index_err)?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(index_err)?;
        debug!(path = %path.display(), journal_mode = %mode, "opened index");
        let mgr = Self { conn };
        mgr.create_schema()?;
        Ok(mgr)
    }

    /// Create an in-memory index (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if schema creation fails.
    pub fn in_memory() -> Result<Self, BoardError> {
        let conn = Connection::open_in_memory().map_err(index_err)?;
        let mgr = Self { conn };
        mgr.create_schema()?;
        Ok(mgr)
    }

    fn create_schema(&self) -> Result<(), BoardError> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dir INTEGER NOT NULL UNIQUE CHECK (dir > 0),
                subject TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                activity INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_articles_updated_at ON articles(updated_at);
            ",
            )
            .map_err(index_err)?;

        Ok(())
    }

    /// Insert a new row.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::DuplicateDir`] if a row for `article.dir`
    /// already exists, [`BoardError::Index`] on other failures.
    pub fn insert(&self, article: &Article) -> Result<(), BoardError> {
        insert_row(&self.conn, article)
    }

    /// Insert or replace the row for `article.dir`. An existing newer
    /// `updated_at` is kept: a reply that lands while a sidecar snapshot is
    /// being imported must not lose its recency.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the write fails.
    pub fn upsert(&self, article: &Article) -> Result<(), BoardError> {
        upsert_row(&self.conn, article)
    }

    /// Set `updated_at` for one article. Returns `false` if no row matched.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the update fails.
    pub fn update_timestamp(&self, dir: Dir, updated_at: Timestamp) -> Result<bool, BoardError> {
        let changed = self
            .conn
            .execute(
                "UPDATE articles
                 SET updated_at = ?1, activity = (SELECT COALESCE(MAX(activity), 0) + 1 FROM articles)
                 WHERE dir = ?2",
                params![updated_at.to_string(), dir_param(dir)?],
            )
            .map_err(index_err)?;
        Ok(changed > 0)
    }

    /// Listing order: most recently updated first. Rows updated within the
    /// same second are ordered by which was touched last.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the query fails.
    pub fn list_all_ordered(&self) -> Result<Vec<ListedArticle>, BoardError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT dir, subject
                 FROM articles
                 ORDER BY updated_at DESC, activity DESC",
            )
            .map_err(index_err)?;

        let raw = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(index_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(index_err)?;

        raw.into_iter()
            .map(|(dir, subject)| {
                Ok(ListedArticle {
                    dir: dir_from_column(dir)?,
                    subject,
                })
            })
            .collect()
    }

    /// Highest `dir` in the index, `None` when empty.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the query fails.
    pub fn max_dir(&self) -> Result<Option<Dir>, BoardError> {
        let max: Option<i64> = self
            .conn
            .query_row("SELECT MAX(dir) FROM articles", [], |row| row.get(0))
            .map_err(index_err)?;
        max.map(dir_from_column).transpose()
    }

    /// Fetch one row.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the query fails or the row is malformed.
    pub fn get(&self, dir: Dir) -> Result<Option<Article>, BoardError> {
        let raw = self
            .conn
            .query_row(
                "SELECT dir, subject, created_at, updated_at FROM articles WHERE dir = ?1",
                params![dir_param(dir)?],
                raw_row,
            )
            .optional()
            .map_err(index_err)?;
        raw.map(article_from_raw).transpose()
    }

    /// Every row ordered by `dir`, for comparing index states.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the query fails or a row is malformed.
    pub fn all_rows(&self) -> Result<Vec<Article>, BoardError> {
        let mut stmt = self
            .conn
            .prepare("SELECT dir, subject, created_at, updated_at FROM articles ORDER BY dir")
            .map_err(index_err)?;
        let raw = stmt
            .query_map([], raw_row)
            .map_err(index_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(index_err)?;
        raw.into_iter().map(article_from_raw).collect()
    }

    /// Get count of indexed articles.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the query fails.
    pub fn count(&self) -> Result<u64, BoardError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))
            .map_err(index_err)?;
        Ok(count as u64)
    }

    /// Start a transaction. Dropping the returned handle without calling
    /// [`IndexTx::commit`] rolls everything back.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the transaction cannot begin.
    pub fn transaction(&mut self) -> Result<IndexTx<'_>, BoardError> {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
            .map_err(index_err)?;
        Ok(IndexTx { tx })
    }
}

/// Writes grouped into one all-or-nothing unit.
pub struct IndexTx<'a> {
    tx: Transaction<'a>,
}

impl IndexTx<'_> {
    /// See [`IndexManager::insert`].
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::DuplicateDir`] or [`BoardError::Index`].
    pub fn insert(&self, article: &Article) -> Result<(), BoardError> {
        insert_row(&self.tx, article)
    }

    /// See [`IndexManager::upsert`].
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the write fails.
    pub fn upsert(&self, article: &Article) -> Result<(), BoardError> {
        upsert_row(&self.tx, article)
    }

    /// Delete every row.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the delete fails.
    pub fn clear(&self) -> Result<u64, BoardError> {
        let removed = self
            .tx
            .execute("DELETE FROM articles", [])
            .map_err(index_err)?;
        Ok(removed as u64)
    }

    /// Make every write in this transaction durable.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the commit fails; nothing is applied.
    pub fn commit(self) -> Result<(), BoardError> {
        self.tx.commit().map_err(index_err)
    }

    /// Discard every write in this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the rollback fails.
    pub fn rollback(self) -> Result<(), BoardError> {
        self.tx.rollback().map_err(index_err)
    }
}

type RawRow = (i64, String, String, String);

fn raw_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn article_from_raw((dir, subject, created_at, updated_at): RawRow) -> Result<Article, BoardError> {
    Ok(Article {
        dir: dir_from_column(dir)?,
        subject,
        created_at: Timestamp::parse(&created_at)?,
        updated_at: Timestamp::parse(&updated_at)?,
    })
}

fn dir_from_column(value: i64) -> Result<Dir, BoardError> {
    u64::try_from(value)
        .ok()
        .and_then(Dir::new)
        .ok_or_else(|| BoardError::Index(format!("invalid dir in index: {value}")))
}

fn dir_param(dir: Dir) -> Result<i64, BoardError> {
    i64::try_from(dir.get())
        .map_err(|_| BoardError::Index(format!("dir {dir} exceeds the index key range")))
}

fn insert_row(conn: &Connection, article: &Article) -> Result<(), BoardError> {
    conn.execute(
        "INSERT INTO articles (dir, subject, created_at, updated_at, activity)
         VALUES (?1, ?2, ?3, ?4, (SELECT COALESCE(MAX(activity), 0) + 1 FROM articles))",
        params![
            dir_param(article.dir)?,
            article.subject,
            article.created_at.to_string(),
            article.updated_at.to_string(),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref f, _)
            if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            BoardError::DuplicateDir(article.dir)
        }
        other => index_err(other),
    })?;
    debug!(dir = %article.dir, "inserted index row");
    Ok(())
}

fn upsert_row(conn: &Connection, article: &Article) -> Result<(), BoardError> {
    conn.execute(
        "INSERT INTO articles (dir, subject, created_at, updated_at, activity)
         VALUES (?1, ?2, ?3, ?4, (SELECT COALESCE(MAX(activity), 0) + 1 FROM articles))
         ON CONFLICT(dir) DO UPDATE SET
             subject = excluded.subject,
             created_at = excluded.created_at,
             updated_at = MAX(articles.updated_at, excluded.updated_at),
             activity = CASE WHEN excluded.updated_at < articles.updated_at
                             THEN articles.activity ELSE excluded.activity END",
        params![
            dir_param(article.dir)?,
            article.subject,
            article.created_at.to_string(),
            article.updated_at.to_string(),
        ],
    )
    .map_err(index_err)?;
    Ok(())
}
