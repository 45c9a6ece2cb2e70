//! # tack-store
//!
//! File system document store for tack.
//!
//! The store is the authoritative source of truth. Each article lives in a
//! numbered container directory:
//! ```text
//! <root>/articles/<dir>/index.html      rendered document
//! <root>/articles/<dir>/metadata.json   sidecar
//! <root>/articles/<dir>/media.<ext>     optional asset
//! ```
//! Board state (config, index database, write lock) lives in `<root>/.tack/`.
//! The index is a derived cache that can be rebuilt from sidecars.

pub mod lock;

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use tack_core::article::{Dir, Sidecar};
use tack_core::error::BoardError;

pub use lock::FileLock;

pub const ARTICLES_DIR: &str = "articles";
pub const STATE_DIR: &str = ".tack";
pub const DOCUMENT_FILE: &str = "index.html";
pub const SIDECAR_FILE: &str = "metadata.json";
const DOCUMENT_LOCK_FILE: &str = ".index.html.lock";
const WRITE_LOCK_FILE: &str = "write.lock";

/// Handle on a board's directory tree.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
    articles: PathBuf,
}

impl DocumentStore {
    /// Create the directory layout under `root` (idempotent) and open it.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Io`] if the directories cannot be created.
    pub fn init(root: &Path) -> Result<Self, BoardError> {
        fs::create_dir_all(root.join(ARTICLES_DIR))?;
        fs::create_dir_all(root.join(STATE_DIR))?;
        Self::open(root)
    }

    /// Open an existing layout.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if `root` has no articles directory.
    pub fn open(root: &Path) -> Result<Self, BoardError> {
        let articles = root.join(ARTICLES_DIR);
        if !articles.is_dir() {
            return Err(BoardError::Store(format!(
                "{} is not a board (no {ARTICLES_DIR}/ directory); run `tack init`",
                root.display()
            )));
        }
        Ok(Self {
            root: root.to_path_buf(),
            articles,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    #[must_use]
    pub fn container_path(&self, dir: Dir) -> PathBuf {
        self.articles.join(dir.to_string())
    }

    #[must_use]
    pub fn document_path(&self, dir: Dir) -> PathBuf {
        self.container_path(dir).join(DOCUMENT_FILE)
    }

    #[must_use]
    pub fn sidecar_path(&self, dir: Dir) -> PathBuf {
        self.container_path(dir).join(SIDECAR_FILE)
    }

    /// Whether a container exists for `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Io`] if existence cannot be determined.
    pub fn exists(&self, dir: Dir) -> Result<bool, BoardError> {
        match fs::metadata(self.container_path(dir)) {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BoardError::Io(e)),
        }
    }

    /// Create the container directory for `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Io`] with kind [`ErrorKind::AlreadyExists`] if
    /// anything already occupies the name.
    pub fn create_container(&self, dir: Dir) -> Result<(), BoardError> {
        fs::create_dir(self.container_path(dir))?;
        debug!(%dir, "created container");
        Ok(())
    }

    /// Delete a container and everything in it.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Io`] if removal fails; a missing container is
    /// not an error.
    pub fn remove_container(&self, dir: Dir) -> Result<(), BoardError> {
        match fs::remove_dir_all(self.container_path(dir)) {
            Ok(()) => {
                debug!(%dir, "removed container");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BoardError::Io(e)),
        }
    }

    /// Replace the rendered document.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Io`] if the write fails.
    pub fn write_document(&self, dir: Dir, content: &str) -> Result<(), BoardError> {
        atomic_write(&self.document_path(dir), content.as_bytes())
    }

    /// Read the rendered document.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if there is no document for `dir`.
    pub fn read_document(&self, dir: Dir) -> Result<String, BoardError> {
        fs::read_to_string(self.document_path(dir)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => BoardError::NotFound(dir),
            _ => BoardError::Io(e),
        })
    }

    /// Write the sidecar as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Serialization`] or [`BoardError::Io`].
    pub fn write_sidecar(&self, sidecar: &Sidecar) -> Result<(), BoardError> {
        let json = serde_json::to_string_pretty(sidecar)
            .map_err(|e| BoardError::Serialization(e.to_string()))?;
        atomic_write(&self.sidecar_path(sidecar.dir), json.as_bytes())
    }

    /// Read the sidecar. `Ok(None)` when the container has none.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Serialization`] if the sidecar is corrupt.
    pub fn read_sidecar(&self, dir: Dir) -> Result<Option<Sidecar>, BoardError> {
        let text = match fs::read_to_string(self.sidecar_path(dir)) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BoardError::Io(e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| BoardError::Serialization(format!("sidecar of article {dir}: {e}")))
    }

    /// Store a media asset as `media.<extension>`. Returns its file name.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] for an unsafe extension and
    /// [`BoardError::Io`] if the write fails.
    pub fn write_asset(&self, dir: Dir, bytes: &[u8], extension: &str) -> Result<String, BoardError> {
        if extension.is_empty() || !extension.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(BoardError::Store(format!(
                "refusing media extension {extension:?}"
            )));
        }
        let name = format!("media.{extension}");
        atomic_write(&self.container_path(dir).join(&name), bytes)?;
        Ok(name)
    }

    /// All container numbers, ascending. Entries whose name is not a
    /// canonical positive integer, and plain files, are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Io`] if the articles directory cannot be read.
    pub fn list_dirs(&self) -> Result<Vec<Dir>, BoardError> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.articles)? {
            let entry = entry?;
            let Some(dir) = entry.file_name().to_str().and_then(Dir::parse) else {
                continue;
            };
            if entry.file_type()?.is_dir() {
                dirs.push(dir);
            }
        }
        dirs.sort_unstable();
        Ok(dirs)
    }

    /// Exclusive lock serializing every article creation on this board.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Lock`] on timeout.
    pub fn lock_writes(&self, timeout: Duration) -> Result<FileLock, BoardError> {
        FileLock::acquire(&self.state_dir().join(WRITE_LOCK_FILE), timeout)
    }

    /// Exclusive lock on one article's document.
    ///
    /// The lock lives in its own file because document rewrites replace the
    /// document's inode.
    ///
    /// # Errors
    ///
    /// Never creates the container. If the container is removed while the
    /// caller waits, the lock is refused rather than handed out on a file
    /// that no longer guards anything.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if the container does not exist or
    /// disappears during the wait, and [`BoardError::Lock`] on timeout.
    pub fn lock_document(&self, dir: Dir, timeout: Duration) -> Result<FileLock, BoardError> {
        if !self.exists(dir)? {
            return Err(BoardError::NotFound(dir));
        }
        let lock = FileLock::acquire(&self.container_path(dir).join(DOCUMENT_LOCK_FILE), timeout)
            .map_err(|e| match e {
                BoardError::Io(ref io) if io.kind() == ErrorKind::NotFound => BoardError::NotFound(dir),
                other => other,
            })?;
        if !lock.is_current()? {
            debug!(%dir, "container removed while waiting for its lock");
            return Err(BoardError::NotFound(dir));
        }
        Ok(lock)
    }
}

/// Write through a temp file in the target's directory, then rename over
/// the target, so readers see either the old or the new content.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), BoardError> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempfile_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_data()?;
    tmp.persist(path).map_err(|e| BoardError::Io(e.error))?;
    Ok(())
}
