//! # tack-board
//!
//! Article operations over one board: allocation, creation, replies, and
//! index reconciliation.
//!
//! A [`Board`] owns the storage clients for one request or command. It is
//! opened explicitly, handed to the operations that need it, and closes
//! everything when dropped:
//! ```no_run
//! # fn main() -> tack_core::Result<()> {
//! let mut board = tack_board::Board::open(std::path::Path::new("/srv/board"))?;
//! let dir = board.create_article(&tack_board::ArticleDraft::new("Hello", "World"))?;
//! board.append_reply(dir, "Nice post!")?;
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod reconcile;
pub mod reply;
pub mod writer;

use std::fs;
use std::path::Path;

use tracing::info;

use tack_core::article::{Article, Dir, ListedArticle, Timestamp};
use tack_core::config::BoardConfig;
use tack_core::error::BoardError;
use tack_core::render::count_replies;
use tack_index::IndexManager;
use tack_store::DocumentStore;

pub use allocator::{Allocator, WriteGuard};
pub use reconcile::{ReconcileReport, Reconciler};
pub use reply::ReplyAppender;
pub use writer::{ArticleDraft, ArticleWriter};

pub const CONFIG_FILE: &str = "config.toml";
pub const INDEX_FILE: &str = "index.db";

/// Storage clients and limits for one board.
pub struct Board {
    store: DocumentStore,
    index: IndexManager,
    config: BoardConfig,
}

impl Board {
    /// Create the board layout under `root` if needed, write a default
    /// config when none exists, and open it.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Io`], [`BoardError::Config`], or
    /// [`BoardError::Index`] if any part cannot be created.
    pub fn init(root: &Path) -> Result<Self, BoardError> {
        let store = DocumentStore::init(root)?;
        let config_path = store.state_dir().join(CONFIG_FILE);
        if !config_path.exists() {
            fs::write(&config_path, BoardConfig::default().to_toml()?)?;
            info!(path = %config_path.display(), "wrote default config");
        }
        Self::open(root)
    }

    /// Open an initialized board, reading `.tack/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Store`] if `root` is not a board, or
    /// [`BoardError::Config`] / [`BoardError::Index`] on bad state.
    pub fn open(root: &Path) -> Result<Self, BoardError> {
        let store = DocumentStore::open(root)?;
        let config = BoardConfig::load(&store.state_dir().join(CONFIG_FILE))?;
        Self::assemble(store, config)
    }

    /// Open an initialized board with an explicit config, ignoring the file.
    ///
    /// # Errors
    ///
    /// As [`Board::open`], plus [`BoardError::Config`] if `config` is invalid.
    pub fn open_with_config(root: &Path, config: BoardConfig) -> Result<Self, BoardError> {
        config.validate()?;
        Self::assemble(DocumentStore::open(root)?, config)
    }

    fn assemble(store: DocumentStore, config: BoardConfig) -> Result<Self, BoardError> {
        let index = IndexManager::open(&store.state_dir().join(INDEX_FILE), config.lock_timeout())?;
        Ok(Self {
            store,
            index,
            config,
        })
    }

    #[must_use]
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    #[must_use]
    pub fn index(&self) -> &IndexManager {
        &self.index
    }

    #[must_use]
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn writer(&mut self) -> ArticleWriter<'_> {
        ArticleWriter::new(&self.store, &mut self.index, &self.config)
    }

    pub fn replies(&self) -> ReplyAppender<'_> {
        ReplyAppender::new(&self.store, &self.index, &self.config)
    }

    pub fn reconciler(&mut self) -> Reconciler<'_> {
        Reconciler::new(&self.store, &mut self.index, self.config.lock_timeout())
    }

    /// See [`ArticleWriter::create_article`].
    ///
    /// # Errors
    ///
    /// As [`ArticleWriter::create_article`].
    pub fn create_article(&mut self, draft: &ArticleDraft) -> Result<Dir, BoardError> {
        self.writer().create_article(draft)
    }

    /// See [`ReplyAppender::append_reply`].
    ///
    /// # Errors
    ///
    /// As [`ReplyAppender::append_reply`].
    pub fn append_reply(&self, dir: Dir, text: &str) -> Result<Timestamp, BoardError> {
        self.replies().append_reply(dir, text)
    }

    /// See [`Reconciler::rebuild_index`].
    ///
    /// # Errors
    ///
    /// As [`Reconciler::rebuild_index`].
    pub fn rebuild_index(&mut self) -> Result<ReconcileReport, BoardError> {
        self.reconciler().rebuild_index()
    }

    /// See [`Reconciler::reset_and_rebuild`].
    ///
    /// # Errors
    ///
    /// As [`Reconciler::reset_and_rebuild`].
    pub fn reset_and_rebuild(&mut self) -> Result<ReconcileReport, BoardError> {
        self.reconciler().reset_and_rebuild()
    }

    /// All articles, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Index`] if the index cannot be read.
    pub fn list(&self) -> Result<Vec<ListedArticle>, BoardError> {
        self.index.list_all_ordered()
    }

    /// The index row for one article.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if the index has no row for `dir`.
    pub fn article(&self, dir: Dir) -> Result<Article, BoardError> {
        self.index.get(dir)?.ok_or(BoardError::NotFound(dir))
    }

    /// Number of replies stored in one article's document.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::NotFound`] if the document does not exist and
    /// [`BoardError::MarkerMissing`] if it has no reply region.
    pub fn reply_count(&self, dir: Dir) -> Result<usize, BoardError> {
        let document = self.store.read_document(dir)?;
        count_replies(&document).ok_or(BoardError::MarkerMissing(dir))
    }
}
