//! Article creation.
//!
//! Creation is all-or-nothing. Inputs are validated and media classified
//! before anything is written; the container, asset, document, and sidecar
//! are written under the board write lock and the new document's lock; the
//! index insert commits last. If any step after the container exists fails,
//! the container is removed again, still under both locks, and the index
//! transaction is rolled back.

use std::io::ErrorKind;

use tracing::{error, info, warn};

use tack_core::article::{Article, Dir, Timestamp};
use tack_core::config::BoardConfig;
use tack_core::error::BoardError;
use tack_core::media::{self, Media, MediaUpload};
use tack_core::render::{render_article, ArticlePage};
use tack_index::IndexManager;
use tack_store::DocumentStore;

use crate::allocator::{Allocator, WriteGuard};

/// A submission for a new article.
#[derive(Debug, Clone, Default)]
pub struct ArticleDraft {
    pub subject: String,
    pub body: String,
    pub media: Option<MediaUpload>,
}

impl ArticleDraft {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            media: None,
        }
    }

    #[must_use]
    pub fn with_media(mut self, upload: MediaUpload) -> Self {
        self.media = Some(upload);
        self
    }
}

/// Validated, trimmed submission.
struct Checked<'d> {
    subject: &'d str,
    body: &'d str,
    media: Option<(Media, &'d [u8])>,
}

/// Creates articles on one board.
pub struct ArticleWriter<'a> {
    store: &'a DocumentStore,
    index: &'a mut IndexManager,
    config: &'a BoardConfig,
}

impl<'a> ArticleWriter<'a> {
    pub fn new(store: &'a DocumentStore, index: &'a mut IndexManager, config: &'a BoardConfig) -> Self {
        Self {
            store,
            index,
            config,
        }
    }

    /// Create an article and return its directory number.
    ///
    /// # Errors
    ///
    /// - [`BoardError::Validation`] for empty or oversized input
    /// - [`BoardError::UnsupportedMedia`] for media outside the allow-list
    /// - [`BoardError::Lock`] if the write lock is not obtained in time
    /// - [`BoardError::Allocation`] or [`BoardError::Write`] on storage or
    ///   index failure, after which nothing of the article remains
    pub fn create_article(&mut self, draft: &ArticleDraft) -> Result<Dir, BoardError> {
        let checked = self.check(draft)?;

        let guard = WriteGuard::acquire(self.store, self.config.lock_timeout())?;
        let dir = self.reserve(&guard)?;

        // Replies wait on the document lock; they see either the committed
        // article or no container at all.
        let (document_lock, outcome) = match self.store.lock_document(dir, self.config.lock_timeout()) {
            Ok(lock) => (Some(lock), self.populate_and_commit(dir, &checked)),
            Err(e) => (None, Err(BoardError::write(Some(dir), "lock_document", e))),
        };

        let result = match outcome {
            Ok(article) => {
                info!(
                    %dir,
                    op = "create_article",
                    subject = %article.subject,
                    media = checked.media.as_ref().map(|(m, _)| m.mime).unwrap_or("none"),
                    "article created"
                );
                Ok(dir)
            }
            Err(e) => {
                error!(%dir, op = "create_article", error = %e, "creation failed, removing container");
                if let Err(cleanup) = self.store.remove_container(dir) {
                    error!(
                        %dir,
                        op = "create_article",
                        error = %cleanup,
                        "could not remove container; run `tack reindex` after fixing it by hand"
                    );
                }
                Err(e)
            }
        };
        drop(document_lock);
        result
    }

    fn check<'d>(&self, draft: &'d ArticleDraft) -> Result<Checked<'d>, BoardError> {
        let subject = draft.subject.trim();
        let body = draft.body.trim();
        if subject.is_empty() || body.is_empty() {
            return Err(BoardError::Validation(
                "Subject and content are required.".to_string(),
            ));
        }
        let subject_chars = subject.chars().count();
        if subject_chars > self.config.max_subject_chars {
            return Err(BoardError::Validation(format!(
                "Subject is {subject_chars} characters; the limit is {}.",
                self.config.max_subject_chars
            )));
        }
        if body.len() > self.config.max_body_bytes {
            return Err(BoardError::Validation(format!(
                "Content exceeds {} bytes.",
                self.config.max_body_bytes
            )));
        }

        let media = match &draft.media {
            None => None,
            Some(upload) => {
                if upload.bytes.len() > self.config.max_media_bytes {
                    return Err(BoardError::Validation(format!(
                        "Uploaded file exceeds {} bytes.",
                        self.config.max_media_bytes
                    )));
                }
                Some((media::classify(upload)?, upload.bytes.as_slice()))
            }
        };

        Ok(Checked {
            subject,
            body,
            media,
        })
    }

    /// Allocate a number and create its container, moving past names that
    /// turn out to be taken at creation time.
    fn reserve(&self, guard: &WriteGuard) -> Result<Dir, BoardError> {
        let allocator = Allocator::new(self.store, &*self.index);
        let mut candidate = allocator.allocate(guard)?;

        for _ in 0..=self.config.allocation_retries {
            match self.store.create_container(candidate) {
                Ok(()) => return Ok(candidate),
                Err(BoardError::Io(e)) if e.kind() == ErrorKind::AlreadyExists => {
                    warn!(dir = %candidate, op = "create_article", "container appeared after allocation, retrying");
                    candidate = allocator.first_free_from(candidate.next()?, guard)?;
                }
                Err(e) => return Err(BoardError::write(Some(candidate), "create_container", e)),
            }
        }

        Err(BoardError::Allocation(format!(
            "no free container after {} collisions",
            self.config.allocation_retries + 1
        )))
    }

    fn populate_and_commit(&mut self, dir: Dir, checked: &Checked<'_>) -> Result<Article, BoardError> {
        if let Some((media, bytes)) = &checked.media {
            self.store
                .write_asset(dir, bytes, media.extension)
                .map_err(|e| BoardError::write(Some(dir), "write_asset", e))?;
        }

        let html = render_article(&ArticlePage {
            dir,
            subject: checked.subject,
            body: checked.body,
            media: checked.media.as_ref().map(|(m, _)| m),
        });
        self.store
            .write_document(dir, &html)
            .map_err(|e| BoardError::write(Some(dir), "write_document", e))?;

        let article = Article::new(dir, checked.subject, Timestamp::now());
        self.store
            .write_sidecar(&article)
            .map_err(|e| BoardError::write(Some(dir), "write_sidecar", e))?;

        let tx = self
            .index
            .transaction()
            .map_err(|e| BoardError::write(Some(dir), "index_insert", e))?;
        tx.insert(&article)
            .map_err(|e| BoardError::write(Some(dir), "index_insert", e))?;
        tx.commit()
            .map_err(|e| BoardError::write(Some(dir), "index_commit", e))?;

        Ok(article)
    }
}
