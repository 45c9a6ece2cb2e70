//! Appending replies to an existing article.

use tracing::{error, info, warn};

use tack_core::article::{Dir, Sidecar, Timestamp};
use tack_core::config::BoardConfig;
use tack_core::error::BoardError;
use tack_core::render::{render_reply, splice_reply};
use tack_index::IndexManager;
use tack_store::DocumentStore;

/// Splices reply fragments into article documents.
pub struct ReplyAppender<'a> {
    store: &'a DocumentStore,
    index: &'a IndexManager,
    config: &'a BoardConfig,
}

impl<'a> ReplyAppender<'a> {
    pub fn new(store: &'a DocumentStore, index: &'a IndexManager, config: &'a BoardConfig) -> Self {
        Self {
            store,
            index,
            config,
        }
    }

    /// Append `text` as a new reply to article `dir` and bump its recency.
    ///
    /// The document rewrite, the sidecar refresh, and the index update all
    /// happen under the document's lock, so concurrent replies to one
    /// article are applied one at a time and `updated_at` only grows.
    /// Returns the new `updated_at`.
    ///
    /// # Errors
    ///
    /// - [`BoardError::Validation`] for empty or oversized text
    /// - [`BoardError::NotFound`] if the article does not exist, or its
    ///   creation has not committed and is removed again
    /// - [`BoardError::Lock`] if the document lock is not obtained in time
    /// - [`BoardError::MarkerMissing`] if the document has no end marker
    /// - [`BoardError::Write`] if the document cannot be rewritten
    ///
    /// Failing to refresh the sidecar or the index is logged, not returned:
    /// the reply itself is already durable by then.
    pub fn append_reply(&self, dir: Dir, text: &str) -> Result<Timestamp, BoardError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(BoardError::Validation("Reply text is required.".to_string()));
        }
        if text.len() > self.config.max_reply_bytes {
            return Err(BoardError::Validation(format!(
                "Reply exceeds {} bytes.",
                self.config.max_reply_bytes
            )));
        }
        if !self.store.exists(dir)? {
            return Err(BoardError::NotFound(dir));
        }

        let fragment = render_reply(text);
        let _lock = self.store.lock_document(dir, self.config.lock_timeout())?;

        // Creation holds this lock until its commit or its cleanup, and writes
        // the sidecar under it. No sidecar here means the container is not an
        // article yet.
        let sidecar = match self.store.read_sidecar(dir) {
            Ok(Some(sidecar)) => Some(sidecar),
            Ok(None) => {
                info!(%dir, op = "append_reply", "container has no sidecar, not an article");
                return Err(BoardError::NotFound(dir));
            }
            Err(e) => {
                warn!(%dir, op = "append_reply", error = %e, "unreadable sidecar, not refreshing it");
                None
            }
        };

        let document = self.store.read_document(dir)?;
        let Some(updated) = splice_reply(&document, &fragment) else {
            error!(%dir, op = "append_reply", "reply end marker missing; document left untouched");
            return Err(BoardError::MarkerMissing(dir));
        };
        self.store
            .write_document(dir, &updated)
            .map_err(|e| BoardError::write(Some(dir), "write_document", e))?;

        let updated_at = self.refresh_recency(dir, sidecar);
        info!(%dir, op = "append_reply", %updated_at, "reply appended");
        Ok(updated_at)
    }

    /// Best-effort: move the sidecar's and the index's `updated_at`
    /// strictly forward.
    fn refresh_recency(&self, dir: Dir, sidecar: Option<Sidecar>) -> Timestamp {
        let previous = match &sidecar {
            Some(s) => Some(s.updated_at),
            None => self.index.get(dir).ok().flatten().map(|row| row.updated_at),
        };
        let updated_at = previous.map_or_else(Timestamp::now, Timestamp::now_after);

        if let Some(mut sidecar) = sidecar {
            sidecar.updated_at = updated_at;
            if let Err(e) = self.store.write_sidecar(&sidecar) {
                warn!(%dir, op = "append_reply", error = %e, "sidecar refresh failed");
            }
        }

        match self.index.update_timestamp(dir, updated_at) {
            Ok(true) => {}
            Ok(false) => warn!(%dir, op = "append_reply", "no index row to refresh; run `tack reindex`"),
            Err(e) => warn!(%dir, op = "append_reply", error = %e, "index refresh failed, listing order is stale"),
        }
        updated_at
    }
}
