//! Error types for tack.

use thiserror::Error;

use crate::article::Dir;

/// Top-level result type for tack operations.
pub type Result<T> = std::result::Result<T, BoardError>;

/// Top-level error type for tack.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("article {0} not found")]
    NotFound(Dir),

    #[error("reply marker missing from document of article {0}")]
    MarkerMissing(Dir),

    #[error("lock error: {0}")]
    Lock(String),

    #[error("write error during {op}{}: {message}", of_article(.dir))]
    Write {
        dir: Option<Dir>,
        op: &'static str,
        message: String,
    },

    #[error("allocation error: {0}")]
    Allocation(String),

    #[error("article {0} already exists in the index")]
    DuplicateDir(Dir),

    #[error("index error: {0}")]
    Index(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("config error: {0}")]
    Config(String),
}

fn of_article(dir: &Option<Dir>) -> String {
    dir.map(|d| format!(" of article {d}")).unwrap_or_default()
}

impl BoardError {
    /// Wrap any displayable failure as a [`BoardError::Write`].
    pub fn write(dir: Option<Dir>, op: &'static str, err: impl std::fmt::Display) -> Self {
        BoardError::Write {
            dir,
            op,
            message: err.to_string(),
        }
    }

    /// True for failures the caller can correct by changing the request.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            BoardError::Validation(_) | BoardError::UnsupportedMedia(_) | BoardError::NotFound(_)
        )
    }

    /// Message safe to show to the requester.
    ///
    /// User errors carry their detail; internal failures collapse to a
    /// generic text so storage paths and driver messages stay in the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            BoardError::Validation(msg) => msg.clone(),
            BoardError::UnsupportedMedia(mime) => format!("Unsupported file type: {mime}"),
            BoardError::NotFound(_) => "Article not found.".to_string(),
            BoardError::MarkerMissing(_) => "Reply section not found.".to_string(),
            _ => "Internal error.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_keep_their_detail() {
        let err = BoardError::Validation("Subject and content are required.".to_string());
        assert!(err.is_user_error());
        assert_eq!(err.public_message(), "Subject and content are required.");

        let err = BoardError::UnsupportedMedia("application/pdf".to_string());
        assert!(err.is_user_error());
        assert!(err.public_message().contains("application/pdf"));
    }

    #[test]
    fn internal_errors_are_reported_generically() {
        let err = BoardError::write(
            Some(Dir::new(4).unwrap()),
            "write_document",
            "disk full at /srv/articles/4/index.html",
        );
        assert!(!err.is_user_error());
        assert_eq!(err.public_message(), "Internal error.");
        let detail = err.to_string();
        assert!(detail.contains("article 4"));
        assert!(detail.contains("disk full"));

        let err = BoardError::Lock("timed out".to_string());
        assert_eq!(err.public_message(), "Internal error.");
    }

    #[test]
    fn write_error_without_dir_omits_article() {
        let err = BoardError::write(None, "lock_writes", "boom");
        assert_eq!(err.to_string(), "write error during lock_writes: boom");
    }
}
