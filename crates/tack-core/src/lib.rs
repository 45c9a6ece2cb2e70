//! # tack-core
//!
//! Core types for the tack content board.
//!
//! This crate defines what every other tack crate shares:
//! - [`Article`] and its identity [`Dir`], with [`Timestamp`] in the
//!   `YYYY-MM-DD HH:MM:SS` form used by sidecars and the index
//! - Error taxonomy ([`BoardError`], [`Result`])
//! - HTML escaping ([`escape`]) and document rendering ([`render`])
//! - Upload classification against the media allow-list ([`media`])
//! - Board limits and timeouts ([`BoardConfig`])

pub mod article;
pub mod config;
pub mod error;
pub mod escape;
pub mod media;
pub mod render;

pub use article::{Article, Dir, ListedArticle, Sidecar, Timestamp};
pub use config::BoardConfig;
pub use error::{BoardError, Result};
pub use media::{Media, MediaKind, MediaUpload};
