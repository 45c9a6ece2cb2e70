//! Media classification against the upload allow-list.
//!
//! The type is taken from the content's leading bytes where they are
//! recognisable; the client's declared type is only consulted when the
//! content says nothing.

use crate::error::BoardError;

/// Accepted MIME types and the extension the asset is stored under.
pub const ALLOWED_MEDIA: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
];

/// How an asset is embedded in the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// A classified upload, ready to be stored as `media.<extension>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub mime: &'static str,
    pub extension: &'static str,
    pub kind: MediaKind,
}

impl Media {
    /// File name of the stored asset inside its container.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("media.{}", self.extension)
    }
}

/// Raw upload as received from the client.
#[derive(Debug, Clone, Default)]
pub struct MediaUpload {
    pub bytes: Vec<u8>,
    pub declared_type: Option<String>,
}

/// Identify a MIME type from magic bytes.
///
/// Recognises more than the allow-list (QuickTime, Matroska, PDF, ...) so
/// that a disallowed file cannot slip through on a permissive declared type.
#[must_use]
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    const EBML: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];

    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(PNG) {
        return Some("image/png");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return Some(match &bytes[8..12] {
            b"isom" | b"iso2" | b"iso4" | b"iso5" | b"iso6" | b"mp41" | b"mp42" | b"avc1"
            | b"dash" | b"mmp4" => "video/mp4",
            b"qt  " => "video/quicktime",
            b"M4V " | b"M4VH" | b"M4VP" => "video/x-m4v",
            brand if brand.starts_with(b"3g") => "video/3gpp",
            _ => "application/octet-stream",
        });
    }
    if bytes.starts_with(EBML) {
        let header = &bytes[..bytes.len().min(64)];
        return Some(if header.windows(4).any(|w| w == b"webm") {
            "video/webm"
        } else {
            "video/x-matroska"
        });
    }
    if bytes.starts_with(b"%PDF-") {
        return Some("application/pdf");
    }
    None
}

/// Classify an upload against [`ALLOWED_MEDIA`].
///
/// # Errors
///
/// Returns [`BoardError::Validation`] for an empty upload and
/// [`BoardError::UnsupportedMedia`] when the resolved type is not allowed.
pub fn classify(upload: &MediaUpload) -> Result<Media, BoardError> {
    if upload.bytes.is_empty() {
        return Err(BoardError::Validation("Uploaded file is empty.".to_string()));
    }

    let declared = upload.declared_type.as_deref().map(normalize_mime);
    let mime = match (sniff_mime(&upload.bytes), declared.as_deref()) {
        (Some(sniffed), _) => sniffed.to_string(),
        (None, Some(declared)) if !declared.is_empty() => declared.to_string(),
        _ => "application/octet-stream".to_string(),
    };

    ALLOWED_MEDIA
        .iter()
        .find(|(allowed, _)| *allowed == mime)
        .map(|&(mime, extension)| Media {
            mime,
            extension,
            kind: if mime.starts_with("image/") {
                MediaKind::Image
            } else {
                MediaKind::Video
            },
        })
        .ok_or(BoardError::UnsupportedMedia(mime))
}

/// Lowercase and drop parameters: `Image/PNG; q=1` becomes `image/png`.
fn normalize_mime(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(bytes: &[u8], declared: Option<&str>) -> MediaUpload {
        MediaUpload {
            bytes: bytes.to_vec(),
            declared_type: declared.map(str::to_string),
        }
    }

    #[test]
    fn sniffs_every_allowed_format() {
        let cases: &[(&[u8], &str, &str)] = &[
            (&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0], "jpg", "image/jpeg"),
            (&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0], "png", "image/png"),
            (b"GIF89a\x01\x00", "gif", "image/gif"),
            (b"\x00\x00\x00\x18ftypmp42\x00\x00", "mp4", "video/mp4"),
            (b"\x1A\x45\xDF\xA3\x9F\x42\x82\x84webm", "webm", "video/webm"),
        ];
        for (bytes, ext, mime) in cases {
            let media = classify(&upload(bytes, None)).unwrap();
            assert_eq!(media.extension, *ext);
            assert_eq!(media.mime, *mime);
        }
    }

    #[test]
    fn kind_follows_mime_family() {
        let image = classify(&upload(b"GIF87a..", None)).unwrap();
        assert_eq!(image.kind, MediaKind::Image);
        assert_eq!(image.file_name(), "media.gif");

        let video = classify(&upload(b"\x00\x00\x00\x18ftypisom\x00\x00", None)).unwrap();
        assert_eq!(video.kind, MediaKind::Video);
    }

    #[test]
    fn content_wins_over_declared_type() {
        let err = classify(&upload(b"%PDF-1.7 ...", Some("image/png"))).unwrap_err();
        assert!(matches!(err, BoardError::UnsupportedMedia(m) if m == "application/pdf"));

        let err = classify(&upload(b"\x00\x00\x00\x14ftypqt  \x00\x00", Some("video/mp4")))
            .unwrap_err();
        assert!(matches!(err, BoardError::UnsupportedMedia(m) if m == "video/quicktime"));
    }

    #[test]
    fn declared_type_is_used_when_content_is_unknown() {
        let media = classify(&upload(b"opaque", Some("Image/PNG; charset=binary"))).unwrap();
        assert_eq!(media.extension, "png");

        let err = classify(&upload(b"opaque", Some("text/plain"))).unwrap_err();
        assert!(matches!(err, BoardError::UnsupportedMedia(_)));

        let err = classify(&upload(b"opaque", None)).unwrap_err();
        assert!(matches!(err, BoardError::UnsupportedMedia(m) if m == "application/octet-stream"));
    }

    #[test]
    fn matroska_without_webm_doctype_is_rejected() {
        let err = classify(&upload(b"\x1A\x45\xDF\xA3\x9F\x42\x82\x88matroska", None)).unwrap_err();
        assert!(matches!(err, BoardError::UnsupportedMedia(m) if m == "video/x-matroska"));
    }

    #[test]
    fn empty_upload_is_a_validation_error() {
        assert!(matches!(
            classify(&upload(b"", Some("image/png"))),
            Err(BoardError::Validation(_))
        ));
    }
}
