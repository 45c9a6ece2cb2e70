//! Rendered article documents and the reply region inside them.
//!
//! A document is a static HTML page. Replies live between two literal
//! markers and are only ever appended immediately before the end marker:
//! ```html
//! <!-- REPLIES START -->
//! <div class="reply">...</div>
//! <!-- REPLIES END -->
//! ```
//! Both markers are part of the on-disk format and must survive every
//! rewrite verbatim.

use crate::article::Dir;
use crate::escape::{escape_html, escape_multiline};
use crate::media::{Media, MediaKind};

pub const REPLIES_START: &str = "<!-- REPLIES START -->";
pub const REPLIES_END: &str = "<!-- REPLIES END -->";
const REPLY_OPEN: &str = "<div class=\"reply\">";

/// Everything needed to render a new article page.
#[derive(Debug, Clone, Copy)]
pub struct ArticlePage<'a> {
    pub dir: Dir,
    pub subject: &'a str,
    pub body: &'a str,
    pub media: Option<&'a Media>,
}

fn media_block(media: Option<&Media>) -> String {
    match media {
        None => String::new(),
        Some(m) => match m.kind {
            MediaKind::Image => format!(
                r#"<div class="media"><img src="{}" alt="Media"></div>"#,
                m.file_name()
            ),
            MediaKind::Video => format!(
                r#"<div class="media"><video controls src="{}"></video></div>"#,
                m.file_name()
            ),
        },
    }
}

/// Render the full page for a new article with an empty reply region.
#[must_use]
pub fn render_article(page: &ArticlePage<'_>) -> String {
    let subject = escape_html(page.subject);
    let body = escape_multiline(page.body);
    let media = media_block(page.media);
    let dir = page.dir;

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{subject}</title>
  <link id="theme-stylesheet" rel="stylesheet" type="text/css" href="/css/dark.css">
</head>
<body>
  <div class="top-bar">
    <a href="/index.php" class="back-button">&lt;&lt; Back</a>
  </div>
  <div class="article-container">
    <h1 style="text-align: center;">{subject}</h1>
    {media}
    <div class="content">
      {body}
    </div>
    <hr>
    <div class="replies">
      <h3>Replies</h3>
      <div id="replyForm">
        <form action="/reply.php" method="post">
          <input type="hidden" name="article_dir" value="{dir}">
          <textarea name="reply_text" rows="4" cols="50" required></textarea><br>
          <button type="submit">Submit Reply</button>
        </form>
      </div>
      <div id="replyList">
        {REPLIES_START}
        {REPLIES_END}
      </div>
    </div>
  </div>
</body>
</html>
"#
    )
}

/// Wrap reply text in the fixed fragment shell. The text is escaped here.
#[must_use]
pub fn render_reply(text: &str) -> String {
    format!(
        "{REPLY_OPEN}\n  <p>{}</p>\n  <hr>\n</div>\n",
        escape_multiline(text)
    )
}

/// Insert `fragment` immediately before the last end marker.
///
/// Returns `None` when the document has no end marker. Everything before
/// the insertion point, including earlier fragments, is left untouched.
#[must_use]
pub fn splice_reply(document: &str, fragment: &str) -> Option<String> {
    let at = document.rfind(REPLIES_END)?;
    let mut out = String::with_capacity(document.len() + fragment.len());
    out.push_str(&document[..at]);
    out.push_str(fragment);
    out.push_str(&document[at..]);
    Some(out)
}

/// Extract the reply fragments currently stored in a document, in order.
#[must_use]
pub fn reply_region(document: &str) -> Option<&str> {
    let start = document.find(REPLIES_START)? + REPLIES_START.len();
    let end = document.rfind(REPLIES_END)?;
    (start <= end).then(|| &document[start..end])
}

/// Number of reply fragments in a document, `None` without a reply region.
///
/// Reply text is escaped, so the fragment shell cannot occur inside it.
#[must_use]
pub fn count_replies(document: &str) -> Option<usize> {
    reply_region(document).map(|region| region.matches(REPLY_OPEN).count())
}
