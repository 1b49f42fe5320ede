//! Content-type lookup by file extension.

use std::borrow::Cow;

/// Returns the content type registered for `extension`, if any.
///
/// Matching is case-insensitive. HTML is served as UTF-8.
pub fn lookup(extension: &str) -> Option<Cow<'static, str>> {
    let essence = mime_guess::from_ext(extension).first_raw()?;
    if essence == "text/html" {
        return Some(Cow::Borrowed("text/html;charset=utf-8"));
    }
    Some(Cow::Borrowed(essence))
}

/// Content type for a file name, judged by its final extension.
///
/// Callers strip encoding suffixes (`.gz`, `.br`) first so that
/// `app.js.gz` is typed as JavaScript.
pub fn for_name(name: &str) -> Option<Cow<'static, str>> {
    let file = name.rsplit('/').next().unwrap_or(name);
    let (_, extension) = file.rsplit_once('.')?;
    lookup(extension)
}
