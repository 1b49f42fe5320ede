//! Candidate public paths for a request path.

/// Expands `url_path` into the ordered public paths to try.
///
/// A single trailing slash is dropped first. For every suffix token, in
/// order, the literal path (`/docs.html`) is tried before the directory
/// index (`/docs/index.html`). The literal form is skipped when the path is
/// empty, i.e. for the root request.
///
/// # Example
///
/// ```
/// let list = quay::candidates("/docs/", &["", "html"]);
/// assert_eq!(list, ["/docs", "/docs/index", "/docs.html", "/docs/index.html"]);
/// ```
pub fn candidates(url_path: &str, suffixes: &[&str]) -> Vec<String> {
    let path = url_path.strip_suffix('/').unwrap_or(url_path);
    let index = format!("{path}/index");

    let mut list = Vec::with_capacity(suffixes.len() * 2);
    for suffix in suffixes {
        let dot = if suffix.is_empty() { "" } else { "." };
        if !path.is_empty() {
            list.push(format!("{path}{dot}{suffix}"));
        }
        list.push(format!("{index}{dot}{suffix}"));
    }
    list
}
