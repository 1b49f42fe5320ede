//! Which public paths are never served, and which never fall back.

use regex::{Regex, RegexBuilder};

use crate::error::Result;

/// Well-known URIs (RFC 8615) stay servable even when dotfiles are not.
const WELL_KNOWN: &str = ".well-known";

/// Exclusion rules shared by the index walk, the live probe and the
/// single-page-app fallback.
#[derive(Clone, Debug)]
pub struct IgnorePolicy {
    allow_dotfiles: bool,
    patterns: Vec<Regex>,
    looks_like_file: Regex,
}

impl IgnorePolicy {
    /// Compiles caller patterns case-insensitively.
    ///
    /// # Errors
    /// Returns [`Error::Pattern`](crate::Error::Pattern) for an invalid expression.
    pub fn new(patterns: &[String], allow_dotfiles: bool) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            allow_dotfiles,
            patterns,
            looks_like_file: Regex::new(r"/[A-Za-z\s\d~$._-]+\.\w+$")?,
        })
    }

    /// Whether a file published as `public_path` must not be served.
    pub fn excludes_asset(&self, public_path: &str) -> bool {
        (!self.allow_dotfiles && is_hidden(public_path)) || self.matches_pattern(public_path)
    }

    /// Whether an unresolved request for `path` must not get the SPA fallback.
    ///
    /// Requests that look like a file (`/missing.js`) or touch a dot segment
    /// are real misses, not client-side routes. Dot segments count even when
    /// dotfiles are allowed.
    pub fn excludes_fallback(&self, path: &str) -> bool {
        self.looks_like_file.is_match(path)
            || path.split('/').any(|segment| segment.starts_with('.'))
            || self.matches_pattern(path)
    }

    fn matches_pattern(&self, path: &str) -> bool {
        self.patterns.iter().any(|pattern| pattern.is_match(path))
    }
}

/// True when any segment is a dotfile or dot-directory other than `.well-known`.
fn is_hidden(path: &str) -> bool {
    path.split('/')
        .any(|segment| segment.starts_with('.') && segment != WELL_KNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(patterns: &[&str], allow_dotfiles: bool) -> IgnorePolicy {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        IgnorePolicy::new(&patterns, allow_dotfiles).unwrap()
    }

    #[test]
    fn test_dotfiles_excluded_by_default() {
        let p = policy(&[], false);
        assert!(p.excludes_asset("/.env"));
        assert!(p.excludes_asset("/.git/config"));
        assert!(p.excludes_asset("/assets/.DS_Store"));
        assert!(!p.excludes_asset("/assets/app.js"));
    }

    #[test]
    fn test_well_known_is_always_kept() {
        let p = policy(&[], false);
        assert!(!p.excludes_asset("/.well-known/security.txt"));
        // but a hidden file inside it is still hidden
        assert!(p.excludes_asset("/.well-known/.secret"));
    }

    #[test]
    fn test_dotfiles_allowed() {
        let p = policy(&[], true);
        assert!(!p.excludes_asset("/.htaccess"));
    }

    #[test]
    fn test_caller_patterns_are_case_insensitive() {
        let p = policy(&["^/private/", r"\.map$"], false);
        assert!(p.excludes_asset("/PRIVATE/keys.txt"));
        assert!(p.excludes_asset("/app.js.MAP"));
        assert!(!p.excludes_asset("/public/keys.txt"));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let patterns = vec!["(unclosed".to_string()];
        assert!(IgnorePolicy::new(&patterns, false).is_err());
    }

    #[test]
    fn test_fallback_skips_file_like_paths() {
        let p = policy(&[], false);
        assert!(p.excludes_fallback("/missing.js"));
        assert!(p.excludes_fallback("/img/logo.v2.png"));
        assert!(!p.excludes_fallback("/foo/bar"));
        assert!(!p.excludes_fallback("/users/42/"));
    }

    #[test]
    fn test_fallback_skips_dot_segments_and_patterns() {
        let p = policy(&["^/api/"], false);
        assert!(p.excludes_fallback("/.well-known/thing"));
        assert!(p.excludes_fallback("/api/users"));
        assert!(!p.excludes_fallback("/dashboard"));
    }

    #[test]
    fn test_fallback_skips_dot_segments_with_dotfiles_allowed() {
        let p = policy(&[], true);
        assert!(!p.excludes_asset("/.hidden/page"));
        assert!(p.excludes_fallback("/.hidden/page"));
    }
}
