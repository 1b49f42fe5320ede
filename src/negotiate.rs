//! Representation negotiation from `Accept-Encoding`.
//!
//! The negotiator turns the client's declared encodings into an ordered list
//! of suffix tokens. Each token is appended to a candidate path with a `.`
//! separator, the empty token meaning "the path itself":
//!
//! ```text
//! Accept-Encoding: gzip, br   (gzip + brotli enabled, extensions html, htm)
//!
//! html.br  htm.br  br  html.gz  htm.gz  gz  ""  html  htm
//! └──── brotli ────┘   └──── gzip ─────┘   │   └ fallbacks ┘
//!                                          identity
//! ```

/// One served representation of a file.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Encoding {
    Brotli,
    Gzip,
    Identity,
}

impl Encoding {
    /// File-name suffix of the precompressed variant (without the dot).
    pub fn suffix(self) -> Option<&'static str> {
        match self {
            Self::Brotli => Some("br"),
            Self::Gzip => Some("gz"),
            Self::Identity => None,
        }
    }

    /// Value for the `Content-Encoding` header.
    pub fn content_encoding(self) -> Option<&'static str> {
        match self {
            Self::Brotli => Some("br"),
            Self::Gzip => Some("gzip"),
            Self::Identity => None,
        }
    }

    /// Splits a recognized encoding suffix off a file name.
    ///
    /// `app.js.br` yields `(Brotli, "app.js")`; names without a recognized
    /// suffix come back unchanged as `Identity`.
    pub fn from_file_name(name: &str) -> (Self, &str) {
        for encoding in [Self::Brotli, Self::Gzip] {
            if let Some(suffix) = encoding.suffix() {
                if let Some(stem) = name.strip_suffix(suffix).and_then(|s| s.strip_suffix('.')) {
                    return (encoding, stem);
                }
            }
        }
        (Self::Identity, name)
    }
}

/// Builds per-request suffix lists.
///
/// Constructed once per engine; the per-encoding token lists are
/// precomputed so that a request only decides which groups to include.
#[derive(Clone, Debug)]
pub struct Negotiator {
    brotli: Option<Vec<String>>,
    gzip: Option<Vec<String>>,
    extensions: Vec<String>,
}

impl Negotiator {
    /// # Arguments
    /// * `extensions` - Fallback extensions tried after the bare path, in order
    /// * `gzip` - Whether `.gz` variants may be served
    /// * `brotli` - Whether `.br` variants may be served
    pub fn new(extensions: &[String], gzip: bool, brotli: bool) -> Self {
        let variants = |encoding: Encoding| {
            let suffix = encoding.suffix().unwrap_or_default();
            extensions
                .iter()
                .map(|ext| format!("{ext}.{suffix}"))
                .chain(std::iter::once(suffix.to_string()))
                .collect::<Vec<_>>()
        };

        Self {
            brotli: brotli.then(|| variants(Encoding::Brotli)),
            gzip: gzip.then(|| variants(Encoding::Gzip)),
            extensions: extensions.to_vec(),
        }
    }

    /// Whether any precompressed variant is enabled.
    pub fn negotiates(&self) -> bool {
        self.brotli.is_some() || self.gzip.is_some()
    }

    /// Ordered suffix tokens for a request carrying `accept_encoding`.
    ///
    /// Compressed groups only appear when both enabled and advertised by the
    /// client. The bare token and the fallback extensions always follow.
    pub fn suffixes(&self, accept_encoding: &str) -> Vec<&str> {
        let accept = accept_encoding.to_ascii_lowercase();
        let mut suffixes = Vec::new();

        if let Some(brotli) = &self.brotli {
            if accepts_brotli(&accept) {
                suffixes.extend(brotli.iter().map(String::as_str));
            }
        }
        if let Some(gzip) = &self.gzip {
            if accept.contains("gzip") {
                suffixes.extend(gzip.iter().map(String::as_str));
            }
        }

        suffixes.push("");
        suffixes.extend(self.extensions.iter().map(String::as_str));
        suffixes
    }
}

fn accepts_brotli(lowercase_header: &str) -> bool {
    lowercase_header.contains("br")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiator(gzip: bool, brotli: bool) -> Negotiator {
        let extensions = vec!["html".to_string(), "htm".to_string()];
        Negotiator::new(&extensions, gzip, brotli)
    }

    #[test]
    fn test_identity_only_when_nothing_enabled() {
        let n = negotiator(false, false);
        assert!(!n.negotiates());
        assert_eq!(n.suffixes("gzip, br"), vec!["", "html", "htm"]);
    }

    /// Brotli goes first, gzip next, identity and fallbacks last.
    #[test]
    fn test_full_priority_order() {
        let n = negotiator(true, true);
        assert_eq!(
            n.suffixes("gzip, deflate, br"),
            vec!["html.br", "htm.br", "br", "html.gz", "htm.gz", "gz", "", "html", "htm"]
        );
    }

    #[test]
    fn test_unadvertised_encodings_are_never_offered() {
        let n = negotiator(true, true);
        assert_eq!(n.suffixes(""), vec!["", "html", "htm"]);
        assert_eq!(n.suffixes("gzip"), vec!["html.gz", "htm.gz", "gz", "", "html", "htm"]);
        assert_eq!(n.suffixes("deflate"), vec!["", "html", "htm"]);
    }

    #[test]
    fn test_disabled_encoding_ignored_even_if_advertised() {
        let n = negotiator(true, false);
        assert_eq!(n.suffixes("br"), vec!["", "html", "htm"]);
    }

    #[test]
    fn test_header_matching_is_case_insensitive() {
        let n = negotiator(true, true);
        assert_eq!(n.suffixes("BROTLI")[0], "html.br");
        assert_eq!(n.suffixes("GZip")[0], "html.gz");
    }

    #[test]
    fn test_encoding_from_file_name() {
        assert_eq!(Encoding::from_file_name("app.js.br"), (Encoding::Brotli, "app.js"));
        assert_eq!(Encoding::from_file_name("index.html.gz"), (Encoding::Gzip, "index.html"));
        assert_eq!(Encoding::from_file_name("archive.tgz"), (Encoding::Identity, "archive.tgz"));
        assert_eq!(Encoding::from_file_name("style.css"), (Encoding::Identity, "style.css"));
    }

    #[test]
    fn test_content_encoding_tokens() {
        assert_eq!(Encoding::Gzip.content_encoding(), Some("gzip"));
        assert_eq!(Encoding::Brotli.content_encoding(), Some("br"));
        assert_eq!(Encoding::Identity.content_encoding(), None);
    }
}
