//! The asset delivery engine.
//!
//! Per request: decode the path, negotiate suffixes, try every candidate
//! against the index (or the disk in development), fall back to the
//! single-page-app shell if configured, and then answer with `304`, `200`,
//! `206` or `416`. Misses pass to the next layer.

use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hyper::header::{
    HeaderMap, HeaderValue, ACCEPT_ENCODING, IF_NONE_MATCH, RANGE, VARY,
};
use hyper::{Method, StatusCode};
use percent_encoding::percent_decode_str;
use unicode_normalization::UnicodeNormalization;

use crate::candidates::candidates;
use crate::chain::{Layer, Next};
use crate::config::{AssetConfig, SpaFallback};
use crate::error::{Error, Result};
use crate::headers::{cache_control, development_cache_control, HeaderHook, HeaderPolicy};
use crate::http::{status_response, Body, FileStream, Request, Response};
use crate::ignore::IgnorePolicy;
use crate::index::{AssetEntry, AssetIndex, AssetSource, LiveProbe};
use crate::negotiate::Negotiator;
use crate::range::{compute_range, RangeOutcome};
use crate::server::{ConnectionInfo, Service};

/// Produces the response for a request no asset matched.
pub type NotFoundHandler = Arc<dyn Fn(&Request) -> Response + Send + Sync>;

enum Lookup {
    Index(AssetIndex),
    Probe(LiveProbe),
}

impl Lookup {
    fn source(&self) -> &dyn AssetSource {
        match self {
            Self::Index(index) => index,
            Self::Probe(probe) => probe,
        }
    }
}

/// Serves the files under a root directory.
///
/// Usable as a [`Layer`] (misses go to the next layer) or as a standalone
/// [`Service`] (misses go to the not-found handler).
///
/// ```no_run
/// use quay::{AssetConfig, Assets, Server};
///
/// # async fn run() -> quay::Result<()> {
/// let mut config = AssetConfig::new("build/client");
/// config.enable_gzip = true;
/// config.enable_etag = true;
///
/// let assets = Assets::new(config)?;
/// Server::bind("127.0.0.1:3000").serve(assets).await
/// # }
/// ```
pub struct Assets {
    root: PathBuf,
    lookup: Lookup,
    negotiator: Negotiator,
    ignore: IgnorePolicy,
    fallback: SpaFallback,
    hook: Option<HeaderHook>,
    not_found: Option<NotFoundHandler>,
}

impl Assets {
    /// An engine with no callbacks attached.
    pub fn new(config: AssetConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: AssetConfig) -> AssetsBuilder {
        AssetsBuilder {
            config,
            hook: None,
            not_found: None,
        }
    }

    /// Canonical served root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The startup index; `None` in development mode.
    pub fn index(&self) -> Option<&AssetIndex> {
        match &self.lookup {
            Lookup::Index(index) => Some(index),
            Lookup::Probe(_) => None,
        }
    }

    /// Finds the entry a request for `path` is answered with, including the
    /// single-page-app fallback. `path` must already be decoded.
    pub fn resolve(&self, path: &str, accept_encoding: &str) -> Option<Arc<AssetEntry>> {
        let suffixes = self.negotiator.suffixes(accept_encoding);
        let source = self.lookup.source();

        if let Some(entry) = source.find(&candidates(path, &suffixes)) {
            log::debug!("{} resolved to {}", path, entry.path.display());
            return Some(entry);
        }

        let fallback = self.fallback.as_path()?;
        if self.ignore.excludes_fallback(path) {
            return None;
        }
        log::debug!("{path} not found, falling back to {fallback}");
        source.find(&candidates(fallback, &suffixes))
    }

    /// Answers `request` if an asset matches it.
    ///
    /// Returns `None` for methods other than `GET` and `HEAD` and for
    /// requests nothing resolves for.
    pub fn respond(&self, request: &Request) -> Option<Response> {
        if !matches!(*request.method(), Method::GET | Method::HEAD) {
            return None;
        }

        let path = decode_path(request.uri().path());
        let accept_encoding = request
            .headers()
            .get(ACCEPT_ENCODING)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        let entry = self.resolve(&path, accept_encoding)?;
        Some(self.deliver(request, &path, &entry))
    }

    fn deliver(&self, request: &Request, path: &str, entry: &AssetEntry) -> Response {
        if let Some(etag) = entry.etag() {
            if request.headers().get(IF_NONE_MATCH) == Some(etag) {
                log::debug!("{path} not modified");
                return status_response(StatusCode::NOT_MODIFIED);
            }
        }

        let mut outgoing = HeaderMap::new();
        if self.negotiator.negotiates() {
            outgoing.insert(VARY, HeaderValue::from_static("Accept-Encoding"));
        }
        if let Some(hook) = &self.hook {
            hook(&mut outgoing, path, &entry.stats);
        }
        let mut headers = entry.headers.clone();
        headers.extend(outgoing);

        let range = request
            .headers()
            .get(RANGE)
            .and_then(|value| value.to_str().ok());
        let (status, start, len) = match range.map(|range| compute_range(range, entry.stats.size)) {
            None => (StatusCode::OK, 0, entry.stats.size),
            Some(outcome @ RangeOutcome::Unsatisfiable { .. }) => {
                log::debug!("unsatisfiable range {:?} for {}", range, path);
                let mut response = status_response(outcome.status());
                outcome.apply(response.headers_mut());
                return response;
            }
            Some(outcome @ RangeOutcome::Partial(window)) => {
                outcome.apply(&mut headers);
                (outcome.status(), window.start, window.len())
            }
        };

        let body = if request.method() == Method::HEAD {
            Body::empty()
        } else {
            match FileStream::open(&entry.path, start, len) {
                Ok(stream) => Body::file(stream),
                Err(err) => {
                    log::error!("opening {} failed: {}", entry.path.display(), err);
                    return status_response(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    fn not_found(&self, request: &Request) -> Response {
        match &self.not_found {
            Some(handler) => handler(request),
            None => status_response(StatusCode::NOT_FOUND),
        }
    }
}

impl fmt::Debug for Assets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assets")
            .field("root", &self.root)
            .field("indexed", &self.index().map(AssetIndex::len))
            .field("fallback", &self.fallback)
            .finish_non_exhaustive()
    }
}

impl Layer for Assets {
    fn handle(&self, request: Request, next: Next<'_>) -> Response {
        match self.respond(&request) {
            Some(response) => response,
            None => next.run(request),
        }
    }
}

impl Service for Assets {
    fn call(&self, request: Request, _info: ConnectionInfo) -> Response {
        match self.respond(&request) {
            Some(response) => response,
            None => self.not_found(&request),
        }
    }
}

/// Builds an [`Assets`] engine with optional callbacks.
pub struct AssetsBuilder {
    config: AssetConfig,
    hook: Option<HeaderHook>,
    not_found: Option<NotFoundHandler>,
}

impl AssetsBuilder {
    /// Runs `hook` on the outgoing headers before each file is sent.
    pub fn on_headers(mut self, hook: HeaderHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Answers unmatched requests when the engine is used as a [`Service`].
    pub fn on_not_found<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Request) -> Response + Send + Sync + 'static,
    {
        self.not_found = Some(Arc::new(handler));
        self
    }

    /// Canonicalizes the root and, outside development mode, indexes it.
    ///
    /// # Errors
    /// Fails if the root cannot be canonicalized, an ignore pattern does not
    /// compile, or the directory walk fails.
    pub fn build(self) -> Result<Assets> {
        let config = self.config;
        let root = fs::canonicalize(&config.served_root).map_err(|source| Error::InvalidRoot {
            path: config.served_root.clone(),
            source,
        })?;
        let ignore = IgnorePolicy::new(&config.ignore_patterns, config.allow_dotfiles)?;

        let lookup = if config.development_mode {
            let cache_control = development_cache_control(config.enable_etag);
            let policy = HeaderPolicy::new(config.enable_etag, Some(cache_control.to_string()));
            log::info!("serving {} from disk (development mode)", root.display());
            Lookup::Probe(LiveProbe::new(root.clone(), policy, ignore.clone()))
        } else {
            let policy = HeaderPolicy::new(
                config.enable_etag,
                cache_control(config.max_age_seconds, config.immutable),
            );
            Lookup::Index(AssetIndex::build(&root, &policy, &ignore)?)
        };

        Ok(Assets {
            root,
            lookup,
            negotiator: Negotiator::new(
                &config.fallback_extensions,
                config.enable_gzip,
                config.enable_brotli,
            ),
            ignore,
            fallback: config.single_page_app_fallback,
            hook: self.hook,
            not_found: self.not_found,
        })
    }
}

/// Percent-decodes and NFC-normalizes a request path.
///
/// A path that does not decode to UTF-8 is used as it arrived.
pub(crate) fn decode_path(raw: &str) -> Cow<'_, str> {
    match percent_decode_str(raw).decode_utf8() {
        Ok(decoded) => Cow::Owned(decoded.nfc().collect()),
        Err(_) => Cow::Borrowed(raw),
    }
}
