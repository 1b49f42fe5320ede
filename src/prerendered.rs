//! Prerendered pages and their canonical trailing slash.

use std::collections::HashSet;

use hyper::header::{HeaderValue, LOCATION};
use hyper::StatusCode;

use crate::chain::{Layer, Next};
use crate::engine::{decode_path, Assets};
use crate::http::{status_response, Request, Response};

/// Serves prerendered pages and redirects to their canonical form.
///
/// A request for a page is answered by the wrapped engine. A request that
/// only differs from a page by its trailing slash gets a `308` to the page,
/// query string included. Anything else goes to the next layer.
#[derive(Debug)]
pub struct Prerendered {
    assets: Assets,
    pages: HashSet<String>,
}

impl Prerendered {
    pub fn new<I>(assets: Assets, pages: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            assets,
            pages: pages.into_iter().map(Into::into).collect(),
        }
    }

    /// Derives the page set from the engine's index: `/a/index.html` is the
    /// page `/a/`, `/a.html` is the page `/a`.
    ///
    /// An engine in development mode has no index and yields no pages.
    pub fn discover(assets: Assets) -> Self {
        let pages: HashSet<String> = match assets.index() {
            Some(index) => index.paths().filter_map(page_path).collect(),
            None => {
                log::warn!("no index under {}, no prerendered pages", assets.root().display());
                HashSet::new()
            }
        };
        log::info!("found {} prerendered pages", pages.len());
        Self { assets, pages }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.pages.contains(path)
    }
}

impl Layer for Prerendered {
    fn handle(&self, request: Request, next: Next<'_>) -> Response {
        let raw = request.uri().path();
        if self.contains(&decode_path(raw)) {
            return match self.assets.respond(&request) {
                Some(response) => response,
                None => next.run(request),
            };
        }

        let Some(toggled) = toggle_slash(raw) else {
            return next.run(request);
        };
        if !self.contains(&decode_path(&toggled)) {
            return next.run(request);
        }

        let location = match request.uri().query() {
            Some(query) => format!("{toggled}?{query}"),
            None => toggled,
        };
        let Ok(location) = HeaderValue::try_from(location) else {
            return next.run(request);
        };
        log::debug!("redirecting {} to {:?}", raw, location);

        let mut response = status_response(StatusCode::PERMANENT_REDIRECT);
        response.headers_mut().insert(LOCATION, location);
        response
    }
}

/// The page a public file path is served as, if it is an HTML page.
fn page_path(public_path: &str) -> Option<String> {
    if let Some(dir) = public_path.strip_suffix("/index.html") {
        return Some(format!("{dir}/"));
    }
    public_path.strip_suffix(".html").map(str::to_string)
}

/// `/a` becomes `/a/` and `/a/` becomes `/a`; the root has no other form.
fn toggle_slash(path: &str) -> Option<String> {
    match path.strip_suffix('/') {
        Some("") => None,
        Some(stripped) => Some(stripped.to_string()),
        None => Some(format!("{path}/")),
    }
}
