//! Response headers computed from file stats and configuration.

use std::fmt::Display;
use std::fs::Metadata;
use std::io;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LENGTH,
    CONTENT_TYPE, ETAG, LAST_MODIFIED,
};

use crate::mime;
use crate::negotiate::Encoding;

/// Size and modification time of a served file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileStats {
    pub size: u64,
    pub modified: SystemTime,
}

impl FileStats {
    pub fn from_metadata(metadata: &Metadata) -> io::Result<Self> {
        Ok(Self {
            size: metadata.len(),
            modified: metadata.modified()?,
        })
    }

    /// Modification time in milliseconds since the Unix epoch (0 if earlier).
    pub fn modified_millis(&self) -> u128 {
        self.modified
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default()
    }

    /// Weak validator in the form `W/"<size>-<mtimeMillis>"`.
    pub fn etag(&self) -> String {
        format!("W/\"{}-{}\"", self.size, self.modified_millis())
    }
}

/// Callback run before a file is sent: `(outgoing headers, request path, stats)`.
///
/// Headers it sets win over the computed ones.
pub type HeaderHook = Arc<dyn Fn(&mut HeaderMap, &str, &FileStats) + Send + Sync>;

/// A hook giving everything under `prefix` a year-long immutable lifetime.
///
/// Meant for fingerprinted build output whose names change with content.
pub fn immutable_under(prefix: impl Into<String>) -> HeaderHook {
    let prefix = prefix.into();
    Arc::new(move |headers: &mut HeaderMap, path: &str, _: &FileStats| {
        if path.starts_with(&prefix) {
            headers.insert(
                CACHE_CONTROL,
                HeaderValue::from_static("public,max-age=31536000,immutable"),
            );
        }
    })
}

/// Production `Cache-Control`: `public,max-age=<n>` plus `immutable`, or
/// `must-revalidate` for a zero max-age.
pub fn cache_control(max_age: Option<u64>, immutable: bool) -> Option<String> {
    let max_age = max_age?;
    let mut value = format!("public,max-age={max_age}");
    if immutable {
        value.push_str(",immutable");
    } else if max_age == 0 {
        value.push_str(",must-revalidate");
    }
    Some(value)
}

/// Development `Cache-Control`: revalidate when ETags exist, else never store.
pub fn development_cache_control(etag: bool) -> &'static str {
    if etag {
        "no-cache"
    } else {
        "no-store"
    }
}

/// Inserts a formatted value, skipping it if it is not a legal header value.
pub(crate) fn insert_display(headers: &mut HeaderMap, name: HeaderName, value: impl Display) {
    if let Ok(value) = HeaderValue::try_from(value.to_string()) {
        headers.insert(name, value);
    }
}

/// Computes the per-file headers an [`AssetEntry`](crate::AssetEntry) carries.
#[derive(Clone, Debug)]
pub struct HeaderPolicy {
    etag: bool,
    cache_control: Option<String>,
}

impl HeaderPolicy {
    pub fn new(etag: bool, cache_control: Option<String>) -> Self {
        Self { etag, cache_control }
    }

    /// Headers for the file published as `public_path`.
    ///
    /// The content type is taken from the name without its encoding suffix,
    /// and `Content-Encoding` is set when there was one.
    pub fn headers_for(&self, public_path: &str, stats: &FileStats) -> HeaderMap {
        let (encoding, plain_name) = Encoding::from_file_name(public_path);
        let mut headers = HeaderMap::new();

        insert_display(&mut headers, CONTENT_LENGTH, stats.size);
        if let Some(content_type) = mime::for_name(plain_name) {
            insert_display(&mut headers, CONTENT_TYPE, content_type);
        }
        insert_display(&mut headers, LAST_MODIFIED, httpdate::fmt_http_date(stats.modified));
        if let Some(token) = encoding.content_encoding() {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static(token));
        }
        if self.etag {
            insert_display(&mut headers, ETAG, stats.etag());
        }
        if let Some(cache_control) = &self.cache_control {
            insert_display(&mut headers, CACHE_CONTROL, cache_control);
        }
        headers
    }
}
