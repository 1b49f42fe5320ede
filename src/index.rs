//! Resolving public paths to files.
//!
//! Two sources implement [`AssetSource`]:
//!
//! - [`AssetIndex`] walks the served root once at startup and answers every
//!   lookup from an immutable map. Shared across requests without locking.
//! - [`LiveProbe`] stats the filesystem per candidate, for development, where
//!   files change between requests.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use hyper::header::{HeaderMap, HeaderValue, ETAG};
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

use crate::error::Result;
use crate::headers::{FileStats, HeaderPolicy};
use crate::ignore::IgnorePolicy;

/// One servable file and the headers it is sent with.
#[derive(Clone, Debug)]
pub struct AssetEntry {
    /// Absolute path on disk, always inside the served root.
    pub path: PathBuf,
    pub stats: FileStats,
    pub headers: HeaderMap,
}

impl AssetEntry {
    /// The entry's ETag header, if ETags are enabled.
    pub fn etag(&self) -> Option<&HeaderValue> {
        self.headers.get(ETAG)
    }
}

/// Anything that can turn an ordered candidate list into a file.
pub trait AssetSource: Send + Sync {
    /// Returns the entry for the first candidate that resolves.
    fn find(&self, candidates: &[String]) -> Option<Arc<AssetEntry>>;
}

/// Precomputed map from public path (`/css/site.css`) to entry.
#[derive(Debug, Default)]
pub struct AssetIndex {
    entries: HashMap<String, Arc<AssetEntry>>,
}

impl AssetIndex {
    /// Walks `root` and registers every regular file the ignore policy allows.
    ///
    /// # Arguments
    /// * `root` - Canonical served root
    /// * `headers` - Computes each entry's precomputed headers
    /// * `ignore` - Files excluded from the index
    ///
    /// # Errors
    /// Returns an error if the walk or a stat fails.
    pub fn build(root: &Path, headers: &HeaderPolicy, ignore: &IgnorePolicy) -> Result<Self> {
        let mut entries = HashMap::new();

        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Some(public_path) = public_path(root, entry.path()) else {
                log::debug!("skipping non UTF-8 file name {}", entry.path().display());
                continue;
            };
            if ignore.excludes_asset(&public_path) {
                continue;
            }

            let stats = FileStats::from_metadata(&entry.metadata()?)?;
            let asset = AssetEntry {
                path: entry.path().to_path_buf(),
                stats,
                headers: headers.headers_for(&public_path, &stats),
            };
            entries.insert(public_path, Arc::new(asset));
        }

        log::info!("indexed {} assets under {}", entries.len(), root.display());
        Ok(Self { entries })
    }

    /// Builds an index from ready-made entries, without touching the disk.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, AssetEntry)>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(path, entry)| (path, Arc::new(entry)))
                .collect(),
        }
    }

    pub fn get(&self, public_path: &str) -> Option<&Arc<AssetEntry>> {
        self.entries.get(public_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every indexed public path, in no particular order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl AssetSource for AssetIndex {
    fn find(&self, candidates: &[String]) -> Option<Arc<AssetEntry>> {
        candidates
            .iter()
            .find_map(|candidate| self.entries.get(candidate).cloned())
    }
}

/// Per-request filesystem lookup for development.
#[derive(Debug)]
pub struct LiveProbe {
    root: PathBuf,
    headers: HeaderPolicy,
    ignore: IgnorePolicy,
}

impl LiveProbe {
    pub fn new(root: PathBuf, headers: HeaderPolicy, ignore: IgnorePolicy) -> Self {
        Self {
            root,
            headers,
            ignore,
        }
    }

    fn probe(&self, candidate: &str) -> Option<AssetEntry> {
        if self.ignore.excludes_asset(candidate) {
            return None;
        }
        let path = contain(&self.root, candidate)?;
        let metadata = fs::metadata(&path).ok()?;
        if metadata.is_dir() {
            return None;
        }

        let stats = FileStats::from_metadata(&metadata).ok()?;
        Some(AssetEntry {
            headers: self.headers.headers_for(candidate, &stats),
            path,
            stats,
        })
    }
}

impl AssetSource for LiveProbe {
    fn find(&self, candidates: &[String]) -> Option<Arc<AssetEntry>> {
        candidates
            .iter()
            .find_map(|candidate| self.probe(candidate))
            .map(Arc::new)
    }
}

/// Joins `public_path` onto `root`, resolving `.` and `..` lexically.
///
/// Returns `None` when the result is not a descendant of `root`.
pub fn contain(root: &Path, public_path: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for segment in public_path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                resolved.pop();
            }
            _ if segment.contains('\0') => return None,
            _ => resolved.push(segment),
        }
    }
    resolved.starts_with(root).then_some(resolved)
}

/// Root-relative, `/`-separated, NFC-normalized public path of `file`.
fn public_path(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let mut public = String::new();
    for component in relative.components() {
        if let Component::Normal(name) = component {
            public.push('/');
            public.extend(name.to_str()?.nfc());
        }
    }
    Some(public)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut file = File::create(path).unwrap();
        write!(file, "{contents}").unwrap();
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.html", "<h1>home</h1>");
        write(dir.path(), "index.html.gz", "gzipped");
        write(dir.path(), "css/site.css", "body{}");
        write(dir.path(), ".env", "SECRET=1");
        write(dir.path(), ".well-known/security.txt", "Contact: x");
        dir
    }

    fn root(dir: &TempDir) -> PathBuf {
        fs::canonicalize(dir.path()).unwrap()
    }

    fn ignore() -> IgnorePolicy {
        IgnorePolicy::new(&[], false).unwrap()
    }

    #[test]
    fn test_index_registers_public_paths() {
        let dir = fixture();
        let index = AssetIndex::build(&root(&dir), &HeaderPolicy::new(true, None), &ignore()).unwrap();

        assert_eq!(index.len(), 4);
        assert!(index.get("/index.html").is_some());
        assert!(index.get("/index.html.gz").is_some());
        assert!(index.get("/css/site.css").is_some());
        assert!(index.get("/.well-known/security.txt").is_some());
        assert!(index.get("/.env").is_none());
    }

    #[test]
    fn test_index_entries_carry_headers() {
        let dir = fixture();
        let index = AssetIndex::build(&root(&dir), &HeaderPolicy::new(true, None), &ignore()).unwrap();
        let entry = index.get("/index.html.gz").unwrap();

        assert_eq!(entry.headers["content-encoding"], "gzip");
        assert_eq!(entry.headers["content-type"], "text/html;charset=utf-8");
        assert_eq!(entry.headers["content-length"], "7");
        assert_eq!(entry.etag().unwrap(), &entry.stats.etag());
        assert!(entry.path.starts_with(root(&dir)));
    }

    #[test]
    fn test_index_find_returns_first_hit() {
        let dir = fixture();
        let index = AssetIndex::build(&root(&dir), &HeaderPolicy::new(false, None), &ignore()).unwrap();

        let candidates = vec!["/index.br".to_string(), "/index.html".to_string()];
        let entry = index.find(&candidates).unwrap();
        assert!(entry.path.ends_with("index.html"));

        assert!(index.find(&["/nope".to_string()]).is_none());
    }

    #[test]
    fn test_index_respects_caller_patterns() {
        let dir = fixture();
        let patterns = vec![r"\.css$".to_string()];
        let ignore = IgnorePolicy::new(&patterns, false).unwrap();
        let index = AssetIndex::build(&root(&dir), &HeaderPolicy::new(false, None), &ignore).unwrap();

        assert!(index.get("/css/site.css").is_none());
        assert!(index.get("/index.html").is_some());
    }

    #[test]
    fn test_live_probe_resolves_and_skips_directories() {
        let dir = fixture();
        let probe = LiveProbe::new(root(&dir), HeaderPolicy::new(false, None), ignore());

        // `/css` is a directory: skipped rather than served
        let candidates = vec!["/css".to_string(), "/css/site.css".to_string()];
        let entry = probe.find(&candidates).unwrap();
        assert!(entry.path.ends_with("site.css"));
    }

    /// Files created after startup are visible to the probe.
    #[test]
    fn test_live_probe_sees_new_files() {
        let dir = fixture();
        let probe = LiveProbe::new(root(&dir), HeaderPolicy::new(false, None), ignore());
        assert!(probe.find(&["/late.txt".to_string()]).is_none());

        write(dir.path(), "late.txt", "hello");
        assert!(probe.find(&["/late.txt".to_string()]).is_some());
    }

    #[test]
    fn test_live_probe_rejects_traversal() {
        let dir = fixture();
        let served = root(&dir).join("css");
        let probe = LiveProbe::new(served, HeaderPolicy::new(false, None), ignore());

        assert!(probe.find(&["/../index.html".to_string()]).is_none());
        assert!(probe.find(&["/site.css".to_string()]).is_some());
    }

    #[test]
    fn test_live_probe_hides_dotfiles() {
        let dir = fixture();
        let probe = LiveProbe::new(root(&dir), HeaderPolicy::new(false, None), ignore());
        assert!(probe.find(&["/.env".to_string()]).is_none());
    }

    /// File names stored decomposed on disk are indexed in composed form.
    #[test]
    fn test_index_keys_are_nfc() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "cafe\u{301}.txt", "latte");
        let index = AssetIndex::build(&root(&dir), &HeaderPolicy::new(false, None), &ignore()).unwrap();

        assert_eq!(index.paths().collect::<Vec<_>>(), vec!["/caf\u{e9}.txt"]);
        assert!(index.get("/cafe\u{301}.txt").is_none());
    }

    #[test]
    fn test_contain() {
        let root = Path::new("/srv/www");
        assert_eq!(contain(root, "/a/b.txt"), Some(PathBuf::from("/srv/www/a/b.txt")));
        assert_eq!(contain(root, "/a/../b.txt"), Some(PathBuf::from("/srv/www/b.txt")));
        assert_eq!(contain(root, "/./a"), Some(PathBuf::from("/srv/www/a")));
        assert_eq!(contain(root, "/../../etc/passwd"), None);
        assert_eq!(contain(root, "/..\\..\\etc\\passwd"), None);
        // a sibling sharing the root's name as a prefix is not inside it
        assert_eq!(contain(root, "/../www-evil/x"), None);
    }

    #[test]
    fn test_from_entries_serves_as_fake_index() {
        let entry = AssetEntry {
            path: PathBuf::from("/srv/www/a.txt"),
            stats: FileStats {
                size: 1,
                modified: std::time::UNIX_EPOCH,
            },
            headers: HeaderMap::new(),
        };
        let index = AssetIndex::from_entries([("/a.txt".to_string(), entry)]);

        assert_eq!(index.paths().collect::<Vec<_>>(), vec!["/a.txt"]);
        assert!(index.find(&["/a.txt".to_string()]).is_some());
    }
}
