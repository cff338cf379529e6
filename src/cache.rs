//! Content-addressed on-disk artifact cache
//!
//! Every remote artifact maps to a stable local path derived from its URL.
//! Next to each cached file sits a `.checked` sidecar recording the
//! server-advertised filename and the SHA-256 of the content; the sidecar
//! is the source of truth — a cached file without one is not trusted and
//! gets refetched. The sidecar's modification time doubles as the
//! fetch timestamp for TTL checks on "changing" artifacts (the channel
//! index and package metadata, which must revalidate periodically).
//!
//! Concurrency: downloads of the same URL serialize through a per-URL
//! advisory lock file; a lock held by another process surfaces as
//! [`Error::Locked`] instead of blocking. Directory creation goes through
//! a coarse structure lock.

use crate::download::{append_extension, Downloader};
use crate::{store, Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Revalidation interval for changing artifacts.
pub const CHANNEL_TTL: Duration = Duration::from_secs(30 * 60);

/// Default bound on concurrent downloads; some of the hosting sites refuse
/// more than a couple of simultaneous connections.
pub const DEFAULT_MAX_PARALLEL_DOWNLOADS: usize = 2;

/// Sidecar stored next to each cached file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub checksum: Checksum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checksum {
    /// Hex-encoded SHA-256 of the cached file.
    pub sha256: String,
}

/// Sidecar path of a cached file: the file path plus `.checked`.
pub fn check_path(path: &Path) -> PathBuf {
    append_extension(path, "checked")
}

/// Streamed SHA-256 of a file, hex-encoded.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// A remote artifact to be cached. `changing` artifacts revalidate after
/// [`CHANNEL_TTL`]; immutable ones are kept until evicted manually.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub url: String,
    pub changing: bool,
}

impl Artifact {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            changing: false,
        }
    }

    pub fn changing(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            changing: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
    pub max_parallel_downloads: usize,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_parallel_downloads: DEFAULT_MAX_PARALLEL_DOWNLOADS,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local cache path of a URL: `<root>/<scheme>/<host>/<encoded path>`.
    /// Derived from the URL alone so repeated runs address the same entry.
    pub fn local_path(&self, url: &str) -> Result<PathBuf> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| Error::ChannelData(format!("invalid URL '{}': {}", url, e)))?;
        let mut path = self
            .root
            .join(parsed.scheme())
            .join(parsed.host_str().unwrap_or("local"));
        let raw = match parsed.query() {
            Some(query) => format!("{}?{}", parsed.path(), query),
            None => parsed.path().to_string(),
        };
        let mut any = false;
        for segment in raw.split('/').filter(|s| !s.is_empty()) {
            path.push(urlencoding::encode(segment).into_owned());
            any = true;
        }
        if !any {
            path.push("root");
        }
        Ok(path)
    }

    /// When the cached file was last (re)validated; `None` means never
    /// fetched or fetched without a sidecar.
    pub fn last_checked(&self, path: &Path) -> Option<SystemTime> {
        fs::metadata(check_path(path)).and_then(|m| m.modified()).ok()
    }

    fn is_fresh(&self, path: &Path, ttl: Option<Duration>) -> bool {
        if !path.exists() {
            return false;
        }
        let Some(checked) = self.last_checked(path) else {
            return false;
        };
        match ttl {
            None => true,
            Some(ttl) => match SystemTime::now().duration_since(checked) {
                Ok(age) => age < ttl,
                Err(_) => true,
            },
        }
    }

    /// Return a local path for the artifact, downloading on a cache miss
    /// or when a changing artifact's TTL has elapsed.
    pub fn file(&self, artifact: &Artifact, downloader: &Downloader) -> Result<PathBuf> {
        let dest = self.local_path(&artifact.url)?;
        let ttl = artifact.changing.then_some(CHANNEL_TTL);
        if self.is_fresh(&dest, ttl) {
            debug!(url = %artifact.url, "cache hit");
            return Ok(dest);
        }

        {
            let _structure = self.structure_lock()?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = append_extension(&dest, "lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| Error::Locked {
                path: lock_path.clone(),
            })?;

        // A concurrent holder of the lock may have finished the download
        // between our freshness check and acquiring the lock.
        let result = if self.is_fresh(&dest, ttl) {
            debug!(url = %artifact.url, "cache filled concurrently");
            Ok(dest.clone())
        } else {
            debug!(url = %artifact.url, "cache miss, downloading");
            downloader.download(&artifact.url, &dest).map(|()| dest.clone())
        };
        let _ = FileExt::unlock(&lock_file);
        result
    }

    /// Fetch several artifacts with at most `max_parallel_downloads`
    /// concurrent transfers, preserving input order in the result. The
    /// first failure fails the whole batch (remaining `.part` files stay
    /// on disk for resumption).
    pub fn fetch_all(
        &self,
        artifacts: &[Artifact],
        downloader: &Downloader,
        on_fetched: Option<&(dyn Fn(&Artifact) + Sync)>,
    ) -> Result<Vec<PathBuf>> {
        if artifacts.is_empty() {
            return Ok(Vec::new());
        }
        let workers = self.max_parallel_downloads.clamp(1, artifacts.len());
        let next = AtomicUsize::new(0);
        let slots: Vec<Mutex<Option<Result<PathBuf>>>> =
            artifacts.iter().map(|_| Mutex::new(None)).collect();

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    if i >= artifacts.len() {
                        break;
                    }
                    let result = self.file(&artifacts[i], downloader);
                    if result.is_ok() {
                        if let Some(cb) = on_fetched {
                            cb(&artifacts[i]);
                        }
                    }
                    *slots[i].lock().expect("result slot poisoned") = Some(result);
                });
            }
        });

        slots
            .into_iter()
            .map(|slot| {
                slot.into_inner()
                    .expect("result slot poisoned")
                    .expect("worker completed every claimed slot")
            })
            .collect()
    }

    /// Recompute the file's SHA-256 and compare it against `expected` (or,
    /// absent an expectation, against the sidecar).
    pub fn validate(&self, path: &Path, url: &str, expected: Option<&str>) -> Result<()> {
        let got = sha256_file(path)?;
        let expected = match expected {
            Some(e) => e.to_string(),
            None => {
                let check: Option<CheckFile> = store::read(&check_path(path))?;
                match check {
                    Some(check) => check.checksum.sha256,
                    None => {
                        // No sidecar means the entry was never completed
                        return Err(Error::ChecksumError {
                            url: url.to_string(),
                            expected: "<missing sidecar>".to_string(),
                            got,
                        });
                    }
                }
            }
        };
        if got.eq_ignore_ascii_case(&expected) {
            Ok(())
        } else {
            Err(Error::ChecksumError {
                url: url.to_string(),
                expected,
                got,
            })
        }
    }

    fn structure_lock(&self) -> Result<File> {
        fs::create_dir_all(&self.root)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.root.join(".structure.lock"))?;
        file.lock_exclusive()?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::AuthCookies;
    use tempfile::TempDir;

    fn downloader() -> Downloader {
        Downloader::with_auth(AuthCookies::new("none.example", None)).unwrap()
    }

    fn local_artifact(dir: &Path, name: &str, content: &[u8]) -> Artifact {
        let source = dir.join(name);
        fs::write(&source, content).unwrap();
        Artifact::new(format!("file://{}", source.display()))
    }

    // ============================================================================
    // Cache key scheme
    // ============================================================================

    #[test]
    fn test_local_path_is_stable_and_url_derived() {
        let cache = FileCache::new("/cache");
        let a = cache
            .local_path("https://example.com/downloads/fixes.zip")
            .unwrap();
        let b = cache
            .local_path("https://example.com/downloads/fixes.zip")
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a, PathBuf::from("/cache/https/example.com/downloads/fixes.zip"));
    }

    #[test]
    fn test_local_path_distinguishes_query() {
        let cache = FileCache::new("/cache");
        let plain = cache.local_path("https://example.com/dl").unwrap();
        let query = cache.local_path("https://example.com/dl?id=42").unwrap();
        assert_ne!(plain, query);
    }

    #[test]
    fn test_local_path_encodes_awkward_segments() {
        let cache = FileCache::new("/cache");
        let path = cache
            .local_path("https://example.com/a%20b/file.zip?x=1&y=2")
            .unwrap();
        for component in path.components() {
            let s = component.as_os_str().to_string_lossy();
            assert!(!s.contains('&'), "unencoded query separator in {:?}", path);
        }
    }

    #[test]
    fn test_local_path_rejects_garbage() {
        let cache = FileCache::new("/cache");
        assert!(cache.local_path("not a url").is_err());
    }

    // ============================================================================
    // TTL semantics
    // ============================================================================

    #[test]
    fn test_unchanging_artifact_cached_forever() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().join("cache"));
        let artifact = local_artifact(dir.path(), "a.zip", b"v1");

        let path = cache.file(&artifact, &downloader()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"v1");

        // Source changes, but the immutable artifact is not refetched
        fs::write(dir.path().join("a.zip"), b"v2").unwrap();
        let path = cache.file(&artifact, &downloader()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"v1");
    }

    #[test]
    fn test_changing_artifact_revalidates_after_ttl() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().join("cache"));
        let source = dir.path().join("index.json");
        fs::write(&source, b"v1").unwrap();
        let artifact = Artifact::changing(format!("file://{}", source.display()));

        let path = cache.file(&artifact, &downloader()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"v1");

        // Fresh within TTL: no refetch even though the source changed
        fs::write(&source, b"v2").unwrap();
        let path = cache.file(&artifact, &downloader()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"v1");

        // Age the sidecar beyond the TTL
        let sidecar = File::options().write(true).open(check_path(&path)).unwrap();
        sidecar
            .set_modified(SystemTime::now() - CHANNEL_TTL - Duration::from_secs(60))
            .unwrap();
        drop(sidecar);

        let path = cache.file(&artifact, &downloader()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"v2");
    }

    #[test]
    fn test_missing_sidecar_means_untrusted() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().join("cache"));
        let artifact = local_artifact(dir.path(), "a.zip", b"v1");

        let path = cache.file(&artifact, &downloader()).unwrap();
        fs::remove_file(check_path(&path)).unwrap();

        // Source changed; without the sidecar the cached file is refetched
        fs::write(dir.path().join("a.zip"), b"v2").unwrap();
        let path = cache.file(&artifact, &downloader()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"v2");
    }

    // ============================================================================
    // Locking
    // ============================================================================

    #[test]
    fn test_held_url_lock_fails_fast() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().join("cache"));
        let artifact = local_artifact(dir.path(), "a.zip", b"v1");

        // Simulate another process holding the per-URL lock
        let dest = cache.local_path(&artifact.url).unwrap();
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        let lock_path = append_extension(&dest, "lock");
        let holder = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .unwrap();
        holder.try_lock_exclusive().unwrap();

        let result = cache.file(&artifact, &downloader());
        assert!(matches!(result, Err(Error::Locked { .. })));

        let _ = FileExt::unlock(&holder);
        assert!(cache.file(&artifact, &downloader()).is_ok());
    }

    // ============================================================================
    // Validation
    // ============================================================================

    #[test]
    fn test_validate_against_sidecar_and_expectation() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().join("cache"));
        let artifact = local_artifact(dir.path(), "a.zip", b"payload");
        let path = cache.file(&artifact, &downloader()).unwrap();

        cache.validate(&path, &artifact.url, None).unwrap();
        let good = sha256_file(&path).unwrap();
        cache.validate(&path, &artifact.url, Some(&good)).unwrap();
        cache
            .validate(&path, &artifact.url, Some(&good.to_uppercase()))
            .unwrap();

        let bad = "0".repeat(64);
        let result = cache.validate(&path, &artifact.url, Some(&bad));
        assert!(matches!(result, Err(Error::ChecksumError { .. })));
    }

    // ============================================================================
    // Parallel fetch
    // ============================================================================

    #[test]
    fn test_fetch_all_preserves_order() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().join("cache"));
        let artifacts = vec![
            local_artifact(dir.path(), "a.zip", b"aaa"),
            local_artifact(dir.path(), "b.zip", b"bbb"),
            local_artifact(dir.path(), "c.zip", b"ccc"),
        ];

        let counter = AtomicUsize::new(0);
        let on_fetched = |_: &Artifact| {
            counter.fetch_add(1, Ordering::SeqCst);
        };
        let paths = cache
            .fetch_all(&artifacts, &downloader(), Some(&on_fetched))
            .unwrap();

        assert_eq!(paths.len(), 3);
        assert_eq!(fs::read(&paths[0]).unwrap(), b"aaa");
        assert_eq!(fs::read(&paths[1]).unwrap(), b"bbb");
        assert_eq!(fs::read(&paths[2]).unwrap(), b"ccc");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_fetch_all_propagates_failure() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path().join("cache"));
        let artifacts = vec![
            local_artifact(dir.path(), "a.zip", b"aaa"),
            Artifact::new(format!("file://{}/absent.zip", dir.path().display())),
        ];
        let result = cache.fetch_all(&artifacts, &downloader(), None);
        assert!(result.is_err());
    }
}
