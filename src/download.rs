//! Single-URL download with resumable range requests
//!
//! One URL streams into a `.part` file which is atomically renamed into
//! place once complete. An interrupted download leaves the `.part` file
//! behind; the next attempt re-requests from shortly before the previous
//! end and byte-compares the overlapping window against what is already on
//! disk, so a server-side replacement of the artifact is detected instead
//! of producing a silently corrupted file.
//!
//! Retry discipline: connect/TLS failures retry up to [`SSL_RETRY_COUNT`]
//! times; read timeouts and short bodies retry up to [`RESUME_ATTEMPTS`]
//! times, resuming from the current `.part` length. Everything else fails
//! with a terminal download error.

use crate::cache::{check_path, sha256_file, CheckFile, Checksum};
use crate::{store, Error, Result};
use reqwest::blocking::Response;
use reqwest::header;
use reqwest::StatusCode;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Bytes re-fetched and compared when resuming a partial download.
pub const OVERLAP: u64 = 8 * 1024;

const SSL_RETRY_COUNT: u32 = 3;
const RESUME_ATTEMPTS: u32 = 5;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(60);
const COPY_BUF_SIZE: usize = 64 * 1024;

/// Environment variable holding the session cookie for the authenticated
/// download host.
pub const AUTH_COOKIE_ENV: &str = "SC4PAC_SIMTROPOLIS_COOKIE";

/// Host the cookie applies to (exact match or dot-suffixed subdomain).
pub const AUTH_HOST: &str = "community.simtropolis.com";

/// Progress callback: `(message, bytes_done, bytes_total)`; total is 0 when
/// the server did not announce a length.
pub type ProgressCallback = Arc<dyn Fn(&str, u64, u64) + Send + Sync>;

/// Session cookie applied only to matching hosts.
#[derive(Debug, Clone)]
pub struct AuthCookies {
    host: String,
    cookie: Option<String>,
}

impl AuthCookies {
    pub fn from_env() -> Self {
        Self {
            host: AUTH_HOST.to_string(),
            cookie: std::env::var(AUTH_COOKIE_ENV).ok().filter(|c| !c.is_empty()),
        }
    }

    pub fn new(host: &str, cookie: Option<String>) -> Self {
        Self {
            host: host.to_string(),
            cookie,
        }
    }

    /// The cookie value, when `request_host` is the configured host or one
    /// of its subdomains.
    pub fn cookie_for(&self, request_host: &str) -> Option<&str> {
        if host_matches(request_host, &self.host) {
            self.cookie.as_deref()
        } else {
            None
        }
    }
}

/// Exact host match, or `request_host` ends in `.configured`.
pub fn host_matches(request_host: &str, configured: &str) -> bool {
    let request_host = request_host.to_ascii_lowercase();
    let configured = configured.to_ascii_lowercase();
    request_host == configured || request_host.ends_with(&format!(".{}", configured))
}

/// Resume state derived from an existing `.part` file.
struct PartialDownload {
    already_downloaded: u64,
    trailing: Vec<u8>,
}

impl PartialDownload {
    /// Byte offset the range request starts from: the overlap window is
    /// re-fetched so it can be compared against the bytes on disk.
    fn offset(&self) -> u64 {
        self.already_downloaded - OVERLAP
    }
}

pub struct Downloader {
    client: reqwest::blocking::Client,
    auth: AuthCookies,
    progress: Option<ProgressCallback>,
}

impl Downloader {
    pub fn new() -> Result<Self> {
        Self::with_auth(AuthCookies::from_env())
    }

    pub fn with_auth(auth: AuthCookies) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("sc4pac/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(READ_TIMEOUT)
            .timeout(None)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self {
            client,
            auth,
            progress: None,
        })
    }

    pub fn set_progress(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    /// Download `url` into `dest`, resuming a previous partial download
    /// when possible, and write the `.checked` sidecar on success.
    pub fn download(&self, url: &str, dest: &Path) -> Result<()> {
        if let Some(local) = file_url_path(url) {
            return self.copy_local(&local, url, dest);
        }

        let mut ssl_retries = 0;
        let mut resume_attempts = 0;
        loop {
            match self.attempt(url, dest) {
                Ok(()) => return Ok(()),
                Err(e) if is_connect_error(&e) && ssl_retries < SSL_RETRY_COUNT => {
                    ssl_retries += 1;
                    warn!(url, attempt = ssl_retries, "connection failed, retrying: {}", e);
                }
                Err(e) if is_resumable_error(&e) && resume_attempts < RESUME_ATTEMPTS => {
                    resume_attempts += 1;
                    warn!(url, attempt = resume_attempts, "download interrupted, resuming: {}", e);
                }
                Err(e) => return Err(wrap_terminal(url, e)),
            }
        }
    }

    fn attempt(&self, url: &str, dest: &Path) -> Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let part = append_extension(dest, "part");

        let mut partial = read_partial(&part)?;
        let mut response = self.request(url, partial.as_ref().map(PartialDownload::offset))?;
        check_status(url, &response)?;

        if let Some(p) = &partial {
            if !range_honored(&response, p.offset()) {
                // Server ignored or mangled the range; start over without it.
                debug!(url, "range request not honored, restarting from scratch");
                partial = None;
                response = self.request(url, None)?;
                check_status(url, &response)?;
            }
        }

        let expected_total = expected_length(&response, partial.as_ref());
        let last_modified = header_string(&response, header::LAST_MODIFIED);
        let filename = content_disposition_filename(&response);

        self.stream_body(response, &part, partial, expected_total, url)?;

        fs::rename(&part, dest)?;
        if let Some(time) = last_modified.as_deref().and_then(parse_http_date) {
            let file = OpenOptions::new().write(true).open(dest)?;
            if let Err(e) = file.set_modified(time) {
                debug!(url, "could not apply server mtime: {}", e);
            }
        }
        write_sidecar(dest, filename)?;
        Ok(())
    }

    fn request(&self, url: &str, range_from: Option<u64>) -> Result<Response> {
        let mut request = self
            .client
            .get(url)
            .header(header::ACCEPT, "*/*");
        if let Ok(parsed) = reqwest::Url::parse(url) {
            if let Some(cookie) = parsed.host_str().and_then(|h| self.auth.cookie_for(h)) {
                request = request.header(header::COOKIE, cookie.to_string());
            }
        }
        if let Some(from) = range_from {
            request = request.header(header::RANGE, format!("bytes={}-", from));
        }
        Ok(request.send()?)
    }

    fn stream_body(
        &self,
        mut response: Response,
        part: &Path,
        partial: Option<PartialDownload>,
        expected_total: Option<u64>,
        url: &str,
    ) -> Result<()> {
        let mut total_written;
        let file = match &partial {
            Some(p) => {
                // The first OVERLAP bytes of the body repeat the tail of the
                // partial file; any difference means the remote object was
                // replaced since the previous attempt.
                let mut window = vec![0u8; OVERLAP as usize];
                response
                    .read_exact(&mut window)
                    .map_err(|e| Error::DownloadFailed {
                        url: url.to_string(),
                        reason: format!("connection closed inside the resume window: {}", e),
                    })?;
                if window != p.trailing {
                    fs::remove_file(part)?;
                    return Err(Error::StalePartialFile {
                        path: part.to_path_buf(),
                    });
                }
                total_written = p.already_downloaded;
                OpenOptions::new().append(true).open(part)?
            }
            None => {
                total_written = 0;
                File::create(part)?
            }
        };

        let step = expected_total
            .map(|t| (t / 10).max(1024 * 1024))
            .unwrap_or(8 * 1024 * 1024);
        let mut last_reported = total_written;

        let mut writer = BufWriter::new(file);
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        loop {
            let n = response.read(&mut buf)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
            total_written += n as u64;
            if total_written - last_reported >= step {
                last_reported = total_written;
                debug!(url, bytes = total_written, "downloading");
                if let Some(cb) = &self.progress {
                    cb(url, total_written, expected_total.unwrap_or(0));
                }
            }
        }
        writer.flush()?;

        if let Some(expected) = expected_total {
            if total_written != expected {
                return Err(Error::WrongLength {
                    got: total_written,
                    expected,
                });
            }
        }
        if let Some(cb) = &self.progress {
            cb(url, total_written, expected_total.unwrap_or(total_written));
        }
        Ok(())
    }

    /// `file://` artifacts bypass HTTP entirely: local channels and tests.
    fn copy_local(&self, source: &Path, url: &str, dest: &Path) -> Result<()> {
        if !source.exists() {
            return Err(Error::NotFound {
                url: url.to_string(),
            });
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let part = append_extension(dest, "part");
        fs::copy(source, &part)?;
        fs::rename(&part, dest)?;
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        write_sidecar(dest, filename)?;
        Ok(())
    }
}

/// Compute the sidecar for a freshly downloaded file.
fn write_sidecar(dest: &Path, filename: Option<String>) -> Result<()> {
    let sha256 = sha256_file(dest)?;
    let check = CheckFile {
        filename,
        checksum: Checksum { sha256 },
    };
    store::save(&check_path(dest), &check)
}

fn read_partial(part: &Path) -> Result<Option<PartialDownload>> {
    let Ok(meta) = fs::metadata(part) else {
        return Ok(None);
    };
    let len = meta.len();
    if len <= OVERLAP {
        // Too short to resume safely; the next write starts from zero.
        return Ok(None);
    }
    let mut file = File::open(part)?;
    file.seek(SeekFrom::End(-(OVERLAP as i64)))?;
    let mut trailing = vec![0u8; OVERLAP as usize];
    file.read_exact(&mut trailing)?;
    Ok(Some(PartialDownload {
        already_downloaded: len,
        trailing,
    }))
}

fn check_status(url: &str, response: &Response) -> Result<()> {
    let status = response.status();
    match status {
        StatusCode::NOT_FOUND => Err(Error::NotFound {
            url: url.to_string(),
        }),
        StatusCode::FORBIDDEN => Err(Error::Forbidden {
            url: url.to_string(),
        }),
        StatusCode::UNAUTHORIZED => Err(Error::Unauthorized {
            url: url.to_string(),
            realm: auth_realm(response).unwrap_or_else(|| "unknown realm".to_string()),
        }),
        s if s.is_client_error() || s.is_server_error() => Err(Error::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", s.as_u16()),
        }),
        _ => Ok(()),
    }
}

/// A range request counts as honored only for a 206 whose `Content-Range`
/// starts exactly at the requested offset.
fn range_honored(response: &Response, requested_offset: u64) -> bool {
    response.status() == StatusCode::PARTIAL_CONTENT
        && content_range_start(response) == Some(requested_offset)
}

fn expected_length(response: &Response, partial: Option<&PartialDownload>) -> Option<u64> {
    match partial {
        Some(p) => content_range_total(response)
            .or_else(|| response.content_length().map(|len| p.offset() + len)),
        None => response
            .content_length()
            .or_else(|| content_range_total(response)),
    }
}

fn header_string(response: &Response, name: header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Parse the start offset out of `Content-Range: bytes <start>-<end>/<total>`.
fn content_range_start(response: &Response) -> Option<u64> {
    let value = header_string(response, header::CONTENT_RANGE)?;
    parse_content_range(&value).map(|(start, _)| start)
}

fn content_range_total(response: &Response) -> Option<u64> {
    let value = header_string(response, header::CONTENT_RANGE)?;
    parse_content_range(&value).and_then(|(_, total)| total)
}

fn parse_content_range(value: &str) -> Option<(u64, Option<u64>)> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let (start, _end) = range.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let total = total.trim().parse().ok();
    Some((start, total))
}

fn auth_realm(response: &Response) -> Option<String> {
    let value = header_string(response, header::WWW_AUTHENTICATE)?;
    let idx = value.find("realm=")?;
    let realm = value[idx + "realm=".len()..].trim_start_matches('"');
    let end = realm.find('"').unwrap_or(realm.len());
    Some(realm[..end].to_string())
}

fn content_disposition_filename(response: &Response) -> Option<String> {
    let value = header_string(response, header::CONTENT_DISPOSITION)?;
    let idx = value.find("filename=")?;
    let name = value[idx + "filename=".len()..].trim();
    let name = name.trim_matches('"');
    let end = name.find(';').unwrap_or(name.len());
    let name = name[..end].trim().trim_matches('"');
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

fn parse_http_date(value: &str) -> Option<SystemTime> {
    chrono::DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| SystemTime::from(dt.with_timezone(&chrono::Utc)))
}

fn file_url_path(url: &str) -> Option<PathBuf> {
    if !url.starts_with("file:") {
        return None;
    }
    reqwest::Url::parse(url).ok()?.to_file_path().ok()
}

/// `dest` plus an additional extension: `a/b.zip` → `a/b.zip.part`.
pub(crate) fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn is_connect_error(error: &Error) -> bool {
    matches!(error, Error::Http(e) if e.is_connect())
}

fn is_resumable_error(error: &Error) -> bool {
    match error {
        Error::WrongLength { got, expected } => got < expected,
        // Read timeouts and connections dropped mid-body surface as IO
        // errors and leave a usable `.part` behind
        Error::Io(_) => true,
        Error::Http(e) => e.is_timeout(),
        _ => false,
    }
}

/// Convert leftover transport errors into the terminal download failure;
/// already-specific errors pass through untouched.
fn wrap_terminal(url: &str, error: Error) -> Error {
    match error {
        Error::Http(e) => Error::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        },
        Error::Io(e) => Error::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        },
        other => other,
    }
}
