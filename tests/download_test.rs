//! Downloader tests against a minimal local HTTP server.
//!
//! The server supports byte ranges and can be told to truncate its first
//! response, which is enough to exercise full round-trips, resumption and
//! the overlap guard without network access.

use sc4pac::cache::{check_path, sha256_file, CheckFile};
use sc4pac::download::{AuthCookies, Downloader, OVERLAP};
use sc4pac::Error;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tempfile::TempDir;

/// Requests seen by the server: `(path, range_start)`.
type RequestLog = Arc<Mutex<Vec<(String, Option<u64>)>>>;

struct TestServer {
    pub url: String,
    pub requests: RequestLog,
}

fn spawn_server(content: Vec<u8>, support_ranges: bool, truncate_first: bool) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind test server");
    let addr = listener.local_addr().unwrap();
    let requests: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();
    let truncate = Arc::new(AtomicBool::new(truncate_first));

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            let Some((path, range)) = read_request(&mut stream) else {
                continue;
            };
            log.lock().unwrap().push((path.clone(), range));

            if path.starts_with("/missing") {
                let _ = stream.write_all(
                    b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                );
                continue;
            }

            let (status, body, extra) = match range {
                Some(start) if support_ranges && (start as usize) < content.len() => {
                    let body = content[start as usize..].to_vec();
                    let extra = format!(
                        "Content-Range: bytes {}-{}/{}\r\n",
                        start,
                        content.len() - 1,
                        content.len()
                    );
                    ("206 Partial Content", body, extra)
                }
                _ => ("200 OK", content.clone(), String::new()),
            };

            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
                status,
                body.len(),
                extra
            );
            let _ = stream.write_all(head.as_bytes());
            if truncate.swap(false, Ordering::SeqCst) {
                let _ = stream.write_all(&body[..body.len() / 2]);
            } else {
                let _ = stream.write_all(&body);
            }
        }
    });

    TestServer {
        url: format!("http://{}", addr),
        requests,
    }
}

fn read_request(stream: &mut std::net::TcpStream) -> Option<(String, Option<u64>)> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        match stream.read(&mut byte) {
            Ok(0) | Err(_) => return None,
            Ok(_) => buf.push(byte[0]),
        }
    }
    let request = String::from_utf8_lossy(&buf).to_string();
    let path = request.split_whitespace().nth(1)?.to_string();
    let range = request.lines().find_map(|line| {
        line.trim_end()
            .to_ascii_lowercase()
            .strip_prefix("range: bytes=")?
            .strip_suffix('-')?
            .parse::<u64>()
            .ok()
    });
    Some((path, range))
}

fn downloader() -> Downloader {
    Downloader::with_auth(AuthCookies::new("none.example", None)).unwrap()
}

/// Deterministic, non-repeating test payload.
fn payload(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i * 31 + i / 251) % 256) as u8)
        .collect()
}

fn part_path(dest: &Path) -> std::path::PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    name.into()
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn test_download_round_trip_with_sidecar() {
    let content = payload(100_000);
    let server = spawn_server(content.clone(), true, false);
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("artifact.zip");

    downloader()
        .download(&format!("{}/artifact.zip", server.url), &dest)
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), content);
    let check: CheckFile = sc4pac::store::read(&check_path(&dest)).unwrap().unwrap();
    assert_eq!(check.checksum.sha256, sha256_file(&dest).unwrap());
    assert!(!part_path(&dest).exists(), "no partial file left behind");
}

#[test]
fn test_download_not_found() {
    let server = spawn_server(Vec::new(), true, false);
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("missing.zip");

    let result = downloader().download(&format!("{}/missing.zip", server.url), &dest);
    assert!(matches!(result, Err(Error::NotFound { .. })));
    assert!(!dest.exists());
}

// ============================================================================
// Resumption
// ============================================================================

#[test]
fn test_resume_from_partial_file() {
    let content = payload(100_000);
    let server = spawn_server(content.clone(), true, false);
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("artifact.zip");

    // A previous run left 50 000 valid bytes behind
    let seeded: u64 = 50_000;
    std::fs::write(part_path(&dest), &content[..seeded as usize]).unwrap();

    downloader()
        .download(&format!("{}/artifact.zip", server.url), &dest)
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), content, "resumed bytes equal a fresh download");
    let requests = server.requests.lock().unwrap();
    assert_eq!(
        requests[0].1,
        Some(seeded - OVERLAP),
        "range starts one overlap window before the partial end"
    );
}

#[test]
fn test_resume_after_truncated_response() {
    let content = payload(100_000);
    let server = spawn_server(content.clone(), true, true);
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("artifact.zip");

    // First response is cut off halfway; the retry resumes and completes
    downloader()
        .download(&format!("{}/artifact.zip", server.url), &dest)
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), content);
    let requests = server.requests.lock().unwrap();
    assert!(requests.len() >= 2, "expected a retry after the truncation");
    assert!(
        requests.iter().any(|(_, range)| range.is_some()),
        "the retry used a range request"
    );
}

#[test]
fn test_server_without_ranges_restarts_from_scratch() {
    let content = payload(100_000);
    let server = spawn_server(content.clone(), false, false);
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("artifact.zip");

    std::fs::write(part_path(&dest), &content[..50_000]).unwrap();

    downloader()
        .download(&format!("{}/artifact.zip", server.url), &dest)
        .unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), content);
}

// ============================================================================
// Overlap guard
// ============================================================================

#[test]
fn test_stale_partial_is_detected_and_removed() {
    let content = payload(100_000);
    let server = spawn_server(content.clone(), true, false);
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("artifact.zip");

    // The partial file does not match what the server now serves: the
    // remote object was replaced between the two runs
    let mut stale = content[..50_000].to_vec();
    let len = stale.len();
    for b in &mut stale[len - 100..] {
        *b ^= 0xFF;
    }
    std::fs::write(part_path(&dest), &stale).unwrap();

    let result = downloader().download(&format!("{}/artifact.zip", server.url), &dest);
    assert!(matches!(result, Err(Error::StalePartialFile { .. })));
    assert!(!dest.exists(), "no corrupted destination file is produced");
    assert!(
        !part_path(&dest).exists(),
        "the stale partial file is deleted so the next run starts clean"
    );
}
