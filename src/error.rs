use std::path::PathBuf;
use thiserror::Error;

use crate::resolver::VariantChoice;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The user cancelled at a prompt. Printed without further detail.
    #[error("operation cancelled by user")]
    Abort,

    #[error("a prompt is required but the session is non-interactive: {0}")]
    NotInteractive(String),

    #[error("download failed: {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("not found (404): {url}")]
    NotFound { url: String },

    #[error("access forbidden (403): {url}")]
    Forbidden { url: String },

    #[error("authentication required ({realm}): {url}")]
    Unauthorized { url: String, realm: String },

    #[error("checksum mismatch for {url}\n  expected: {expected}\n  computed: {got}")]
    ChecksumError {
        url: String,
        expected: String,
        got: String,
    },

    #[error("truncated or oversized response: got {got} bytes, expected {expected}")]
    WrongLength { got: u64, expected: u64 },

    /// The partial file on disk no longer matches what the server serves.
    /// The stale `.part` file has been deleted; retrying starts from scratch.
    #[error("partial download is out of date, retry the download: {path}")]
    StalePartialFile { path: PathBuf },

    #[error("none of the configured channels are available")]
    ChannelsNotAvailable,

    #[error("no channel publishes the package {module}")]
    VersionNotFound { module: String },

    #[error("the referenced asset is unknown to all channels: {asset_id}")]
    AssetNotFound { asset_id: String },

    /// Recovered locally by prompting the user for a variant value and
    /// re-running resolution; never surfaced to the command line.
    #[error("{0}")]
    MissingVariant(Box<VariantChoice>),

    #[error("your configured variant contradicts the package metadata: {0}")]
    UnsatisfiableVariantConstraints(String),

    #[error("ambiguous variant metadata for {package}: no key is common to all candidate variants")]
    NoCommonVariantKey { package: String },

    #[error("invalid channel metadata: {0}")]
    ChannelData(String),

    #[error("invalid package name '{0}': expected <group>:<name> with lowercase letters, digits, '-' or '.'")]
    InvalidPackageName(String),

    #[error("failed to extract {archive}: {reason}")]
    ExtractionFailed { archive: PathBuf, reason: String },

    #[error("some packages could not be published and need manual intervention: {pkgs}")]
    PublishWarning { pkgs: String },

    #[error("state file was modified concurrently, try again: {path}")]
    Stale { path: PathBuf },

    #[error("another sc4pac process holds the lock: {path}")]
    Locked { path: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_subject() {
        let err = Error::VersionNotFound {
            module: "memo:essential-fixes".to_string(),
        };
        assert!(err.to_string().contains("memo:essential-fixes"));

        let err = Error::AssetNotFound {
            asset_id: "asset-x".to_string(),
        };
        assert!(err.to_string().contains("asset-x"));

        let err = Error::WrongLength {
            got: 10,
            expected: 20,
        };
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains("20"));
    }
}
