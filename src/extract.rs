//! Archive extraction with per-package filtering
//!
//! Packages reference asset archives together with include/exclude
//! patterns deciding which entries land in the plugins tree. Patterns are
//! case-insensitive regular expressions matched against the `/`-prefixed
//! entry path; an empty include list admits everything, and excludes win
//! over includes.
//!
//! Entry paths are sanitized against directory traversal, and symbolic
//! links inside archives are skipped.

use crate::{Error, Result};
use flate2::read::GzDecoder;
use regex::{Regex, RegexBuilder};
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Compiled include/exclude patterns of one asset reference.
#[derive(Debug)]
pub struct FileFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl FileFilter {
    /// Admit every entry.
    pub fn all() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: compile_patterns(include)?,
            exclude: compile_patterns(exclude)?,
        })
    }

    /// Whether an entry path (relative, `/`-separated) gets extracted.
    pub fn accepts(&self, entry_path: &str) -> bool {
        let candidate = format!("/{}", entry_path.trim_start_matches('/'));
        if self.exclude.iter().any(|re| re.is_match(&candidate)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|re| re.is_match(&candidate))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| Error::ChannelData(format!("invalid filter pattern '{}': {}", p, e)))
        })
        .collect()
}

/// Extract the filtered entries of `archive` into `target`, returning the
/// relative paths of the files created. The archive format is chosen by
/// file extension; unsupported formats fail with a clear error.
pub fn extract_archive(archive: &Path, target: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if name.ends_with(".zip") || name.ends_with(".jar") {
        extract_zip(archive, target, filter)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_tar(GzDecoder::new(File::open(archive)?), archive, target, filter)
    } else if name.ends_with(".tar") {
        extract_tar(File::open(archive)?, archive, target, filter)
    } else {
        Err(Error::ExtractionFailed {
            archive: archive.to_path_buf(),
            reason: format!("unsupported archive format: {}", name),
        })
    }
}

fn extract_zip(archive: &Path, target: &Path, filter: &FileFilter) -> Result<Vec<PathBuf>> {
    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| Error::ExtractionFailed {
        archive: archive.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut produced = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(|e| Error::ExtractionFailed {
            archive: archive.to_path_buf(),
            reason: e.to_string(),
        })?;
        if entry.is_dir() {
            continue;
        }
        if is_zip_symlink(entry.unix_mode()) {
            debug!(entry = entry.name(), "skipping symlink in archive");
            continue;
        }
        // enclosed_name rejects traversal outside the extraction root
        let Some(rel) = entry.enclosed_name() else {
            debug!(entry = entry.name(), "skipping unsafe entry path");
            continue;
        };
        if !filter.accepts(&path_to_slash(&rel)) {
            continue;
        }
        let out = target.join(&rel);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out)?;
        io::copy(&mut entry, &mut out_file)?;
        produced.push(rel);
    }
    Ok(produced)
}

fn extract_tar<R: io::Read>(
    reader: R,
    archive: &Path,
    target: &Path,
    filter: &FileFilter,
) -> Result<Vec<PathBuf>> {
    let mut tar = tar::Archive::new(reader);
    let mut produced = Vec::new();
    let entries = tar.entries().map_err(|e| Error::ExtractionFailed {
        archive: archive.to_path_buf(),
        reason: e.to_string(),
    })?;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::ExtractionFailed {
            archive: archive.to_path_buf(),
            reason: e.to_string(),
        })?;
        let kind = entry.header().entry_type();
        if kind.is_symlink() || kind.is_hard_link() {
            debug!("skipping link in archive");
            continue;
        }
        if !kind.is_file() {
            continue;
        }
        let rel = {
            let raw = entry.path().map_err(|e| Error::ExtractionFailed {
                archive: archive.to_path_buf(),
                reason: e.to_string(),
            })?;
            match sanitize_entry_path(&raw) {
                Some(rel) => rel,
                None => {
                    debug!(entry = %raw.display(), "skipping unsafe entry path");
                    continue;
                }
            }
        };
        if !filter.accepts(&path_to_slash(&rel)) {
            continue;
        }
        let out = target.join(&rel);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out)?;
        io::copy(&mut entry, &mut out_file)?;
        produced.push(rel);
    }
    Ok(produced)
}

fn is_zip_symlink(unix_mode: Option<u32>) -> bool {
    matches!(unix_mode, Some(mode) if mode & 0o170000 == 0o120000)
}

/// Keep only plain path components; entries attempting traversal are
/// rejected entirely rather than silently rewritten.
fn sanitize_entry_path(path: &Path) -> Option<PathBuf> {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => result.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if result.as_os_str().is_empty() {
        None
    } else {
        Some(result)
    }
}

fn path_to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
