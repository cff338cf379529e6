//! Publishing: moving staged files into the live plugins directory
//!
//! The whole step runs under an advisory file lock next to the lockfile,
//! making the profile single-writer. Removals happen first, then each
//! staged package folder is moved into place (falling back to a recursive
//! copy when a plain rename fails, e.g. across filesystems), and finally
//! the lockfile is rewritten through a compare-and-swap so an interrupted
//! publish leaves either the old or the new lock on disk.
//!
//! A move that fails does not roll back the packages that already made it:
//! the lockfile reflects what is actually on disk and the failed packages
//! are reported for manual intervention.

use crate::config::Profile;
use crate::data::Dep;
use crate::download::append_extension;
use crate::lockfile::{installed_entry, PluginsLock};
use crate::plan::UpdatePlan;
use crate::resolver::Resolution;
use crate::stage::StageResult;
use crate::{store, Error, Result};
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing::{debug, warn};

/// Apply the staged files and the plan's removals to the live plugins
/// directory, then rewrite the lockfile. Returns the new lock state.
pub fn publish(
    profile: &Profile,
    plan: &UpdatePlan,
    stage: &StageResult,
    resolution: &Resolution,
    plugins_root: &Path,
) -> Result<PluginsLock> {
    fs::create_dir_all(plugins_root)?;
    let lock_path = profile.lock_path();

    let flock_path = append_extension(&lock_path, "lock");
    let flock = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&flock_path)?;
    flock.try_lock_exclusive().map_err(|_| Error::Locked {
        path: flock_path.clone(),
    })?;

    let result = publish_locked(profile, plan, stage, resolution, plugins_root);
    let _ = FileExt::unlock(&flock);
    result
}

fn publish_locked(
    profile: &Profile,
    plan: &UpdatePlan,
    stage: &StageResult,
    resolution: &Resolution,
    plugins_root: &Path,
) -> Result<PluginsLock> {
    let lock_path = profile.lock_path();
    let old_lock: PluginsLock = store::read(&lock_path)?.unwrap_or_default();

    // Removals precede moves so a reinstall never merges stale files into
    // the fresh package folder.
    for key in &plan.to_remove {
        let Some(module) = key.module() else { continue };
        let Some(entry) = old_lock.find(module) else {
            warn!(package = %module, "not in the lockfile, nothing to remove");
            continue;
        };
        for rel in &entry.files {
            let path = plugins_root.join(rel);
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else if path.exists() {
                fs::remove_file(&path)?;
            } else {
                warn!(path = %path.display(), "already absent, skipping removal");
            }
        }
    }

    let staged_root = stage.plugins_dir();
    let mut failed: Vec<String> = Vec::new();
    let mut new_entries = Vec::new();
    for staged in &stage.items {
        let mut ok = true;
        for rel in &staged.files {
            let src = staged_root.join(rel);
            let dst = plugins_root.join(rel);
            if let Err(e) = move_replace(&src, &dst) {
                warn!(package = %staged.dep.module, "failed to publish: {}", e);
                ok = false;
            }
        }
        if ok {
            let assets = resolution.dependencies_of(&Dep::Module(staged.dep.clone()));
            new_entries.push(installed_entry(&staged.dep, staged.files.clone(), assets));
        } else {
            failed.push(staged.dep.module.to_string());
        }
    }

    let new_lock = old_lock.update_to(plan, new_entries.clone());
    let prior = store::current_value(&lock_path)?;
    match store::write(&lock_path, &new_lock, prior.as_ref()) {
        Ok(()) => {}
        Err(Error::Stale { .. }) => {
            // Retried once: recompute from whatever is on disk now.
            debug!("lockfile changed concurrently, recomputing once");
            let fresh: PluginsLock = store::read(&lock_path)?.unwrap_or_default();
            let recomputed = fresh.update_to(plan, new_entries);
            let prior = store::current_value(&lock_path)?;
            store::write(&lock_path, &recomputed, prior.as_ref())?;
        }
        Err(e) => return Err(e),
    }

    if failed.is_empty() {
        Ok(new_lock)
    } else {
        Err(Error::PublishWarning {
            pkgs: failed.join(" "),
        })
    }
}

/// Move `src` over `dst`, replacing whatever is there and creating parent
/// directories. A failed rename (commonly "directory not empty" or a
/// cross-device move) falls back to a recursive copy plus remove.
fn move_replace(src: &Path, dst: &Path) -> Result<()> {
    if dst.is_dir() {
        fs::remove_dir_all(dst)?;
    } else if dst.exists() {
        fs::remove_file(dst)?;
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) => {
            debug!(src = %src.display(), dst = %dst.display(), "rename failed ({}), copying", e);
            copy_recursive(src, dst)?;
            if src.is_dir() {
                fs::remove_dir_all(src)?;
            } else {
                fs::remove_file(src)?;
            }
            Ok(())
        }
    }
}

fn copy_recursive(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        fs::copy(src, dst)?;
    }
    Ok(())
}
