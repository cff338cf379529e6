//! Update planning: diffing the desired closure against the installed state
//!
//! A plan is derived purely from a [`Resolution`] and the installed dep
//! set: modules and assets that are wanted but not installed become
//! `to_install`; installed entries no longer wanted become `to_remove`;
//! modules whose asset versions changed underneath them are reinstalled
//! (removal first, then install).

use crate::data::{Dep, DepKey};
use crate::resolver::Resolution;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct UpdatePlan {
    /// Deps to fetch and stage, in resolution order (dependencies first).
    pub to_install: Vec<Dep>,
    /// Subset of `to_install` (and of `to_remove`) that is installed but
    /// must be rebuilt because one of its assets changed.
    pub to_reinstall: HashSet<DepKey>,
    /// Installed deps to delete from the plugins directory before moving
    /// the staged files in.
    pub to_remove: Vec<DepKey>,
}

impl UpdatePlan {
    pub fn from_resolution(resolution: &Resolution, installed: &HashSet<DepKey>) -> UpdatePlan {
        let wanted: HashSet<DepKey> = resolution
            .transitive_dependencies()
            .iter()
            .map(Dep::key)
            .collect();

        let missing: HashSet<DepKey> = wanted.difference(installed).cloned().collect();
        let obsolete: HashSet<DepKey> = installed.difference(&wanted).cloned().collect();
        let missing_assets: HashSet<&DepKey> =
            missing.iter().filter(|k| k.is_asset()).collect();

        // Installed modules whose assets changed: they are in both sets,
        // but one of their direct asset deps is newly missing.
        let mut to_reinstall: HashSet<DepKey> = HashSet::new();
        for dep in resolution.transitive_dependencies() {
            let Dep::Module(_) = dep else { continue };
            let key = dep.key();
            if !installed.contains(&key) {
                continue;
            }
            let depends_on_changed_asset = resolution
                .dependencies_of(dep)
                .iter()
                .any(|d| d.is_asset() && missing_assets.contains(&d.key()));
            if depends_on_changed_asset {
                to_reinstall.insert(key);
            }
        }

        // Assets needed to rebuild the reinstalled modules (they may be
        // cached and unchanged, but they must be part of the fetch phase).
        let mut reinstall_assets: HashSet<DepKey> = HashSet::new();
        for dep in resolution.transitive_dependencies() {
            if to_reinstall.contains(&dep.key()) {
                for d in resolution.dependencies_of(dep) {
                    if d.is_asset() {
                        reinstall_assets.insert(d.key());
                    }
                }
            }
        }

        let to_install: Vec<Dep> = resolution
            .transitive_dependencies()
            .iter()
            .filter(|dep| {
                let key = dep.key();
                missing.contains(&key)
                    || to_reinstall.contains(&key)
                    || reinstall_assets.contains(&key)
            })
            .cloned()
            .collect();

        let mut to_remove: Vec<DepKey> = obsolete.into_iter().collect();
        to_remove.sort();
        for key in &to_reinstall {
            if !to_remove.contains(key) {
                to_remove.push(key.clone());
            }
        }

        UpdatePlan {
            to_install,
            to_reinstall,
            to_remove,
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.to_install.is_empty() && self.to_remove.is_empty()
    }

    /// Modules to stage (everything in `to_install` that is not an asset).
    pub fn modules_to_install(&self) -> impl Iterator<Item = &Dep> {
        self.to_install.iter().filter(|d| !d.is_asset())
    }

    /// Assets to fetch, in reverse resolution order so that leaves are
    /// fetched first and partial progress survives an interruption.
    pub fn assets_to_fetch(&self) -> Vec<&Dep> {
        self.to_install
            .iter()
            .filter(|d| d.is_asset())
            .rev()
            .collect()
    }
}
