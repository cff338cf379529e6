//! Installed-state database (`sc4pac-plugins-lock.json`)
//!
//! The lockfile records what is actually installed in the plugins
//! directory: one entry per module with its version, selected variant, the
//! asset versions it was built from, and the paths it produced. It is only
//! ever rewritten through [`PluginsLock::update_to`] while the publisher
//! holds the profile's file lock, and the write itself is a
//! compare-and-swap, so an interrupted update leaves either the old or the
//! new lockfile on disk, never a torn mixture.

use crate::data::{BareModule, Dep, DepKey, Variant};
use crate::plan::UpdatePlan;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsLock {
    #[serde(default)]
    pub installed: Vec<InstalledData>,
}

/// One installed module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledData {
    pub group: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub variant: Variant,
    /// Paths produced under the plugins root, relative to it. Removal
    /// deletes exactly these paths.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    /// Asset versions this module was extracted from; a version bump in
    /// the channel triggers a reinstall of the module.
    #[serde(default)]
    pub assets: Vec<InstalledAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledAsset {
    pub asset_id: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl InstalledData {
    pub fn module(&self) -> BareModule {
        BareModule::new(&self.group, &self.name)
    }

    pub fn dep_key(&self) -> DepKey {
        DepKey::Module {
            module: self.module(),
            version: self.version.clone(),
            variant: self.variant.clone(),
        }
    }
}

impl PluginsLock {
    /// The installed set as comparable dep identities: every module entry
    /// plus the union of the asset versions they were built from.
    pub fn installed_deps(&self) -> HashSet<DepKey> {
        let mut deps = HashSet::new();
        for entry in &self.installed {
            deps.insert(entry.dep_key());
            for asset in &entry.assets {
                deps.insert(DepKey::Asset {
                    asset_id: asset.asset_id.clone(),
                    version: asset.version.clone(),
                });
            }
        }
        deps
    }

    pub fn find(&self, module: &BareModule) -> Option<&InstalledData> {
        self.installed.iter().find(|e| &e.module() == module)
    }

    /// Derive the next lockfile state from an update plan: entries for
    /// removed modules are dropped, then the freshly staged entries are
    /// appended. `new_entries` must describe exactly the modules that were
    /// published (a move that failed mid-publish is excluded by the caller
    /// so the lockfile keeps reflecting the on-disk state).
    pub fn update_to(&self, plan: &UpdatePlan, new_entries: Vec<InstalledData>) -> PluginsLock {
        let removed: HashSet<&BareModule> = plan
            .to_remove
            .iter()
            .filter_map(|key| key.module())
            .collect();
        let replaced: HashSet<BareModule> =
            new_entries.iter().map(|e| e.module()).collect();

        let mut installed: Vec<InstalledData> = self
            .installed
            .iter()
            .filter(|e| !removed.contains(&e.module()) && !replaced.contains(&e.module()))
            .cloned()
            .collect();
        installed.extend(new_entries);
        PluginsLock { installed }
    }
}

/// Build a lockfile entry for a module that was staged from `dep` and
/// produced `files` under the plugins root.
pub fn installed_entry(dep: &crate::data::DepModule, files: Vec<PathBuf>, assets: &[Dep]) -> InstalledData {
    InstalledData {
        group: dep.module.group.clone(),
        name: dep.module.name.clone(),
        version: dep.version.clone(),
        variant: dep.variant.clone(),
        files,
        assets: assets
            .iter()
            .filter_map(|d| match d {
                Dep::Asset(a) => Some(InstalledAsset {
                    asset_id: a.asset.asset_id.clone(),
                    version: a.version.clone(),
                    sha256: None,
                }),
                Dep::Module(_) => None,
            })
            .collect(),
    }
}
