//! Staging: extracting packages into a temporary plugins tree
//!
//! All extraction happens under `tempRoot/staging-XXXXXX/plugins/` before
//! anything touches the live plugins directory. The staging root is a
//! scoped temp directory: it is removed on every exit path, successful or
//! not, including cancellation mid-way.
//!
//! Staging is sequential: extraction is CPU- and disk-bound, and a stable
//! order keeps progress reporting readable.

use crate::data::{BareModule, Dep, DepModule};
use crate::extract::{extract_archive, FileFilter};
use crate::plan::UpdatePlan;
use crate::resolver::Resolution;
use crate::{Error, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// One staged package and the paths it produced, relative to the plugins
/// root.
#[derive(Debug)]
pub struct StagedPackage {
    pub dep: DepModule,
    pub files: Vec<PathBuf>,
}

/// The staged plugins tree. Dropping this removes the staging directory.
pub struct StageResult {
    staging: TempDir,
    pub items: Vec<StagedPackage>,
    /// `(module, warning text)` collected from package metadata.
    pub warnings: Vec<(BareModule, String)>,
}

impl StageResult {
    /// The temporary plugins tree the publisher moves files out of.
    pub fn plugins_dir(&self) -> PathBuf {
        self.staging.path().join("plugins")
    }
}

/// Extract every module of the plan into a fresh staging tree.
///
/// `artifact_files` maps asset ids to their cached archive files; every
/// asset referenced by a staged module must be present.
pub fn stage_all(
    resolution: &Resolution,
    plan: &UpdatePlan,
    artifact_files: &HashMap<String, PathBuf>,
    temp_root: &Path,
    progress: Option<&dyn Fn(&DepModule)>,
) -> Result<StageResult> {
    fs::create_dir_all(temp_root)?;
    let staging = tempfile::Builder::new()
        .prefix("staging-")
        .tempdir_in(temp_root)?;
    let plugins_tmp = staging.path().join("plugins");

    let mut items = Vec::new();
    let mut warnings = Vec::new();
    for dep in plan.modules_to_install() {
        let Dep::Module(module_dep) = dep else {
            continue;
        };
        let resolved = resolution
            .resolved_module(&module_dep.module)
            .ok_or_else(|| {
                Error::ChannelData(format!(
                    "resolution is missing metadata for {}",
                    module_dep.module
                ))
            })?;
        if let Some(cb) = progress {
            cb(module_dep);
        }

        let folder = resolved.metadata.subfolder.join(module_dep.folder_name());
        let dest = plugins_tmp.join(&folder);
        fs::create_dir_all(&dest)?;
        debug!(package = %module_dep.module, folder = %folder.display(), "staging");

        for asset_ref in &resolved.variant_data().assets {
            let archive = artifact_files.get(&asset_ref.asset_id).ok_or_else(|| {
                Error::AssetNotFound {
                    asset_id: asset_ref.asset_id.clone(),
                }
            })?;
            let filter = FileFilter::new(&asset_ref.include, &asset_ref.exclude)?;
            let extracted = extract_archive(archive, &dest, &filter)?;
            if extracted.is_empty() {
                warn!(
                    package = %module_dep.module,
                    asset = %asset_ref.asset_id,
                    "filters matched no files in the archive"
                );
            }
        }

        if let Some(text) = &resolved.metadata.info.warning {
            warnings.push((module_dep.module.clone(), text.clone()));
        }
        items.push(StagedPackage {
            dep: module_dep.clone(),
            files: vec![folder],
        });
    }

    Ok(StageResult {
        staging,
        items,
        warnings,
    })
}
