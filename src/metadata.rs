//! Channel metadata schema
//!
//! A channel is a URL root serving a JSON index
//! (`sc4pac-channel-contents.json`) that lists every available package and
//! asset identity, plus one JSON document per package version under
//! `metadata/<group>/<name>/<version>/pkg.json`.
//!
//! # Examples
//!
//! ```
//! use sc4pac::metadata::ChannelIndex;
//!
//! let json = r#"{ "packages": [
//!     { "group": "memo", "name": "essential-fixes", "version": "1.0.0",
//!       "summary": "Fixes for common issues" },
//!     { "group": "memo", "name": "essential-fixes-asset", "version": "2",
//!       "type": "sc4pac-asset" }
//! ]}"#;
//! let index: ChannelIndex = serde_json::from_str(json).unwrap();
//! assert!(!index.packages[0].is_asset());
//! assert!(index.packages[1].is_asset());
//! ```

use crate::data::{BareModule, Variant};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filename of the channel index, relative to the channel root.
pub const CHANNEL_CONTENTS_FILENAME: &str = "sc4pac-channel-contents.json";

/// Type tag distinguishing assets from packages in the channel index.
pub const ASSET_TYPE_TAG: &str = "sc4pac-asset";

/// The channel index: one entry per available package or asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelIndex {
    #[serde(default)]
    pub packages: Vec<ChannelItem>,
}

/// One line of the channel index. For assets, `name` is the asset id and
/// `type` is [`ASSET_TYPE_TAG`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelItem {
    pub group: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub summary: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ChannelItem {
    pub fn is_asset(&self) -> bool {
        self.kind.as_deref() == Some(ASSET_TYPE_TAG)
    }

    pub fn module(&self) -> BareModule {
        BareModule::new(&self.group, &self.name)
    }
}

/// Full metadata of one `(module, version)` pair, fetched on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub group: String,
    pub name: String,
    pub version: String,
    /// Relative directory under the plugins root that this package
    /// installs into (e.g. `150-mods`).
    #[serde(default)]
    pub subfolder: PathBuf,
    #[serde(default)]
    pub info: InfoBlock,
    /// Never empty: a package without declared variants carries a single
    /// [`VariantData`] with an empty variant map.
    pub variants: Vec<VariantData>,
}

impl PackageMetadata {
    pub fn module(&self) -> BareModule {
        BareModule::new(&self.group, &self.name)
    }
}

/// Descriptive fields of a package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfoBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Displayed prominently before installation; the user is asked to
    /// confirm when any staged package carries a warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<String>,
}

/// One realization of a package: the variant values it is bound to, the
/// assets it extracts from, and the modules it depends on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantData {
    #[serde(default)]
    pub variant: Variant,
    #[serde(default)]
    pub assets: Vec<AssetReference>,
    #[serde(default)]
    pub dependencies: Vec<BareModule>,
}

/// Reference from a package to an asset, with optional filters restricting
/// which archive entries get extracted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReference {
    pub asset_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

/// Full metadata of an asset: where its artifact downloads from.
///
/// The asset id maps 1:1 to an artifact URL within a channel; the index
/// loader rejects channels violating this.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetadata {
    pub asset_id: String,
    pub version: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// Expected SHA-256 of the artifact (hex), when the channel publishes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_sha256: Option<String>,
}
