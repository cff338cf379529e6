//! Core identity types shared across the resolver, planner and lockfile
//!
//! A package is identified by a [`BareModule`] (`group:name`), a downloadable
//! archive by a [`BareAsset`] (its channel-wide asset id). A [`Variant`] maps
//! preference keys to values and selects one realization of a package.
//! Resolved dependencies carry concrete versions as [`Dep`] values.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a package: `group:name`. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BareModule {
    pub group: String,
    pub name: String,
}

impl BareModule {
    pub fn new(group: &str, name: &str) -> Self {
        Self {
            group: group.to_string(),
            name: name.to_string(),
        }
    }

    /// Parse a `group:name` spec as typed on the command line.
    pub fn parse(spec: &str) -> Result<Self> {
        let (group, name) = spec
            .split_once(':')
            .ok_or_else(|| Error::InvalidPackageName(spec.to_string()))?;
        if group.is_empty() || name.is_empty() || !is_identifier(group) || !is_identifier(name) {
            return Err(Error::InvalidPackageName(spec.to_string()));
        }
        Ok(Self::new(group, name))
    }
}

impl fmt::Display for BareModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

fn is_identifier(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
}

/// Identity of a downloadable artifact. Assets carry no variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BareAsset {
    pub asset_id: String,
}

impl fmt::Display for BareAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.asset_id)
    }
}

/// A mapping from variant key to chosen value. Keys are unique and
/// iteration order is deterministic (sorted by key).
pub type Variant = BTreeMap<String, String>;

/// Render a variant as `key=value, key=value` for display.
pub fn variant_display(variant: &Variant) -> String {
    variant
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A resolved module dependency: concrete version plus the selected variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepModule {
    pub module: BareModule,
    pub version: String,
    pub variant: Variant,
}

impl DepModule {
    /// On-disk folder name: `group.name[.values].version.sc4pac`, where the
    /// variant value tokens are sorted by key and joined with `-`. The
    /// `.sc4pac` suffix marks directories owned by this tool.
    pub fn folder_name(&self) -> String {
        let mut parts = format!("{}.{}", self.module.group, self.module.name);
        if !self.variant.is_empty() {
            let tokens: Vec<&str> = self.variant.values().map(String::as_str).collect();
            parts.push('.');
            parts.push_str(&tokens.join("-"));
        }
        format!("{}.{}.sc4pac", parts, self.version)
    }
}

impl fmt::Display for DepModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.module, self.version)
    }
}

/// A resolved asset dependency with the artifact URL it downloads from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepAsset {
    pub asset: BareAsset,
    pub version: String,
    pub url: String,
}

impl fmt::Display for DepAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.asset, self.version)
    }
}

/// A node of a resolution: either an installed module or a fetched asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dep {
    Module(DepModule),
    Asset(DepAsset),
}

impl Dep {
    pub fn is_asset(&self) -> bool {
        matches!(self, Dep::Asset(_))
    }

    /// Identity used for set arithmetic between a resolution and the
    /// installed state. Asset URLs are excluded: an installed asset matches
    /// a wanted one when id and version agree, regardless of where it was
    /// downloaded from.
    pub fn key(&self) -> DepKey {
        match self {
            Dep::Module(m) => DepKey::Module {
                module: m.module.clone(),
                version: m.version.clone(),
                variant: m.variant.clone(),
            },
            Dep::Asset(a) => DepKey::Asset {
                asset_id: a.asset.asset_id.clone(),
                version: a.version.clone(),
            },
        }
    }
}

impl fmt::Display for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dep::Module(m) => m.fmt(f),
            Dep::Asset(a) => a.fmt(f),
        }
    }
}

/// Comparable identity of a [`Dep`], shared between the desired closure and
/// the lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepKey {
    Module {
        module: BareModule,
        version: String,
        variant: Variant,
    },
    Asset {
        asset_id: String,
        version: String,
    },
}

impl DepKey {
    pub fn is_asset(&self) -> bool {
        matches!(self, DepKey::Asset { .. })
    }

    pub fn module(&self) -> Option<&BareModule> {
        match self {
            DepKey::Module { module, .. } => Some(module),
            DepKey::Asset { .. } => None,
        }
    }
}

impl fmt::Display for DepKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepKey::Module {
                module, version, ..
            } => write!(f, "{} {}", module, version),
            DepKey::Asset { asset_id, version } => write!(f, "{} {}", asset_id, version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_module_spec() {
        let m = BareModule::parse("memo:essential-fixes").unwrap();
        assert_eq!(m.group, "memo");
        assert_eq!(m.name, "essential-fixes");
        assert_eq!(m.to_string(), "memo:essential-fixes");
    }

    #[test]
    fn test_parse_module_spec_invalid() {
        assert!(BareModule::parse("no-colon").is_err());
        assert!(BareModule::parse(":name").is_err());
        assert!(BareModule::parse("group:").is_err());
        assert!(BareModule::parse("Group:name").is_err());
        assert!(BareModule::parse("gr oup:name").is_err());
    }

    #[test]
    fn test_folder_name_without_variant() {
        let dep = DepModule {
            module: BareModule::new("memo", "essential-fixes"),
            version: "1.0.0".to_string(),
            variant: Variant::new(),
        };
        assert_eq!(dep.folder_name(), "memo.essential-fixes.1.0.0.sc4pac");
    }

    #[test]
    fn test_folder_name_with_variant_sorted_by_key() {
        let mut variant = Variant::new();
        variant.insert("nightmode".to_string(), "dark".to_string());
        variant.insert("driveside".to_string(), "right".to_string());
        let dep = DepModule {
            module: BareModule::new("memo", "roads"),
            version: "2.1.0".to_string(),
            variant,
        };
        // driveside sorts before nightmode, so its value comes first
        assert_eq!(dep.folder_name(), "memo.roads.right-dark.2.1.0.sc4pac");
    }

    #[test]
    fn test_dep_key_ignores_asset_url() {
        let a = Dep::Asset(DepAsset {
            asset: BareAsset {
                asset_id: "asset-x".to_string(),
            },
            version: "1".to_string(),
            url: "https://mirror-a.example/x.zip".to_string(),
        });
        let b = Dep::Asset(DepAsset {
            asset: BareAsset {
                asset_id: "asset-x".to_string(),
            },
            version: "1".to_string(),
            url: "https://mirror-b.example/x.zip".to_string(),
        });
        assert_eq!(a.key(), b.key());
    }
}
