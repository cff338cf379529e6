//! Profile configuration management
//!
//! A profile is a directory holding one `sc4pac-plugins.json` (the
//! configuration plus the set of explicitly requested packages), one
//! `sc4pac-plugins-lock.json`, and the plugins/cache/temp roots the
//! configuration points at.
//!
//! # Examples
//!
//! ```no_run
//! use sc4pac::config::Profile;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let profile = Profile::locate(None)?;
//! if let Some(spec) = profile.read_spec()? {
//!     println!("{} channels configured", spec.config.channels.len());
//! }
//! # Ok(())
//! # }
//! ```

use crate::data::{BareModule, Variant};
use crate::{store, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Filename of the profile configuration.
pub const PLUGINS_CONFIG_FILENAME: &str = "sc4pac-plugins.json";

/// Filename of the installed-state database.
pub const PLUGINS_LOCK_FILENAME: &str = "sc4pac-plugins-lock.json";

/// Channel used when a fresh profile is initialized.
pub const DEFAULT_CHANNEL: &str = "https://memo33.github.io/sc4pac/channel/";

/// Contents of `sc4pac-plugins.json`: the configuration block plus the
/// explicitly requested packages (their dependencies are implicit).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsSpec {
    pub config: PluginsConfig,
    #[serde(default)]
    pub explicit: Vec<BareModule>,
}

impl PluginsSpec {
    /// Defaults for a fresh profile: everything lives beside the config file.
    pub fn init_defaults() -> Self {
        Self {
            config: PluginsConfig {
                plugins_root: PathBuf::from("plugins"),
                cache_root: PathBuf::from("cache"),
                temp_root: PathBuf::from("temp"),
                channels: vec![DEFAULT_CHANNEL.to_string()],
                variant: Variant::new(),
            },
            explicit: Vec::new(),
        }
    }

    /// Record a package as explicitly requested. Returns false when it was
    /// already present.
    pub fn add_explicit(&mut self, module: &BareModule) -> bool {
        if self.explicit.contains(module) {
            return false;
        }
        self.explicit.push(module.clone());
        true
    }

    /// Drop a package from the explicit set. Returns false when it was not
    /// present.
    pub fn remove_explicit(&mut self, module: &BareModule) -> bool {
        let before = self.explicit.len();
        self.explicit.retain(|m| m != module);
        self.explicit.len() != before
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginsConfig {
    pub plugins_root: PathBuf,
    pub cache_root: PathBuf,
    pub temp_root: PathBuf,
    /// Channel URLs in priority order: the first channel declaring a
    /// package wins.
    #[serde(default)]
    pub channels: Vec<String>,
    /// The user's accumulated variant choices, shared by all packages.
    #[serde(default)]
    pub variant: Variant,
}

/// A profile directory and path helpers derived from it.
#[derive(Debug, Clone)]
pub struct Profile {
    pub root: PathBuf,
}

impl Profile {
    /// Locate the profile: explicit `--profile` flag, else the
    /// `SC4PAC_PROFILE_DIR` environment variable, else the current directory.
    pub fn locate(flag: Option<PathBuf>) -> Result<Self> {
        let root = match flag {
            Some(dir) => dir,
            None => match std::env::var("SC4PAC_PROFILE_DIR") {
                Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
                _ => std::env::current_dir()?,
            },
        };
        Ok(Self { root })
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(PLUGINS_CONFIG_FILENAME)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(PLUGINS_LOCK_FILENAME)
    }

    /// Resolve a configured root (plugins/cache/temp) against the profile
    /// directory; absolute paths are taken as-is.
    pub fn resolve(&self, configured: &Path) -> PathBuf {
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            self.root.join(configured)
        }
    }

    pub fn read_spec(&self) -> Result<Option<PluginsSpec>> {
        store::read(&self.config_path())
    }

    /// Read the configuration, creating it with defaults on first use.
    pub fn read_or_init_spec(&self) -> Result<PluginsSpec> {
        store::read_or_init(&self.config_path(), PluginsSpec::init_defaults)
    }

    /// Apply `patch` to the freshest on-disk configuration and persist it
    /// with a compare-and-swap, retrying once when a concurrent writer
    /// races in between. `spec` is updated to the written state, so
    /// changes made by other processes are preserved rather than
    /// overwritten.
    pub fn update_spec<F>(&self, spec: &mut PluginsSpec, patch: F) -> Result<()>
    where
        F: Fn(&mut PluginsSpec),
    {
        for attempt in 0..2 {
            let prior = store::current_value(&self.config_path())?;
            let mut fresh: PluginsSpec = match &prior {
                Some(value) => serde_json::from_value(value.clone())?,
                None => PluginsSpec::init_defaults(),
            };
            patch(&mut fresh);
            match store::write(&self.config_path(), &fresh, prior.as_ref()) {
                Ok(()) => {
                    *spec = fresh;
                    return Ok(());
                }
                Err(crate::Error::Stale { .. }) if attempt == 0 => continue,
                Err(e) => return Err(e),
            }
        }
        Err(crate::Error::Stale {
            path: self.config_path(),
        })
    }
}

/// Normalize a channel URL so relative metadata paths append cleanly.
pub fn normalize_channel_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    }
}
