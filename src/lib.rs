//! sc4pac - a package manager for SimCity 4 plugins
//!
//! sc4pac installs plugins declaratively: users list the packages they
//! want, and the tool resolves transitive dependencies across one or more
//! metadata channels, downloads the referenced asset archives (resumable,
//! checksum-verified, cached), extracts them according to per-package
//! filters, and atomically publishes the result into the plugins
//! directory while maintaining a lockfile of what is installed.
//!
//! # Examples
//!
//! ```no_run
//! use sc4pac::{Downloader, FileCache, Profile};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let profile = Profile::locate(None)?;
//! let spec = profile.read_or_init_spec()?;
//! let cache = FileCache::new(profile.resolve(&spec.config.cache_root));
//! let downloader = Downloader::new()?;
//!
//! let repos = sc4pac::channel::connect_all(&spec.config.channels, &cache, &downloader)?;
//! let resolution = sc4pac::resolver::resolve(
//!     &spec.explicit,
//!     &spec.config.variant,
//!     &repos,
//!     &cache,
//!     &downloader,
//! )?;
//! println!("{} deps resolved", resolution.transitive_dependencies().len());
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`data`] - Identity types: modules, assets, variants, resolved deps
//! - [`metadata`] - Channel JSON schema (index, packages, assets)
//! - [`config`] - Profile configuration (`sc4pac-plugins.json`)
//! - [`lockfile`] - Installed-state database (`sc4pac-plugins-lock.json`)
//! - [`store`] - Typed JSON persistence with compare-and-swap writes
//! - [`cache`] - Content-addressed artifact cache with TTL and sidecars
//! - [`download`] - Resumable, checksum-verified single-URL downloads
//! - [`channel`] - In-memory view over one channel's metadata
//! - [`resolver`] - Transitive resolution with variant selection
//! - [`plan`] - Diff of the desired closure against the installed state
//! - [`extract`] - Filtered archive extraction
//! - [`stage`] - Extraction into a scoped temporary plugins tree
//! - [`publish`] - Atomic swap into the live plugins directory
//! - [`prompt`] - Prompting abstraction (terminal and non-interactive)
//! - [`error`] - Error taxonomy and result handling

pub mod cache;
pub mod channel;
pub mod config;
pub mod data;
pub mod download;
pub mod error;
pub mod extract;
pub mod lockfile;
pub mod metadata;
pub mod plan;
pub mod prompt;
pub mod publish;
pub mod resolver;
pub mod stage;
pub mod store;

pub use cache::{Artifact, CheckFile, FileCache};
pub use channel::ChannelRepository;
pub use config::{PluginsConfig, PluginsSpec, Profile};
pub use data::{BareAsset, BareModule, Dep, DepAsset, DepKey, DepModule, Variant};
pub use download::Downloader;
pub use error::{Error, Result};
pub use lockfile::{InstalledData, PluginsLock};
pub use metadata::{AssetMetadata, ChannelItem, PackageMetadata};
pub use plan::UpdatePlan;
pub use prompt::{CliPrompter, NonInteractivePrompter, Prompter};
pub use resolver::{DecisionTree, Resolution, VariantChoice};
pub use stage::StageResult;
