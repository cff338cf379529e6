pub mod add;
pub mod channel;
pub mod info;
pub mod list;
pub mod remove;
pub mod search;
pub mod update;
pub mod variant;

use anyhow::Result;
use sc4pac::{Downloader, FileCache, PluginsSpec, Profile};
use std::path::PathBuf;

/// Shared state every command starts from: the located profile, its
/// configuration, and the cache/downloader pair derived from it.
pub(crate) struct Context {
    pub profile: Profile,
    pub spec: PluginsSpec,
    pub cache: FileCache,
    pub downloader: Downloader,
}

impl Context {
    pub fn load(profile_flag: Option<PathBuf>) -> Result<Self> {
        let profile = Profile::locate(profile_flag)?;
        let spec = profile.read_or_init_spec()?;
        let cache = FileCache::new(profile.resolve(&spec.config.cache_root));
        let downloader = Downloader::new()?;
        Ok(Self {
            profile,
            spec,
            cache,
            downloader,
        })
    }

    pub fn connect_channels(&self) -> sc4pac::Result<Vec<sc4pac::ChannelRepository>> {
        sc4pac::channel::connect_all(&self.spec.config.channels, &self.cache, &self.downloader)
    }
}
