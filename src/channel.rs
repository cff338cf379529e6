//! In-memory view over one channel's metadata
//!
//! Connecting to a channel fetches its index through the file cache
//! (revalidated on TTL expiry) and builds lookup tables for modules and
//! assets. Individual package documents are fetched lazily when the
//! resolver needs them.
//!
//! # Examples
//!
//! ```no_run
//! use sc4pac::{cache::FileCache, channel::ChannelRepository, download::Downloader};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = FileCache::new("cache");
//! let downloader = Downloader::new()?;
//! let repo = ChannelRepository::connect(
//!     "https://memo33.github.io/sc4pac/channel/",
//!     &cache,
//!     &downloader,
//! )?;
//! for item in repo.iterate_channel_contents() {
//!     println!("{}:{} {}", item.group, item.name, item.version);
//! }
//! # Ok(())
//! # }
//! ```

use crate::cache::{Artifact, FileCache};
use crate::config::normalize_channel_url;
use crate::data::BareModule;
use crate::download::Downloader;
use crate::metadata::{
    AssetMetadata, ChannelIndex, ChannelItem, PackageMetadata, CHANNEL_CONTENTS_FILENAME,
};
use crate::{store, Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// A search hit: `(module, summary, is_asset)`.
pub type SearchItem = (BareModule, String, bool);

pub struct ChannelRepository {
    /// Channel root, normalized with a trailing slash.
    pub url: String,
    index: ChannelIndex,
    modules: HashMap<BareModule, usize>,
    assets: HashMap<String, usize>,
}

impl ChannelRepository {
    /// Fetch and parse the channel index. The index is a changing
    /// artifact: it revalidates whenever its TTL has elapsed.
    pub fn connect(url: &str, cache: &FileCache, downloader: &Downloader) -> Result<Self> {
        let base = normalize_channel_url(url);
        if base.trim_end_matches('/').ends_with(".yaml") {
            return Err(Error::ChannelData(format!(
                "'{}' points at a YAML file; build it into a JSON channel first \
                 (sc4pac channel build)",
                url
            )));
        }
        let contents_url = format!("{}{}", base, CHANNEL_CONTENTS_FILENAME);
        let path = cache.file(&Artifact::changing(contents_url.clone()), downloader)?;
        let index: ChannelIndex = store::read(&path)?.ok_or_else(|| {
            Error::ChannelData(format!("channel index missing at {}", contents_url))
        })?;

        let mut modules = HashMap::new();
        let mut assets = HashMap::new();
        for (i, item) in index.packages.iter().enumerate() {
            if item.is_asset() {
                // Each asset id must map to exactly one artifact URL
                if assets.insert(item.name.clone(), i).is_some() {
                    return Err(Error::ChannelData(format!(
                        "channel {} declares the asset '{}' more than once",
                        base, item.name
                    )));
                }
            } else {
                modules.entry(item.module()).or_insert(i);
            }
        }
        Ok(Self {
            url: base,
            index,
            modules,
            assets,
        })
    }

    /// Lazy finite iteration over the current index contents.
    pub fn iterate_channel_contents(&self) -> impl Iterator<Item = &ChannelItem> {
        self.index.packages.iter()
    }

    /// Tuples consumed by the fuzzy search.
    pub fn search_items(&self) -> impl Iterator<Item = SearchItem> + '_ {
        self.index
            .packages
            .iter()
            .map(|item| (item.module(), item.summary.clone(), item.is_asset()))
    }

    pub fn lookup_module(&self, module: &BareModule) -> Option<&ChannelItem> {
        self.modules.get(module).map(|&i| &self.index.packages[i])
    }

    pub fn lookup_asset(&self, asset_id: &str) -> Option<&ChannelItem> {
        self.assets.get(asset_id).map(|&i| &self.index.packages[i])
    }

    fn metadata_url(&self, group: &str, name: &str, version: &str) -> String {
        format!(
            "{}metadata/{}/{}/{}/pkg.json",
            self.url, group, name, version
        )
    }

    /// Fetch the full metadata of `(module, version)` on demand.
    pub fn package_metadata(
        &self,
        module: &BareModule,
        version: &str,
        cache: &FileCache,
        downloader: &Downloader,
    ) -> Result<PackageMetadata> {
        let url = self.metadata_url(&module.group, &module.name, version);
        let path = cache.file(&Artifact::changing(url.clone()), downloader)?;
        store::read(&path)?
            .ok_or_else(|| Error::ChannelData(format!("package metadata missing at {}", url)))
    }

    /// Fetch the metadata of an asset listed in this channel's index.
    pub fn asset_metadata(
        &self,
        item: &ChannelItem,
        cache: &FileCache,
        downloader: &Downloader,
    ) -> Result<AssetMetadata> {
        let url = self.metadata_url(&item.group, &item.name, &item.version);
        let path = cache.file(&Artifact::changing(url.clone()), downloader)?;
        store::read(&path)?
            .ok_or_else(|| Error::ChannelData(format!("asset metadata missing at {}", url)))
    }
}

/// Connect to every configured channel concurrently (bounded by the cache's
/// download parallelism), preserving priority order. Channels that fail to
/// load are skipped with a warning; when all of them fail the whole
/// operation fails with [`Error::ChannelsNotAvailable`].
pub fn connect_all(
    channel_urls: &[String],
    cache: &FileCache,
    downloader: &Downloader,
) -> Result<Vec<ChannelRepository>> {
    if channel_urls.is_empty() {
        return Err(Error::ChannelsNotAvailable);
    }
    let workers = cache.max_parallel_downloads.clamp(1, channel_urls.len());
    let next = AtomicUsize::new(0);
    let slots: Vec<Mutex<Option<Result<ChannelRepository>>>> =
        channel_urls.iter().map(|_| Mutex::new(None)).collect();

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let i = next.fetch_add(1, Ordering::SeqCst);
                if i >= channel_urls.len() {
                    break;
                }
                let result = ChannelRepository::connect(&channel_urls[i], cache, downloader);
                *slots[i].lock().expect("channel slot poisoned") = Some(result);
            });
        }
    });

    let mut repos = Vec::new();
    for (url, slot) in channel_urls.iter().zip(slots) {
        match slot.into_inner().expect("channel slot poisoned") {
            Some(Ok(repo)) => repos.push(repo),
            Some(Err(e)) => warn!(channel = %url, "channel unavailable: {}", e),
            None => warn!(channel = %url, "channel load did not complete"),
        }
    }
    if repos.is_empty() {
        return Err(Error::ChannelsNotAvailable);
    }
    Ok(repos)
}
