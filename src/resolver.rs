//! Dependency resolution with variant selection
//!
//! Resolution walks the explicitly requested packages across the configured
//! channels (first channel wins), selects one [`VariantData`] per package by
//! walking a [`DecisionTree`] against the user's accumulated variant
//! choices, and recursively collects module and asset dependencies into an
//! ordered [`Resolution`] graph.
//!
//! A package needing a variant key the user has not decided yet surfaces as
//! [`Error::MissingVariant`]; the command driver prompts for exactly that
//! key and re-runs resolution until it succeeds or the user aborts.

use crate::cache::FileCache;
use crate::channel::ChannelRepository;
use crate::data::{BareAsset, BareModule, Dep, DepAsset, DepKey, DepModule, Variant};
use crate::download::Downloader;
use crate::metadata::{PackageMetadata, VariantData};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Decision structure over the declared variants of one package.
///
/// Each node asks for one key; each choice narrows the candidate set. By
/// construction the node's key is present in every remaining candidate, so
/// a full walk decides every key the package needs.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionTree {
    Node {
        key: String,
        choices: Vec<(String, DecisionTree)>,
    },
    Empty,
}

impl DecisionTree {
    /// Build the tree from a package's declared variants.
    ///
    /// Fails with [`Error::NoCommonVariantKey`] when no key is shared by
    /// all candidates of some branch (ambiguous metadata).
    pub fn from_variants(variants: &[Variant], package: &str) -> Result<DecisionTree> {
        if variants.is_empty() {
            return Err(Error::ChannelData(format!(
                "package {} declares no variants",
                package
            )));
        }
        // Union of keys in first-appearance order
        let mut all_keys: Vec<String> = Vec::new();
        for v in variants {
            for k in v.keys() {
                if !all_keys.contains(k) {
                    all_keys.push(k.clone());
                }
            }
        }
        let indices: Vec<usize> = (0..variants.len()).collect();
        Self::helper(variants, indices, all_keys, package)
    }

    fn helper(
        variants: &[Variant],
        candidates: Vec<usize>,
        keys_left: Vec<String>,
        package: &str,
    ) -> Result<DecisionTree> {
        if candidates.len() == 1 {
            let v = &variants[candidates[0]];
            if keys_left.iter().all(|k| !v.contains_key(k)) {
                return Ok(DecisionTree::Empty);
            }
        }
        let key = keys_left
            .iter()
            .find(|k| candidates.iter().all(|&i| variants[i].contains_key(*k)))
            .cloned()
            .ok_or_else(|| Error::NoCommonVariantKey {
                package: package.to_string(),
            })?;

        // Partition by value, preserving first-appearance order of values
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for &i in &candidates {
            let value = variants[i][&key].clone();
            if !groups.contains_key(&value) {
                order.push(value.clone());
            }
            groups.entry(value).or_default().push(i);
        }

        let remaining: Vec<String> = keys_left.into_iter().filter(|k| *k != key).collect();
        let mut choices = Vec::with_capacity(order.len());
        for value in order {
            let group = groups.remove(&value).unwrap_or_default();
            let subtree = Self::helper(variants, group, remaining.clone(), package)?;
            choices.push((value, subtree));
        }
        Ok(DecisionTree::Node { key, choices })
    }

    /// Enumerate the key/value paths of all leaves, in declaration order.
    pub fn leaves(&self) -> Vec<Variant> {
        match self {
            DecisionTree::Empty => vec![Variant::new()],
            DecisionTree::Node { key, choices } => {
                let mut result = Vec::new();
                for (value, subtree) in choices {
                    for mut leaf in subtree.leaves() {
                        leaf.insert(key.clone(), value.clone());
                        result.push(leaf);
                    }
                }
                result
            }
        }
    }
}

/// The variant decision a package is waiting for, carried by
/// [`Error::MissingVariant`] so the driver can prompt for exactly this key.
#[derive(Debug, Clone)]
pub struct VariantChoice {
    pub package: BareModule,
    pub key: String,
    pub values: Vec<String>,
}

impl fmt::Display for VariantChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} requires a choice for variant '{}': candidates are {}",
            self.package,
            self.key,
            self.values.join(", ")
        )
    }
}

/// Select the [`VariantData`] of `pkg` matching the global variant.
///
/// Returns the index into `pkg.variants`.
pub fn select_variant(pkg: &PackageMetadata, global: &Variant) -> Result<usize> {
    let declared: Vec<Variant> = pkg.variants.iter().map(|vd| vd.variant.clone()).collect();
    let module = pkg.module();
    let tree = DecisionTree::from_variants(&declared, &module.to_string())?;

    let mut chosen = Variant::new();
    let mut node = &tree;
    loop {
        match node {
            DecisionTree::Empty => break,
            DecisionTree::Node { key, choices } => match global.get(key) {
                None => {
                    return Err(Error::MissingVariant(Box::new(VariantChoice {
                        package: module,
                        key: key.clone(),
                        values: choices.iter().map(|(v, _)| v.clone()).collect(),
                    })));
                }
                Some(configured) => {
                    let next = choices.iter().find(|(v, _)| v == configured);
                    match next {
                        Some((value, subtree)) => {
                            chosen.insert(key.clone(), value.clone());
                            node = subtree;
                        }
                        None => {
                            return Err(Error::UnsatisfiableVariantConstraints(format!(
                                "{}: variant '{}' is configured as '{}' but the \
                                 package offers {}",
                                module,
                                key,
                                configured,
                                choices
                                    .iter()
                                    .map(|(v, _)| format!("'{}'", v))
                                    .collect::<Vec<_>>()
                                    .join(", ")
                            )));
                        }
                    }
                }
            },
        }
    }

    pkg.variants
        .iter()
        .position(|vd| vd.variant.iter().all(|(k, v)| chosen.get(k) == Some(v)))
        .ok_or_else(|| Error::ChannelData(format!(
            "no declared variant of {} matches the decided values",
            module
        )))
}

/// One module of a resolution with everything staging needs later.
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    pub dep: DepModule,
    pub metadata: PackageMetadata,
    pub variant_index: usize,
}

impl ResolvedModule {
    pub fn variant_data(&self) -> &VariantData {
        &self.metadata.variants[self.variant_index]
    }
}

/// The resolved dependency graph: an ordered closure plus its edges.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    deps: Vec<Dep>,
    edges: HashMap<Dep, Vec<Dep>>,
    modules: HashMap<BareModule, ResolvedModule>,
    asset_checksums: HashMap<String, String>,
}

impl Resolution {
    /// Assemble a resolution from explicit parts (graph structure only).
    pub fn from_parts(deps: Vec<Dep>, edges: Vec<(Dep, Vec<Dep>)>) -> Self {
        Resolution {
            deps,
            edges: edges.into_iter().collect(),
            modules: HashMap::new(),
            asset_checksums: HashMap::new(),
        }
    }

    /// All deps, ordered so that dependencies precede their dependents.
    pub fn transitive_dependencies(&self) -> &[Dep] {
        &self.deps
    }

    /// Direct dependencies of `dep` (empty for assets).
    pub fn dependencies_of(&self, dep: &Dep) -> &[Dep] {
        self.edges.get(dep).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Deps directly depending on any member of `targets`.
    pub fn dependents_of(&self, targets: &HashSet<DepKey>) -> HashSet<DepKey> {
        self.deps
            .iter()
            .filter(|dep| {
                self.dependencies_of(dep)
                    .iter()
                    .any(|d| targets.contains(&d.key()))
            })
            .map(Dep::key)
            .collect()
    }

    pub fn resolved_module(&self, module: &BareModule) -> Option<&ResolvedModule> {
        self.modules.get(module)
    }

    /// Register a module's metadata when assembling a resolution by hand.
    pub fn insert_module(&mut self, resolved: ResolvedModule) {
        self.modules.insert(resolved.dep.module.clone(), resolved);
    }

    /// Expected SHA-256 for an asset, when its channel publishes one.
    pub fn asset_checksum(&self, asset_id: &str) -> Option<&str> {
        self.asset_checksums.get(asset_id).map(String::as_str)
    }
}

/// Resolve the transitive closure of `explicit` across `repos`.
pub fn resolve(
    explicit: &[BareModule],
    global_variant: &Variant,
    repos: &[ChannelRepository],
    cache: &FileCache,
    downloader: &Downloader,
) -> Result<Resolution> {
    let mut state = ResolveState {
        repos,
        cache,
        downloader,
        global: global_variant,
        result: Resolution::default(),
        visiting: HashSet::new(),
        assets: HashMap::new(),
    };
    for module in explicit {
        state.resolve_module(module)?;
    }
    Ok(state.result)
}

struct ResolveState<'a> {
    repos: &'a [ChannelRepository],
    cache: &'a FileCache,
    downloader: &'a Downloader,
    global: &'a Variant,
    result: Resolution,
    visiting: HashSet<BareModule>,
    assets: HashMap<String, DepAsset>,
}

impl ResolveState<'_> {
    fn resolve_module(&mut self, module: &BareModule) -> Result<DepModule> {
        if let Some(resolved) = self.result.modules.get(module) {
            return Ok(resolved.dep.clone());
        }
        if !self.visiting.insert(module.clone()) {
            return Err(Error::ChannelData(format!(
                "dependency cycle detected involving {}",
                module
            )));
        }

        // Priority order: the first channel declaring the module wins,
        // even when a later channel publishes a newer version.
        let found = self
            .repos
            .iter()
            .find_map(|repo| repo.lookup_module(module).map(|item| (repo, item)));
        let (repo, item) = found.ok_or_else(|| Error::VersionNotFound {
            module: module.to_string(),
        })?;

        let pkg = repo.package_metadata(module, &item.version, self.cache, self.downloader)?;
        let variant_index = select_variant(&pkg, self.global)?;
        let variant_data = pkg.variants[variant_index].clone();

        let mut children: Vec<Dep> = Vec::new();
        for dependency in &variant_data.dependencies {
            let dep = self.resolve_module(dependency)?;
            children.push(Dep::Module(dep));
        }
        for asset_ref in &variant_data.assets {
            let dep = self.resolve_asset(&asset_ref.asset_id)?;
            children.push(Dep::Asset(dep));
        }

        let dep = DepModule {
            module: module.clone(),
            version: pkg.version.clone(),
            variant: variant_data.variant.clone(),
        };
        self.result.deps.push(Dep::Module(dep.clone()));
        self.result.edges.insert(Dep::Module(dep.clone()), children);
        self.result.modules.insert(
            module.clone(),
            ResolvedModule {
                dep: dep.clone(),
                metadata: pkg,
                variant_index,
            },
        );
        self.visiting.remove(module);
        Ok(dep)
    }

    fn resolve_asset(&mut self, asset_id: &str) -> Result<DepAsset> {
        if let Some(dep) = self.assets.get(asset_id) {
            return Ok(dep.clone());
        }
        let found = self
            .repos
            .iter()
            .find_map(|repo| repo.lookup_asset(asset_id).map(|item| (repo, item)));
        let (repo, item) = found.ok_or_else(|| Error::AssetNotFound {
            asset_id: asset_id.to_string(),
        })?;

        let meta = repo.asset_metadata(item, self.cache, self.downloader)?;
        let dep = DepAsset {
            asset: BareAsset {
                asset_id: meta.asset_id.clone(),
            },
            version: meta.version.clone(),
            url: meta.url.clone(),
        };
        if let Some(checksum) = meta.checksum_sha256 {
            self.result
                .asset_checksums
                .insert(meta.asset_id.clone(), checksum);
        }
        self.result.deps.push(Dep::Asset(dep.clone()));
        self.result.edges.insert(Dep::Asset(dep.clone()), Vec::new());
        self.assets.insert(asset_id.to_string(), dep.clone());
        Ok(dep)
    }
}
