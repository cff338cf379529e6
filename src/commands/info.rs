use super::Context;
use anyhow::Result;
use sc4pac::data::variant_display;
use sc4pac::{store, BareModule, Error, PluginsLock};
use std::path::PathBuf;

pub fn run(profile: Option<PathBuf>, package: String) -> Result<()> {
    let ctx = Context::load(profile)?;
    let module = BareModule::parse(&package)?;
    let repos = ctx.connect_channels()?;

    let found = repos
        .iter()
        .find_map(|repo| repo.lookup_module(&module).map(|item| (repo, item)));
    let Some((repo, item)) = found else {
        anyhow::bail!(Error::VersionNotFound {
            module: module.to_string(),
        });
    };

    let pkg = repo.package_metadata(&module, &item.version, &ctx.cache, &ctx.downloader)?;
    let lock: PluginsLock = store::read(&ctx.profile.lock_path())?.unwrap_or_default();

    println!("Name         : {}", module);
    println!("Version      : {}", pkg.version);
    if let Some(installed) = lock.find(&module) {
        let variant = if installed.variant.is_empty() {
            String::new()
        } else {
            format!(" [{}]", variant_display(&installed.variant))
        };
        println!("Installed    : {}{}", installed.version, variant);
    }
    if pkg.subfolder.components().next().is_some() {
        println!("Subfolder    : {}", pkg.subfolder.display());
    }
    if let Some(summary) = &pkg.info.summary {
        println!("Summary      : {}", summary);
    }
    if let Some(description) = &pkg.info.description {
        println!("Description  : {}", description);
    }
    if let Some(warning) = &pkg.info.warning {
        println!("Warning      : ⚠ {}", warning);
    }
    if let Some(conflicts) = &pkg.info.conflicts {
        println!("Conflicts    : {}", conflicts);
    }
    if let Some(author) = &pkg.info.author {
        println!("Author       : {}", author);
    }
    if let Some(website) = &pkg.info.website {
        println!("Website      : {}", website);
    }
    println!("Channel      : {}", repo.url);

    for variant_data in &pkg.variants {
        if !variant_data.variant.is_empty() {
            println!("Variant      : {}", variant_display(&variant_data.variant));
        }
        for dependency in &variant_data.dependencies {
            println!("  Dependency : {}", dependency);
        }
        for asset in &variant_data.assets {
            println!("  Asset      : {}", asset.asset_id);
        }
    }
    println!();
    Ok(())
}
