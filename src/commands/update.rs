use super::Context;
use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use sc4pac::plan::UpdatePlan;
use sc4pac::{
    store, Artifact, CliPrompter, Dep, Error, NonInteractivePrompter, PluginsLock, Prompter,
};
use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::PathBuf;

pub fn run(profile: Option<PathBuf>, yes: bool) -> Result<()> {
    let ctx = Context::load(profile)?;

    let prompter: Box<dyn Prompter> = if yes {
        Box::new(NonInteractivePrompter::new(true))
    } else if std::io::stdin().is_terminal() {
        Box::new(CliPrompter::new())
    } else {
        Box::new(NonInteractivePrompter::new(false))
    };

    println!("Connecting to channels...");
    let repos = ctx.connect_channels()?;
    println!("  ✓ {} channels available", repos.len());

    let mut spec = ctx.spec;

    // Resolution loop: each missing variant is decided interactively,
    // persisted, and resolution re-runs with the refined global variant.
    println!("Resolving packages...");
    let resolution = loop {
        match sc4pac::resolver::resolve(
            &spec.explicit,
            &spec.config.variant,
            &repos,
            &ctx.cache,
            &ctx.downloader,
        ) {
            Ok(resolution) => break resolution,
            Err(Error::MissingVariant(choice)) => {
                let (key, value) = prompter.choose_variant(&choice)?;
                println!("  ✓ {} = {}", key, value);
                ctx.profile.update_spec(&mut spec, |s| {
                    s.config.variant.insert(key.clone(), value.clone());
                })?;
            }
            Err(e) => return Err(e.into()),
        }
    };
    println!(
        "  ✓ Resolved {} packages and assets",
        resolution.transitive_dependencies().len()
    );

    let lock: PluginsLock = store::read(&ctx.profile.lock_path())?.unwrap_or_default();
    let plan = UpdatePlan::from_resolution(&resolution, &lock.installed_deps());
    if plan.is_up_to_date() {
        println!();
        println!("✓ Everything is up-to-date.");
        println!();
        return Ok(());
    }

    describe_plan(&plan);
    if !prompter.confirm("Apply the changes to your plugins folder?", true)? {
        return Err(Error::Abort.into());
    }

    // Fetch phase: artifacts only, leaves first, bounded parallelism
    let asset_deps = plan.assets_to_fetch();
    let mut artifact_files: HashMap<String, PathBuf> = HashMap::new();
    if !asset_deps.is_empty() {
        println!("Fetching {} artifacts...", asset_deps.len());
        let bar = ProgressBar::new(asset_deps.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  [{bar:30}] {pos}/{len} {msg}")
                .unwrap(),
        );
        let artifacts: Vec<Artifact> = asset_deps
            .iter()
            .filter_map(|dep| match dep {
                Dep::Asset(a) => Some(Artifact::new(a.url.clone())),
                Dep::Module(_) => None,
            })
            .collect();
        let on_fetched = |_: &Artifact| bar.inc(1);
        let paths = ctx
            .cache
            .fetch_all(&artifacts, &ctx.downloader, Some(&on_fetched))?;
        bar.finish_and_clear();

        for (dep, path) in asset_deps.iter().zip(paths) {
            let Dep::Asset(asset) = dep else { continue };
            if let Some(expected) = resolution.asset_checksum(&asset.asset.asset_id) {
                ctx.cache.validate(&path, &asset.url, Some(expected))?;
            }
            artifact_files.insert(asset.asset.asset_id.clone(), path);
        }
        println!("  ✓ Artifacts ready");
    }

    // Stage phase: sequential extraction into the scoped temp tree
    println!("Staging packages...");
    let temp_root = ctx.profile.resolve(&spec.config.temp_root);
    let on_staged = |dep: &sc4pac::DepModule| println!("  Extracting {}...", dep);
    let stage = sc4pac::stage::stage_all(
        &resolution,
        &plan,
        &artifact_files,
        &temp_root,
        Some(&on_staged),
    )?;

    if !stage.warnings.is_empty() {
        println!();
        for (module, text) in &stage.warnings {
            println!("  ⚠ {}: {}", module, text);
        }
        if prompter.is_interactive() && !prompter.confirm("Continue despite warnings?", true)? {
            return Err(Error::Abort.into());
        }
    }

    // Publish phase: serial, under the profile's file lock
    println!("Publishing...");
    let plugins_root = ctx.profile.resolve(&spec.config.plugins_root);
    let installed_count = stage.items.len();
    let removed_count = plan.to_remove.iter().filter(|k| !k.is_asset()).count();
    sc4pac::publish::publish(&ctx.profile, &plan, &stage, &resolution, &plugins_root)?;

    println!();
    println!(
        "✓ Update complete: {} packages installed, {} removed.",
        installed_count, removed_count
    );
    println!();
    Ok(())
}

fn describe_plan(plan: &UpdatePlan) {
    println!();
    println!("The following changes will be made:");
    for key in &plan.to_remove {
        if key.is_asset() || plan.to_reinstall.contains(key) {
            continue;
        }
        println!("  remove     {}", key);
    }
    for dep in plan.modules_to_install() {
        if plan.to_reinstall.contains(&dep.key()) {
            println!("  reinstall  {}", dep);
        } else {
            println!("  install    {}", dep);
        }
    }
    let asset_count = plan.to_install.iter().filter(|d| d.is_asset()).count();
    if asset_count > 0 {
        println!("  ({} asset downloads)", asset_count);
    }
    println!();
}
