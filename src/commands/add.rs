use super::Context;
use anyhow::Result;
use sc4pac::{BareModule, Error};
use std::path::PathBuf;

pub fn run(profile: Option<PathBuf>, packages: Vec<String>) -> Result<()> {
    let ctx = Context::load(profile)?;
    let modules = packages
        .iter()
        .map(|p| BareModule::parse(p))
        .collect::<sc4pac::Result<Vec<_>>>()?;

    println!("Checking channels...");
    let repos = ctx.connect_channels()?;

    for module in &modules {
        let known = repos.iter().any(|r| r.lookup_module(module).is_some());
        if !known {
            let similar = similar_packages(&repos, module);
            let mut subject = module.to_string();
            if !similar.is_empty() {
                subject.push_str("\n\nDid you mean one of these?\n  ");
                subject.push_str(&similar.join("\n  "));
            }
            anyhow::bail!(Error::VersionNotFound { module: subject });
        }
    }

    let mut spec = ctx.spec;
    let already: Vec<BareModule> = modules
        .iter()
        .filter(|m| spec.explicit.contains(m))
        .cloned()
        .collect();
    ctx.profile.update_spec(&mut spec, |s| {
        for module in &modules {
            s.add_explicit(module);
        }
    })?;

    for module in &modules {
        if already.contains(module) {
            println!("  ✓ {} (already added)", module);
        } else {
            println!("  ✓ Added {}", module);
        }
    }
    println!();
    if already.len() < modules.len() {
        println!("Run 'sc4pac update' to install the packages.");
    }
    println!();
    Ok(())
}

/// Closest package names across all channels, for typo suggestions.
fn similar_packages(repos: &[sc4pac::ChannelRepository], module: &BareModule) -> Vec<String> {
    let wanted = module.to_string();
    let mut similar: Vec<(u8, String)> = Vec::new();
    for repo in repos {
        for (candidate, _, is_asset) in repo.search_items() {
            if is_asset {
                continue;
            }
            let score = super::search::fuzzy_score(&wanted, &candidate.to_string())
                .max(super::search::fuzzy_score(&module.name, &candidate.name));
            if score >= 70 {
                similar.push((score, candidate.to_string()));
            }
        }
    }
    similar.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    similar.dedup_by(|a, b| a.1 == b.1);
    similar.truncate(5);
    similar.into_iter().map(|(_, name)| name).collect()
}
