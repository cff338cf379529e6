use super::Context;
use anyhow::Result;
use sc4pac::config::normalize_channel_url;
use std::path::PathBuf;

pub fn run_add(profile: Option<PathBuf>, url: String) -> Result<()> {
    let ctx = Context::load(profile)?;
    let mut spec = ctx.spec;
    let normalized = normalize_channel_url(&url);

    if spec.config.channels.contains(&normalized) {
        println!("  ✓ Channel already configured: {}", normalized);
        println!();
        return Ok(());
    }

    ctx.profile.update_spec(&mut spec, |s| {
        if !s.config.channels.contains(&normalized) {
            s.config.channels.push(normalized.clone());
        }
    })?;
    println!("  ✓ Added channel {}", normalized);
    println!();
    Ok(())
}

pub fn run_remove(profile: Option<PathBuf>, url: String) -> Result<()> {
    let ctx = Context::load(profile)?;
    let mut spec = ctx.spec;
    let normalized = normalize_channel_url(&url);

    if !spec.config.channels.contains(&normalized) {
        println!("  ✗ Channel is not configured: {}", normalized);
        println!();
        return Ok(());
    }

    ctx.profile.update_spec(&mut spec, |s| {
        s.config.channels.retain(|c| c != &normalized);
    })?;
    println!("  ✓ Removed channel {}", normalized);
    println!();
    Ok(())
}

pub fn run_list(profile: Option<PathBuf>) -> Result<()> {
    let ctx = Context::load(profile)?;
    if ctx.spec.config.channels.is_empty() {
        println!("No channels configured.");
        println!();
        return Ok(());
    }
    for url in &ctx.spec.config.channels {
        println!("{}", url);
    }
    println!();
    Ok(())
}
