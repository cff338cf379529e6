use super::Context;
use anyhow::Result;
use sc4pac::data::variant_display;
use sc4pac::{store, PluginsLock};
use std::path::PathBuf;

pub fn run(profile: Option<PathBuf>) -> Result<()> {
    let ctx = Context::load(profile)?;
    let lock: PluginsLock = store::read(&ctx.profile.lock_path())?.unwrap_or_default();

    if lock.installed.is_empty() {
        println!("No packages installed.");
        println!();
        println!("Add packages with 'sc4pac add <group:name>' and run 'sc4pac update'.");
        println!();
        return Ok(());
    }

    let mut entries = lock.installed.clone();
    entries.sort_by(|a, b| a.module().cmp(&b.module()));

    for entry in &entries {
        let marker = if ctx.spec.explicit.contains(&entry.module()) {
            "*"
        } else {
            " "
        };
        let variant = if entry.variant.is_empty() {
            String::new()
        } else {
            format!(" [{}]", variant_display(&entry.variant))
        };
        println!("{} {} {}{}", marker, entry.module(), entry.version, variant);
    }
    println!();
    println!(
        "{} packages installed ('*' marks explicitly added packages)",
        entries.len()
    );
    println!();
    Ok(())
}
