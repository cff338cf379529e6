use super::Context;
use anyhow::Result;
use sc4pac::{CliPrompter, Prompter};
use std::path::PathBuf;

pub fn run_reset(profile: Option<PathBuf>, interactive: bool, keys: Vec<String>) -> Result<()> {
    let ctx = Context::load(profile)?;
    let mut spec = ctx.spec;

    if spec.config.variant.is_empty() {
        println!("No variant choices recorded.");
        println!();
        return Ok(());
    }

    if keys.is_empty() && !interactive {
        println!("Current variant choices:");
        for (key, value) in &spec.config.variant {
            println!("  {} = {}", key, value);
        }
        println!();
        println!("Reset with 'sc4pac variant reset <key>' or 'sc4pac variant reset -i'.");
        println!();
        return Ok(());
    }

    let mut targets = keys;
    if interactive {
        let prompter = CliPrompter::new();
        for (key, value) in spec.config.variant.clone() {
            if targets.contains(&key) {
                continue;
            }
            if prompter.confirm(&format!("Reset {} (= {})?", key, value), false)? {
                targets.push(key);
            }
        }
    }

    if targets.is_empty() {
        println!("Nothing to reset.");
        println!();
        return Ok(());
    }

    let unknown: Vec<String> = targets
        .iter()
        .filter(|k| !spec.config.variant.contains_key(*k))
        .cloned()
        .collect();
    ctx.profile.update_spec(&mut spec, |s| {
        for key in &targets {
            s.config.variant.remove(key);
        }
    })?;

    for key in &targets {
        if unknown.contains(key) {
            println!("  ✗ no choice recorded for '{}'", key);
        } else {
            println!("  ✓ Reset '{}'", key);
        }
    }
    println!();
    println!("The next 'sc4pac update' will ask for the affected variants again.");
    println!();
    Ok(())
}
