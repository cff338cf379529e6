use super::Context;
use anyhow::Result;
use sc4pac::{BareModule, CliPrompter, Prompter};
use std::path::PathBuf;

pub fn run(profile: Option<PathBuf>, interactive: bool, packages: Vec<String>) -> Result<()> {
    let ctx = Context::load(profile)?;
    let mut spec = ctx.spec;

    let mut to_remove = packages
        .iter()
        .map(|p| BareModule::parse(p))
        .collect::<sc4pac::Result<Vec<_>>>()?;

    if interactive {
        if spec.explicit.is_empty() {
            println!("No packages have been explicitly added.");
            println!();
            return Ok(());
        }
        let prompter = CliPrompter::new();
        for module in spec.explicit.clone() {
            if to_remove.contains(&module) {
                continue;
            }
            if prompter.confirm(&format!("Remove {}?", module), false)? {
                to_remove.push(module);
            }
        }
    }

    if to_remove.is_empty() {
        println!("Nothing to remove.");
        println!();
        return Ok(());
    }

    let not_explicit: Vec<BareModule> = to_remove
        .iter()
        .filter(|m| !spec.explicit.contains(m))
        .cloned()
        .collect();
    ctx.profile.update_spec(&mut spec, |s| {
        for module in &to_remove {
            s.remove_explicit(module);
        }
    })?;

    for module in &to_remove {
        if not_explicit.contains(module) {
            println!("  ✗ {} was not explicitly added", module);
        } else {
            println!("  ✓ Removed {}", module);
        }
    }
    println!();
    println!("Run 'sc4pac update' to remove the files from your plugins folder.");
    println!();
    Ok(())
}
