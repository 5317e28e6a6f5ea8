//! Check command - validate a configuration and report virtual cycles

use binrepo_core::MultiStatusHolder;
use binrepo_repo::{RepositoryGraph, VirtualRepoResolver};
use console::style;

use crate::error::{CliError, Result};
use crate::util::{Locations, display_path, kind_label};

pub fn run(locations: &Locations, strict: bool) -> Result<()> {
    let file = locations.config_file()?;
    println!(
        "{} Checking {}",
        style("→").blue(),
        style(display_path(&file)).cyan()
    );

    let config = locations.load_config()?;
    let graph = RepositoryGraph::new(config)?;
    let snapshot = graph.snapshot();

    println!();
    println!("{:<30} {:<10}", "KEY", "KIND");
    println!("{}", "-".repeat(40));
    for key in snapshot.keys() {
        if let Some(kind) = snapshot.kind_of(key) {
            println!("{:<30} {:<10}", key, kind_label(kind));
        }
    }
    for proxy in &snapshot.config().proxies {
        println!("{:<30} {:<10}", proxy.key, "proxy");
    }
    println!();

    let resolver = VirtualRepoResolver::new(&snapshot);
    let mut warnings = 0;
    for virt in snapshot.virtuals() {
        let mut status = MultiStatusHolder::new().with_logging(false);
        let resolved = resolver.resolve(virt, &mut status);
        for warning in status.warnings() {
            warnings += 1;
            println!("  {} {}", style("⚠").yellow(), warning.message());
        }
        tracing::debug!(virtual_repo = virt.key(), members = resolved.len(), "virtual resolved");
    }

    if warnings > 0 {
        println!();
        println!(
            "{} Configuration is valid with {} warning(s)",
            style("⚠").yellow().bold(),
            warnings
        );
        if strict {
            return Err(CliError::Warnings { warnings });
        }
    } else {
        println!(
            "{} Configuration is valid: {} repositories",
            style("✓").green().bold(),
            snapshot.keys().len()
        );
    }
    Ok(())
}
