//! Resolve command - print the flattened member order of a virtual

use binrepo_core::MultiStatusHolder;
use binrepo_repo::{RepoKind, RepositoryGraph, VirtualRepoResolver};
use console::style;

use crate::error::{CliError, Result};
use crate::util::{Locations, kind_label};

pub fn run(locations: &Locations, key: &str, internal: bool, json: bool) -> Result<()> {
    let graph = RepositoryGraph::new(locations.load_config()?)?;
    let snapshot = graph.snapshot();

    match snapshot.kind_of(key) {
        Some(RepoKind::Virtual) => {}
        Some(kind) => {
            return Err(CliError::usage(format!(
                "'{}' is a {} repository, not a virtual one",
                key,
                kind_label(kind)
            )));
        }
        None => {
            return Err(CliError::not_found_with_help(
                format!("Repository '{}' not found", key),
                "run 'binrepo check' to list the configured repositories",
            ));
        }
    }

    let mut status = MultiStatusHolder::new().with_logging(false);
    let resolved = VirtualRepoResolver::new(&snapshot).resolve_key(key, &mut status)?;
    let remotes: Vec<&str> = resolved
        .remote_candidates(internal)
        .iter()
        .map(|r| r.key())
        .collect();

    // Cycle warnings never go to stdout
    for warning in status.warnings() {
        eprintln!("{} {}", style("⚠").yellow(), warning.message());
    }

    if json {
        let repositories: Vec<serde_json::Value> = resolved
            .repos()
            .iter()
            .map(|r| serde_json::json!({ "key": r.key(), "kind": local_kind(r.is_cache()) }))
            .collect();
        let warnings: Vec<&str> = status.warnings().map(|w| w.message()).collect();
        let output = serde_json::json!({
            "virtual": key,
            "repositories": repositories,
            "remotes": remotes,
            "warnings": warnings,
        });
        let rendered = serde_json::to_string_pretty(&output)
            .map_err(|e| CliError::Internal { message: e.to_string() })?;
        println!("{}", rendered);
        return Ok(());
    }

    println!("{} {}", style("Virtual").bold(), style(key).cyan().bold());
    if resolved.is_empty() {
        println!("  (no repositories)");
    }
    for (index, repo) in resolved.repos().iter().enumerate() {
        println!(
            "  {:>2}. {:<30} {}",
            index + 1,
            repo.key(),
            style(local_kind(repo.is_cache())).dim()
        );
    }

    if !remotes.is_empty() {
        println!();
        println!("{}", style("Remote candidates").bold());
        for remote in &remotes {
            println!("  - {}", remote);
        }
    }
    Ok(())
}

fn local_kind(is_cache: bool) -> &'static str {
    if is_cache { "cache" } else { "local" }
}
