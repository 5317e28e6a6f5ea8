//! Locate command - map a logical path to its physical location

use binrepo_core::RepoPath;
use binrepo_repo::RepositoryService;

use crate::error::Result;
use crate::util::Locations;

pub fn run(locations: &Locations, path: &str) -> Result<()> {
    let requested = RepoPath::parse(path)?;
    let service = RepositoryService::builder(locations.load_config()?)?.build();
    let target = service.resolve_write_target(&requested)?;
    let location = locations.mapper()?.item_location(&target);

    if target != requested {
        tracing::debug!(from = %requested, to = %target, "write target redirected");
    }
    println!("{}", target);
    println!("{}", location.display());
    Ok(())
}
