//! binrepo Core - Value types shared by the repository engine
//!
//! This crate provides the foundational types used throughout binrepo:
//! - `RepoPath`: Logical artifact identifier (repository key + relative path)
//! - `PathMapper`: Maps logical paths onto the physical storage layout
//! - `ItemInfo`: Immutable description of a stored file or folder
//! - `RepositoriesConfig`: Repository descriptors (local, remote, virtual)
//! - `StatusHolder` / `MultiStatusHolder`: Outcome and diagnostics carriers

pub mod config;
pub mod error;
pub mod item;
pub mod path;
pub mod status;

pub use config::{
    GLOBAL_VIRTUAL_KEY, LocalRepoDescriptor, LockPolicy, PackageType, ProxyDescriptor,
    RemoteRepoDescriptor, RepoDescriptor, RepoPolicy, RepositoriesConfig, SnapshotVersionBehavior,
    VirtualRepoDescriptor,
};
pub use error::{CoreError, Result};
pub use item::{ItemInfo, Properties};
pub use path::{PathMapper, RepoPath};
pub use status::{
    MultiStatusHolder, StatusCause, StatusEntry, StatusError, StatusHolder, StatusLevel,
    StatusReporter, codes,
};
