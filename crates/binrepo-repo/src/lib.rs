//! binrepo Repository Engine
//!
//! This crate turns a repository configuration into a resolvable namespace
//! and runs every storage mutation through an ordered, cancellable chain of
//! hooks under per-path locks:
//!
//! - `RepositoryGraph`: Atomically swappable runtime graph of repositories
//! - `VirtualRepoResolver`: Cycle-safe, ordered flattening of virtuals
//! - `LockManager` / `UnitOfWork`: Per-path read/write locks and sessions
//! - `InterceptorPipeline`: Before/after hooks around create, delete, move, copy
//! - `interceptors`: Metadata, user hook, and package metadata consumers
//! - `StatsBuffer`: Buffered download statistics
//! - `RepositoryService`: Facade combining all of the above

pub mod error;
pub mod graph;
pub mod interceptors;
pub mod lock;
pub mod pipeline;
pub mod resolver;
pub mod service;
pub mod stats;
pub mod store;
pub mod unit_of_work;

pub use error::{RepoError, Result};
pub use graph::{LocalRepo, RemoteRepo, RepoKind, RepositoryGraph, RuntimeGraph, VirtualRepo};
pub use lock::{LockManager, LockMode, LockToken, OwnerId};
pub use pipeline::{
    AfterCopy, AfterCreate, AfterDelete, AfterMove, BeforeCopy, BeforeCreate, BeforeDelete,
    BeforeMove, CancelSignal, HookContext, HookError, HookPhase, HookResult, Interceptor,
    InterceptorPipeline, InterceptorRegistry, MutationKind, MutationOutcome, MutationRequest,
    MutationState, Stage,
};
pub use resolver::{ResolvedRepoList, VirtualRepoItem, VirtualRepoResolver};
pub use service::{
    ANONYMOUS_USER, AnonymousAuthenticator, Authenticator, FixedUserAuthenticator, ResolvedItem,
    RepositoryService, RepositoryServiceBuilder,
};
pub use stats::{DownloadStats, StatsBuffer, StatsSink, run_flush_loop};
pub use store::{ItemStore, MemoryItemStore, OperationCounts};
pub use unit_of_work::{SaveHook, SaveHooks, SessionId, UnitOfWork};
