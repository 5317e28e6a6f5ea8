//! Reference side-effect interceptors
//!
//! - [`metadata`]: aggregated metadata recalculation for descriptor files
//! - [`user_hooks`]: dispatch to operator-registered callbacks
//! - [`package`]: package metadata and latest-version tracking

pub mod metadata;
pub mod package;
pub mod user_hooks;

pub use metadata::{MetadataCalculator, MetadataInterceptor, MetadataRecalculator};
pub use package::{
    LatestVersionRequest, LatestVersionWorker, NupkgFormat, PackageFormat, PackageMetadata,
    PackageMetadataInterceptor, PackageMetadataStore, latest_version_channel,
};
pub use user_hooks::{HookEvent, UserHook, UserHookInterceptor};
