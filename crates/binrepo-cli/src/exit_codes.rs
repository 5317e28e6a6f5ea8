//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Configuration error - the repositories document is invalid
pub const CONFIG_ERROR: i32 = 2;

/// Not found - unknown repository or item
pub const NOT_FOUND: i32 = 3;

/// Not deployable - the path cannot be written to
pub const NOT_DEPLOYABLE: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
