//! Structured outcome and diagnostics carriers
//!
//! Every engine operation reports through a [`StatusReporter`]. Two
//! implementations exist:
//!
//! - [`StatusHolder`] keeps the latest entry and, separately, the latest
//!   error, so a caller can ask both "what happened last" and "did anything
//!   fail".
//! - [`MultiStatusHolder`] additionally keeps the ordered history of every
//!   entry, for batch operations that must report each problem.
//!
//! In fail-fast mode `set_error` returns `Err` immediately; callers
//! propagate it with `?`. Otherwise the error is only recorded and control
//! returns to the caller.
//!
//! When logging is enabled every entry is mirrored to `tracing` under the
//! `binrepo::status` target. Verbose mode appends the cause to the message.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// Status codes (HTTP-aligned so the service layer can forward them)
pub mod codes {
    pub const OK: i32 = 200;
    pub const BAD_REQUEST: i32 = 400;
    pub const FORBIDDEN: i32 = 403;
    pub const NOT_FOUND: i32 = 404;
    pub const CONFLICT: i32 = 409;
    pub const LOCKED: i32 = 423;
    pub const INTERNAL_ERROR: i32 = 500;
}

/// Shared error cause attached to a status entry
pub type StatusCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Severity of a status entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusLevel::Debug => "DEBUG",
            StatusLevel::Info => "INFO",
            StatusLevel::Warning => "WARNING",
            StatusLevel::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// One recorded status
#[derive(Debug, Clone)]
pub struct StatusEntry {
    code: i32,
    level: StatusLevel,
    message: String,
    cause: Option<StatusCause>,
}

impl StatusEntry {
    pub fn new(
        level: StatusLevel,
        code: i32,
        message: impl Into<String>,
        cause: Option<StatusCause>,
    ) -> Self {
        Self {
            code,
            level,
            message: message.into(),
            cause,
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn level(&self) -> StatusLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&StatusCause> {
        self.cause.as_ref()
    }

    pub fn is_error(&self) -> bool {
        self.level == StatusLevel::Error
    }

    pub fn is_warning(&self) -> bool {
        self.level == StatusLevel::Warning
    }
}

impl fmt::Display for StatusEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.level, self.message, self.code)
    }
}

/// Error raised by a fail-fast `set_error`
#[derive(Debug, Clone, Error)]
pub enum StatusError {
    /// The error carried the cause it was reported with
    #[error("{message}")]
    Cause {
        message: String,
        code: i32,
        #[source]
        source: StatusCause,
    },

    /// No cause was supplied
    #[error("fail fast: {message}")]
    FailFast { message: String, code: i32 },
}

impl StatusError {
    /// Build the error a fail-fast holder raises for `entry`.
    ///
    /// A cause that already is a `StatusError` is re-raised as is.
    fn raise(entry: &StatusEntry) -> Self {
        match entry.cause() {
            Some(cause) => match cause.downcast_ref::<StatusError>() {
                Some(inner) => inner.clone(),
                None => StatusError::Cause {
                    message: entry.message().to_string(),
                    code: entry.code(),
                    source: Arc::clone(cause),
                },
            },
            None => StatusError::FailFast {
                message: entry.message().to_string(),
                code: entry.code(),
            },
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            StatusError::Cause { code, .. } | StatusError::FailFast { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            StatusError::Cause { message, .. } | StatusError::FailFast { message, .. } => message,
        }
    }
}

/// Sink for operation outcomes
pub trait StatusReporter {
    /// Record an entry (no fail-fast handling)
    fn push(&mut self, entry: StatusEntry);

    fn is_fail_fast(&self) -> bool;

    /// Forget everything recorded so far
    fn reset(&mut self);

    /// Latest entry of any level
    fn status(&self) -> Option<&StatusEntry>;

    /// Latest error entry
    fn last_error(&self) -> Option<&StatusEntry>;

    fn is_error(&self) -> bool {
        self.last_error().is_some()
    }

    /// Code of the last error if any occurred, else of the last status
    fn status_code(&self) -> i32 {
        self.last_error()
            .or_else(|| self.status())
            .map(StatusEntry::code)
            .unwrap_or(codes::OK)
    }

    fn status_message(&self) -> &str {
        self.last_error()
            .or_else(|| self.status())
            .map(StatusEntry::message)
            .unwrap_or("OK")
    }

    fn set_status(&mut self, message: &str) {
        self.push(StatusEntry::new(StatusLevel::Info, codes::OK, message, None));
    }

    fn set_debug(&mut self, message: &str) {
        self.push(StatusEntry::new(StatusLevel::Debug, codes::OK, message, None));
    }

    fn set_warning(&mut self, message: &str, cause: Option<StatusCause>) {
        self.push(StatusEntry::new(
            StatusLevel::Warning,
            codes::OK,
            message,
            cause,
        ));
    }

    /// Record an error; in fail-fast mode also raise it
    fn set_error(
        &mut self,
        message: &str,
        code: i32,
        cause: Option<StatusCause>,
    ) -> Result<(), StatusError> {
        let entry = StatusEntry::new(StatusLevel::Error, code, message, cause);
        let raised = self.is_fail_fast().then(|| StatusError::raise(&entry));
        self.push(entry);
        match raised {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Holder of the latest status and the latest error
#[derive(Debug, Clone)]
pub struct StatusHolder {
    status: Option<StatusEntry>,
    last_error: Option<StatusEntry>,
    fail_fast: bool,
    verbose: bool,
    logging: bool,
}

impl Default for StatusHolder {
    fn default() -> Self {
        Self {
            status: None,
            last_error: None,
            fail_fast: false,
            verbose: false,
            logging: true,
        }
    }
}

impl StatusHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holder that raises on the first error
    pub fn fail_fast() -> Self {
        Self::new().with_fail_fast(true)
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Enable or disable mirroring entries to the diagnostic log
    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Message as mirrored to the log
    pub fn log_line(&self, entry: &StatusEntry) -> String {
        match (self.verbose, entry.cause()) {
            (true, Some(cause)) => format!("{}: {}", entry.message(), cause),
            _ => entry.message().to_string(),
        }
    }

    fn mirror(&self, entry: &StatusEntry) {
        if !self.logging {
            return;
        }
        let line = self.log_line(entry);
        let code = entry.code();
        match entry.level() {
            StatusLevel::Debug => tracing::debug!(target: "binrepo::status", code, "{}", line),
            StatusLevel::Info => tracing::info!(target: "binrepo::status", code, "{}", line),
            StatusLevel::Warning => tracing::warn!(target: "binrepo::status", code, "{}", line),
            StatusLevel::Error => tracing::error!(target: "binrepo::status", code, "{}", line),
        }
    }
}

impl StatusReporter for StatusHolder {
    fn push(&mut self, entry: StatusEntry) {
        self.mirror(&entry);
        if entry.is_error() {
            self.last_error = Some(entry.clone());
        }
        self.status = Some(entry);
    }

    fn is_fail_fast(&self) -> bool {
        self.fail_fast
    }

    fn reset(&mut self) {
        self.status = None;
        self.last_error = None;
    }

    fn status(&self) -> Option<&StatusEntry> {
        self.status.as_ref()
    }

    fn last_error(&self) -> Option<&StatusEntry> {
        self.last_error.as_ref()
    }
}

/// Status holder that also keeps every entry in order
#[derive(Debug, Clone, Default)]
pub struct MultiStatusHolder {
    holder: StatusHolder,
    entries: Vec<StatusEntry>,
}

impl MultiStatusHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.holder = self.holder.with_fail_fast(fail_fast);
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.holder = self.holder.with_verbose(verbose);
        self
    }

    pub fn with_logging(mut self, logging: bool) -> Self {
        self.holder = self.holder.with_logging(logging);
        self
    }

    /// Full ordered history
    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|e| e.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries.iter().filter(|e| e.is_warning())
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }

    /// Append the latest state of a single holder
    pub fn merge(&mut self, other: &StatusHolder) {
        if let Some(error) = other.last_error() {
            self.push(error.clone());
        } else if let Some(status) = other.status() {
            self.push(status.clone());
        }
    }

    /// Append every entry of another multi holder
    pub fn merge_all(&mut self, other: &MultiStatusHolder) {
        for entry in other.entries() {
            self.push(entry.clone());
        }
    }
}

impl StatusReporter for MultiStatusHolder {
    fn push(&mut self, entry: StatusEntry) {
        self.entries.push(entry.clone());
        self.holder.push(entry);
    }

    fn is_fail_fast(&self) -> bool {
        self.holder.is_fail_fast()
    }

    fn reset(&mut self) {
        self.holder.reset();
        self.entries.clear();
    }

    fn status(&self) -> Option<&StatusEntry> {
        self.holder.status()
    }

    fn last_error(&self) -> Option<&StatusEntry> {
        self.holder.last_error()
    }
}
