//! Mutation interceptor pipeline
//!
//! Every storage mutation (create, delete, move, copy) passes through a
//! *before* stage, the physical mutation, and an *after* stage:
//!
//! ```text
//! Pending -> BeforeHooksRunning -> Cancelled
//!                               -> PhysicalMutationRunning -> AfterHooksRunning -> Done
//! ```
//!
//! Interceptors declare the stages they care about through capability traits
//! ([`BeforeCreate`], [`AfterDelete`], ...) and register only those with an
//! [`InterceptorRegistry`]. The registry is mutable during startup and then
//! frozen into an immutable [`InterceptorPipeline`].
//!
//! Before-hooks run in registration order and may veto the mutation by
//! returning a [`CancelSignal`]; the first veto stops the stage, skips the
//! physical mutation, and runs no after-hooks. After-hooks are
//! notifications: each runs regardless of the others, and their failures
//! (including panics) are logged and reported as warnings only.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use binrepo_core::{
    ItemInfo, MultiStatusHolder, Properties, RepoPath, StatusError, StatusReporter, codes,
};
use thiserror::Error;

use crate::error::{RepoError, Result};
use crate::unit_of_work::{SessionId, UnitOfWork};

/// Kind of storage mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Delete,
    Move,
    Copy,
}

impl MutationKind {
    /// Operation name used in user-facing messages
    pub fn label(&self) -> &'static str {
        match self {
            MutationKind::Create => "Create",
            MutationKind::Delete => "Delete",
            MutationKind::Move => "Move",
            MutationKind::Copy => "Copy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    Before,
    After,
}

/// One of the eight interception points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stage {
    pub kind: MutationKind,
    pub phase: HookPhase,
}

impl Stage {
    pub fn before(kind: MutationKind) -> Self {
        Self {
            kind,
            phase: HookPhase::Before,
        }
    }

    pub fn after(kind: MutationKind) -> Self {
        Self {
            kind,
            phase: HookPhase::After,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self.phase {
            HookPhase::Before => "before",
            HookPhase::After => "after",
        };
        write!(f, "{}-{}", phase, self.kind.label().to_lowercase())
    }
}

/// Veto raised by a before-hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelSignal {
    code: i32,
    message: String,
}

impl CancelSignal {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: codes::FORBIDDEN,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Failure returned by a hook
#[derive(Debug, Error)]
pub enum HookError {
    #[error("cancelled: {0}")]
    Cancel(CancelSignal),

    /// Raised by a fail-fast status holder
    #[error(transparent)]
    Status(#[from] StatusError),

    #[error(transparent)]
    Fatal(#[from] RepoError),
}

impl From<CancelSignal> for HookError {
    fn from(signal: CancelSignal) -> Self {
        HookError::Cancel(signal)
    }
}

pub type HookResult = std::result::Result<(), HookError>;

/// Description of the mutation handed to the pipeline
#[derive(Debug, Clone, Copy)]
pub struct MutationRequest<'a> {
    pub kind: MutationKind,
    pub item: &'a ItemInfo,
    pub target: Option<&'a RepoPath>,
    pub properties: &'a Properties,
}

impl<'a> MutationRequest<'a> {
    pub fn create(item: &'a ItemInfo) -> Self {
        Self {
            kind: MutationKind::Create,
            item,
            target: None,
            properties: &item.properties,
        }
    }

    pub fn delete(item: &'a ItemInfo) -> Self {
        Self {
            kind: MutationKind::Delete,
            ..Self::create(item)
        }
    }

    pub fn move_to(item: &'a ItemInfo, target: &'a RepoPath) -> Self {
        Self {
            kind: MutationKind::Move,
            target: Some(target),
            ..Self::create(item)
        }
    }

    pub fn copy_to(item: &'a ItemInfo, target: &'a RepoPath) -> Self {
        Self {
            kind: MutationKind::Copy,
            target: Some(target),
            ..Self::create(item)
        }
    }

    pub fn with_properties(mut self, properties: &'a Properties) -> Self {
        self.properties = properties;
        self
    }
}

/// What a hook sees of the mutation in progress
pub struct HookContext<'a> {
    stage: Stage,
    item: &'a ItemInfo,
    target: Option<&'a RepoPath>,
    properties: &'a Properties,
    session: SessionId,
    user: &'a str,
    status: &'a mut dyn StatusReporter,
}

impl<'a> HookContext<'a> {
    pub fn new(
        stage: Stage,
        request: &MutationRequest<'a>,
        session: SessionId,
        user: &'a str,
        status: &'a mut dyn StatusReporter,
    ) -> Self {
        Self {
            stage,
            item: request.item,
            target: request.target,
            properties: request.properties,
            session,
            user,
            status,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Snapshot of the item as it was when the mutation was requested
    pub fn item(&self) -> &ItemInfo {
        self.item
    }

    /// Destination of a move or copy
    pub fn target(&self) -> Option<&RepoPath> {
        self.target
    }

    pub fn properties(&self) -> &Properties {
        self.properties
    }

    /// Unit of work the mutation runs in
    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn user(&self) -> &str {
        self.user
    }

    pub fn status(&mut self) -> &mut dyn StatusReporter {
        &mut *self.status
    }
}

pub trait BeforeCreate: Send + Sync {
    fn before_create(&self, ctx: &mut HookContext<'_>) -> HookResult;
}

pub trait AfterCreate: Send + Sync {
    fn after_create(&self, ctx: &mut HookContext<'_>) -> HookResult;
}

pub trait BeforeDelete: Send + Sync {
    fn before_delete(&self, ctx: &mut HookContext<'_>) -> HookResult;
}

pub trait AfterDelete: Send + Sync {
    fn after_delete(&self, ctx: &mut HookContext<'_>) -> HookResult;
}

pub trait BeforeMove: Send + Sync {
    fn before_move(&self, ctx: &mut HookContext<'_>) -> HookResult;
}

pub trait AfterMove: Send + Sync {
    fn after_move(&self, ctx: &mut HookContext<'_>) -> HookResult;
}

pub trait BeforeCopy: Send + Sync {
    fn before_copy(&self, ctx: &mut HookContext<'_>) -> HookResult;
}

pub trait AfterCopy: Send + Sync {
    fn after_copy(&self, ctx: &mut HookContext<'_>) -> HookResult;
}

/// A side-effect module plugged into the pipeline at startup
pub trait Interceptor: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Register the capabilities this interceptor implements
    fn install(self: Arc<Self>, registry: &mut InterceptorRegistry);
}

type HookFn = Box<dyn Fn(&mut HookContext<'_>) -> HookResult + Send + Sync>;

struct RegisteredHook {
    interceptor: String,
    hook: HookFn,
}

/// Startup-time collection of hooks
#[derive(Default)]
pub struct InterceptorRegistry {
    stages: HashMap<Stage, Vec<RegisteredHook>>,
    interceptors: Vec<String>,
    current: Option<String>,
}

macro_rules! capability {
    ($method:ident, $trait:ident, $call:ident, $stage:expr) => {
        pub fn $method<T: $trait + 'static>(&mut self, hook: Arc<T>) {
            self.push($stage, move |ctx| hook.$call(ctx));
        }
    };
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interceptor; its capabilities run in registration order
    pub fn register<I: Interceptor>(&mut self, interceptor: Arc<I>) {
        let name = interceptor.name().to_string();
        self.interceptors.push(name.clone());
        self.current = Some(name);
        interceptor.install(self);
        self.current = None;
    }

    capability!(before_create, BeforeCreate, before_create, Stage::before(MutationKind::Create));
    capability!(after_create, AfterCreate, after_create, Stage::after(MutationKind::Create));
    capability!(before_delete, BeforeDelete, before_delete, Stage::before(MutationKind::Delete));
    capability!(after_delete, AfterDelete, after_delete, Stage::after(MutationKind::Delete));
    capability!(before_move, BeforeMove, before_move, Stage::before(MutationKind::Move));
    capability!(after_move, AfterMove, after_move, Stage::after(MutationKind::Move));
    capability!(before_copy, BeforeCopy, before_copy, Stage::before(MutationKind::Copy));
    capability!(after_copy, AfterCopy, after_copy, Stage::after(MutationKind::Copy));

    fn push<F>(&mut self, stage: Stage, hook: F)
    where
        F: Fn(&mut HookContext<'_>) -> HookResult + Send + Sync + 'static,
    {
        let interceptor = self
            .current
            .clone()
            .unwrap_or_else(|| "anonymous".to_string());
        self.stages.entry(stage).or_default().push(RegisteredHook {
            interceptor,
            hook: Box::new(hook),
        });
    }

    /// Freeze into the runtime pipeline
    pub fn build(self) -> InterceptorPipeline {
        tracing::debug!(interceptors = ?self.interceptors, "interceptor pipeline built");
        InterceptorPipeline {
            stages: self.stages,
            interceptors: self.interceptors,
        }
    }
}

/// Position of a mutation in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    BeforeHooksRunning,
    Cancelled,
    PhysicalMutationRunning,
    AfterHooksRunning,
    Done,
}

/// Terminal result of a mutation that did not fail fatally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationOutcome {
    state: MutationState,
    cancel: Option<CancelSignal>,
    after_hook_failures: usize,
}

impl MutationOutcome {
    pub fn state(&self) -> MutationState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == MutationState::Done
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == MutationState::Cancelled
    }

    /// The veto that cancelled the mutation
    pub fn cancel_signal(&self) -> Option<&CancelSignal> {
        self.cancel.as_ref()
    }

    /// Number of after-hooks that failed (logged only)
    pub fn after_hook_failures(&self) -> usize {
        self.after_hook_failures
    }
}

/// Immutable runtime pipeline
#[derive(Default)]
pub struct InterceptorPipeline {
    stages: HashMap<Stage, Vec<RegisteredHook>>,
    interceptors: Vec<String>,
}

impl fmt::Debug for InterceptorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorPipeline")
            .field("interceptors", &self.interceptors)
            .finish()
    }
}

impl InterceptorPipeline {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registered interceptor names, in registration order
    pub fn interceptors(&self) -> &[String] {
        &self.interceptors
    }

    /// Number of hooks bound to a stage
    pub fn hook_count(&self, stage: Stage) -> usize {
        self.stages.get(&stage).map_or(0, Vec::len)
    }

    /// Run a mutation through the pipeline.
    ///
    /// `physical` is the storage primitive; it runs only if no before-hook
    /// cancels. A cancellation is recorded in `status` as
    /// `"<Operation> rejected: <message>"` and returned as a cancelled
    /// outcome. Fatal errors (from a before-hook, a fail-fast status raise,
    /// or the physical mutation) are recorded and returned as `Err`.
    pub fn mutate<F>(
        &self,
        request: &MutationRequest<'_>,
        uow: &UnitOfWork,
        status: &mut dyn StatusReporter,
        physical: F,
    ) -> Result<MutationOutcome>
    where
        F: FnOnce() -> Result<()>,
    {
        let kind = request.kind;
        let path = &request.item.repo_path;
        let mut state = MutationState::Pending;
        let mut advance = |next: MutationState| {
            tracing::debug!(operation = kind.label(), path = %path, from = ?state, to = ?next, "mutation state");
            state = next;
        };

        advance(MutationState::BeforeHooksRunning);
        match self.run_before(request, uow, status) {
            Ok(None) => {}
            Ok(Some(signal)) => {
                advance(MutationState::Cancelled);
                let message = format!("{} rejected: {}", kind.label(), signal.message());
                // The veto is reported as a cancelled outcome in both modes
                let _ = status.set_error(&message, signal.code(), None);
                return Ok(MutationOutcome {
                    state: MutationState::Cancelled,
                    cancel: Some(signal),
                    after_hook_failures: 0,
                });
            }
            Err(err) => {
                advance(MutationState::Cancelled);
                return Err(err);
            }
        }

        advance(MutationState::PhysicalMutationRunning);
        if let Err(err) = physical() {
            let message = format!("{} of {} failed: {}", kind.label(), path, err);
            let _ = status.set_error(&message, err.status_code(), None);
            return Err(err);
        }

        advance(MutationState::AfterHooksRunning);
        let after_hook_failures = self.run_after(request, uow, status);

        advance(MutationState::Done);
        Ok(MutationOutcome {
            state: MutationState::Done,
            cancel: None,
            after_hook_failures,
        })
    }

    fn run_before(
        &self,
        request: &MutationRequest<'_>,
        uow: &UnitOfWork,
        status: &mut dyn StatusReporter,
    ) -> Result<Option<CancelSignal>> {
        let stage = Stage::before(request.kind);
        let Some(hooks) = self.stages.get(&stage) else {
            return Ok(None);
        };

        let mut ctx = HookContext::new(stage, request, uow.id(), uow.user(), status);
        for registered in hooks {
            match (registered.hook)(&mut ctx) {
                Ok(()) => {}
                Err(HookError::Cancel(signal)) => {
                    tracing::debug!(stage = %stage, interceptor = %registered.interceptor, "mutation vetoed");
                    return Ok(Some(signal));
                }
                Err(HookError::Status(err)) => return Err(err.into()),
                Err(HookError::Fatal(err)) => {
                    let message = format!("{} failed: {}", stage, err);
                    let _ = ctx.status().set_error(&message, err.status_code(), None);
                    return Err(err);
                }
            }
        }
        Ok(None)
    }

    /// Run every after-hook; returns the number that failed
    fn run_after(
        &self,
        request: &MutationRequest<'_>,
        uow: &UnitOfWork,
        status: &mut dyn StatusReporter,
    ) -> usize {
        let stage = Stage::after(request.kind);
        let Some(hooks) = self.stages.get(&stage) else {
            return 0;
        };

        // Hooks report into a scratch holder so their errors never fail the
        // caller's operation
        let mut scratch = MultiStatusHolder::new().with_logging(false);
        let mut failures = 0;

        for registered in hooks {
            let mut ctx = HookContext::new(stage, request, uow.id(), uow.user(), &mut scratch);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (registered.hook)(&mut ctx)));
            let failure = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err.to_string()),
                Err(payload) => Some(panic_message(payload.as_ref())),
            };
            if let Some(reason) = failure {
                failures += 1;
                tracing::warn!(
                    stage = %stage,
                    interceptor = %registered.interceptor,
                    path = %request.item.repo_path,
                    "after-hook failed: {}",
                    reason
                );
                scratch.set_warning(
                    &format!("{} hook '{}' failed: {}", stage, registered.interceptor, reason),
                    None,
                );
            }
        }

        for entry in scratch.entries() {
            if entry.is_error() {
                status.set_warning(entry.message(), entry.cause().cloned());
            } else {
                status.push(entry.clone());
            }
        }
        failures
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockManager;
    use binrepo_core::{LockPolicy, StatusHolder};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn uow() -> UnitOfWork {
        UnitOfWork::new(
            Arc::new(LockManager::new(LockPolicy::FailFast)),
            Arc::new(Vec::new()),
            "tester",
        )
    }

    /// Records every call into a shared journal
    struct Journal {
        name: &'static str,
        calls: Arc<Mutex<Vec<String>>>,
        veto: Option<CancelSignal>,
        fail_after: bool,
        report_error: bool,
    }

    impl Journal {
        fn new(name: &'static str, calls: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name,
                calls: Arc::clone(calls),
                veto: None,
                fail_after: false,
                report_error: false,
            }
        }

        fn record(&self, stage: Stage) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, stage));
        }
    }

    impl BeforeCreate for Journal {
        fn before_create(&self, ctx: &mut HookContext<'_>) -> HookResult {
            self.record(ctx.stage());
            if self.report_error {
                ctx.status()
                    .set_error(&format!("{} found a problem", self.name), codes::BAD_REQUEST, None)?;
            }
            match &self.veto {
                Some(signal) => Err(signal.clone().into()),
                None => Ok(()),
            }
        }
    }

    impl AfterCreate for Journal {
        fn after_create(&self, ctx: &mut HookContext<'_>) -> HookResult {
            self.record(ctx.stage());
            if self.fail_after {
                return Err(RepoError::storage("after failed").into());
            }
            Ok(())
        }
    }

    impl Interceptor for Journal {
        fn name(&self) -> &str {
            self.name
        }

        fn install(self: Arc<Self>, registry: &mut InterceptorRegistry) {
            registry.before_create(Arc::clone(&self));
            registry.after_create(self);
        }
    }

    struct Panicker;

    impl AfterCreate for Panicker {
        fn after_create(&self, _ctx: &mut HookContext<'_>) -> HookResult {
            panic!("boom");
        }
    }

    impl Interceptor for Panicker {
        fn name(&self) -> &str {
            "panicker"
        }

        fn install(self: Arc<Self>, registry: &mut InterceptorRegistry) {
            registry.after_create(self);
        }
    }

    fn item() -> ItemInfo {
        ItemInfo::file(RepoPath::new("libs-local", "com/acme/app.jar"), 1)
    }

    #[test]
    fn test_hooks_run_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = InterceptorRegistry::new();
        registry.register(Arc::new(Journal::new("first", &calls)));
        registry.register(Arc::new(Journal::new("second", &calls)));
        let pipeline = registry.build();

        let item = item();
        let mut status = StatusHolder::new();
        let physical_calls = AtomicUsize::new(0);
        let outcome = pipeline
            .mutate(&MutationRequest::create(&item), &uow(), &mut status, || {
                physical_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert!(outcome.is_done());
        assert_eq!(physical_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *calls.lock().unwrap(),
            [
                "first:before-create",
                "second:before-create",
                "first:after-create",
                "second:after-create"
            ]
        );
        assert_eq!(pipeline.interceptors(), ["first", "second"]);
    }

    #[test]
    fn test_cancellation_short_circuits() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = InterceptorRegistry::new();
        let mut veto = Journal::new("veto", &calls);
        veto.veto = Some(CancelSignal::new("not allowed").with_code(codes::CONFLICT));
        registry.register(Arc::new(veto));
        registry.register(Arc::new(Journal::new("later", &calls)));
        let pipeline = registry.build();

        let item = item();
        let mut status = StatusHolder::new();
        let outcome = pipeline
            .mutate(&MutationRequest::create(&item), &uow(), &mut status, || {
                panic!("physical create must not run")
            })
            .unwrap();

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.cancel_signal().unwrap().code(), codes::CONFLICT);
        assert_eq!(*calls.lock().unwrap(), ["veto:before-create"]);
        assert!(status.is_error());
        assert_eq!(status.status_message(), "Create rejected: not allowed");
        assert_eq!(status.status_code(), codes::CONFLICT);
    }

    #[test]
    fn test_after_hook_failures_are_isolated() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = InterceptorRegistry::new();
        let mut failing = Journal::new("failing", &calls);
        failing.fail_after = true;
        registry.register(Arc::new(failing));
        registry.register(Arc::new(Panicker));
        registry.register(Arc::new(Journal::new("observer", &calls)));
        let pipeline = registry.build();

        let item = item();
        let mut status = MultiStatusHolder::new();
        let outcome = pipeline
            .mutate(&MutationRequest::create(&item), &uow(), &mut status, || Ok(()))
            .unwrap();

        assert!(outcome.is_done());
        assert_eq!(outcome.after_hook_failures(), 2);
        assert!(calls.lock().unwrap().contains(&"observer:after-create".to_string()));
        assert!(!status.is_error());
        assert_eq!(status.warnings().count(), 2);
    }

    #[test]
    fn test_fail_fast_stops_remaining_before_hooks() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = InterceptorRegistry::new();
        let mut first = Journal::new("first", &calls);
        first.report_error = true;
        let mut second = Journal::new("second", &calls);
        second.report_error = true;
        registry.register(Arc::new(first));
        registry.register(Arc::new(second));
        let pipeline = registry.build();

        let item = item();
        let mut status = StatusHolder::fail_fast();
        let err = pipeline
            .mutate(&MutationRequest::create(&item), &uow(), &mut status, || Ok(()))
            .unwrap_err();

        assert!(matches!(err, RepoError::Status(_)));
        assert_eq!(*calls.lock().unwrap(), ["first:before-create"]);
    }

    #[test]
    fn test_accumulate_mode_runs_every_before_hook() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = InterceptorRegistry::new();
        let mut first = Journal::new("first", &calls);
        first.report_error = true;
        let mut second = Journal::new("second", &calls);
        second.report_error = true;
        registry.register(Arc::new(first));
        registry.register(Arc::new(second));
        let pipeline = registry.build();

        let item = item();
        let mut status = MultiStatusHolder::new();
        pipeline
            .mutate(&MutationRequest::create(&item), &uow(), &mut status, || Ok(()))
            .unwrap();

        assert_eq!(status.errors().count(), 2);
        assert!(status.is_error());
    }

    #[test]
    fn test_physical_failure_is_fatal() {
        let pipeline = InterceptorRegistry::new().build();
        let item = item();
        let mut status = StatusHolder::new();
        let err = pipeline
            .mutate(&MutationRequest::delete(&item), &uow(), &mut status, || {
                Err(RepoError::storage("disk full"))
            })
            .unwrap_err();

        assert!(matches!(err, RepoError::Storage { .. }));
        assert!(status.is_error());
        assert_eq!(status.status_code(), codes::INTERNAL_ERROR);
    }

    #[test]
    fn test_only_implemented_capabilities_are_registered() {
        let mut registry = InterceptorRegistry::new();
        registry.register(Arc::new(Panicker));
        let pipeline = registry.build();

        assert_eq!(pipeline.hook_count(Stage::after(MutationKind::Create)), 1);
        assert_eq!(pipeline.hook_count(Stage::before(MutationKind::Create)), 0);
        assert_eq!(pipeline.hook_count(Stage::after(MutationKind::Delete)), 0);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::before(MutationKind::Move).to_string(), "before-move");
        assert_eq!(Stage::after(MutationKind::Copy).to_string(), "after-copy");
    }
}
