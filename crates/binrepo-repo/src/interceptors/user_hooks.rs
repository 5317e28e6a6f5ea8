//! Dispatch to user-defined hooks
//!
//! Operators register callbacks per stage. Each callback receives an owned
//! [`HookEvent`] snapshot (never the live item) and runs synchronously
//! within its stage, so a before-hook's veto reaches the pipeline.

use std::collections::HashMap;
use std::sync::Arc;

use binrepo_core::{ItemInfo, Properties, RepoPath};

use crate::pipeline::{
    AfterCopy, AfterCreate, AfterDelete, AfterMove, BeforeCopy, BeforeCreate, BeforeDelete,
    BeforeMove, CancelSignal, HookContext, HookPhase, HookResult, Interceptor,
    InterceptorRegistry, MutationKind, Stage,
};

/// Immutable view of a mutation passed to user callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookEvent {
    pub stage: Stage,
    pub item: ItemInfo,
    pub target: Option<RepoPath>,
    pub properties: Properties,
    pub user: String,
}

/// A user callback; `Err` vetoes in a before stage and is logged in an after stage
pub type UserHook = Arc<dyn Fn(&HookEvent) -> Result<(), CancelSignal> + Send + Sync>;

#[derive(Default)]
pub struct UserHookInterceptor {
    hooks: HashMap<Stage, Vec<(String, UserHook)>>,
}

impl UserHookInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a named callback to a stage
    pub fn on<F>(mut self, stage: Stage, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&HookEvent) -> Result<(), CancelSignal> + Send + Sync + 'static,
    {
        self.hooks
            .entry(stage)
            .or_default()
            .push((name.into(), Arc::new(hook)));
        self
    }

    pub fn has_hooks(&self, stage: Stage) -> bool {
        self.hooks.get(&stage).is_some_and(|h| !h.is_empty())
    }

    fn dispatch(&self, ctx: &mut HookContext<'_>) -> HookResult {
        let stage = ctx.stage();
        let Some(hooks) = self.hooks.get(&stage) else {
            return Ok(());
        };

        let event = HookEvent {
            stage,
            item: ctx.item().clone(),
            target: ctx.target().cloned(),
            properties: ctx.properties().clone(),
            user: ctx.user().to_string(),
        };

        for (name, hook) in hooks {
            if let Err(signal) = (hook.as_ref())(&event) {
                match stage.phase {
                    HookPhase::Before => {
                        tracing::debug!(hook = %name, stage = %stage, "user hook vetoed mutation");
                        return Err(signal.into());
                    }
                    HookPhase::After => {
                        tracing::warn!(hook = %name, stage = %stage, "user hook failed: {}", signal);
                        ctx.status()
                            .set_warning(&format!("User hook '{}' failed: {}", name, signal.message()), None);
                    }
                }
            }
        }
        Ok(())
    }
}

macro_rules! dispatch_capability {
    ($trait:ident, $method:ident) => {
        impl $trait for UserHookInterceptor {
            fn $method(&self, ctx: &mut HookContext<'_>) -> HookResult {
                self.dispatch(ctx)
            }
        }
    };
}

dispatch_capability!(BeforeCreate, before_create);
dispatch_capability!(AfterCreate, after_create);
dispatch_capability!(BeforeDelete, before_delete);
dispatch_capability!(AfterDelete, after_delete);
dispatch_capability!(BeforeMove, before_move);
dispatch_capability!(AfterMove, after_move);
dispatch_capability!(BeforeCopy, before_copy);
dispatch_capability!(AfterCopy, after_copy);

impl Interceptor for UserHookInterceptor {
    fn name(&self) -> &str {
        "user-hooks"
    }

    /// Registers only the stages that have callbacks
    fn install(self: Arc<Self>, registry: &mut InterceptorRegistry) {
        if self.has_hooks(Stage::before(MutationKind::Create)) {
            registry.before_create(Arc::clone(&self));
        }
        if self.has_hooks(Stage::after(MutationKind::Create)) {
            registry.after_create(Arc::clone(&self));
        }
        if self.has_hooks(Stage::before(MutationKind::Delete)) {
            registry.before_delete(Arc::clone(&self));
        }
        if self.has_hooks(Stage::after(MutationKind::Delete)) {
            registry.after_delete(Arc::clone(&self));
        }
        if self.has_hooks(Stage::before(MutationKind::Move)) {
            registry.before_move(Arc::clone(&self));
        }
        if self.has_hooks(Stage::after(MutationKind::Move)) {
            registry.after_move(Arc::clone(&self));
        }
        if self.has_hooks(Stage::before(MutationKind::Copy)) {
            registry.before_copy(Arc::clone(&self));
        }
        if self.has_hooks(Stage::after(MutationKind::Copy)) {
            registry.after_copy(self);
        }
    }
}
