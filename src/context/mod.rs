//! Per-worker execution state: user identity, locale bundle, property bag,
//! the artifact stack, and the wiring to external collaborators.
//!
//! One [`ExecutionContext`] exists per unit of work. It is installed on the
//! worker with [`scope`](crate::context::scope) and reached from anywhere
//! below with [`current`](crate::context::current); derived tasks
//! re-materialize it by cloning the [`ContextHandle`] into their own scope.
//!
//! # Examples
//!
//! ```
//! use pathguard::artifact::ExecutionArtifact;
//! use pathguard::context::{self, ExecutionContext};
//! use pathguard::delegator::UserLogin;
//!
//! let handle = ExecutionContext::builder()
//!     .user_login(UserLogin::new("alice"))
//!     .build_handle();
//!
//! context::scope_sync(handle.clone(), || {
//!     let ctx = context::current().unwrap();
//!     let _frame = ctx.enter(ExecutionArtifact::screen("module"));
//!     assert_eq!(ctx.execution_path().to_string(), "/module");
//! });
//! assert_eq!(handle.execution_path().to_string(), "/");
//! ```

mod bypass;
mod current;

pub use bypass::BypassGuard;
pub use current::{ContextError, current, scope, scope_sync, try_current};

use crate::artifact::{ArtifactStack, ExecutionArtifact};
use crate::authz::AuthorizationManager;
use crate::delegator::{Delegator, UserLogin};
use crate::dispatch::ServiceDispatcher;
use crate::path::ArtifactPath;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

const DEFAULT_LOCALE: &str = "en";
const DEFAULT_TIME_ZONE: &str = "UTC";
const DEFAULT_CURRENCY_UOM: &str = "USD";

/// The per-worker state container.
///
/// User-associated fields reset between units of work; the wiring to the
/// delegator, dispatcher, and security manager survives an
/// [`ExecutionContext::reset`] so the instance can be reused.
pub struct ExecutionContext {
    user_login: Option<UserLogin>,
    locale: String,
    time_zone: String,
    currency_uom: String,
    properties: FxHashMap<String, Value>,
    stack: ArtifactStack,
    bypass_depth: u32,
    delegator: Option<Arc<dyn Delegator>>,
    dispatcher: Option<Arc<dyn ServiceDispatcher>>,
    security: Option<Arc<AuthorizationManager>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            user_login: None,
            locale: DEFAULT_LOCALE.to_owned(),
            time_zone: DEFAULT_TIME_ZONE.to_owned(),
            currency_uom: DEFAULT_CURRENCY_UOM.to_owned(),
            properties: FxHashMap::default(),
            stack: ArtifactStack::new(),
            bypass_depth: 0,
            delegator: None,
            dispatcher: None,
            security: None,
        }
    }
}

impl ExecutionContext {
    #[must_use]
    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }

    /// Return to a neutral state for reuse: user, properties, stack, and
    /// bypass depth are cleared; locale bundle returns to defaults; the
    /// collaborator wiring is kept.
    pub fn reset(&mut self) {
        self.user_login = None;
        self.locale = DEFAULT_LOCALE.to_owned();
        self.time_zone = DEFAULT_TIME_ZONE.to_owned();
        self.currency_uom = DEFAULT_CURRENCY_UOM.to_owned();
        self.properties.clear();
        self.stack.clear();
        self.bypass_depth = 0;
    }
}

/// Seeds an [`ExecutionContext`] with identity, locale bundle, properties,
/// and collaborator wiring.
#[derive(Default)]
pub struct ExecutionContextBuilder {
    context: ExecutionContext,
}

impl ExecutionContextBuilder {
    #[must_use]
    pub fn user_login(mut self, user_login: UserLogin) -> Self {
        self.context.user_login = Some(user_login);
        self
    }

    #[must_use]
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.context.locale = locale.into();
        self
    }

    #[must_use]
    pub fn time_zone(mut self, time_zone: impl Into<String>) -> Self {
        self.context.time_zone = time_zone.into();
        self
    }

    #[must_use]
    pub fn currency_uom(mut self, currency_uom: impl Into<String>) -> Self {
        self.context.currency_uom = currency_uom.into();
        self
    }

    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.properties.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn delegator(mut self, delegator: Arc<dyn Delegator>) -> Self {
        self.context.delegator = Some(delegator);
        self
    }

    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<dyn ServiceDispatcher>) -> Self {
        self.context.dispatcher = Some(dispatcher);
        self
    }

    #[must_use]
    pub fn security(mut self, security: Arc<AuthorizationManager>) -> Self {
        self.context.security = Some(security);
        self
    }

    #[must_use]
    pub fn build(self) -> ExecutionContext {
        self.context
    }

    #[must_use]
    pub fn build_handle(self) -> ContextHandle {
        ContextHandle::new(self.context)
    }
}

/// Shared handle to one worker's [`ExecutionContext`].
///
/// All operations take short internal locks; nothing is held across await
/// points.
#[derive(Clone)]
pub struct ContextHandle {
    inner: Arc<Mutex<ExecutionContext>>,
}

impl ContextHandle {
    #[must_use]
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    /// Run a closure against the locked context.
    pub fn with<R>(&self, f: impl FnOnce(&mut ExecutionContext) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn push(&self, artifact: ExecutionArtifact) {
        self.with(|ctx| ctx.stack.push(artifact));
    }

    pub fn pop(&self) -> Option<ExecutionArtifact> {
        self.with(|ctx| ctx.stack.pop())
    }

    /// Pop frames down to and including `artifact`.
    pub fn pop_to(&self, artifact: &ExecutionArtifact) -> usize {
        self.with(|ctx| ctx.stack.pop_to(artifact))
    }

    /// Push `artifact` and hand back a frame that pops it on drop, however
    /// the scope exits.
    #[must_use]
    pub fn enter(&self, artifact: ExecutionArtifact) -> ArtifactFrame {
        self.push(artifact.clone());
        ArtifactFrame {
            handle: self.clone(),
            artifact,
        }
    }

    /// The current execution path: `/` + the `/`-joined artifact names.
    #[must_use]
    pub fn execution_path(&self) -> ArtifactPath {
        self.with(|ctx| ctx.stack.path())
    }

    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.with(|ctx| ctx.stack.len())
    }

    #[must_use]
    pub fn user_login(&self) -> Option<UserLogin> {
        self.with(|ctx| ctx.user_login.clone())
    }

    pub fn set_user_login(&self, user_login: Option<UserLogin>) {
        self.with(|ctx| ctx.user_login = user_login);
    }

    #[must_use]
    pub fn locale(&self) -> String {
        self.with(|ctx| ctx.locale.clone())
    }

    pub fn set_locale(&self, locale: impl Into<String>) {
        let locale = locale.into();
        self.with(|ctx| ctx.locale = locale);
    }

    #[must_use]
    pub fn time_zone(&self) -> String {
        self.with(|ctx| ctx.time_zone.clone())
    }

    pub fn set_time_zone(&self, time_zone: impl Into<String>) {
        let time_zone = time_zone.into();
        self.with(|ctx| ctx.time_zone = time_zone);
    }

    #[must_use]
    pub fn currency_uom(&self) -> String {
        self.with(|ctx| ctx.currency_uom.clone())
    }

    pub fn set_currency_uom(&self, currency_uom: impl Into<String>) {
        let currency_uom = currency_uom.into();
        self.with(|ctx| ctx.currency_uom = currency_uom);
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<Value> {
        self.with(|ctx| ctx.properties.get(key).cloned())
    }

    pub fn set_property(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.with(|ctx| {
            ctx.properties.insert(key, value);
        });
    }

    pub fn remove_property(&self, key: &str) -> Option<Value> {
        self.with(|ctx| ctx.properties.remove(key))
    }

    #[must_use]
    pub fn delegator(&self) -> Option<Arc<dyn Delegator>> {
        self.with(|ctx| ctx.delegator.clone())
    }

    #[must_use]
    pub fn dispatcher(&self) -> Option<Arc<dyn ServiceDispatcher>> {
        self.with(|ctx| ctx.dispatcher.clone())
    }

    #[must_use]
    pub fn security(&self) -> Option<Arc<AuthorizationManager>> {
        self.with(|ctx| ctx.security.clone())
    }

    /// Suspend permission enforcement until the returned guard drops.
    /// Nesting is counted; enforcement resumes when the last guard goes.
    #[must_use]
    pub fn run_unprotected(&self) -> BypassGuard {
        BypassGuard::acquire(self)
    }

    /// Whether enforcement is currently suspended.
    #[must_use]
    pub fn is_unprotected(&self) -> bool {
        self.with(|ctx| ctx.bypass_depth > 0)
    }

    pub fn reset(&self) {
        self.with(ExecutionContext::reset);
    }

    pub(crate) fn bypass_enter(&self) {
        self.with(|ctx| ctx.bypass_depth += 1);
    }

    pub(crate) fn bypass_exit(&self) {
        self.with(|ctx| ctx.bypass_depth = ctx.bypass_depth.saturating_sub(1));
    }
}

/// RAII frame: pushed on [`ContextHandle::enter`], popped on drop.
///
/// Dropping pops down to and including its own artifact, so frames leaked
/// by a panicking or early-returning inner scope are unwound too.
pub struct ArtifactFrame {
    handle: ContextHandle,
    artifact: ExecutionArtifact,
}

impl ArtifactFrame {
    #[must_use]
    pub fn artifact(&self) -> &ExecutionArtifact {
        &self.artifact
    }
}

impl Drop for ArtifactFrame {
    fn drop(&mut self) {
        self.handle.pop_to(&self.artifact);
    }
}
