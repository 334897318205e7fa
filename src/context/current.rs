//! The worker-local context slot.
//!
//! The slot is a task-local: entering a unit of work is explicit, and a
//! spawned task sees nothing until its spawner re-materializes the context
//! by cloning the handle into a new scope. Implicit inheritance is
//! deliberately absent.

use super::ContextHandle;
use miette::Diagnostic;
use thiserror::Error;

tokio::task_local! {
    static CURRENT: ContextHandle;
}

/// Install `handle` as the current context for the duration of `fut`.
pub async fn scope<F>(handle: ContextHandle, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(handle, fut).await
}

/// Synchronous variant of [`scope`] for non-async entry points and tests.
pub fn scope_sync<F, R>(handle: ContextHandle, f: F) -> R
where
    F: FnOnce() -> R,
{
    CURRENT.sync_scope(handle, f)
}

/// The context installed on this worker.
pub fn current() -> Result<ContextHandle, ContextError> {
    CURRENT
        .try_with(ContextHandle::clone)
        .map_err(|_| ContextError::NotInScope)
}

/// Like [`current`], but absence is not an error.
#[must_use]
pub fn try_current() -> Option<ContextHandle> {
    CURRENT.try_with(ContextHandle::clone).ok()
}

/// Failure to find a context on the current worker.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum ContextError {
    #[error("no execution context is in scope on this worker")]
    #[diagnostic(
        code(pathguard::context::not_in_scope),
        help("wrap the unit of work in context::scope(handle, fut)")
    )]
    NotInScope,
}
