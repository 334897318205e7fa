//! The template-engine surface: render a body only when a permission holds.
//!
//! This is the programmatic shape of a `<security permission=".."
//! artifactId="..">body</security>` template directive: push a template
//! artifact named `artifact_id`, check the permission at the resulting
//! path, render the body on success and nothing on denial. The artifact is
//! popped on every exit path.

use crate::artifact::ExecutionArtifact;
use crate::authz::{AccessError, AuthorizationError};
use crate::context::{self, ContextError};
use crate::permission::Permission;
use miette::Diagnostic;
use thiserror::Error;

/// Failures of the directive itself. A permission denial is not an error
/// here; it renders as the empty string.
#[derive(Debug, Error, Diagnostic)]
pub enum DirectiveError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Context(#[from] ContextError),

    #[error("no security manager wired on the execution context")]
    #[diagnostic(
        code(pathguard::directive::no_security),
        help("seed the context builder with .security(manager)")
    )]
    NoSecurity,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Authorization(#[from] AuthorizationError),
}

/// Render `render()` inside a template artifact frame when `permission`
/// holds there; render nothing when it is denied.
pub async fn render_secured<F, Fut>(
    artifact_id: &str,
    permission: &Permission,
    render: F,
) -> Result<String, DirectiveError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = String>,
{
    let ctx = context::current()?;
    let security = ctx.security().ok_or(DirectiveError::NoSecurity)?;
    let _frame = ctx.enter(ExecutionArtifact::template(artifact_id));
    let controller = security.access_controller().await?;
    match controller.check_permission(permission).await {
        Ok(()) => Ok(render().await),
        Err(AccessError::Denied { .. }) => Ok(String::new()),
        Err(AccessError::Context(err)) => Err(DirectiveError::Context(err)),
    }
}
