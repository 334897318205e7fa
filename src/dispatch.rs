//! The service-dispatch capability consumed for programmable permission
//! checks and row-level filters.
//!
//! The engine never owns a service engine; it invokes one through
//! [`ServiceDispatcher`] and reads a single conventional field,
//! [`HAS_PERMISSION`], out of the result map. A closure-backed
//! [`FnDispatcher`] ships with the crate for tests and bootstrap wiring.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

/// Parameter and result maps exchanged with services.
pub type ServiceParams = FxHashMap<String, Value>;

/// Result field carrying a permission service's verdict.
pub const HAS_PERMISSION: &str = "hasPermission";

/// Parameter key for the calling user's login id.
pub const USER_LOGIN_ID: &str = "userLoginId";

/// Parameter key for the calling context's locale.
pub const LOCALE: &str = "locale";

/// Parameter key for the calling context's time zone.
pub const TIME_ZONE: &str = "timeZone";

/// Parameter key carrying the row under scrutiny in a filter service.
pub const CANDIDATE: &str = "candidate";

/// Failures surfaced by a dispatcher.
#[derive(Debug, Error, Diagnostic)]
pub enum ServiceError {
    #[error("no service registered under `{service}`")]
    #[diagnostic(code(pathguard::dispatch::unknown_service))]
    Unknown { service: String },

    #[error("service `{service}` failed: {message}")]
    #[diagnostic(code(pathguard::dispatch::failed))]
    Failed { service: String, message: String },
}

/// Synchronous-from-the-caller's-view service invocation.
///
/// `invoke` runs the named service to completion and returns its result map.
/// Implementations decide how the call is actually carried out.
#[async_trait]
pub trait ServiceDispatcher: Send + Sync {
    async fn invoke(&self, service: &str, params: ServiceParams)
    -> Result<ServiceParams, ServiceError>;
}

/// Build the conventional result map of a permission service.
#[must_use]
pub fn permission_result(granted: bool) -> ServiceParams {
    let mut result = ServiceParams::default();
    result.insert(HAS_PERMISSION.to_owned(), Value::Bool(granted));
    result
}

type Handler = Box<dyn Fn(ServiceParams) -> Result<ServiceParams, ServiceError> + Send + Sync>;

/// A dispatcher backed by registered closures.
///
/// # Examples
///
/// ```
/// use pathguard::dispatch::{permission_result, FnDispatcher};
///
/// let dispatcher = FnDispatcher::new()
///     .with_service("chkQuota", |_params| Ok(permission_result(true)));
/// ```
#[derive(Default)]
pub struct FnDispatcher {
    handlers: FxHashMap<String, Handler>,
}

impl FnDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_service<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(ServiceParams) -> Result<ServiceParams, ServiceError> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Box::new(handler));
        self
    }
}

#[async_trait]
impl ServiceDispatcher for FnDispatcher {
    async fn invoke(
        &self,
        service: &str,
        params: ServiceParams,
    ) -> Result<ServiceParams, ServiceError> {
        match self.handlers.get(service) {
            Some(handler) => handler(params),
            None => Err(ServiceError::Unknown {
                service: service.to_owned(),
            }),
        }
    }
}
