//! Per-user access decisions at the current execution path.

use crate::authz::SecurityAudit;
use crate::context::{self, ContextError, ContextHandle};
use crate::delegator::UserLogin;
use crate::dispatch::{
    CANDIDATE, HAS_PERMISSION, LOCALE, ServiceDispatcher, ServiceParams, TIME_ZONE, USER_LOGIN_ID,
};
use crate::path::ArtifactPath;
use crate::permission::{Permission, PermissionSet};
use crate::trie::PathTrie;
use futures_util::{Stream, StreamExt};
use miette::Diagnostic;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Outcome of a failed check.
#[derive(Debug, Error, Diagnostic)]
pub enum AccessError {
    #[error("access denied: `{user}` lacks {requested} at {path}")]
    #[diagnostic(code(pathguard::authz::denied))]
    Denied {
        user: String,
        path: String,
        requested: String,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Context(#[from] ContextError),
}

impl AccessError {
    pub(crate) fn denied(user: &str, path: &ArtifactPath, requested: &Permission) -> Self {
        AccessError::Denied {
            user: user.to_owned(),
            path: path.to_string(),
            requested: requested.to_string(),
        }
    }
}

/// One user's resolved permission tree plus the machinery to evaluate it.
///
/// Controllers are built by the
/// [`AuthorizationManager`](crate::authz::AuthorizationManager), memoized
/// per user, and shared freely across workers; every check resolves into a
/// fresh accumulator.
pub struct AccessController {
    user: UserLogin,
    trie: PathTrie<PermissionSet>,
    dispatcher: Arc<dyn ServiceDispatcher>,
    audit: Arc<SecurityAudit>,
    disabled: bool,
    verbose: bool,
}

impl AccessController {
    pub(crate) fn new(
        user: UserLogin,
        trie: PathTrie<PermissionSet>,
        dispatcher: Arc<dyn ServiceDispatcher>,
        audit: Arc<SecurityAudit>,
        disabled: bool,
        verbose: bool,
    ) -> Self {
        Self {
            user,
            trie,
            dispatcher,
            audit,
            disabled,
            verbose,
        }
    }

    #[must_use]
    pub fn user(&self) -> &UserLogin {
        &self.user
    }

    /// Merge every grant matching `path` into a fresh accumulator.
    #[must_use]
    pub fn resolve(&self, path: &ArtifactPath) -> PermissionSet {
        let mut acc = PermissionSet::new(self.user.id.clone());
        self.trie.resolve_into(path, &mut acc);
        acc
    }

    /// Decide `requested` at the current execution path.
    ///
    /// Grants if enforcement is suspended on the context or disabled by
    /// configuration; otherwise the accumulated set must imply the request
    /// and every registered permission service must agree. A denial at an
    /// audited artifact is recorded before it is returned.
    pub async fn check_permission(&self, requested: &Permission) -> Result<(), AccessError> {
        let ctx = context::current()?;
        if ctx.is_unprotected() {
            return Ok(());
        }
        let path = ctx.execution_path();
        let acc = self.resolve(&path);
        if self.verbose {
            debug!(
                user = %self.user.id,
                %path,
                resolved = %acc,
                requested = %requested,
                "permission check"
            );
        }
        if self.disabled {
            return Ok(());
        }
        if acc.implies(requested) && self.service_checks_pass(&acc, &ctx).await {
            return Ok(());
        }
        self.audit
            .log_incident(&self.user.id, &path, requested)
            .await?;
        Err(AccessError::denied(&self.user.id, &path, requested))
    }

    /// Keep only the rows every filter service registered at the current
    /// path agrees to.
    pub async fn filtered_rows(&self, rows: Vec<Value>) -> Result<Vec<Value>, AccessError> {
        let ctx = context::current()?;
        let acc = self.resolve(&ctx.execution_path());
        if acc.filters().is_empty() {
            return Ok(rows);
        }
        let filters = sorted_filters(&acc);
        let base = self.context_params(&ctx);
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if row_passes(&self.dispatcher, &filters, &base, &row).await {
                kept.push(row);
            }
        }
        Ok(kept)
    }

    /// The same contract as [`filtered_rows`](Self::filtered_rows), applied
    /// lazily while the stream is driven. Row-level filters compose with
    /// collections and streams only; external cursor paging is out of
    /// scope.
    pub async fn filtered_stream<S>(
        &self,
        rows: S,
    ) -> Result<impl Stream<Item = Value>, AccessError>
    where
        S: Stream<Item = Value>,
    {
        let ctx = context::current()?;
        let acc = self.resolve(&ctx.execution_path());
        let filters = Arc::new(sorted_filters(&acc));
        let base = Arc::new(self.context_params(&ctx));
        let dispatcher = self.dispatcher.clone();
        Ok(rows.filter_map(move |row| {
            let dispatcher = dispatcher.clone();
            let filters = filters.clone();
            let base = base.clone();
            async move {
                if filters.is_empty() || row_passes(&dispatcher, &filters, &base, &row).await {
                    Some(row)
                } else {
                    None
                }
            }
        }))
    }

    /// Invoke every permission service in the set; any explicit `false`
    /// verdict denies, invocation failures carry no opinion.
    async fn service_checks_pass(&self, acc: &PermissionSet, ctx: &ContextHandle) -> bool {
        for service in acc.services() {
            let params = self.context_params(ctx);
            match self.dispatcher.invoke(service, params).await {
                Ok(result) => {
                    if result.get(HAS_PERMISSION).and_then(Value::as_bool) == Some(false) {
                        return false;
                    }
                }
                Err(err) => {
                    warn!(
                        service = %service,
                        error = %err,
                        "permission service failed; treating as no opinion"
                    );
                }
            }
        }
        true
    }

    fn context_params(&self, ctx: &ContextHandle) -> ServiceParams {
        let mut params = ServiceParams::default();
        params.insert(
            USER_LOGIN_ID.to_owned(),
            Value::String(self.user.id.clone()),
        );
        params.insert(LOCALE.to_owned(), Value::String(ctx.locale()));
        params.insert(TIME_ZONE.to_owned(), Value::String(ctx.time_zone()));
        params
    }
}

fn sorted_filters(acc: &PermissionSet) -> Vec<String> {
    let mut filters: Vec<String> = acc.filters().iter().cloned().collect();
    filters.sort_unstable();
    filters
}

async fn row_passes(
    dispatcher: &Arc<dyn ServiceDispatcher>,
    filters: &[String],
    base: &ServiceParams,
    row: &Value,
) -> bool {
    for filter in filters {
        let mut params = base.clone();
        params.insert(CANDIDATE.to_owned(), row.clone());
        match dispatcher.invoke(filter, params).await {
            Ok(result) => {
                if result.get(HAS_PERMISSION).and_then(Value::as_bool) == Some(false) {
                    return false;
                }
            }
            Err(err) => {
                warn!(
                    filter = %filter,
                    error = %err,
                    "filter service failed; treating as no opinion"
                );
            }
        }
    }
    true
}
