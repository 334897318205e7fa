//! Authorization: building per-user permission trees from raw grants and
//! answering checks against the current execution path.
//!
//! [`AuthorizationManager`] owns the grant-loading pipeline: it computes the
//! user's group closure, parses every grant row into the permission trie,
//! and memoizes the finished [`AccessController`] in a named cache scoped to
//! the delegator. One builder runs per user at a time; later callers get the
//! published controller.

mod audit;
mod controller;

pub use audit::{AuditMark, SecurityAudit};
pub use controller::{AccessController, AccessError};

use crate::cache::{Cache, CacheManager};
use crate::context::{self, ContextError};
use crate::delegator::{DataAccessError, Delegator, UserLogin};
use crate::dispatch::ServiceDispatcher;
use crate::path::{ArtifactPath, PathParseError};
use crate::permission::{GrantParseError, Permission, PermissionSet};
use crate::trie::PathTrie;
use dashmap::DashMap;
use miette::Diagnostic;
use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Failures while producing an [`AccessController`].
#[derive(Debug, Error, Diagnostic)]
pub enum AuthorizationError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidPermission(#[from] GrantParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    InvalidPath(#[from] PathParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Data(#[from] DataAccessError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Context(#[from] ContextError),

    #[error("no user login on the current execution context")]
    #[diagnostic(
        code(pathguard::authz::missing_user),
        help("seed the context with a UserLogin before requesting a controller")
    )]
    MissingUser,
}

/// Resolves users' raw grants into cached [`AccessController`] values.
pub struct AuthorizationManager {
    delegator: Arc<dyn Delegator>,
    dispatcher: Arc<dyn ServiceDispatcher>,
    controllers: Arc<Cache<String, Arc<AccessController>>>,
    build_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    audit: Arc<SecurityAudit>,
    disabled: bool,
    verbose: bool,
}

impl AuthorizationManager {
    /// Wire a manager to its collaborators. The per-user memo cache is
    /// registered with `caches` under `security.permissions.<delegator-id>`
    /// and picks up any environment tuning for that name.
    pub fn new(
        delegator: Arc<dyn Delegator>,
        dispatcher: Arc<dyn ServiceDispatcher>,
        caches: &CacheManager,
    ) -> Self {
        let settings = caches.engine_settings();
        let controllers =
            caches.cache::<String, Arc<AccessController>>(&format!(
                "security.permissions.{}",
                delegator.id()
            ));
        Self {
            audit: Arc::new(SecurityAudit::new(delegator.clone())),
            disabled: settings.authorization_disabled,
            verbose: settings.authorization_verbose,
            delegator,
            dispatcher,
            controllers,
            build_locks: DashMap::new(),
        }
    }

    /// Whether enforcement is globally switched off by configuration.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// The controller for the user on the current execution context.
    ///
    /// Cache hit aside, the build runs under a per-user lock so concurrent
    /// requests do the work once, and under a bypass guard so reading grant
    /// rows does not recurse into authorization.
    pub async fn access_controller(&self) -> Result<Arc<AccessController>, AuthorizationError> {
        let ctx = context::current()?;
        let user = ctx.user_login().ok_or(AuthorizationError::MissingUser)?;

        if let Some(controller) = self.controllers.get(&user.id) {
            return Ok(controller);
        }

        let lock = self
            .build_locks
            .entry(user.id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _build = lock.lock().await;

        if let Some(controller) = self.controllers.get(&user.id) {
            return Ok(controller);
        }

        let _bypass = ctx.run_unprotected();
        let controller = Arc::new(self.build_controller(&user).await?);
        self.controllers.put(user.id.clone(), controller.clone());
        Ok(controller)
    }

    /// Drop the memoized controller for a user, forcing a rebuild on the
    /// next check after their grants or memberships change.
    pub fn clear_user_data(&self, user_login_id: &str) {
        self.controllers.remove(&user_login_id.to_owned());
    }

    /// Record an incident for the current path if it is under audit.
    /// Independent entry point; see [`SecurityAudit::log_incident`].
    pub async fn log_incident(&self, requested: &Permission) -> Result<(), AccessError> {
        let ctx = context::current()?;
        let user = ctx.user_login().map(|u| u.id).unwrap_or_default();
        self.audit
            .log_incident(&user, &ctx.execution_path(), requested)
            .await
    }

    async fn build_controller(
        &self,
        user: &UserLogin,
    ) -> Result<AccessController, AuthorizationError> {
        let groups = self.group_closure(&user.id).await?;
        let mut trie = PathTrie::new();

        // Group grants first, user grants last.
        for group_id in &groups {
            for grant in self.delegator.group_grants(group_id).await? {
                insert_grant(
                    &mut trie,
                    group_id,
                    &grant.artifact_path,
                    &grant.permission_value,
                )?;
            }
        }
        for grant in self.delegator.user_grants(&user.id).await? {
            insert_grant(
                &mut trie,
                &user.id,
                &grant.artifact_path,
                &grant.permission_value,
            )?;
        }

        if self.verbose {
            debug!(user = %user.id, groups = ?groups, "built permission tree");
        }
        Ok(AccessController::new(
            user.clone(),
            trie,
            self.dispatcher.clone(),
            self.audit.clone(),
            self.disabled,
            self.verbose,
        ))
    }

    /// Transitive closure over child-to-parent group edges, deduplicated,
    /// in breadth-first order from the user's direct memberships.
    async fn group_closure(&self, user_id: &str) -> Result<Vec<String>, DataAccessError> {
        let mut order = Vec::new();
        let mut seen = FxHashSet::default();
        let mut queue: VecDeque<String> =
            self.delegator.groups_for_user(user_id).await?.into();
        while let Some(group) = queue.pop_front() {
            if !seen.insert(group.clone()) {
                continue;
            }
            queue.extend(self.delegator.parent_groups(&group).await?);
            order.push(group);
        }
        Ok(order)
    }
}

fn insert_grant(
    trie: &mut PathTrie<PermissionSet>,
    owner: &str,
    artifact_path: &str,
    permission_value: &str,
) -> Result<(), AuthorizationError> {
    let path: ArtifactPath = artifact_path.parse()?;
    let mut set = PermissionSet::new(owner);
    set.apply_grant_value(permission_value)?;
    trie.insert(&path, set);
    Ok(())
}
