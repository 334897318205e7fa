//! The entity-layer capability the authorization manager reads grants
//! through, plus the row types it exchanges.
//!
//! The real storage engine lives outside this crate; [`Delegator`] is the
//! narrow surface consumed here. [`InMemoryDelegator`] is the process-local
//! implementation used by tests and bootstrap wiring.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// An authenticated user identity carried on the execution context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLogin {
    pub id: String,
}

impl UserLogin {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Membership row: a user belongs to a group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    pub user_login_id: String,
    pub group_id: String,
}

/// Group hierarchy edge, directed child to parent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRelationship {
    pub from_group_id: String,
    pub to_group_id: String,
}

/// A raw permission grant owned by a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGrant {
    pub user_login_id: String,
    pub artifact_path: String,
    pub permission_value: String,
}

/// A raw permission grant owned by a group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupGrant {
    pub group_id: String,
    pub artifact_path: String,
    pub permission_value: String,
}

/// An artifact path pattern under audit, optionally time-boxed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditedArtifact {
    pub artifact_path: String,
    pub from_date: Option<DateTime<Utc>>,
    pub thru_date: Option<DateTime<Utc>>,
}

/// One recorded denial at an audited artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityIncident {
    pub id: Uuid,
    pub user_login_id: String,
    pub artifact_path: String,
    pub incident_date: DateTime<Utc>,
    pub requested_access: String,
}

/// Entity-layer failure wrapper. Grant loads abort on it; audit writes
/// convert it so a logging failure never masks a denial.
#[derive(Debug, Error, Diagnostic)]
#[error("entity layer failure: {message}")]
#[diagnostic(code(pathguard::delegator::data_access))]
pub struct DataAccessError {
    pub message: String,
}

impl DataAccessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The storage surface the authorization layer consumes.
#[async_trait]
pub trait Delegator: Send + Sync {
    /// Stable identifier distinguishing storage instances; scopes the
    /// per-user permission cache.
    fn id(&self) -> &str;

    /// Direct group memberships of a user.
    async fn groups_for_user(&self, user_login_id: &str) -> Result<Vec<String>, DataAccessError>;

    /// Direct parents of a group in the hierarchy.
    async fn parent_groups(&self, group_id: &str) -> Result<Vec<String>, DataAccessError>;

    async fn user_grants(&self, user_login_id: &str) -> Result<Vec<UserGrant>, DataAccessError>;

    async fn group_grants(&self, group_id: &str) -> Result<Vec<GroupGrant>, DataAccessError>;

    /// Every audited-artifact row, for building the audit trie.
    async fn audited_artifacts(&self) -> Result<Vec<AuditedArtifact>, DataAccessError>;

    /// Append one incident row to the audit log.
    async fn record_incident(&self, incident: SecurityIncident) -> Result<(), DataAccessError>;
}

#[derive(Default)]
struct Tables {
    memberships: Vec<GroupMembership>,
    relationships: Vec<GroupRelationship>,
    user_grants: Vec<UserGrant>,
    group_grants: Vec<GroupGrant>,
    audited: Vec<AuditedArtifact>,
    incidents: Vec<SecurityIncident>,
}

/// Process-local [`Delegator`] with builder-style seeding and mutation
/// hooks, the way the runtime's in-memory checkpointer ships next to its
/// durable ones.
pub struct InMemoryDelegator {
    id: String,
    tables: RwLock<Tables>,
}

impl InMemoryDelegator {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tables: RwLock::new(Tables::default()),
        }
    }

    #[must_use]
    pub fn with_membership(self, user: &str, group: &str) -> Self {
        self.add_membership(user, group);
        self
    }

    #[must_use]
    pub fn with_group_parent(self, child: &str, parent: &str) -> Self {
        self.tables.write().relationships.push(GroupRelationship {
            from_group_id: child.to_owned(),
            to_group_id: parent.to_owned(),
        });
        self
    }

    #[must_use]
    pub fn with_user_grant(self, user: &str, path: &str, value: &str) -> Self {
        self.add_user_grant(user, path, value);
        self
    }

    #[must_use]
    pub fn with_group_grant(self, group: &str, path: &str, value: &str) -> Self {
        self.add_group_grant(group, path, value);
        self
    }

    #[must_use]
    pub fn with_audited(self, path: &str) -> Self {
        self.tables.write().audited.push(AuditedArtifact {
            artifact_path: path.to_owned(),
            from_date: None,
            thru_date: None,
        });
        self
    }

    #[must_use]
    pub fn with_audited_between(
        self,
        path: &str,
        from_date: Option<DateTime<Utc>>,
        thru_date: Option<DateTime<Utc>>,
    ) -> Self {
        self.tables.write().audited.push(AuditedArtifact {
            artifact_path: path.to_owned(),
            from_date,
            thru_date,
        });
        self
    }

    pub fn add_membership(&self, user: &str, group: &str) {
        self.tables.write().memberships.push(GroupMembership {
            user_login_id: user.to_owned(),
            group_id: group.to_owned(),
        });
    }

    pub fn add_user_grant(&self, user: &str, path: &str, value: &str) {
        self.tables.write().user_grants.push(UserGrant {
            user_login_id: user.to_owned(),
            artifact_path: path.to_owned(),
            permission_value: value.to_owned(),
        });
    }

    pub fn add_group_grant(&self, group: &str, path: &str, value: &str) {
        self.tables.write().group_grants.push(GroupGrant {
            group_id: group.to_owned(),
            artifact_path: path.to_owned(),
            permission_value: value.to_owned(),
        });
    }

    /// Recorded incidents, oldest first.
    #[must_use]
    pub fn incidents(&self) -> Vec<SecurityIncident> {
        self.tables.read().incidents.clone()
    }
}

#[async_trait]
impl Delegator for InMemoryDelegator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn groups_for_user(&self, user_login_id: &str) -> Result<Vec<String>, DataAccessError> {
        Ok(self
            .tables
            .read()
            .memberships
            .iter()
            .filter(|m| m.user_login_id == user_login_id)
            .map(|m| m.group_id.clone())
            .collect())
    }

    async fn parent_groups(&self, group_id: &str) -> Result<Vec<String>, DataAccessError> {
        Ok(self
            .tables
            .read()
            .relationships
            .iter()
            .filter(|r| r.from_group_id == group_id)
            .map(|r| r.to_group_id.clone())
            .collect())
    }

    async fn user_grants(&self, user_login_id: &str) -> Result<Vec<UserGrant>, DataAccessError> {
        Ok(self
            .tables
            .read()
            .user_grants
            .iter()
            .filter(|g| g.user_login_id == user_login_id)
            .cloned()
            .collect())
    }

    async fn group_grants(&self, group_id: &str) -> Result<Vec<GroupGrant>, DataAccessError> {
        Ok(self
            .tables
            .read()
            .group_grants
            .iter()
            .filter(|g| g.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn audited_artifacts(&self) -> Result<Vec<AuditedArtifact>, DataAccessError> {
        Ok(self.tables.read().audited.clone())
    }

    async fn record_incident(&self, incident: SecurityIncident) -> Result<(), DataAccessError> {
        self.tables.write().incidents.push(incident);
        Ok(())
    }
}
