//! Incident logging for audited artifacts.
//!
//! Audited-artifact rows form their own path trie with the same matching
//! rules as grants. When a denial lands inside an audited pattern whose
//! date window covers now, one incident row is appended through the
//! delegator. An audit write that fails converts to a denial, never to a
//! silent pass.

use crate::authz::AccessError;
use crate::delegator::{DataAccessError, Delegator, SecurityIncident};
use crate::path::ArtifactPath;
use crate::permission::Permission;
use crate::trie::{Accumulate, PathTrie};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
struct AuditWindow {
    from: Option<DateTime<Utc>>,
    thru: Option<DateTime<Utc>>,
}

impl AuditWindow {
    fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.thru.is_none_or(|thru| at <= thru)
    }
}

/// Accumulated audit coverage at one trie position: audited whenever any
/// merged window covers the moment of the incident.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditMark {
    windows: Vec<AuditWindow>,
}

impl AuditMark {
    fn window(from: Option<DateTime<Utc>>, thru: Option<DateTime<Utc>>) -> Self {
        Self {
            windows: vec![AuditWindow { from, thru }],
        }
    }

    #[must_use]
    pub fn is_audited_at(&self, at: DateTime<Utc>) -> bool {
        self.windows.iter().any(|window| window.contains(at))
    }
}

impl Accumulate for AuditMark {
    fn accumulate(&mut self, other: &Self) {
        for window in &other.windows {
            if !self.windows.contains(window) {
                self.windows.push(window.clone());
            }
        }
    }
}

/// Writes [`SecurityIncident`] rows for denials at audited paths.
pub struct SecurityAudit {
    delegator: Arc<dyn Delegator>,
    trie: OnceCell<PathTrie<AuditMark>>,
}

impl SecurityAudit {
    pub(crate) fn new(delegator: Arc<dyn Delegator>) -> Self {
        Self {
            delegator,
            trie: OnceCell::new(),
        }
    }

    async fn trie(&self) -> Result<&PathTrie<AuditMark>, DataAccessError> {
        self.trie
            .get_or_try_init(|| async {
                let mut trie = PathTrie::new();
                for row in self.delegator.audited_artifacts().await? {
                    match row.artifact_path.parse::<ArtifactPath>() {
                        Ok(path) => {
                            trie.insert(&path, AuditMark::window(row.from_date, row.thru_date));
                        }
                        Err(err) => {
                            warn!(
                                path = %row.artifact_path,
                                error = %err,
                                "skipping malformed audited-artifact row"
                            );
                        }
                    }
                }
                Ok(trie)
            })
            .await
    }

    /// Append an incident if `path` matches an audited pattern active now.
    ///
    /// An entity-layer failure while consulting or writing the audit log
    /// converts to [`AccessError::Denied`]: audit failure must not mask a
    /// denial.
    pub async fn log_incident(
        &self,
        user_login_id: &str,
        path: &ArtifactPath,
        requested: &Permission,
    ) -> Result<(), AccessError> {
        match self.try_log(user_login_id, path, requested).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, "audit write failed; converting to denial");
                Err(AccessError::denied(user_login_id, path, requested))
            }
        }
    }

    async fn try_log(
        &self,
        user_login_id: &str,
        path: &ArtifactPath,
        requested: &Permission,
    ) -> Result<(), DataAccessError> {
        let trie = self.trie().await?;
        let mark = trie.resolve(path);
        let now = Utc::now();
        if mark.is_audited_at(now) {
            self.delegator
                .record_incident(SecurityIncident {
                    id: Uuid::new_v4(),
                    user_login_id: user_login_id.to_owned(),
                    artifact_path: path.to_string(),
                    incident_date: now,
                    requested_access: requested.to_string(),
                })
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn open_window_always_contains() {
        let mark = AuditMark::window(None, None);
        assert!(mark.is_audited_at(Utc::now()));
    }

    #[test]
    fn closed_window_bounds() {
        let now = Utc::now();
        let mark = AuditMark::window(
            Some(now - ChronoDuration::hours(1)),
            Some(now + ChronoDuration::hours(1)),
        );
        assert!(mark.is_audited_at(now));
        assert!(!mark.is_audited_at(now + ChronoDuration::hours(2)));
        assert!(!mark.is_audited_at(now - ChronoDuration::hours(2)));
    }

    #[test]
    fn accumulate_dedups_windows() {
        let mut mark = AuditMark::window(None, None);
        let other = AuditMark::window(None, None);
        mark.accumulate(&other);
        assert_eq!(mark.windows.len(), 1);
    }
}
