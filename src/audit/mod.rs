//! Append-only audit trail
//!
//! Every security-relevant action in the platform lands here as a
//! structured [`AuditRecord`]. Records are create-then-immutable; nothing in
//! this module can mutate or delete one. Persistence failures are absorbed
//! at this boundary: the business operation that triggered the audit call
//! must not fail because auditing failed, so [`AuditLogger::log`] returns a
//! [`LogOutcome`] instead of propagating the error (an explicit
//! availability-over-completeness trade-off).

pub mod sanitize;
pub mod store;

pub use sanitize::{sanitize_for_log, REDACTION_MARKER};
pub use store::{AuditStore, MemoryAuditStore};

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Action taxonomy for audit records
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    UserLogin,
    UserLogout,
    FinancialTransaction,
    SensitiveDataAccess,
    SensitiveDataChange,
    UnauthorizedAccess,
    RoleChange,
    DataDeletion,
    DataExport,
    SecurityCheck,
    SecurityAlertTriggered,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserLogin => "USER_LOGIN",
            AuditAction::UserLogout => "USER_LOGOUT",
            AuditAction::FinancialTransaction => "FINANCIAL_TRANSACTION",
            AuditAction::SensitiveDataAccess => "SENSITIVE_DATA_ACCESS",
            AuditAction::SensitiveDataChange => "SENSITIVE_DATA_CHANGE",
            AuditAction::UnauthorizedAccess => "UNAUTHORIZED_ACCESS",
            AuditAction::RoleChange => "ROLE_CHANGE",
            AuditAction::DataDeletion => "DATA_DELETION",
            AuditAction::DataExport => "DATA_EXPORT",
            AuditAction::SecurityCheck => "SECURITY_CHECK",
            AuditAction::SecurityAlertTriggered => "SECURITY_ALERT_TRIGGERED",
        }
    }
}

/// A persisted, immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub actor_user_id: Option<i64>,
    pub action: AuditAction,
    pub resource: String,
    pub resource_id: Option<String>,
    /// Structured context, already redacted before it reaches the store
    pub details: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A record about to be written; the store assigns id and timestamp
#[derive(Debug, Clone)]
pub struct NewAuditRecord {
    pub actor_user_id: Option<i64>,
    pub action: AuditAction,
    pub resource: String,
    pub resource_id: Option<String>,
    pub details: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl NewAuditRecord {
    pub fn new(action: AuditAction, resource: impl Into<String>) -> Self {
        Self {
            actor_user_id: None,
            action,
            resource: resource.into(),
            resource_id: None,
            details: None,
            ip_address: None,
            user_agent: None,
            success: true,
            error_message: None,
        }
    }

    pub fn actor(mut self, user_id: i64) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn maybe_actor(mut self, user_id: Option<i64>) -> Self {
        self.actor_user_id = user_id;
        self
    }

    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    /// Attach structured context; the value is redacted here, not at the
    /// call site
    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(sanitize_for_log(details));
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn maybe_ip_address(mut self, ip: Option<&str>) -> Self {
        self.ip_address = ip.map(str::to_string);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn maybe_user_agent(mut self, agent: Option<&str>) -> Self {
        self.user_agent = agent.map(str::to_string);
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub(crate) fn into_record(self, id: Uuid, created_at: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            id,
            actor_user_id: self.actor_user_id,
            action: self.action,
            resource: self.resource,
            resource_id: self.resource_id,
            details: self.details,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            success: self.success,
            error_message: self.error_message,
            created_at,
        }
    }
}

/// Typed filter parameters for audit retrieval
///
/// The only filtering surface the stores expose; a SQL-backed store maps
/// each field to a bound parameter, so injectable queries are not
/// constructible.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub actor_user_id: Option<i64>,
    pub actions: Vec<AuditAction>,
    pub resource: Option<String>,
    pub ip_address: Option<String>,
    pub success: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl AuditQuery {
    pub fn with_actor(mut self, user_id: i64) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn with_action(mut self, action: AuditAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Whether a record satisfies every set filter
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(actor) = self.actor_user_id {
            if record.actor_user_id != Some(actor) {
                return false;
            }
        }
        if !self.actions.is_empty() && !self.actions.contains(&record.action) {
            return false;
        }
        if let Some(resource) = &self.resource {
            if &record.resource != resource {
                return false;
            }
        }
        if let Some(ip) = &self.ip_address {
            if record.ip_address.as_deref() != Some(ip.as_str()) {
                return false;
            }
        }
        if let Some(success) = self.success {
            if record.success != success {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.created_at > until {
                return false;
            }
        }
        true
    }
}

/// Aggregate statistics over a filtered slice of the trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    pub total: u64,
    pub by_action: Vec<(AuditAction, u64)>,
    pub by_resource: Vec<(String, u64)>,
}

/// Outcome of an audit write
///
/// Persistence failures are swallowed by design so auditing can never break
/// the triggering business operation; callers that care can still inspect
/// the dropped error.
#[derive(Debug)]
pub enum LogOutcome {
    Recorded(Uuid),
    Dropped(Error),
}

impl LogOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, LogOutcome::Recorded(_))
    }

    pub fn id(&self) -> Option<Uuid> {
        match self {
            LogOutcome::Recorded(id) => Some(*id),
            LogOutcome::Dropped(_) => None,
        }
    }
}

/// Append-only audit logger over an abstract store
pub struct AuditLogger {
    store: Arc<dyn AuditStore>,
    store_timeout: Duration,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn AuditStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// The underlying store, shared with the security monitor's detectors
    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Persist a record, absorbing store failures into the outcome
    ///
    /// The write is bounded by the configured store timeout so a slow audit
    /// store cannot stall the caller's business operation.
    pub async fn log(&self, entry: NewAuditRecord) -> LogOutcome {
        let action = entry.action;
        match tokio::time::timeout(self.store_timeout, self.store.insert(entry)).await {
            Ok(Ok(id)) => LogOutcome::Recorded(id),
            Ok(Err(err)) => {
                warn!(
                    target: "mealdesk_audit",
                    action = action.as_str(),
                    error = %err,
                    "audit record dropped: store rejected write"
                );
                LogOutcome::Dropped(err)
            }
            Err(_) => {
                warn!(
                    target: "mealdesk_audit",
                    action = action.as_str(),
                    "audit record dropped: store write timed out"
                );
                LogOutcome::Dropped(Error::Persistence("audit store write timed out".into()))
            }
        }
    }

    /// Filtered retrieval, newest-first
    pub async fn search(&self, query: &AuditQuery) -> crate::error::Result<Vec<AuditRecord>> {
        tokio::time::timeout(self.store_timeout, self.store.search(query))
            .await
            .map_err(|_| Error::Persistence("audit store read timed out".into()))?
    }

    /// Aggregate statistics for reporting
    pub async fn get_stats(&self, query: &AuditQuery) -> crate::error::Result<AuditStats> {
        tokio::time::timeout(self.store_timeout, self.store.stats(query))
            .await
            .map_err(|_| Error::Persistence("audit store read timed out".into()))?
    }

    // Typed helpers fixing the action/resource taxonomy. Each one runs
    // caller-supplied details through the redaction pass.

    pub async fn log_user_login(
        &self,
        user_id: i64,
        ip: &str,
        user_agent: Option<&str>,
        success: bool,
        error_message: Option<&str>,
    ) -> LogOutcome {
        let mut entry = NewAuditRecord::new(AuditAction::UserLogin, "auth")
            .actor(user_id)
            .ip_address(ip)
            .maybe_user_agent(user_agent)
            .success(success);
        if let Some(message) = error_message {
            entry = entry.error_message(message);
        }
        self.log(entry).await
    }

    pub async fn log_user_logout(&self, user_id: i64, ip: &str) -> LogOutcome {
        self.log(
            NewAuditRecord::new(AuditAction::UserLogout, "auth")
                .actor(user_id)
                .ip_address(ip),
        )
        .await
    }

    pub async fn log_financial_transaction(
        &self,
        user_id: i64,
        resource: &str,
        resource_id: &str,
        details: Value,
        ip: Option<&str>,
    ) -> LogOutcome {
        self.log(
            NewAuditRecord::new(AuditAction::FinancialTransaction, resource)
                .actor(user_id)
                .resource_id(resource_id)
                .details(details)
                .maybe_ip_address(ip),
        )
        .await
    }

    pub async fn log_sensitive_data_access(
        &self,
        user_id: Option<i64>,
        resource: &str,
        resource_id: Option<&str>,
        details: Value,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> LogOutcome {
        let mut entry = NewAuditRecord::new(AuditAction::SensitiveDataAccess, resource)
            .maybe_actor(user_id)
            .details(details)
            .maybe_ip_address(ip)
            .maybe_user_agent(user_agent);
        if let Some(id) = resource_id {
            entry = entry.resource_id(id);
        }
        self.log(entry).await
    }

    pub async fn log_sensitive_data_change(
        &self,
        user_id: i64,
        resource: &str,
        resource_id: &str,
        details: Value,
        ip: Option<&str>,
    ) -> LogOutcome {
        self.log(
            NewAuditRecord::new(AuditAction::SensitiveDataChange, resource)
                .actor(user_id)
                .resource_id(resource_id)
                .details(details)
                .maybe_ip_address(ip),
        )
        .await
    }

    pub async fn log_unauthorized_access(
        &self,
        user_id: Option<i64>,
        resource: &str,
        ip: &str,
        user_agent: Option<&str>,
        reason: &str,
    ) -> LogOutcome {
        self.log(
            NewAuditRecord::new(AuditAction::UnauthorizedAccess, resource)
                .maybe_actor(user_id)
                .ip_address(ip)
                .maybe_user_agent(user_agent)
                .success(false)
                .error_message(reason),
        )
        .await
    }

    pub async fn log_role_change(
        &self,
        actor_user_id: i64,
        target_user_id: i64,
        old_role: &str,
        new_role: &str,
        ip: Option<&str>,
    ) -> LogOutcome {
        self.log(
            NewAuditRecord::new(AuditAction::RoleChange, "user_role")
                .actor(actor_user_id)
                .resource_id(target_user_id.to_string())
                .details(serde_json::json!({
                    "old_role": old_role,
                    "new_role": new_role,
                }))
                .maybe_ip_address(ip),
        )
        .await
    }

    pub async fn log_data_deletion(
        &self,
        actor_user_id: i64,
        resource: &str,
        resource_id: &str,
        ip: Option<&str>,
    ) -> LogOutcome {
        self.log(
            NewAuditRecord::new(AuditAction::DataDeletion, resource)
                .actor(actor_user_id)
                .resource_id(resource_id)
                .maybe_ip_address(ip),
        )
        .await
    }

    pub async fn log_data_export(
        &self,
        actor_user_id: i64,
        resource: &str,
        details: Value,
        ip: Option<&str>,
    ) -> LogOutcome {
        self.log(
            NewAuditRecord::new(AuditAction::DataExport, resource)
                .actor(actor_user_id)
                .details(details)
                .maybe_ip_address(ip),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::store::FailingAuditStore;
    use super::*;
    use serde_json::json;

    fn test_logger() -> (Arc<MemoryAuditStore>, AuditLogger) {
        let store = Arc::new(MemoryAuditStore::new());
        let logger = AuditLogger::new(store.clone(), Duration::from_secs(2));
        (store, logger)
    }

    #[tokio::test]
    async fn log_returns_recorded_id() {
        let (_, logger) = test_logger();
        let outcome = logger
            .log(NewAuditRecord::new(AuditAction::DataExport, "orders").actor(3))
            .await;
        assert!(outcome.is_recorded());
        assert!(outcome.id().is_some());
    }

    #[tokio::test]
    async fn persistence_failure_is_dropped_not_propagated() {
        let logger = AuditLogger::new(Arc::new(FailingAuditStore), Duration::from_secs(2));
        let outcome = logger
            .log(NewAuditRecord::new(AuditAction::UserLogin, "auth"))
            .await;
        assert!(matches!(outcome, LogOutcome::Dropped(Error::Persistence(_))));
    }

    #[tokio::test]
    async fn helpers_fix_the_taxonomy() {
        let (store, logger) = test_logger();

        logger
            .log_user_login(5, "10.1.1.1", Some("curl/8"), false, Some("bad password"))
            .await;
        logger.log_user_logout(5, "10.1.1.1").await;
        logger
            .log_unauthorized_access(None, "invoices", "10.1.1.2", None, "missing role")
            .await;

        let login = store
            .search(&AuditQuery::default().with_action(AuditAction::UserLogin))
            .await
            .unwrap();
        assert_eq!(login.len(), 1);
        assert_eq!(login[0].actor_user_id, Some(5));
        assert!(!login[0].success);
        assert_eq!(login[0].error_message.as_deref(), Some("bad password"));

        let unauthorized = store
            .search(&AuditQuery::default().with_action(AuditAction::UnauthorizedAccess))
            .await
            .unwrap();
        assert_eq!(unauthorized.len(), 1);
        assert!(!unauthorized[0].success);
        assert_eq!(unauthorized[0].actor_user_id, None);
    }

    #[tokio::test]
    async fn details_are_redacted_before_persistence() {
        let (store, logger) = test_logger();
        logger
            .log_sensitive_data_change(
                9,
                "payment_method",
                "pm-42",
                json!({"cardNumber": "4111111111111111", "label": "corporate card"}),
                Some("10.0.0.1"),
            )
            .await;

        let records = store.search(&AuditQuery::default()).await.unwrap();
        let details = records[0].details.as_ref().unwrap();
        assert_eq!(details["cardNumber"], REDACTION_MARKER);
        assert_eq!(details["label"], "corporate card");
    }

    #[tokio::test]
    async fn role_change_shapes_details() {
        let (store, logger) = test_logger();
        logger
            .log_role_change(1, 2, "employee", "company_admin", None)
            .await;

        let records = store.search(&AuditQuery::default()).await.unwrap();
        assert_eq!(records[0].action, AuditAction::RoleChange);
        assert_eq!(records[0].resource_id.as_deref(), Some("2"));
        let details = records[0].details.as_ref().unwrap();
        assert_eq!(details["old_role"], "employee");
        assert_eq!(details["new_role"], "company_admin");
    }

    #[tokio::test]
    async fn stats_pass_through() {
        let (_, logger) = test_logger();
        logger.log_user_logout(1, "a").await;
        logger.log_user_logout(2, "b").await;

        let stats = logger.get_stats(&AuditQuery::default()).await.unwrap();
        assert_eq!(stats.total, 2);
    }
}
