//! Security alert model, lifecycle state machine, and storage contracts
//!
//! Alerts move `Active -> Investigating -> Resolved | FalsePositive`
//! (investigation is optional). Transitions are monotonic: once resolved or
//! marked false-positive an alert is immutable, and no code path here can
//! hard-delete one.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::error;
use uuid::Uuid;

/// Detector-aligned alert categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    FailedLoginAttempts,
    SuspiciousIpActivity,
    RapidRequests,
    ExcessiveDataAccess,
    AnomalousActivityPattern,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::FailedLoginAttempts => "FAILED_LOGIN_ATTEMPTS",
            AlertType::SuspiciousIpActivity => "SUSPICIOUS_IP_ACTIVITY",
            AlertType::RapidRequests => "RAPID_REQUESTS",
            AlertType::ExcessiveDataAccess => "EXCESSIVE_DATA_ACCESS",
            AlertType::AnomalousActivityPattern => "ANOMALOUS_ACTIVITY_PATTERN",
        }
    }

    /// Default severity for alerts of this type
    pub fn severity(&self) -> AlertSeverity {
        match self {
            AlertType::FailedLoginAttempts | AlertType::RapidRequests => AlertSeverity::High,
            AlertType::SuspiciousIpActivity
            | AlertType::ExcessiveDataAccess
            | AlertType::AnomalousActivityPattern => AlertSeverity::Medium,
        }
    }
}

/// Alert severity levels
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// High and critical alerts trigger the external notification hook
    pub fn requires_notification(&self) -> bool {
        *self >= AlertSeverity::High
    }
}

/// Alert lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Active,
    Investigating,
    Resolved,
    FalsePositive,
}

impl AlertStatus {
    /// Resolved and false-positive alerts accept no further changes
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::FalsePositive)
    }

    fn can_transition_to(&self, next: AlertStatus) -> bool {
        match (self, next) {
            // Investigation can be (re)assigned while the alert is open
            (AlertStatus::Active, AlertStatus::Investigating)
            | (AlertStatus::Investigating, AlertStatus::Investigating) => true,
            // Open alerts may close directly or after investigation
            (AlertStatus::Active | AlertStatus::Investigating, AlertStatus::Resolved)
            | (AlertStatus::Active | AlertStatus::Investigating, AlertStatus::FalsePositive) => {
                true
            }
            _ => false,
        }
    }
}

/// A raised security alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub subject_user_id: Option<i64>,
    pub ip_address: Option<String>,
    pub details: Value,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    /// Operator currently investigating, when status is `Investigating`
    pub assigned_to: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution: Option<String>,
}

impl SecurityAlert {
    pub fn new(
        alert_type: AlertType,
        subject_user_id: Option<i64>,
        ip_address: Option<String>,
        details: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type,
            severity: alert_type.severity(),
            subject_user_id,
            ip_address,
            details,
            status: AlertStatus::Active,
            created_at: Utc::now(),
            assigned_to: None,
            resolved_at: None,
            resolved_by: None,
            resolution: None,
        }
    }

    fn transition(&mut self, next: AlertStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::IllegalTransition(format!(
                "{:?} -> {:?} for alert {}",
                self.status, next, self.id
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Assign an investigator to an open alert
    pub fn start_investigation(&mut self, by: &str) -> Result<()> {
        self.transition(AlertStatus::Investigating)?;
        self.assigned_to = Some(by.to_string());
        Ok(())
    }

    /// Close the alert as a genuine finding
    pub fn resolve(&mut self, by: &str, note: &str) -> Result<()> {
        self.transition(AlertStatus::Resolved)?;
        self.resolved_at = Some(Utc::now());
        self.resolved_by = Some(by.to_string());
        self.resolution = Some(note.to_string());
        Ok(())
    }

    /// Close the alert as noise
    pub fn mark_false_positive(&mut self, by: &str, reason: &str) -> Result<()> {
        self.transition(AlertStatus::FalsePositive)?;
        self.resolved_at = Some(Utc::now());
        self.resolved_by = Some(by.to_string());
        self.resolution = Some(reason.to_string());
        Ok(())
    }
}

/// Alert persistence contract
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert(&self, alert: SecurityAlert) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<SecurityAlert>>;

    /// Replace the stored alert after a lifecycle transition
    async fn update(&self, alert: SecurityAlert) -> Result<()>;

    /// Non-terminal alerts, newest first
    async fn active(&self) -> Result<Vec<SecurityAlert>>;

    /// An open (non-terminal) alert of the same type for the same subject,
    /// used for de-duplication; matches on user id when given, else on IP
    async fn find_open(
        &self,
        alert_type: AlertType,
        subject_user_id: Option<i64>,
        ip_address: Option<&str>,
    ) -> Result<Option<SecurityAlert>>;
}

/// In-memory reference alert store
#[derive(Default)]
pub struct MemoryAlertStore {
    alerts: RwLock<HashMap<Uuid, SecurityAlert>>,
}

impl MemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertStore for MemoryAlertStore {
    async fn insert(&self, alert: SecurityAlert) -> Result<()> {
        self.alerts.write().await.insert(alert.id, alert);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SecurityAlert>> {
        Ok(self.alerts.read().await.get(&id).cloned())
    }

    async fn update(&self, alert: SecurityAlert) -> Result<()> {
        let mut alerts = self.alerts.write().await;
        match alerts.get_mut(&alert.id) {
            Some(slot) => {
                *slot = alert;
                Ok(())
            }
            None => Err(Error::AlertNotFound(alert.id)),
        }
    }

    async fn active(&self) -> Result<Vec<SecurityAlert>> {
        let alerts = self.alerts.read().await;
        let mut open: Vec<SecurityAlert> = alerts
            .values()
            .filter(|alert| !alert.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(open)
    }

    async fn find_open(
        &self,
        alert_type: AlertType,
        subject_user_id: Option<i64>,
        ip_address: Option<&str>,
    ) -> Result<Option<SecurityAlert>> {
        let alerts = self.alerts.read().await;
        let hit = alerts
            .values()
            .filter(|alert| alert.alert_type == alert_type && !alert.status.is_terminal())
            .find(|alert| match subject_user_id {
                Some(user) => alert.subject_user_id == Some(user),
                None => alert.ip_address.as_deref() == ip_address,
            })
            .cloned();
        Ok(hit)
    }
}

/// External notification dispatch for high-severity alerts
///
/// Implementations wrap email/SMS/push delivery. Invocation is
/// fire-and-forget; a failed notification never rolls back the alert.
#[async_trait]
pub trait NotificationHook: Send + Sync {
    async fn notify(&self, alert: &SecurityAlert) -> Result<()>;
}

/// Default hook that writes high-severity alerts to the operational log
pub struct LogNotifier;

#[async_trait]
impl NotificationHook for LogNotifier {
    async fn notify(&self, alert: &SecurityAlert) -> Result<()> {
        error!(
            target: "mealdesk_alerts",
            alert_id = %alert.id,
            alert_type = alert.alert_type.as_str(),
            severity = ?alert.severity,
            subject_user_id = ?alert.subject_user_id,
            ip = ?alert.ip_address,
            "security alert requires attention"
        );
        Ok(())
    }
}
