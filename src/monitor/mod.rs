//! Threat and anomaly monitoring over the audit trail
//!
//! [`SecurityMonitor`] runs the five detectors against the shared audit
//! store and the in-process rate tracker, combines their verdicts into a
//! single [`SecurityStatus`] snapshot, raises [`SecurityAlert`]s, and owns
//! the alert lifecycle. Request-handling code calls
//! [`SecurityMonitor::perform_security_check`] on each inbound request (or
//! periodically); the check itself is audit-logged so the trail also
//! records that monitoring happened.

pub mod alerts;
pub mod detectors;
pub mod rate;

pub use alerts::{
    AlertSeverity, AlertStatus, AlertStore, AlertType, LogNotifier, MemoryAlertStore,
    NotificationHook, SecurityAlert,
};
pub use detectors::Verdict;
pub use rate::{RateTracker, SweeperHandle};

use crate::audit::{AuditAction, AuditLogger, NewAuditRecord};
use crate::config::{DetectorConfig, RateConfig};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Combined result of one security check
#[derive(Debug, Clone)]
pub struct SecurityStatus {
    /// The request should be rejected outright
    pub is_blocked: bool,
    /// Worth operator attention, but not a hard block
    pub is_suspicious: bool,
    pub failed_logins: Verdict,
    pub suspicious_ips: Verdict,
    pub rapid_requests: Verdict,
    pub excessive_access: Verdict,
    pub anomalous_pattern: Verdict,
    pub checked_at: DateTime<Utc>,
}

/// Threat monitor over the audit store, alert store, and rate tracker
pub struct SecurityMonitor {
    audit: Arc<AuditLogger>,
    alert_store: Arc<dyn AlertStore>,
    rate: Arc<RateTracker>,
    detectors: DetectorConfig,
    rate_config: RateConfig,
    notifier: Option<Arc<dyn NotificationHook>>,
}

impl SecurityMonitor {
    pub fn new(
        audit: Arc<AuditLogger>,
        alert_store: Arc<dyn AlertStore>,
        detectors: DetectorConfig,
        rate_config: RateConfig,
    ) -> Self {
        Self {
            audit,
            alert_store,
            rate: Arc::new(RateTracker::new(&rate_config)),
            detectors,
            rate_config,
            notifier: None,
        }
    }

    /// Attach the outbound notification hook for high-severity alerts
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationHook>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// The in-process rate tracker (shared with the sweeper task)
    pub fn rate_tracker(&self) -> &Arc<RateTracker> {
        &self.rate
    }

    /// Start the periodic rate-tracker sweeper
    pub fn start_rate_sweeper(&self) -> SweeperHandle {
        Arc::clone(&self.rate).start_sweeper(self.rate_config.sweep_interval)
    }

    /// Run all detectors and combine their verdicts into one snapshot
    ///
    /// Detectors run concurrently; no partial result escapes before all
    /// have completed. Every tripped detector raises (at most) one alert,
    /// and the combined outcome is always audit-logged, blocked or not.
    pub async fn perform_security_check(
        &self,
        user_id: Option<i64>,
        ip_address: &str,
        user_agent: Option<&str>,
        endpoint: &str,
    ) -> SecurityStatus {
        let store = self.audit.store();
        let config = &self.detectors;

        let request_count = self.rate.record(ip_address, endpoint) as u64;
        let rapid_requests = detectors::rapid_requests(request_count, config);

        let (failed_logins, suspicious_ips, excessive_access, anomalous_pattern) = tokio::join!(
            detectors::failed_logins(store, config, user_id, ip_address),
            detectors::suspicious_ips(store, config, user_id),
            detectors::excessive_access(store, config, user_id),
            detectors::anomalous_pattern(store, config),
        );

        let status = SecurityStatus {
            is_blocked: failed_logins.is_tripped() || rapid_requests.is_tripped(),
            is_suspicious: suspicious_ips.is_tripped()
                || excessive_access.is_tripped()
                || anomalous_pattern.is_tripped(),
            failed_logins,
            suspicious_ips,
            rapid_requests,
            excessive_access,
            anomalous_pattern,
            checked_at: Utc::now(),
        };

        let tripped: [(AlertType, &Verdict); 5] = [
            (AlertType::FailedLoginAttempts, &status.failed_logins),
            (AlertType::SuspiciousIpActivity, &status.suspicious_ips),
            (AlertType::RapidRequests, &status.rapid_requests),
            (AlertType::ExcessiveDataAccess, &status.excessive_access),
            (AlertType::AnomalousActivityPattern, &status.anomalous_pattern),
        ];
        for (alert_type, verdict) in tripped {
            if let Verdict::Tripped {
                observed,
                threshold,
            } = *verdict
            {
                let details = json!({
                    "observed": observed,
                    "threshold": threshold,
                    "endpoint": endpoint,
                });
                if let Err(err) = self
                    .trigger_security_alert(alert_type, user_id, Some(ip_address), details)
                    .await
                {
                    warn!(
                        target: "mealdesk_monitor",
                        alert_type = alert_type.as_str(),
                        error = %err,
                        "failed to persist security alert"
                    );
                }
            }
        }

        // The check itself goes on the record, fail-open like any audit write
        self.audit
            .log(
                NewAuditRecord::new(AuditAction::SecurityCheck, "security_monitor")
                    .maybe_actor(user_id)
                    .ip_address(ip_address)
                    .maybe_user_agent(user_agent)
                    .success(!status.is_blocked)
                    .details(json!({
                        "endpoint": endpoint,
                        "is_blocked": status.is_blocked,
                        "is_suspicious": status.is_suspicious,
                        "failed_logins": status.failed_logins,
                        "suspicious_ips": status.suspicious_ips,
                        "rapid_requests": status.rapid_requests,
                        "excessive_access": status.excessive_access,
                        "anomalous_pattern": status.anomalous_pattern,
                    })),
            )
            .await;

        status
    }

    /// Persist a new alert, audit-log it, and notify for high severity
    ///
    /// De-duplication: an open alert of the same type for the same subject
    /// (user id when known, else IP) suppresses a duplicate and returns
    /// `Ok(None)`. The open alert is the unit of operator attention, not
    /// each individual threshold crossing.
    pub async fn trigger_security_alert(
        &self,
        alert_type: AlertType,
        subject_user_id: Option<i64>,
        ip_address: Option<&str>,
        details: serde_json::Value,
    ) -> Result<Option<Uuid>> {
        if let Some(existing) = self
            .alert_store
            .find_open(alert_type, subject_user_id, ip_address)
            .await?
        {
            debug!(
                target: "mealdesk_monitor",
                alert_type = alert_type.as_str(),
                existing = %existing.id,
                "open alert already covers this subject; not duplicating"
            );
            return Ok(None);
        }

        let alert = SecurityAlert::new(
            alert_type,
            subject_user_id,
            ip_address.map(str::to_string),
            details,
        );
        let alert_id = alert.id;
        self.alert_store.insert(alert.clone()).await?;

        // Best-effort trail entry; alert creation stands even if this drops
        self.audit
            .log(
                NewAuditRecord::new(AuditAction::SecurityAlertTriggered, "security_alert")
                    .maybe_actor(subject_user_id)
                    .resource_id(alert_id.to_string())
                    .maybe_ip_address(ip_address)
                    .details(json!({
                        "alert_type": alert_type.as_str(),
                        "severity": alert.severity,
                    })),
            )
            .await;

        if alert.severity.requires_notification() {
            if let Some(notifier) = &self.notifier {
                let notifier = Arc::clone(notifier);
                let alert = alert.clone();
                tokio::spawn(async move {
                    if let Err(err) = notifier.notify(&alert).await {
                        warn!(
                            target: "mealdesk_monitor",
                            alert_id = %alert.id,
                            error = %err,
                            "alert notification failed"
                        );
                    }
                });
            }
        }

        Ok(Some(alert_id))
    }

    /// Non-terminal alerts, newest first
    pub async fn get_active_security_alerts(&self) -> Result<Vec<SecurityAlert>> {
        self.alert_store.active().await
    }

    /// Move an open alert into investigation
    pub async fn start_investigation(&self, alert_id: Uuid, by: &str) -> Result<SecurityAlert> {
        self.apply_transition(alert_id, |alert| alert.start_investigation(by))
            .await
    }

    /// Close an alert as a genuine finding
    pub async fn resolve_security_alert(
        &self,
        alert_id: Uuid,
        by: &str,
        note: &str,
    ) -> Result<SecurityAlert> {
        self.apply_transition(alert_id, |alert| alert.resolve(by, note))
            .await
    }

    /// Close an alert as noise
    pub async fn mark_as_false_positive(
        &self,
        alert_id: Uuid,
        by: &str,
        reason: &str,
    ) -> Result<SecurityAlert> {
        self.apply_transition(alert_id, |alert| alert.mark_false_positive(by, reason))
            .await
    }

    async fn apply_transition<F>(&self, alert_id: Uuid, change: F) -> Result<SecurityAlert>
    where
        F: FnOnce(&mut SecurityAlert) -> Result<()>,
    {
        let mut alert = self
            .alert_store
            .get(alert_id)
            .await?
            .ok_or(Error::AlertNotFound(alert_id))?;
        change(&mut alert)?;
        self.alert_store.update(alert.clone()).await?;
        Ok(alert)
    }
}
