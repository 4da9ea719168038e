//! Threshold and sliding-window detectors over the audit trail
//!
//! Each detector returns a tagged [`Verdict`] so callers handle the outcome
//! exhaustively instead of poking at ad hoc booleans. Store-backed
//! detectors bound every query with the configured timeout and fail open:
//! an unreachable or slow audit store yields `Clear`, never a hang and
//! never a block. That bias toward availability is deliberate and
//! documented; it trades security strictness for keeping the platform up.

use crate::audit::{AuditAction, AuditQuery, AuditStore};
use crate::config::DetectorConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Outcome of one detector evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Clear { observed: u64 },
    Tripped { observed: u64, threshold: u64 },
}

impl Verdict {
    pub fn is_tripped(&self) -> bool {
        matches!(self, Verdict::Tripped { .. })
    }

    pub fn observed(&self) -> u64 {
        match self {
            Verdict::Clear { observed } | Verdict::Tripped { observed, .. } => *observed,
        }
    }

    fn from_count(observed: u64, threshold: u64) -> Self {
        if observed >= threshold {
            Verdict::Tripped {
                observed,
                threshold,
            }
        } else {
            Verdict::Clear { observed }
        }
    }
}

fn window_start(window: Duration) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Run a store query with the configured bound, failing open on error or
/// timeout
async fn bounded<T, F>(name: &str, timeout: Duration, query: F) -> Option<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, query).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            warn!(
                target: "mealdesk_monitor",
                detector = name,
                error = %err,
                "detector query failed; failing open"
            );
            None
        }
        Err(_) => {
            warn!(
                target: "mealdesk_monitor",
                detector = name,
                "detector query timed out; failing open"
            );
            None
        }
    }
}

/// Failed `USER_LOGIN` events within the window, for the user or the IP,
/// whichever is higher
pub(crate) async fn failed_logins(
    store: &Arc<dyn AuditStore>,
    config: &DetectorConfig,
    user_id: Option<i64>,
    ip_address: &str,
) -> Verdict {
    let since = window_start(config.failed_login_window);
    let base = AuditQuery::default()
        .with_action(AuditAction::UserLogin)
        .with_success(false)
        .with_since(since);

    let mut observed = 0u64;
    if let Some(user) = user_id {
        let query = base.clone().with_actor(user);
        if let Some(count) = bounded(
            "failed_logins",
            config.store_timeout,
            store.count(&query),
        )
        .await
        {
            observed = observed.max(count);
        }
    }
    let query = base.with_ip(ip_address);
    if let Some(count) = bounded(
        "failed_logins",
        config.store_timeout,
        store.count(&query),
    )
    .await
    {
        observed = observed.max(count);
    }

    Verdict::from_count(observed, config.failed_login_threshold)
}

/// Distinct source IPs for one user within the window
pub(crate) async fn suspicious_ips(
    store: &Arc<dyn AuditStore>,
    config: &DetectorConfig,
    user_id: Option<i64>,
) -> Verdict {
    let Some(user) = user_id else {
        return Verdict::Clear { observed: 0 };
    };
    let since = window_start(config.distinct_ip_window);
    let observed = bounded(
        "suspicious_ips",
        config.store_timeout,
        store.distinct_ips(user, since),
    )
    .await
    .map(|ips| ips.len() as u64)
    .unwrap_or(0);

    Verdict::from_count(observed, config.distinct_ip_threshold)
}

/// Request rate for one `(ip, endpoint)` pair; the count comes from the
/// in-process tracker, so there is nothing to time out on
pub(crate) fn rapid_requests(observed: u64, config: &DetectorConfig) -> Verdict {
    Verdict::from_count(observed, config.rapid_request_threshold)
}

/// Sensitive-data reads and writes for one user within the window
pub(crate) async fn excessive_access(
    store: &Arc<dyn AuditStore>,
    config: &DetectorConfig,
    user_id: Option<i64>,
) -> Verdict {
    let Some(user) = user_id else {
        return Verdict::Clear { observed: 0 };
    };
    let since = window_start(config.sensitive_access_window);
    let query = AuditQuery::default()
        .with_actor(user)
        .with_action(AuditAction::SensitiveDataAccess)
        .with_action(AuditAction::SensitiveDataChange)
        .with_since(since);

    let observed = bounded(
        "excessive_access",
        config.store_timeout,
        store.count(&query),
    )
    .await
    .unwrap_or(0);

    Verdict::from_count(observed, config.sensitive_access_threshold)
}

/// Hour-over-hour activity skew across the whole trail
///
/// Trips when any hour's count exceeds the configured multiple of the
/// 24-hour mean. Quiet periods are skipped: below `anomaly_min_events`
/// total records a single event would always dominate the mean.
pub(crate) async fn anomalous_pattern(
    store: &Arc<dyn AuditStore>,
    config: &DetectorConfig,
) -> Verdict {
    let since = window_start(config.anomaly_window);
    let hours = (config.anomaly_window.as_secs() / 3600).max(1) as usize;

    let Some(buckets) = bounded(
        "anomalous_pattern",
        config.store_timeout,
        store.hourly_counts(since, hours),
    )
    .await
    else {
        return Verdict::Clear { observed: 0 };
    };

    let total: u64 = buckets.iter().sum();
    let peak = buckets.iter().copied().max().unwrap_or(0);
    if total < config.anomaly_min_events {
        return Verdict::Clear { observed: peak };
    }

    let mean = total as f64 / buckets.len() as f64;
    let limit = (mean * config.anomaly_multiplier).ceil() as u64;
    if peak as f64 > mean * config.anomaly_multiplier {
        Verdict::Tripped {
            observed: peak,
            threshold: limit,
        }
    } else {
        Verdict::Clear { observed: peak }
    }
}
