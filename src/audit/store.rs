//! Abstract audit storage
//!
//! The relational store behind the audit trail is supplied by the embedding
//! application; this crate only defines the query contract plus an
//! in-memory reference implementation used by tests and local development.
//! The [`AuditQuery`] parameter object is the only way to filter, so no
//! string-assembled SQL is expressible through this interface.

use crate::audit::{AuditAction, AuditQuery, AuditRecord, AuditStats, NewAuditRecord};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Append-only audit trail storage
///
/// Writes are inserts only; nothing in this trait can mutate or delete an
/// existing record.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist a new record, returning its id
    async fn insert(&self, entry: NewAuditRecord) -> Result<Uuid>;

    /// Filtered retrieval, newest-first, honoring limit/offset
    async fn search(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>>;

    /// Number of records matching the query
    async fn count(&self, query: &AuditQuery) -> Result<u64>;

    /// Distinct IP addresses seen for one user since the given instant
    async fn distinct_ips(&self, actor_user_id: i64, since: DateTime<Utc>) -> Result<Vec<String>>;

    /// Per-hour activity counts for `hours` buckets starting at `since`
    async fn hourly_counts(&self, since: DateTime<Utc>, hours: usize) -> Result<Vec<u64>>;

    /// Aggregate statistics over the matching records
    async fn stats(&self, query: &AuditQuery) -> Result<AuditStats>;
}

/// In-memory reference store
///
/// Holds the whole trail in an `RwLock<Vec<_>>`; suitable for tests and
/// single-process development, not for production retention.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record with an explicit timestamp. Test and backfill
    /// helper; the trait's `insert` always stamps `Utc::now()`.
    pub async fn insert_backdated(
        &self,
        entry: NewAuditRecord,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let record = entry.into_record(Uuid::new_v4(), created_at);
        let id = record.id;
        self.records.write().await.push(record);
        id
    }

    async fn matching(&self, query: &AuditQuery) -> Vec<AuditRecord> {
        let records = self.records.read().await;
        let mut hits: Vec<AuditRecord> = records
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        hits
    }
}

#[async_trait]
impl AuditStore for MemoryAuditStore {
    async fn insert(&self, entry: NewAuditRecord) -> Result<Uuid> {
        let record = entry.into_record(Uuid::new_v4(), Utc::now());
        let id = record.id;
        self.records.write().await.push(record);
        Ok(id)
    }

    async fn search(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        let hits = self.matching(query).await;
        let paged = hits
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(paged)
    }

    async fn count(&self, query: &AuditQuery) -> Result<u64> {
        Ok(self.matching(query).await.len() as u64)
    }

    async fn distinct_ips(&self, actor_user_id: i64, since: DateTime<Utc>) -> Result<Vec<String>> {
        let records = self.records.read().await;
        let mut seen = HashSet::new();
        for record in records.iter() {
            if record.actor_user_id == Some(actor_user_id) && record.created_at >= since {
                if let Some(ip) = &record.ip_address {
                    seen.insert(ip.clone());
                }
            }
        }
        Ok(seen.into_iter().collect())
    }

    async fn hourly_counts(&self, since: DateTime<Utc>, hours: usize) -> Result<Vec<u64>> {
        let records = self.records.read().await;
        let mut buckets = vec![0u64; hours];
        for record in records.iter() {
            if record.created_at < since {
                continue;
            }
            let offset = (record.created_at - since).num_hours();
            if offset >= 0 && (offset as usize) < hours {
                buckets[offset as usize] += 1;
            }
        }
        Ok(buckets)
    }

    async fn stats(&self, query: &AuditQuery) -> Result<AuditStats> {
        let hits = self.matching(query).await;

        let mut by_action: BTreeMap<AuditAction, u64> = BTreeMap::new();
        let mut by_resource: BTreeMap<String, u64> = BTreeMap::new();
        for record in &hits {
            *by_action.entry(record.action).or_insert(0) += 1;
            *by_resource.entry(record.resource.clone()).or_insert(0) += 1;
        }

        Ok(AuditStats {
            total: hits.len() as u64,
            by_action: by_action.into_iter().collect(),
            by_resource: by_resource.into_iter().collect(),
        })
    }
}

/// Store wrapper used in tests to simulate an unavailable backing database
#[cfg(test)]
pub(crate) struct FailingAuditStore;

#[cfg(test)]
#[async_trait]
impl AuditStore for FailingAuditStore {
    async fn insert(&self, _entry: NewAuditRecord) -> Result<Uuid> {
        Err(Error::Persistence("audit store unavailable".into()))
    }

    async fn search(&self, _query: &AuditQuery) -> Result<Vec<AuditRecord>> {
        Err(Error::Persistence("audit store unavailable".into()))
    }

    async fn count(&self, _query: &AuditQuery) -> Result<u64> {
        Err(Error::Persistence("audit store unavailable".into()))
    }

    async fn distinct_ips(&self, _actor: i64, _since: DateTime<Utc>) -> Result<Vec<String>> {
        Err(Error::Persistence("audit store unavailable".into()))
    }

    async fn hourly_counts(&self, _since: DateTime<Utc>, _hours: usize) -> Result<Vec<u64>> {
        Err(Error::Persistence("audit store unavailable".into()))
    }

    async fn stats(&self, _query: &AuditQuery) -> Result<AuditStats> {
        Err(Error::Persistence("audit store unavailable".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn login_entry(user: i64, ip: &str, success: bool) -> NewAuditRecord {
        NewAuditRecord::new(AuditAction::UserLogin, "auth")
            .actor(user)
            .ip_address(ip)
            .success(success)
    }

    #[tokio::test]
    async fn search_is_newest_first_and_paged() {
        let store = MemoryAuditStore::new();
        let base = Utc::now() - Duration::minutes(10);
        for minute in 0..5 {
            store
                .insert_backdated(
                    login_entry(1, "10.0.0.1", true),
                    base + Duration::minutes(minute),
                )
                .await;
        }

        let all = store.search(&AuditQuery::default()).await.unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let page = store
            .search(&AuditQuery::default().with_limit(2).with_offset(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].created_at, base + Duration::minutes(3));
    }

    #[tokio::test]
    async fn count_honours_filters() {
        let store = MemoryAuditStore::new();
        store.insert(login_entry(1, "10.0.0.1", false)).await.unwrap();
        store.insert(login_entry(1, "10.0.0.1", false)).await.unwrap();
        store.insert(login_entry(1, "10.0.0.1", true)).await.unwrap();
        store.insert(login_entry(2, "10.0.0.2", false)).await.unwrap();

        let failed_for_user = AuditQuery::default()
            .with_actor(1)
            .with_action(AuditAction::UserLogin)
            .with_success(false);
        assert_eq!(store.count(&failed_for_user).await.unwrap(), 2);

        let by_ip = AuditQuery::default()
            .with_ip("10.0.0.2")
            .with_success(false);
        assert_eq!(store.count(&by_ip).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn distinct_ips_deduplicates_and_windows() {
        let store = MemoryAuditStore::new();
        let now = Utc::now();
        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.1"] {
            store.insert(login_entry(7, ip, true)).await.unwrap();
        }
        // Outside the window
        store
            .insert_backdated(login_entry(7, "10.0.0.9", true), now - Duration::hours(2))
            .await;

        let mut ips = store
            .distinct_ips(7, now - Duration::hours(1))
            .await
            .unwrap();
        ips.sort();
        assert_eq!(ips, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[tokio::test]
    async fn hourly_counts_bucket_correctly() {
        let store = MemoryAuditStore::new();
        let since = Utc::now() - Duration::hours(24);
        // 2 records in hour 0, 1 in hour 5
        store
            .insert_backdated(login_entry(1, "a", true), since + Duration::minutes(1))
            .await;
        store
            .insert_backdated(login_entry(1, "a", true), since + Duration::minutes(30))
            .await;
        store
            .insert_backdated(login_entry(1, "a", true), since + Duration::hours(5))
            .await;

        let buckets = store.hourly_counts(since, 24).await.unwrap();
        assert_eq!(buckets.len(), 24);
        assert_eq!(buckets[0], 2);
        assert_eq!(buckets[5], 1);
        assert_eq!(buckets.iter().sum::<u64>(), 3);
    }

    #[tokio::test]
    async fn stats_aggregate_by_action_and_resource() {
        let store = MemoryAuditStore::new();
        store.insert(login_entry(1, "a", true)).await.unwrap();
        store.insert(login_entry(1, "a", false)).await.unwrap();
        store
            .insert(NewAuditRecord::new(AuditAction::DataExport, "orders").actor(1))
            .await
            .unwrap();

        let stats = store.stats(&AuditQuery::default()).await.unwrap();
        assert_eq!(stats.total, 3);
        assert!(stats
            .by_action
            .iter()
            .any(|(action, count)| *action == AuditAction::UserLogin && *count == 2));
        assert!(stats
            .by_resource
            .iter()
            .any(|(resource, count)| resource == "orders" && *count == 1));
    }
}
