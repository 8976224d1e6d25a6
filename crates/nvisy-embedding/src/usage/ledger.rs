//! Daily usage counters per (user, provider).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use jiff::civil::Date;
use jiff::tz::TimeZone;
use jiff::{Timestamp, ToSpan};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::TRACING_TARGET_USAGE;
use crate::provider::ProviderId;

/// Aggregated usage for one bucket.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Successful generation calls.
    pub requests: u64,
    /// Texts embedded.
    pub texts: u64,
    /// Tokens billed.
    pub tokens: u64,
    /// Cost in USD.
    pub cost: f64,
    /// Calls served by the local fallback after every provider failed.
    pub fallbacks: u64,
}

impl UsageRecord {
    fn merge(&mut self, other: &Self) {
        self.requests += other.requests;
        self.texts += other.texts;
        self.tokens += other.tokens;
        self.cost += other.cost;
        self.fallbacks += other.fallbacks;
    }
}

/// Usage of one user over the retention period.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Usage per provider.
    pub by_provider: BTreeMap<ProviderId, UsageRecord>,
    /// Sum over all providers.
    pub total: UsageRecord,
}

type LedgerKey = (Uuid, ProviderId, Date);

/// Usage counters keyed by (user, provider, UTC date).
#[derive(Debug, Clone)]
pub struct UsageLedger {
    entries: Arc<RwLock<HashMap<LedgerKey, UsageRecord>>>,
    retention_days: i32,
}

impl UsageLedger {
    /// Creates a ledger that keeps `retention_days` days of history.
    pub fn new(retention_days: u16) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            retention_days: i32::from(retention_days),
        }
    }

    /// Current UTC date.
    pub fn today() -> Date {
        Timestamp::now().to_zoned(TimeZone::UTC).date()
    }

    /// Adds one successful call to today's bucket.
    pub async fn record(
        &self,
        user_id: Uuid,
        provider: ProviderId,
        texts: u64,
        tokens: u64,
        cost: f64,
        fallback: bool,
    ) {
        self.record_on(Self::today(), user_id, provider, texts, tokens, cost, fallback)
            .await;
    }

    /// Adds one successful call to the bucket of `date`.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_on(
        &self,
        date: Date,
        user_id: Uuid,
        provider: ProviderId,
        texts: u64,
        tokens: u64,
        cost: f64,
        fallback: bool,
    ) {
        let delta = UsageRecord {
            requests: 1,
            texts,
            tokens,
            cost,
            fallbacks: u64::from(fallback),
        };

        let mut entries = self.entries.write().await;
        entries
            .entry((user_id, provider, date))
            .or_default()
            .merge(&delta);
    }

    /// Returns the bucket for (user, provider, date).
    pub async fn usage_for(&self, user_id: Uuid, provider: ProviderId, date: Date) -> UsageRecord {
        self.entries
            .read()
            .await
            .get(&(user_id, provider, date))
            .copied()
            .unwrap_or_default()
    }

    /// Sums a user's usage over the retention period.
    pub async fn usage_summary(&self, user_id: Uuid) -> UsageSummary {
        let cutoff = self.cutoff(Self::today());
        let entries = self.entries.read().await;

        let mut summary = UsageSummary::default();
        for ((user, provider, date), record) in entries.iter() {
            if *user != user_id || *date < cutoff {
                continue;
            }
            summary.by_provider.entry(*provider).or_default().merge(record);
            summary.total.merge(record);
        }
        summary
    }

    /// Drops buckets older than the retention period, relative to `today`.
    pub async fn purge_expired(&self, today: Date) -> usize {
        let cutoff = self.cutoff(today);
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(_, _, date), _| *date >= cutoff);
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(target: TRACING_TARGET_USAGE, removed, "Purged expired usage");
        }
        removed
    }

    fn cutoff(&self, today: Date) -> Date {
        today
            .checked_sub(self.retention_days.days())
            .unwrap_or(Date::MIN)
    }
}

#[cfg(test)]
mod tests {
    use jiff::civil::date;

    use super::*;

    #[tokio::test]
    async fn test_record_and_query() {
        let ledger = UsageLedger::new(30);
        let user = Uuid::new_v4();
        let day = date(2025, 3, 1);

        ledger.record_on(day, user, ProviderId::OpenAi, 2, 100, 0.002, false).await;
        ledger.record_on(day, user, ProviderId::OpenAi, 1, 50, 0.001, false).await;
        ledger.record_on(day, user, ProviderId::Local, 1, 10, 0.0, true).await;

        let usage = ledger.usage_for(user, ProviderId::OpenAi, day).await;
        assert_eq!(usage.requests, 2);
        assert_eq!(usage.texts, 3);
        assert_eq!(usage.tokens, 150);
        assert!((usage.cost - 0.003).abs() < 1e-12);

        let local = ledger.usage_for(user, ProviderId::Local, day).await;
        assert_eq!(local.fallbacks, 1);
    }

    #[tokio::test]
    async fn test_summary_and_retention() {
        let ledger = UsageLedger::new(30);
        let user = Uuid::new_v4();
        let today = UsageLedger::today();

        ledger.record(user, ProviderId::OpenAi, 1, 10, 0.1, false).await;
        ledger.record(user, ProviderId::Cohere, 1, 20, 0.2, false).await;
        ledger
            .record_on(today - 40.days(), user, ProviderId::OpenAi, 1, 1000, 5.0, false)
            .await;
        ledger.record(Uuid::new_v4(), ProviderId::OpenAi, 1, 99, 9.0, false).await;

        let summary = ledger.usage_summary(user).await;
        assert_eq!(summary.total.tokens, 30);
        assert_eq!(summary.by_provider.len(), 2);

        assert_eq!(ledger.purge_expired(today).await, 1);
    }
}
