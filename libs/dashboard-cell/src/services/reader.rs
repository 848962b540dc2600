use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::models::{
    DashboardError, DashboardSeries, EntityKind, GrowthBucket, RevenueBucket, TimeRange, TimeWindow,
    TimestampedRecord,
};
use crate::services::bucketize::{count_by_bucket, growth_buckets, revenue_buckets, sum_by_bucket};
use crate::services::cache::DashboardCache;
use crate::services::source::RecordSource;

/// Short digest of a bearer token. Used as the cache scope so one caller's
/// row-level-security view is never served to another.
pub fn caller_scope(auth_token: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(auth_token.as_bytes()));
    digest[..16].to_string()
}

/// Read-only chart queries. Results are memoized in the injected cache under
/// `"<endpoint>:<range>"`, suffixed with `:<scope>` when one is set, for `ttl`.
pub struct DashboardReader {
    source: Arc<dyn RecordSource>,
    cache: Arc<dyn DashboardCache>,
    ttl: Duration,
    epoch: NaiveDate,
    scope: Option<String>,
}

impl DashboardReader {
    pub fn new(
        source: Arc<dyn RecordSource>,
        cache: Arc<dyn DashboardCache>,
        ttl: Duration,
        epoch: NaiveDate,
    ) -> Self {
        Self { source, cache, ttl, epoch, scope: None }
    }

    pub fn with_cache_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    fn cache_key(&self, endpoint: &str, range: TimeRange) -> String {
        match &self.scope {
            Some(scope) => format!("{}:{}:{}", endpoint, range, scope),
            None => format!("{}:{}", endpoint, range),
        }
    }

    pub async fn growth(&self, range: TimeRange) -> Result<DashboardSeries<GrowthBucket>, DashboardError> {
        self.growth_at(range, Utc::now()).await
    }

    pub async fn revenue(&self, range: TimeRange) -> Result<DashboardSeries<RevenueBucket>, DashboardError> {
        self.revenue_at(range, Utc::now()).await
    }

    /// Patients, doctors and hospitals registered per bucket.
    pub async fn growth_at(
        &self,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<DashboardSeries<GrowthBucket>, DashboardError> {
        let key = self.cache_key("growth", range);
        if let Some(cached) = self.cached(&key).await {
            return Ok(cached);
        }

        let window = range.resolve(now, self.epoch)?;
        let grain = range.grain();

        let (patients, doctors, hospitals) = tokio::try_join!(
            self.fetch(EntityKind::Patients, window),
            self.fetch(EntityKind::Doctors, window),
            self.fetch(EntityKind::Hospitals, window),
        )?;

        let buckets = growth_buckets(
            &count_by_bucket(&patients, &window, grain),
            &count_by_bucket(&doctors, &window, grain),
            &count_by_bucket(&hospitals, &window, grain),
            grain,
        );

        let series = DashboardSeries { range, grain, start: window.start, end: window.end, buckets };
        self.store(&key, &series).await;
        Ok(series)
    }

    /// Subscription amounts summed per bucket.
    pub async fn revenue_at(
        &self,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<DashboardSeries<RevenueBucket>, DashboardError> {
        let key = self.cache_key("revenue", range);
        if let Some(cached) = self.cached(&key).await {
            return Ok(cached);
        }

        let window = range.resolve(now, self.epoch)?;
        let grain = range.grain();

        let subscriptions = self.fetch(EntityKind::Subscriptions, window).await?;
        let buckets = revenue_buckets(&sum_by_bucket(&subscriptions, &window, grain), grain);

        let series = DashboardSeries { range, grain, start: window.start, end: window.end, buckets };
        self.store(&key, &series).await;
        Ok(series)
    }

    async fn fetch(&self, kind: EntityKind, window: TimeWindow) -> Result<Vec<TimestampedRecord>, DashboardError> {
        self.source
            .fetch_timestamped(kind, window)
            .await
            .map_err(|e| DashboardError::unavailable(&format!("Failed to load {}", kind.table()), e))
    }

    async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.cache.get(key).await?;
        match serde_json::from_value(value) {
            Ok(series) => {
                debug!("Serving {} from cache", key);
                Some(series)
            }
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                self.cache.invalidate(key).await;
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &str, series: &T) {
        match serde_json::to_value(series) {
            Ok(value) => self.cache.put(key, value, self.ttl).await,
            Err(e) => warn!("Not caching {}: {}", key, e),
        }
    }
}
