use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use dashboard_cell::models::{EntityKind, Grain, TimeRange, TimestampedRecord};
use dashboard_cell::services::{DashboardReader, InMemoryRecordSource, NoopCache, TtlCache};

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 20, 8, 0, 0).unwrap()
}

fn at(m: u32, d: u32) -> TimestampedRecord {
    TimestampedRecord::at(Utc.with_ymd_and_hms(2024, m, d, 14, 0, 0).unwrap())
}

async fn seeded_source() -> Arc<InMemoryRecordSource> {
    let source = Arc::new(InMemoryRecordSource::new());

    for record in [at(5, 2), at(5, 30), at(7, 4), at(9, 1), at(9, 2), at(9, 3)] {
        source.insert(EntityKind::Patients, record).await;
    }
    // No doctors joined in July; hospitals only in September.
    for record in [at(5, 10), at(9, 10)] {
        source.insert(EntityKind::Doctors, record).await;
    }
    source.insert(EntityKind::Hospitals, at(9, 15)).await;

    for (m, d, amount) in [(6, 1, 100.0), (6, 15, 50.0), (8, 1, 75.5)] {
        let created_at = Utc.with_ymd_and_hms(2024, m, d, 0, 0, 0).unwrap();
        source.insert(EntityKind::Subscriptions, TimestampedRecord::with_amount(created_at, amount)).await;
    }

    source
}

#[tokio::test]
async fn test_growth_over_six_months() {
    let reader = DashboardReader::new(seeded_source().await, Arc::new(NoopCache), Duration::from_secs(300), epoch());

    let series = reader.growth_at(TimeRange::Last6Months, now()).await.unwrap();

    assert_eq!(series.grain, Grain::Month);
    let rows: Vec<_> = series.buckets.iter()
        .map(|b| (b.label.as_str(), b.patients, b.doctors, b.hospitals))
        .collect();
    assert_eq!(rows, vec![
        ("May 2024", 2, 1, 0),
        ("Jul 2024", 1, 0, 0),
        ("Sep 2024", 3, 1, 1),
    ]);
}

#[tokio::test]
async fn test_growth_over_last_week_uses_days() {
    let reader = DashboardReader::new(seeded_source().await, Arc::new(NoopCache), Duration::from_secs(300), epoch());

    let series = reader.growth_at(TimeRange::Last7Days, now()).await.unwrap();

    assert_eq!(series.grain, Grain::Day);
    let labels: Vec<_> = series.buckets.iter().map(|b| b.label.as_str()).collect();
    assert_eq!(labels, vec!["15/09"]);
    assert_eq!(series.buckets[0].hospitals, 1);
    assert_eq!(series.buckets[0].patients, 0);
}

#[tokio::test]
async fn test_revenue_sums_per_month() {
    let reader = DashboardReader::new(seeded_source().await, Arc::new(NoopCache), Duration::from_secs(300), epoch());

    let series = reader.revenue_at(TimeRange::LastYear, now()).await.unwrap();

    let rows: Vec<_> = series.buckets.iter().map(|b| (b.label.as_str(), b.revenue)).collect();
    assert_eq!(rows, vec![("Jun 2024", 150.0), ("Aug 2024", 75.5)]);
}

#[tokio::test]
async fn test_all_range_starts_at_epoch() {
    let late_epoch = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
    let reader = DashboardReader::new(seeded_source().await, Arc::new(NoopCache), Duration::from_secs(300), late_epoch);

    let series = reader.growth_at(TimeRange::All, now()).await.unwrap();

    assert_eq!(series.start, Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
    assert_eq!(series.buckets.first().map(|b| b.label.as_str()), Some("Jul 2024"));
}

#[tokio::test(start_paused = true)]
async fn test_cached_series_refreshes_after_ttl() {
    let source = seeded_source().await;
    let cache = Arc::new(TtlCache::new());
    let reader = DashboardReader::new(source.clone(), cache.clone(), Duration::from_secs(300), epoch());

    let before = reader.revenue_at(TimeRange::LastYear, now()).await.unwrap();

    let created_at = Utc.with_ymd_and_hms(2024, 8, 20, 0, 0, 0).unwrap();
    source.insert(EntityKind::Subscriptions, TimestampedRecord::with_amount(created_at, 24.5)).await;

    tokio::time::advance(Duration::from_secs(120)).await;
    let cached = reader.revenue_at(TimeRange::LastYear, now()).await.unwrap();
    assert_eq!(cached, before);

    tokio::time::advance(Duration::from_secs(181)).await;
    let refreshed = reader.revenue_at(TimeRange::LastYear, now()).await.unwrap();
    assert_eq!(refreshed.buckets[1].revenue, 100.0);

    let stats = cache.stats().await;
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 2);
}

#[tokio::test]
async fn test_growth_and_revenue_do_not_share_cache_entries() {
    let cache = Arc::new(TtlCache::new());
    let reader = DashboardReader::new(seeded_source().await, cache.clone(), Duration::from_secs(300), epoch());

    reader.growth_at(TimeRange::LastYear, now()).await.unwrap();
    reader.revenue_at(TimeRange::LastYear, now()).await.unwrap();
    reader.growth_at(TimeRange::Last30Days, now()).await.unwrap();

    let stats = cache.stats().await;
    assert_eq!(stats.entries, 3);
    assert_eq!(stats.hits, 0);
}
