use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;

use chrono::NaiveDate;

use crate::models::{Grain, GrowthBucket, RevenueBucket, TimeWindow, TimestampedRecord};

/// One metric grouped by bucket start. Keys sort chronologically.
pub type Series<V = f64> = BTreeMap<NaiveDate, V>;

/// Group the records inside `window` by `grain`, adding up `value` per group.
pub fn bucketize<V, F>(records: &[TimestampedRecord], window: &TimeWindow, grain: Grain, value: F) -> Series<V>
where
    V: AddAssign + Default,
    F: Fn(&TimestampedRecord) -> V,
{
    let mut series = BTreeMap::new();

    for record in records.iter().filter(|r| window.contains(r.created_at)) {
        *series.entry(grain.truncate(record.created_at)).or_default() += value(record);
    }

    series
}

/// Rows per bucket, as an exact integer.
pub fn count_by_bucket(records: &[TimestampedRecord], window: &TimeWindow, grain: Grain) -> Series<u64> {
    bucketize(records, window, grain, |_| 1)
}

/// Sum of `amount` per bucket; records without one add nothing.
pub fn sum_by_bucket(records: &[TimestampedRecord], window: &TimeWindow, grain: Grain) -> Series<f64> {
    bucketize(records, window, grain, |r| r.amount.unwrap_or(0.0))
}

/// A bucket present in at least one series, with one value per input series.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRow<V> {
    pub bucket: NaiveDate,
    pub values: Vec<V>,
}

/// Join several series on their bucket. A bucket missing from one series
/// gets the zero value for it; every bucket appears exactly once, oldest first.
pub fn merge_series<V: Copy + Default>(series: &[&Series<V>]) -> Vec<MergedRow<V>> {
    let buckets: BTreeSet<NaiveDate> = series.iter().flat_map(|s| s.keys().copied()).collect();

    buckets
        .into_iter()
        .map(|bucket| MergedRow {
            bucket,
            values: series.iter().map(|s| s.get(&bucket).copied().unwrap_or_default()).collect(),
        })
        .collect()
}

pub fn growth_buckets(
    patients: &Series<u64>,
    doctors: &Series<u64>,
    hospitals: &Series<u64>,
    grain: Grain,
) -> Vec<GrowthBucket> {
    merge_series(&[patients, doctors, hospitals])
        .into_iter()
        .map(|row| GrowthBucket {
            label: grain.label(row.bucket),
            patients: row.values[0],
            doctors: row.values[1],
            hospitals: row.values[2],
        })
        .collect()
}

pub fn revenue_buckets(revenue: &Series<f64>, grain: Grain) -> Vec<RevenueBucket> {
    revenue
        .iter()
        .map(|(bucket, total)| RevenueBucket {
            label: grain.label(*bucket),
            revenue: *total,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(y: i32, m: u32, d: u32) -> TimestampedRecord {
        TimestampedRecord::at(Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap())
    }

    fn year_2024() -> TimeWindow {
        TimeWindow {
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_three_months_give_three_rows() {
        let records = vec![
            at(2024, 5, 20),
            at(2024, 3, 2),
            at(2024, 3, 28),
            at(2024, 4, 1),
            at(2024, 5, 1),
            at(2024, 5, 31),
        ];

        let series = count_by_bucket(&records, &year_2024(), Grain::Month);

        let rows: Vec<_> = series.into_iter().collect();
        assert_eq!(rows, vec![
            (date(2024, 3, 1), 2),
            (date(2024, 4, 1), 1),
            (date(2024, 5, 1), 3),
        ]);
    }

    #[test]
    fn test_records_outside_window_are_ignored() {
        let records = vec![at(2023, 12, 31), at(2024, 6, 1), at(2025, 1, 1)];
        let series = count_by_bucket(&records, &year_2024(), Grain::Day);

        assert_eq!(series.len(), 1);
        assert_eq!(series.get(&date(2024, 6, 1)), Some(&1));
    }

    #[test]
    fn test_sum_uses_amount() {
        let records = vec![
            TimestampedRecord::with_amount(Utc.with_ymd_and_hms(2024, 2, 3, 0, 0, 0).unwrap(), 49.5),
            TimestampedRecord::with_amount(Utc.with_ymd_and_hms(2024, 2, 20, 0, 0, 0).unwrap(), 50.5),
            at(2024, 2, 21),
        ];

        let series = sum_by_bucket(&records, &year_2024(), Grain::Month);
        assert_eq!(series.get(&date(2024, 2, 1)), Some(&100.0));
    }

    #[test]
    fn test_merge_defaults_missing_metric_to_zero() {
        let patients: Series<u64> = BTreeMap::from([(date(2024, 3, 1), 4), (date(2024, 4, 1), 1)]);
        let doctors: Series<u64> = BTreeMap::from([(date(2024, 4, 1), 2)]);
        let hospitals: Series<u64> = BTreeMap::new();

        let rows = growth_buckets(&patients, &doctors, &hospitals, Grain::Month);

        assert_eq!(rows, vec![
            GrowthBucket { label: "Mar 2024".into(), patients: 4, doctors: 0, hospitals: 0 },
            GrowthBucket { label: "Apr 2024".into(), patients: 1, doctors: 2, hospitals: 0 },
        ]);
    }

    #[test]
    fn test_merge_orders_chronologically_not_by_label() {
        // "Dec 2023" sorts after "Apr 2024" alphabetically
        let a: Series = BTreeMap::from([(date(2024, 4, 1), 1.0)]);
        let b: Series = BTreeMap::from([(date(2023, 12, 1), 1.0)]);

        let rows = merge_series(&[&a, &b]);
        let buckets: Vec<_> = rows.iter().map(|r| r.bucket).collect();

        assert_eq!(buckets, vec![date(2023, 12, 1), date(2024, 4, 1)]);
        assert_eq!(rows[0].values, vec![0.0, 1.0]);
    }

    #[test]
    fn test_empty_input_gives_no_rows() {
        let empty: Series<u64> = BTreeMap::new();
        assert!(merge_series(&[&empty, &empty]).is_empty());
        assert!(revenue_buckets(&BTreeMap::new(), Grain::Day).is_empty());
    }

    #[test]
    fn test_counts_stay_exact_past_float_precision() {
        // 2^53 + 1 has no f64 representation
        let big = (1u64 << 53) + 1;
        let patients: Series<u64> = BTreeMap::from([(date(2024, 1, 1), big)]);
        let none: Series<u64> = BTreeMap::new();

        let rows = growth_buckets(&patients, &none, &none, Grain::Month);
        assert_eq!(rows[0].patients, big);
    }
}
