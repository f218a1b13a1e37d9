use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use tpsheat_core::aggregate::aggregate_day;
use tpsheat_core::datetime::{WeekStart, days_between};
use tpsheat_core::layout::{LayoutOptions, WeekIndexing, assign_cells};
use tpsheat_core::partition::partition_days;
use tpsheat_core::reduce::{Average, Percentile};
use tpsheat_core::Sample;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 12, 20, 0, 0, 0)
        .single()
        .expect("valid base")
}

/// Sorted samples built from second offsets within ~90 days.
fn samples_strategy() -> impl Strategy<Value = Vec<Sample>> {
    prop::collection::vec((0i64..90 * 86_400, -1000.0f64..1000.0), 1..300).prop_map(|mut raw| {
        raw.sort_by_key(|(offset, _)| *offset);
        raw.into_iter()
            .map(|(offset, value)| Sample::new(base() + Duration::seconds(offset), value))
            .collect()
    })
}

proptest! {
    #[test]
    fn buckets_cover_every_day_once(samples in samples_strategy()) {
        let buckets = partition_days(&samples).expect("partition");
        let first = samples[0].timestamp;
        let last = samples[samples.len() - 1].timestamp;

        prop_assert_eq!(buckets.len() as i64, days_between(first, last) + 1);
        for pair in buckets.windows(2) {
            prop_assert_eq!(pair[1].start - pair[0].start, Duration::days(1));
        }
        let total: usize = buckets.iter().map(|b| b.samples.len()).sum();
        prop_assert_eq!(total, samples.len());
        for bucket in &buckets {
            for sample in bucket.samples {
                prop_assert!(sample.timestamp >= bucket.start);
                prop_assert!(sample.timestamp < bucket.end());
            }
        }
    }

    #[test]
    fn every_day_has_exactly_n_slices(samples in samples_strategy(), slices in 1usize..200) {
        let buckets = partition_days(&samples).expect("partition");
        for bucket in &buckets {
            let avg = aggregate_day(bucket, slices, &Average).expect("aggregate");
            prop_assert_eq!(avg.values.len(), slices);
            let pct = aggregate_day(bucket, slices, &Percentile::default()).expect("aggregate");
            prop_assert_eq!(pct.values.len(), slices);
            if bucket.is_empty() {
                prop_assert!(avg.values.iter().all(|v| *v == 0.0));
            }
        }
    }

    #[test]
    fn rows_and_columns_stay_consistent(
        start_offset in 0i64..3000,
        len in 1i64..400,
        sunday in any::<bool>(),
        break_months in any::<bool>(),
        suppress in any::<bool>(),
        week_indexing in prop_oneof![Just(WeekIndexing::Sequential), Just(WeekIndexing::Approximate)],
    ) {
        let first = base().date_naive() + Duration::days(start_offset);
        let dates: Vec<_> = (0..len).map(|i| first + Duration::days(i)).collect();
        let week_start = if sunday { WeekStart::Sunday } else { WeekStart::Monday };
        let options = LayoutOptions {
            week_start,
            break_on_month_change: break_months,
            suppress_break_on_week_start: suppress,
            week_indexing,
            ..LayoutOptions::default()
        };

        let placement = assign_cells(&dates, &options);
        prop_assert_eq!(placement.cells.len(), dates.len());
        for pair in placement.cells.windows(2) {
            prop_assert!(pair[1].row >= pair[0].row);
            prop_assert_eq!(pair[1].column, (pair[0].column + 1) % 7);
            if pair[1].column == 0 {
                prop_assert!(pair[1].row > pair[0].row);
            }
        }
        prop_assert_eq!(placement.cells[0].column, week_start.column_of(chrono::Datelike::weekday(&first)));
        prop_assert_eq!(placement.row_count, placement.cells[placement.cells.len() - 1].row + 1);

        let unbroken = assign_cells(&dates, &LayoutOptions {
            break_on_month_change: false,
            ..options.clone()
        });
        prop_assert!(placement.row_count >= unbroken.row_count);
    }
}
