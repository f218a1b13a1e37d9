use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::datetime::sample_timestamp_serde;
use crate::error::{HeatmapError, Result};
use crate::partition::DayBucket;
use crate::reduce::Reducer;

const NANOS_PER_DAY: i128 = 86_400 * 1_000_000_000;

/// One day reduced to a fixed number of slice scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedDay {
    #[serde(with = "sample_timestamp_serde")]
    pub start: DateTime<Utc>,
    pub sample_count: usize,
    pub values: Vec<f64>,
}

impl AggregatedDay {
    pub fn date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }
}

/// Offset of slice boundary `k` out of `slices` from midnight.
///
/// Computed in whole nanoseconds so boundary `slices` is exactly 24h.
fn slice_boundary(k: usize, slices: usize) -> Duration {
    let nanos = NANOS_PER_DAY * k as i128 / slices as i128;
    Duration::nanoseconds(nanos as i64)
}

/// Reduces one day bucket into `slices` scalars.
///
/// Slice `s` covers `[start + s*24h/slices, start + (s+1)*24h/slices)`; a
/// slice with no samples gets the reducer's empty-input value.
pub fn aggregate_day(
    bucket: &DayBucket<'_>,
    slices: usize,
    reducer: &dyn Reducer,
) -> Result<AggregatedDay> {
    if slices == 0 {
        return Err(HeatmapError::InvalidConfiguration(
            "day width must be at least one slice".to_string(),
        ));
    }

    let mut values = Vec::with_capacity(slices);
    let mut scratch: Vec<f64> = Vec::new();
    let mut cursor = 0usize;
    let samples = bucket.samples;

    for s in 0..slices {
        let slice_start = bucket.start + slice_boundary(s, slices);
        let slice_end = bucket.start + slice_boundary(s + 1, slices);

        scratch.clear();
        while cursor < samples.len() && samples[cursor].timestamp < slice_end {
            if samples[cursor].timestamp >= slice_start {
                scratch.push(samples[cursor].value);
            }
            cursor += 1;
        }
        values.push(reducer.reduce(&scratch));
    }

    Ok(AggregatedDay {
        start: bucket.start,
        sample_count: bucket.samples.len(),
        values,
    })
}

#[tracing::instrument(skip_all, fields(days = buckets.len(), slices = slices, reducer = reducer.name()))]
pub fn aggregate_days(
    buckets: &[DayBucket<'_>],
    slices: usize,
    reducer: &dyn Reducer,
) -> Result<Vec<AggregatedDay>> {
    let days = buckets
        .iter()
        .map(|bucket| aggregate_day(bucket, slices, reducer))
        .collect::<Result<Vec<_>>>()?;
    debug!(days = days.len(), "aggregated day slices");
    Ok(days)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::reduce::{Average, FnReducer, Percentile};
    use crate::sample::Sample;

    fn midnight() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .single()
            .expect("valid midnight")
    }

    #[test]
    fn empty_day_yields_zeroes() {
        let bucket = DayBucket {
            start: midnight(),
            samples: &[],
        };
        let day = aggregate_day(&bucket, 7, &Average).expect("aggregate");
        assert_eq!(day.values, vec![0.0; 7]);
        assert_eq!(day.sample_count, 0);
    }

    #[test]
    fn hourly_samples_map_one_to_one() {
        let samples: Vec<Sample> = (0..24)
            .map(|h| Sample::new(midnight() + Duration::hours(h), h as f64 * 10.0))
            .collect();
        let bucket = DayBucket {
            start: midnight(),
            samples: &samples,
        };

        let day = aggregate_day(&bucket, 24, &Percentile::default()).expect("aggregate");
        let expected: Vec<f64> = (0..24).map(|h| h as f64 * 10.0).collect();
        assert_eq!(day.values, expected);
    }

    #[test]
    fn slices_average_their_samples() {
        let samples = vec![
            Sample::new(midnight() + Duration::minutes(10), 1.0),
            Sample::new(midnight() + Duration::minutes(20), 3.0),
            Sample::new(midnight() + Duration::hours(12), 8.0),
            Sample::new(midnight() + Duration::hours(23), 5.0),
        ];
        let bucket = DayBucket {
            start: midnight(),
            samples: &samples,
        };

        let day = aggregate_day(&bucket, 2, &Average).expect("aggregate");
        assert_eq!(day.values, vec![2.0, 6.5]);
    }

    #[test]
    fn uneven_width_keeps_last_sample_of_day() {
        let samples = vec![Sample::new(
            midnight() + Duration::hours(24) - Duration::nanoseconds(1),
            4.0,
        )];
        let bucket = DayBucket {
            start: midnight(),
            samples: &samples,
        };

        let count = FnReducer::new("count", |values: &[f64]| values.len() as f64);
        let day = aggregate_day(&bucket, 7, &count).expect("aggregate");
        assert_eq!(day.values.iter().sum::<f64>(), 1.0);
        assert_eq!(day.values[6], 1.0);
    }

    #[test]
    fn zero_width_is_rejected() {
        let bucket = DayBucket {
            start: midnight(),
            samples: &[],
        };
        assert!(matches!(
            aggregate_day(&bucket, 0, &Average),
            Err(HeatmapError::InvalidConfiguration(_))
        ));
    }
}
