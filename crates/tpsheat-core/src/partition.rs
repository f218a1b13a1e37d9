use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use crate::datetime::{one_day, truncate_to_day};
use crate::error::{HeatmapError, Result};
use crate::sample::{Sample, first_out_of_order};

/// All samples of one UTC calendar day, borrowed from the caller's input.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket<'a> {
    pub start: DateTime<Utc>,
    pub samples: &'a [Sample],
}

impl DayBucket<'_> {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + one_day()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Splits ordered samples into one bucket per calendar day from the first
/// sample's day through the last sample's day, empty days included.
///
/// Windows are half-open, `[midnight, next midnight)`, so a sample stamped
/// exactly at midnight opens the new day.
#[tracing::instrument(skip_all, fields(samples = samples.len()))]
pub fn partition_days(samples: &[Sample]) -> Result<Vec<DayBucket<'_>>> {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return Err(HeatmapError::EmptyInput);
    };
    if let Some(index) = first_out_of_order(samples) {
        return Err(HeatmapError::OutOfOrder { index });
    }

    let last_day = truncate_to_day(last.timestamp);
    let mut day_start = truncate_to_day(first.timestamp);
    let mut cursor = 0usize;
    let mut buckets = Vec::new();

    while day_start <= last_day {
        let day_end = day_start + one_day();
        let begin = cursor;
        while cursor < samples.len() && samples[cursor].timestamp < day_end {
            cursor += 1;
        }

        trace!(day = %day_start.date_naive(), count = cursor - begin, "bucketed day");
        buckets.push(DayBucket {
            start: day_start,
            samples: &samples[begin..cursor],
        });
        day_start = day_end;
    }

    debug!(days = buckets.len(), "partitioned samples into days");
    Ok(buckets)
}
