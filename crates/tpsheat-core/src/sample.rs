use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::sample_timestamp_serde;
use crate::error::{HeatmapError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    #[serde(with = "sample_timestamp_serde")]
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Zips parallel timestamp and value columns into samples.
#[tracing::instrument(skip_all, fields(timestamps = timestamps.len(), values = values.len()))]
pub fn samples_from_columns(timestamps: &[DateTime<Utc>], values: &[f64]) -> Result<Vec<Sample>> {
    if timestamps.len() != values.len() {
        return Err(HeatmapError::LengthMismatch {
            expected: timestamps.len(),
            actual: values.len(),
        });
    }
    if timestamps.is_empty() {
        return Err(HeatmapError::EmptyInput);
    }

    Ok(timestamps
        .iter()
        .zip(values)
        .map(|(&timestamp, &value)| Sample { timestamp, value })
        .collect())
}

/// Returns the index of the first sample that goes back in time.
pub fn first_out_of_order(samples: &[Sample]) -> Option<usize> {
    samples
        .windows(2)
        .position(|pair| pair[1].timestamp < pair[0].timestamp)
        .map(|idx| idx + 1)
}
