use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{AggregatedDay, aggregate_days};
use crate::error::Result;
use crate::layout::{CalendarLayout, GridCell, LayoutOptions};
use crate::partition::partition_days;
use crate::reduce::{Reducer, ReducerKind, validate_reducer};
use crate::sample::{Sample, samples_from_columns};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HeatmapOptions {
    pub layout: LayoutOptions,
    pub reducer: ReducerKind,
    /// Free text the renderer prints along the bottom edge.
    pub caption: String,
}

/// Aggregated days plus the layout that positions them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Heatmap {
    pub reducer: String,
    pub caption: String,
    pub days: Vec<AggregatedDay>,
    pub layout: CalendarLayout,
}

impl Heatmap {
    /// Runs the whole pipeline with one of the built-in reducers.
    pub fn build(samples: &[Sample], options: &HeatmapOptions) -> Result<Self> {
        let reducer = options.reducer.build()?;
        Self::build_with(samples, &options.layout, reducer.as_ref(), &options.caption)
    }

    /// Runs the whole pipeline from parallel timestamp and value columns.
    pub fn from_columns(
        timestamps: &[DateTime<Utc>],
        values: &[f64],
        options: &HeatmapOptions,
    ) -> Result<Self> {
        let samples = samples_from_columns(timestamps, values)?;
        Self::build(&samples, options)
    }

    #[tracing::instrument(skip_all, fields(samples = samples.len(), reducer = reducer.name()))]
    pub fn build_with(
        samples: &[Sample],
        layout: &LayoutOptions,
        reducer: &dyn Reducer,
        caption: &str,
    ) -> Result<Self> {
        layout.validate()?;
        validate_reducer(reducer)?;

        // Rejects empty and unordered input before any bucket is built.
        let buckets = partition_days(samples)?;
        let days = aggregate_days(&buckets, layout.day_width as usize, reducer)?;
        let layout = CalendarLayout::build(&days, layout)?;

        info!(
            days = days.len(),
            rows = layout.row_count,
            width = layout.geometry.image_width,
            height = layout.geometry.image_height,
            "built heatmap"
        );

        Ok(Self {
            reducer: reducer.name().to_string(),
            caption: caption.to_string(),
            days,
            layout,
        })
    }

    /// Pairs every grid cell with the day it positions.
    pub fn placed_days(&self) -> impl Iterator<Item = (&GridCell, &AggregatedDay)> {
        self.layout
            .cells
            .iter()
            .filter_map(|cell| self.days.get(cell.day).map(|day| (cell, day)))
    }
}
