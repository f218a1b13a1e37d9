use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{HeatmapError, Result};

/// Collapses the values of one slice into a single scalar.
///
/// Implementations must be deterministic and must return a finite value for
/// the empty slice, which is what a slice without samples reduces to.
pub trait Reducer {
    fn reduce(&self, values: &[f64]) -> f64;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Average;

impl Reducer for Average {
    fn reduce(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }

    fn name(&self) -> &str {
        "average"
    }
}

/// Nearest-rank percentile without interpolation.
#[derive(Debug, Clone, Copy)]
pub struct Percentile {
    percent: f64,
}

impl Percentile {
    pub fn new(percent: f64) -> Result<Self> {
        if !percent.is_finite() || percent <= 0.0 || percent > 100.0 {
            return Err(HeatmapError::InvalidConfiguration(format!(
                "percentile must be in (0, 100], got {percent}"
            )));
        }
        Ok(Self { percent })
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }
}

impl Default for Percentile {
    fn default() -> Self {
        Self { percent: 1.0 }
    }
}

impl Reducer for Percentile {
    fn reduce(&self, values: &[f64]) -> f64 {
        let n = values.len();
        if n == 0 {
            return 0.0;
        }
        let rank = ((self.percent / 100.0) * n as f64).ceil() as usize;
        let idx = rank.clamp(1, n) - 1;

        let mut scratch = values.to_vec();
        let (_, nth, _) = scratch.select_nth_unstable_by(idx, f64::total_cmp);
        *nth
    }

    fn name(&self) -> &str {
        "percentile"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Min;

impl Reducer for Min {
    fn reduce(&self, values: &[f64]) -> f64 {
        values.iter().copied().reduce(f64::min).unwrap_or(0.0)
    }

    fn name(&self) -> &str {
        "min"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl Reducer for Max {
    fn reduce(&self, values: &[f64]) -> f64 {
        values.iter().copied().reduce(f64::max).unwrap_or(0.0)
    }

    fn name(&self) -> &str {
        "max"
    }
}

/// Adapts a plain closure into a [`Reducer`].
pub struct FnReducer<F> {
    name: String,
    func: F,
}

impl<F> FnReducer<F>
where
    F: Fn(&[f64]) -> f64,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Reducer for FnReducer<F>
where
    F: Fn(&[f64]) -> f64,
{
    fn reduce(&self, values: &[f64]) -> f64 {
        (self.func)(values)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnReducer<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnReducer").field("name", &self.name).finish()
    }
}

/// Rejects reducers that are not defined on the empty slice.
pub fn validate_reducer(reducer: &dyn Reducer) -> Result<()> {
    let empty = reducer.reduce(&[]);
    if !empty.is_finite() {
        return Err(HeatmapError::InvalidConfiguration(format!(
            "reducer {} is not defined for an empty slice (got {empty})",
            reducer.name()
        )));
    }
    Ok(())
}

/// Configurable choice among the built-in reducers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReducerKind {
    Average,
    Percentile { percent: f64 },
    Min,
    Max,
}

impl Default for ReducerKind {
    fn default() -> Self {
        ReducerKind::Percentile { percent: 1.0 }
    }
}

impl ReducerKind {
    pub fn build(self) -> Result<Box<dyn Reducer + Send + Sync>> {
        Ok(match self {
            ReducerKind::Average => Box::new(Average),
            ReducerKind::Percentile { percent } => Box::new(Percentile::new(percent)?),
            ReducerKind::Min => Box::new(Min),
            ReducerKind::Max => Box::new(Max),
        })
    }
}

impl FromStr for ReducerKind {
    type Err = HeatmapError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let raw = s.trim().to_ascii_lowercase();
        let (name, arg) = match raw.split_once(':') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (raw.as_str(), None),
        };

        match (name, arg) {
            ("average" | "avg" | "mean", None) => Ok(ReducerKind::Average),
            ("min", None) => Ok(ReducerKind::Min),
            ("max", None) => Ok(ReducerKind::Max),
            ("percentile" | "pct", None) => Ok(ReducerKind::default()),
            ("percentile" | "pct", Some(arg)) => {
                let percent = arg.parse::<f64>().map_err(|_| {
                    HeatmapError::InvalidConfiguration(format!("invalid percentile: {arg}"))
                })?;
                Percentile::new(percent)?;
                Ok(ReducerKind::Percentile { percent })
            }
            _ => Err(HeatmapError::InvalidConfiguration(format!(
                "unknown reducer: {s}"
            ))),
        }
    }
}
