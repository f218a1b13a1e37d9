use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::aggregate::AggregatedDay;
use crate::datetime::{WeekStart, approximate_week_index, month_name, sequential_week_index};
use crate::error::{HeatmapError, Result};

/// Horizontal inset of the day-number label inside its cell.
const DAY_LABEL_INSET: f64 = 4.0;

/// One slice per second is the finest a day can be split.
pub const MAX_DAY_WIDTH: u32 = 86_400;

/// Text extents supplied by whoever measures the font.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelMetrics {
    /// Widest month name.
    pub month_width: f64,
    /// Tallest month name.
    pub month_height: f64,
    pub numeral_height: f64,
}

impl Default for LabelMetrics {
    fn default() -> Self {
        Self {
            month_width: 80.0,
            month_height: 12.0,
            numeral_height: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekIndexing {
    /// Whole weeks counted from the first day, honoring the week start.
    #[default]
    Sequential,
    /// ISO week plus a year-scaled offset; can merge or skip weeks around New Year.
    Approximate,
}

impl std::str::FromStr for WeekIndexing {
    type Err = HeatmapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" | "exact" => Ok(WeekIndexing::Sequential),
            "approximate" | "iso" => Ok(WeekIndexing::Approximate),
            other => Err(HeatmapError::InvalidConfiguration(format!(
                "unknown week indexing: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutOptions {
    /// Cell width in pixels, one pixel column per slice.
    pub day_width: u32,
    pub day_height: u32,
    pub padding: u32,
    pub spacing: u32,
    pub legend_height: u32,
    pub labels: LabelMetrics,
    pub week_start: WeekStart,
    pub week_indexing: WeekIndexing,
    pub break_on_month_change: bool,
    /// Skip the month break when the month's first day opens a week anyway.
    pub suppress_break_on_week_start: bool,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            day_width: 288,
            day_height: 60,
            padding: 10,
            spacing: 4,
            legend_height: 20,
            labels: LabelMetrics::default(),
            week_start: WeekStart::Monday,
            week_indexing: WeekIndexing::Sequential,
            break_on_month_change: true,
            suppress_break_on_week_start: true,
        }
    }
}

impl LayoutOptions {
    pub fn validate(&self) -> Result<()> {
        if self.day_width == 0 {
            return Err(HeatmapError::InvalidConfiguration(
                "day width must be at least one slice".to_string(),
            ));
        }
        if self.day_width > MAX_DAY_WIDTH {
            return Err(HeatmapError::InvalidConfiguration(format!(
                "day width {} exceeds {MAX_DAY_WIDTH} slices",
                self.day_width
            )));
        }
        if self.day_height == 0 {
            return Err(HeatmapError::InvalidConfiguration(
                "day height must be positive".to_string(),
            ));
        }
        let metrics = [
            self.labels.month_width,
            self.labels.month_height,
            self.labels.numeral_height,
        ];
        if metrics.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(HeatmapError::InvalidConfiguration(
                "label metrics must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

fn too_large(what: &str) -> HeatmapError {
    HeatmapError::InvalidConfiguration(format!("{what} does not fit in u32 pixels"))
}

/// Sums `terms` of (factor, value) pairs, failing instead of wrapping.
fn pixel_sum(what: &str, terms: &[(u32, u32)]) -> Result<u32> {
    terms.iter().try_fold(0u32, |acc, &(factor, value)| {
        factor
            .checked_mul(value)
            .and_then(|term| acc.checked_add(term))
            .ok_or_else(|| too_large(what))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One vertical pixel line of a day cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliceLine {
    pub x: f64,
    pub top: f64,
    pub bottom: f64,
}

/// Position of one aggregated day; `day` indexes the day sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub day: usize,
    pub date: NaiveDate,
    pub row: u32,
    pub column: u8,
    pub week_index: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthLabel {
    pub year: i32,
    pub month: u32,
    pub name: String,
    pub row: u32,
    pub anchor: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutGeometry {
    pub image_width: u32,
    pub image_height: u32,
    pub cell_width: u32,
    pub cell_height: u32,
    pub padding: u32,
    pub spacing: u32,
    pub grid_origin: Point,
    /// Strip where the color gradient sample is painted.
    pub legend: Rect,
    pub caption_anchor: Point,
}

impl LayoutGeometry {
    /// Fails with `InvalidConfiguration` when the image would not fit in `u32`.
    pub fn compute(row_count: u32, options: &LayoutOptions) -> Result<Self> {
        let month_width = options.labels.month_width.ceil() as u32;
        let month_height = options.labels.month_height.ceil() as u32;
        let p = options.padding;
        let s = options.spacing;

        let row_pitch = pixel_sum("row pitch", &[(1, options.day_height), (1, s)])?;
        let image_width = pixel_sum(
            "image width",
            &[(2, p), (1, month_width), (8, s), (1, 1), (7, options.day_width)],
        )?;
        let image_height = pixel_sum(
            "image height",
            &[
                (4, p),
                (row_count, row_pitch),
                (1, options.legend_height),
                (2, month_height),
            ],
        )?;

        // Every subtracted term is part of the sum above.
        let legend_bottom = image_height - 2 * p - 2 * month_height;
        let legend = Rect {
            x: f64::from(p),
            y: f64::from(legend_bottom - options.legend_height),
            width: f64::from(image_width - 2 * p),
            height: f64::from(options.legend_height),
        };

        Ok(Self {
            image_width,
            image_height,
            cell_width: options.day_width,
            cell_height: options.day_height,
            padding: p,
            spacing: s,
            grid_origin: Point {
                x: f64::from(p) + options.labels.month_width,
                y: f64::from(p),
            },
            legend,
            caption_anchor: Point {
                x: f64::from(p),
                y: f64::from(image_height - p),
            },
        })
    }

    fn pitch(&self, extent: u32) -> f64 {
        f64::from(extent) + f64::from(self.spacing)
    }

    pub fn row_top(&self, row: u32) -> f64 {
        self.grid_origin.y + f64::from(row) * self.pitch(self.cell_height)
    }

    pub fn cell_rect(&self, row: u32, column: u8) -> Rect {
        Rect {
            x: self.grid_origin.x + f64::from(column) * self.pitch(self.cell_width),
            y: self.row_top(row),
            width: f64::from(self.cell_width),
            height: f64::from(self.cell_height),
        }
    }

    /// Pixel line for `slice` of the cell at (`row`, `column`).
    pub fn slice_line(&self, row: u32, column: u8, slice: u32) -> Option<SliceLine> {
        if slice >= self.cell_width {
            return None;
        }
        let rect = self.cell_rect(row, column);
        Some(SliceLine {
            x: rect.x + f64::from(slice),
            top: rect.y,
            bottom: rect.y + rect.height,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarLayout {
    pub cells: Vec<GridCell>,
    pub month_labels: Vec<MonthLabel>,
    pub row_count: u32,
    pub geometry: LayoutGeometry,
    numeral_height: f64,
}

impl CalendarLayout {
    #[tracing::instrument(skip_all, fields(days = days.len()))]
    pub fn build(days: &[AggregatedDay], options: &LayoutOptions) -> Result<Self> {
        options.validate()?;
        if days.is_empty() {
            return Err(HeatmapError::EmptyInput);
        }
        let expected = options.day_width as usize;
        if let Some(day) = days.iter().find(|day| day.width() != expected) {
            return Err(HeatmapError::LengthMismatch {
                expected,
                actual: day.width(),
            });
        }

        let dates: Vec<NaiveDate> = days.iter().map(AggregatedDay::date).collect();
        let placement = assign_cells(&dates, options);
        let geometry = LayoutGeometry::compute(placement.row_count, options)?;

        let month_labels = placement
            .month_starts
            .into_iter()
            .map(|(row, date)| MonthLabel {
                year: date.year(),
                month: date.month(),
                name: month_name(date.month()).to_string(),
                row,
                anchor: Point {
                    x: f64::from(options.padding),
                    y: geometry.row_top(row) + options.labels.month_height,
                },
            })
            .collect();

        debug!(
            rows = placement.row_count,
            width = geometry.image_width,
            height = geometry.image_height,
            "laid out calendar"
        );

        Ok(Self {
            cells: placement.cells,
            month_labels,
            row_count: placement.row_count,
            geometry,
            numeral_height: options.labels.numeral_height,
        })
    }

    pub fn cell_rect(&self, cell: &GridCell) -> Rect {
        self.geometry.cell_rect(cell.row, cell.column)
    }

    pub fn slice_line(&self, cell: &GridCell, slice: u32) -> Option<SliceLine> {
        self.geometry.slice_line(cell.row, cell.column, slice)
    }

    /// Baseline anchor for the day-of-month number.
    pub fn day_label_anchor(&self, cell: &GridCell) -> Point {
        let rect = self.cell_rect(cell);
        Point {
            x: rect.x + DAY_LABEL_INSET,
            y: rect.y + self.numeral_height + 1.0,
        }
    }

    /// Anchors for the diagnostic overlay: the cell's week index, then its
    /// month number, stacked under the day number.
    pub fn debug_label_anchors(&self, cell: &GridCell) -> (Point, Point) {
        let rect = self.cell_rect(cell);
        let x = rect.x + DAY_LABEL_INSET;
        (
            Point {
                x,
                y: rect.y + self.numeral_height * 2.0 + 4.0,
            },
            Point {
                x,
                y: rect.y + self.numeral_height * 3.0 + 8.0,
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub cells: Vec<GridCell>,
    /// Row and first date of every month that gets a label.
    pub month_starts: Vec<(u32, NaiveDate)>,
    pub row_count: u32,
}

/// Assigns every date a row and weekday column in a single pass.
///
/// `dates` must be consecutive and non-empty; the row count is one past the
/// last assigned row. A column that does not move right of its predecessor
/// always opens a row, even when the week index failed to change.
pub fn assign_cells(dates: &[NaiveDate], options: &LayoutOptions) -> Placement {
    let Some(&origin) = dates.first() else {
        return Placement {
            cells: vec![],
            month_starts: vec![],
            row_count: 0,
        };
    };

    let week_of = |date: NaiveDate| match options.week_indexing {
        WeekIndexing::Sequential => sequential_week_index(origin, date, options.week_start),
        WeekIndexing::Approximate => approximate_week_index(date, options.week_start),
    };

    let mut cells = Vec::with_capacity(dates.len());
    let mut month_starts = vec![(0, origin)];
    let mut row = 0u32;
    let mut current_week = week_of(origin);
    let mut current_month = (origin.year(), origin.month());
    let mut previous_column: Option<u8> = None;

    for (idx, &date) in dates.iter().enumerate() {
        let week_index = week_of(date);
        let column = options.week_start.column_of(date.weekday());
        let wrapped = previous_column.is_some_and(|prev| column <= prev);
        previous_column = Some(column);

        if week_index != current_week || wrapped {
            current_week = week_index;
            row += 1;
        }

        let month = (date.year(), date.month());
        if month != current_month {
            current_month = month;
            let lands_on_week_start = column == 0;
            if options.break_on_month_change
                && !(options.suppress_break_on_week_start && lands_on_week_start)
            {
                row += 1;
            }
            trace!(%date, row, "month boundary");
            month_starts.push((row, date));
        }

        cells.push(GridCell {
            day: idx,
            date,
            row,
            column,
            week_index,
        });
    }

    Placement {
        cells,
        month_starts,
        row_count: row + 1,
    }
}
