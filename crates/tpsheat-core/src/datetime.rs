use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  TimeZone,
  Utc,
  Weekday
};
use serde::{
  Deserialize,
  Serialize
};

const COMPACT_FORMAT: &str =
  "%Y%m%dT%H%M%SZ";

/// Average number of weeks per year used
/// by the approximate week index.
const WEEKS_PER_YEAR: f64 = 52.1429;

#[must_use]
pub fn one_day() -> Duration {
  Duration::days(1)
}

/// Midnight UTC of the day containing
/// `dt`.
#[must_use]
pub fn truncate_to_day(
  dt: DateTime<Utc>
) -> DateTime<Utc> {
  dt.date_naive()
    .and_hms_opt(0, 0, 0)
    .map(|ndt| {
      Utc.from_utc_datetime(&ndt)
    })
    .unwrap_or(dt)
}

#[must_use]
pub fn days_between(
  from: DateTime<Utc>,
  to: DateTime<Utc>
) -> i64 {
  (truncate_to_day(to)
    - truncate_to_day(from))
  .num_days()
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize
)]
#[serde(rename_all = "lowercase")]
pub enum WeekStart {
  #[default]
  Monday,
  Sunday
}

impl WeekStart {
  #[must_use]
  pub fn weekday(self) -> Weekday {
    match self {
      | WeekStart::Monday => {
        Weekday::Mon
      }
      | WeekStart::Sunday => {
        Weekday::Sun
      }
    }
  }

  /// Grid column of `day`, with the
  /// week start at column 0.
  #[must_use]
  pub fn column_of(
    self,
    day: Weekday
  ) -> u8 {
    let day_idx =
      day.num_days_from_monday();
    let start_idx = self
      .weekday()
      .num_days_from_monday();
    ((7 + day_idx - start_idx) % 7)
      as u8
  }

  #[must_use]
  pub fn start_of_week(
    self,
    day: NaiveDate
  ) -> NaiveDate {
    let diff =
      i64::from(self.column_of(
        day.weekday()
      ));
    day
      .checked_sub_signed(
        Duration::days(diff)
      )
      .unwrap_or(day)
  }
}

impl std::str::FromStr for WeekStart {
  type Err = String;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "monday" | "mon" => {
        Ok(WeekStart::Monday)
      }
      | "sunday" | "sun" => {
        Ok(WeekStart::Sunday)
      }
      | other => {
        Err(format!(
          "unknown week start: {other}"
        ))
      }
    }
  }
}

/// Week counter that keeps ISO week
/// numbers roughly monotonic across
/// year boundaries. It is a heuristic:
/// two adjacent ISO weeks around New
/// Year can map to equal or skipped
/// indices.
///
/// The day is shifted forward so the
/// ISO week turns over on
/// `week_start` rather than Monday.
#[must_use]
pub fn approximate_week_index(
  day: NaiveDate,
  week_start: WeekStart
) -> i64 {
  let shift = (7
    - week_start
      .weekday()
      .num_days_from_monday())
    % 7;
  let shifted = day
    .checked_add_signed(Duration::days(
      i64::from(shift)
    ))
    .unwrap_or(day);
  let iso = shifted.iso_week();
  i64::from(iso.week())
    + (f64::from(iso.year())
      * WEEKS_PER_YEAR)
      .round() as i64
}

/// Exact number of whole weeks between
/// the week containing `origin` and the
/// week containing `day`.
#[must_use]
pub fn sequential_week_index(
  origin: NaiveDate,
  day: NaiveDate,
  week_start: WeekStart
) -> i64 {
  let origin_start =
    week_start.start_of_week(origin);
  let day_start =
    week_start.start_of_week(day);
  (day_start - origin_start).num_days()
    / 7
}

#[must_use]
pub fn month_name(
  month: u32
) -> &'static str {
  u8::try_from(month)
    .ok()
    .and_then(|m| {
      chrono::Month::try_from(m).ok()
    })
    .map(|m| m.name())
    .unwrap_or("")
}

/// Parses RFC 3339, the compact
/// `%Y%m%dT%H%M%SZ` form, or integer
/// unix seconds.
pub fn parse_timestamp(
  raw: &str
) -> Option<DateTime<Utc>> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(
      trimmed
    )
  {
    return Some(
      dt.with_timezone(&Utc)
    );
  }

  if let Ok(ndt) =
    NaiveDateTime::parse_from_str(
      trimmed,
      COMPACT_FORMAT
    )
  {
    return Some(
      Utc.from_utc_datetime(&ndt)
    );
  }

  trimmed
    .parse::<i64>()
    .ok()
    .and_then(|secs| {
      DateTime::<Utc>::from_timestamp(
        secs, 0
      )
    })
}

pub mod sample_timestamp_serde {
  use chrono::{
    DateTime,
    SecondsFormat,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  #[derive(Deserialize)]
  #[serde(untagged)]
  enum RawTimestamp {
    Seconds(i64),
    Text(String)
  }

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.to_rfc3339_opts(
        SecondsFormat::AutoSi,
        true
      )
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    match RawTimestamp::deserialize(
      deserializer
    )? {
      | RawTimestamp::Seconds(secs) => {
        DateTime::<Utc>::from_timestamp(
          secs, 0
        )
        .ok_or_else(|| {
          serde::de::Error::custom(
            format!(
              "unix timestamp out of range: {secs}"
            )
          )
        })
      }
      | RawTimestamp::Text(raw) => {
        super::parse_timestamp(&raw)
          .ok_or_else(|| {
            serde::de::Error::custom(
              format!(
                "unrecognized timestamp: {raw}"
              )
            )
          })
      }
    }
  }
}
