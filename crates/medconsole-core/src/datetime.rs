use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use serde::{
  Deserialize,
  Serialize
};

pub const TIMEZONE_ENV_VAR: &str =
  "MEDCONSOLE_TIMEZONE";
const DEFAULT_CONSOLE_TIMEZONE: &str =
  "UTC";
const ISO_DATE_FORMAT: &str =
  "%Y-%m-%d";

/// Symbolic period selector used by the
/// appointment and queue filters.
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
  Today,
  Week,
  Month,
  #[default]
  All
}

impl DateRange {
  pub const ALL: [DateRange; 4] = [
    DateRange::Today,
    DateRange::Week,
    DateRange::Month,
    DateRange::All
  ];

  pub fn as_key(self) -> &'static str {
    match self {
      | DateRange::Today => "today",
      | DateRange::Week => "week",
      | DateRange::Month => "month",
      | DateRange::All => "all"
    }
  }

  pub fn from_key(
    raw: &str
  ) -> Option<Self> {
    let key =
      raw.trim().to_ascii_lowercase();
    Self::ALL
      .into_iter()
      .find(|range| range.as_key() == key)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct DateBounds {
  pub start: NaiveDate,
  pub end:   NaiveDate
}

impl DateBounds {
  pub fn contains(
    &self,
    date: NaiveDate
  ) -> bool {
    date >= self.start
      && date <= self.end
  }

  pub fn query_params(
    &self
  ) -> [(&'static str, String); 2] {
    [
      (
        "startDate",
        format_iso_date(self.start)
      ),
      (
        "endDate",
        format_iso_date(self.end)
      )
    ]
  }
}

/// Resolves a symbolic period against
/// `today`. `All` yields no bounds and the
/// caller must omit range parameters.
#[must_use]
pub fn resolve(
  range: DateRange,
  today: NaiveDate
) -> Option<DateBounds> {
  match range {
    | DateRange::Today => {
      Some(DateBounds {
        start: today,
        end:   today
      })
    }
    | DateRange::Week => {
      let start = start_of_week(
        today,
        Weekday::Sun
      );
      Some(DateBounds {
        start,
        end: add_days(start, 6)
      })
    }
    | DateRange::Month => {
      Some(DateBounds {
        start: first_day_of_month(
          today.year(),
          today.month()
        ),
        end:   last_day_of_month(
          today.year(),
          today.month()
        )
      })
    }
    | DateRange::All => None
  }
}

pub fn first_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  NaiveDate::from_ymd_opt(
    year, month, 1
  )
  .unwrap_or(NaiveDate::MIN)
}

/// Day zero of the following month.
pub fn last_day_of_month(
  year: i32,
  month: u32
) -> NaiveDate {
  let (next_year, next_month) =
    if month >= 12 {
      (year.saturating_add(1), 1_u32)
    } else {
      (year, month + 1)
    };
  add_days(
    first_day_of_month(
      next_year, next_month
    ),
    -1
  )
}

pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month).day()
}

pub fn add_days(
  date: NaiveDate,
  days: i64
) -> NaiveDate {
  date
    .checked_add_signed(Duration::days(
      days
    ))
    .unwrap_or(date)
}

pub fn start_of_week(
  day: NaiveDate,
  week_start: Weekday
) -> NaiveDate {
  let day_idx = day
    .weekday()
    .num_days_from_sunday()
    as i64;
  let start_idx = week_start
    .num_days_from_sunday()
    as i64;
  let diff =
    (7 + day_idx - start_idx) % 7;
  add_days(day, -diff)
}

#[must_use]
pub fn format_iso_date(
  date: NaiveDate
) -> String {
  date.format(ISO_DATE_FORMAT).to_string()
}

pub fn parse_iso_date(
  raw: &str
) -> anyhow::Result<NaiveDate> {
  NaiveDate::parse_from_str(
    raw.trim(),
    ISO_DATE_FORMAT
  )
  .map_err(|err| {
    anyhow::anyhow!(
      "invalid date '{raw}', expected \
       YYYY-MM-DD: {err}"
    )
  })
}

/// Picks the console timezone: env
/// override first, then the configured
/// value, then UTC.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) =
      parse_timezone(&raw, TIMEZONE_ENV_VAR)
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "timezone")
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_CONSOLE_TIMEZONE,
    "DEFAULT_CONSOLE_TIMEZONE"
  )
  .unwrap_or(chrono_tz::UTC)
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => Some(tz),
    | Err(error) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %error,
        "invalid timezone id"
      );
      None
    }
  }
}

pub fn today_in(
  timezone: Tz
) -> NaiveDate {
  local_date(Utc::now(), timezone)
}

#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  timezone: Tz
) -> NaiveDate {
  dt.with_timezone(&timezone)
    .date_naive()
}
