use std::collections::BTreeMap;

use chrono::{
  Datelike,
  NaiveDate
};
use serde::{
  Deserialize,
  Serialize
};

use crate::datetime::{
  DateBounds,
  days_in_month,
  first_day_of_month,
  format_iso_date
};
use crate::model::Appointment;

pub const GRID_COLUMNS: usize = 7;

pub type AppointmentsByDate =
  BTreeMap<NaiveDate, Vec<Appointment>>;

/// Buckets appointments by calendar date.
/// Relative order inside each bucket
/// follows the input order.
pub fn group_by_date(
  appointments: &[Appointment]
) -> AppointmentsByDate {
  let mut grouped =
    AppointmentsByDate::new();
  for appointment in appointments {
    grouped
      .entry(appointment.date)
      .or_default()
      .push(appointment.clone());
  }

  tracing::debug!(
    appointments = appointments.len(),
    dates = grouped.len(),
    "grouped appointments by date"
  );
  grouped
}

pub fn appointments_in_bounds(
  appointments: &[Appointment],
  bounds: Option<DateBounds>
) -> Vec<Appointment> {
  match bounds {
    | Some(bounds) => {
      appointments
        .iter()
        .filter(|appt| {
          bounds.contains(appt.date)
        })
        .cloned()
        .collect()
    }
    | None => appointments.to_vec()
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
#[serde(try_from = "RawMonthCursor")]
pub struct MonthCursor {
  pub year:  i32,
  pub month: u32
}

/// Stored form, checked through
/// `MonthCursor::new` on the way in.
#[derive(Deserialize)]
struct RawMonthCursor {
  year:  i32,
  month: u32
}

impl TryFrom<RawMonthCursor>
  for MonthCursor
{
  type Error = anyhow::Error;

  fn try_from(
    raw: RawMonthCursor
  ) -> anyhow::Result<Self> {
    Self::new(raw.year, raw.month)
  }
}

impl MonthCursor {
  pub fn new(
    year: i32,
    month: u32
  ) -> anyhow::Result<Self> {
    if !(1..=12).contains(&month) {
      anyhow::bail!(
        "month must be between 1 and \
         12, got {month}"
      );
    }
    Ok(Self { year, month })
  }

  pub fn containing(
    date: NaiveDate
  ) -> Self {
    Self {
      year:  date.year(),
      month: date.month()
    }
  }

  #[must_use]
  pub fn prev(self) -> Self {
    if self.month <= 1 {
      Self {
        year:  self.year.saturating_sub(1),
        month: 12
      }
    } else {
      Self {
        year:  self.year,
        month: self.month - 1
      }
    }
  }

  #[must_use]
  pub fn next(self) -> Self {
    if self.month >= 12 {
      Self {
        year:  self.year.saturating_add(1),
        month: 1
      }
    } else {
      Self {
        year:  self.year,
        month: self.month + 1
      }
    }
  }

  pub fn first_day(self) -> NaiveDate {
    first_day_of_month(
      self.year, self.month
    )
  }

  pub fn label(self) -> String {
    self
      .first_day()
      .format("%B %Y")
      .to_string()
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum DayHighlight {
  Past,
  Today,
  Upcoming
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarDayCell {
  pub day:          u32,
  pub date:         NaiveDate,
  pub date_key:     String,
  pub appointments: Vec<Appointment>,
  pub is_today:     bool,
  pub is_past:      bool,
  pub is_upcoming:  bool
}

impl CalendarDayCell {
  /// Temporal styling only applies to
  /// days that carry appointments.
  pub fn highlight(
    &self
  ) -> Option<DayHighlight> {
    if self.appointments.is_empty() {
      return None;
    }
    if self.is_today {
      Some(DayHighlight::Today)
    } else if self.is_past {
      Some(DayHighlight::Past)
    } else {
      Some(DayHighlight::Upcoming)
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridCell {
  Blank,
  Day(CalendarDayCell)
}

impl GridCell {
  pub fn as_day(
    &self
  ) -> Option<&CalendarDayCell> {
    match self {
      | GridCell::Blank => None,
      | GridCell::Day(cell) => Some(cell)
    }
  }
}

pub fn build_month_grid(
  cursor: MonthCursor,
  by_date: &AppointmentsByDate,
  today: NaiveDate
) -> Vec<GridCell> {
  let first = cursor.first_day();
  let leading = first
    .weekday()
    .num_days_from_sunday()
    as usize;
  let total_days = days_in_month(
    cursor.year,
    cursor.month
  );

  let mut cells = Vec::with_capacity(
    leading + total_days as usize
  );
  cells.extend(
    std::iter::repeat_n(
      GridCell::Blank,
      leading
    )
  );

  for day in 1..=total_days {
    let Some(date) =
      first.with_day(day)
    else {
      continue;
    };
    let appointments = by_date
      .get(&date)
      .cloned()
      .unwrap_or_default();
    cells.push(GridCell::Day(
      CalendarDayCell {
        day,
        date,
        date_key: format_iso_date(date),
        appointments,
        is_today: date == today,
        is_past: date < today,
        is_upcoming: date >= today
      }
    ));
  }

  tracing::debug!(
    year = cursor.year,
    month = cursor.month,
    leading,
    days = total_days,
    "built month grid"
  );
  cells
}

/// Splits a flat grid into display rows.
pub fn grid_rows(
  cells: &[GridCell]
) -> Vec<&[GridCell]> {
  cells.chunks(GRID_COLUMNS).collect()
}
