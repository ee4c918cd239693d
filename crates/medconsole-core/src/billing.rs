use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::datetime::{DateBounds, first_day_of_month, start_of_week};
use crate::model::{BillingRecord, BillingStatus, BillingSummary, Transaction};

/// Amounts below one cent count as settled.
const SETTLED_EPSILON: f64 = 0.005;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BillingGranularity {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Yearly,
}

impl BillingGranularity {
    pub const ALL: [BillingGranularity; 4] = [
        BillingGranularity::Daily,
        BillingGranularity::Weekly,
        BillingGranularity::Monthly,
        BillingGranularity::Yearly,
    ];

    pub fn as_key(self) -> &'static str {
        match self {
            BillingGranularity::Daily => "daily",
            BillingGranularity::Weekly => "weekly",
            BillingGranularity::Monthly => "monthly",
            BillingGranularity::Yearly => "yearly",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|granularity| granularity.as_key() == key)
    }
}

/// First day of the bucket `date` falls into. Weeks start on Sunday, the
/// same as the appointment range filter.
pub fn period_start(date: NaiveDate, granularity: BillingGranularity) -> NaiveDate {
    match granularity {
        BillingGranularity::Daily => date,
        BillingGranularity::Weekly => start_of_week(date, Weekday::Sun),
        BillingGranularity::Monthly => first_day_of_month(date.year(), date.month()),
        BillingGranularity::Yearly => first_day_of_month(date.year(), 1),
    }
}

fn in_bounds(date: NaiveDate, bounds: Option<DateBounds>) -> bool {
    bounds.is_none_or(|bounds| bounds.contains(date))
}

/// Buckets billed amounts by issue date and collected amounts by
/// transaction date, oldest period first.
#[tracing::instrument(skip(records, transactions), fields(records = records.len(), transactions = transactions.len()))]
pub fn summarize(
    records: &[BillingRecord],
    transactions: &[Transaction],
    granularity: BillingGranularity,
    bounds: Option<DateBounds>,
) -> Vec<BillingSummary> {
    let mut totals: BTreeMap<NaiveDate, BillingSummary> = BTreeMap::new();

    for record in records.iter().filter(|r| in_bounds(r.issued_date, bounds)) {
        let entry = summary_entry(&mut totals, period_start(record.issued_date, granularity));
        entry.billed += record.amount;
        entry.outstanding += record.outstanding();
        entry.records += 1;
    }

    for transaction in transactions.iter().filter(|t| in_bounds(t.date, bounds)) {
        let entry = summary_entry(&mut totals, period_start(transaction.date, granularity));
        entry.collected += transaction.amount;
    }

    totals.into_values().collect()
}

fn summary_entry(
    totals: &mut BTreeMap<NaiveDate, BillingSummary>,
    start: NaiveDate,
) -> &mut BillingSummary {
    totals.entry(start).or_insert_with(|| BillingSummary {
        period_start: start,
        billed: 0.0,
        collected: 0.0,
        outstanding: 0.0,
        records: 0,
    })
}

/// Records with a balance at least `min_days` past due, most overdue first.
pub fn aging(records: &[BillingRecord], today: NaiveDate, min_days: u32) -> Vec<(&BillingRecord, i64)> {
    let mut overdue: Vec<(&BillingRecord, i64)> = records
        .iter()
        .filter_map(|record| record.days_overdue(today).map(|days| (record, days)))
        .filter(|(_, days)| *days >= i64::from(min_days))
        .collect();
    overdue.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
    overdue
}

/// Posts a payment against `record` and settles its status.
pub fn apply_payment(record: &mut BillingRecord, amount: f64, today: NaiveDate) {
    record.amount_paid += amount;
    record.status = if record.outstanding() < SETTLED_EPSILON {
        BillingStatus::Paid
    } else if today > record.due_date {
        BillingStatus::Overdue
    } else {
        BillingStatus::Pending
    };
}
