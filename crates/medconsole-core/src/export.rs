use std::path::Path;

use chrono::NaiveDate;

use crate::billing::BillingGranularity;
use crate::datetime::{DateBounds, format_iso_date};
use crate::model::{Appointment, BillingRecord, BillingSummary, Transaction};

pub const APPOINTMENT_COLUMNS: [&str; 7] =
    ["Date", "Time", "Patient", "MRN", "Clinician", "Status", "Reason"];

/// Free-text fields are wrapped in quotes as-is. Embedded quotes and commas
/// are not escaped, so such values can shift columns in the output.
fn quoted(value: &str) -> String {
    format!("\"{value}\"")
}

pub fn appointment_row(appt: &Appointment) -> String {
    [
        format_iso_date(appt.date),
        appt.time.clone(),
        quoted(&appt.patient.name),
        appt.patient.mrn.clone().unwrap_or_default(),
        quoted(&appt.clinician_names()),
        appt.status.as_key().to_string(),
        quoted(appt.reason.as_deref().unwrap_or_default()),
    ]
    .join(",")
}

#[tracing::instrument(skip_all, fields(rows = appointments.len()))]
pub fn appointments_csv(appointments: &[Appointment]) -> String {
    let mut lines = Vec::with_capacity(appointments.len() + 1);
    lines.push(APPOINTMENT_COLUMNS.join(","));
    lines.extend(appointments.iter().map(appointment_row));
    lines.join("\n")
}

pub fn appointments_filename(today: NaiveDate) -> String {
    format!("appointments-{}.csv", format_iso_date(today))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingReportKind {
    Summary,
    Transactions,
    Aging,
}

impl BillingReportKind {
    pub const ALL: [BillingReportKind; 3] = [
        BillingReportKind::Summary,
        BillingReportKind::Transactions,
        BillingReportKind::Aging,
    ];

    pub fn as_key(self) -> &'static str {
        match self {
            BillingReportKind::Summary => "summary",
            BillingReportKind::Transactions => "transactions",
            BillingReportKind::Aging => "aging",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_key() == key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportWindow {
    Range(DateBounds),
    Period(BillingGranularity, NaiveDate),
    AgingDays(u32),
}

pub fn billing_report_filename(kind: BillingReportKind, window: ReportWindow) -> String {
    let suffix = match window {
        ReportWindow::Range(bounds) => format!(
            "{}-to-{}",
            format_iso_date(bounds.start),
            format_iso_date(bounds.end)
        ),
        ReportWindow::Period(granularity, date) => {
            format!("{}-{}", granularity.as_key(), format_iso_date(date))
        }
        ReportWindow::AgingDays(days) => format!("{days}-days"),
    };
    format!("billing-{}-{suffix}.csv", kind.as_key())
}

pub fn billing_summary_csv(rows: &[BillingSummary], granularity: BillingGranularity) -> String {
    let mut lines = vec!["Period,Granularity,Records,Billed,Collected,Outstanding".to_string()];
    lines.extend(rows.iter().map(|row| {
        format!(
            "{},{},{},{:.2},{:.2},{:.2}",
            format_iso_date(row.period_start),
            granularity.as_key(),
            row.records,
            row.billed,
            row.collected,
            row.outstanding
        )
    }));
    lines.join("\n")
}

pub fn transactions_csv(transactions: &[Transaction]) -> String {
    let mut lines = vec!["Date,Record,Amount,Method,Note".to_string()];
    lines.extend(transactions.iter().map(|t| {
        format!(
            "{},{},{:.2},{},{}",
            format_iso_date(t.date),
            t.billing_record_id,
            t.amount,
            t.method.as_key(),
            quoted(t.note.as_deref().unwrap_or_default())
        )
    }));
    lines.join("\n")
}

pub fn aging_csv(rows: &[(&BillingRecord, i64)]) -> String {
    let mut lines = vec!["Record,Patient,Description,Due,Outstanding,DaysOverdue".to_string()];
    lines.extend(rows.iter().map(|(record, days)| {
        format!(
            "{},{},{},{},{:.2},{days}",
            record.id,
            quoted(&record.patient_name),
            quoted(&record.description),
            format_iso_date(record.due_date),
            record.outstanding()
        )
    }));
    lines.join("\n")
}

pub fn write_export(path: &Path, contents: &str) -> anyhow::Result<()> {
    crate::storage::write_atomic(path, contents)?;
    tracing::info!(file = %path.display(), bytes = contents.len(), "wrote export");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::model::{AppointmentStatus, BillingStatus, ClinicianRef, PatientRef};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn appointment(reason: Option<&str>) -> Appointment {
        Appointment {
            id: "apt-1".to_string(),
            patient: PatientRef {
                id: "p-1".to_string(),
                name: "Ada Obi".to_string(),
                mrn: Some("MRN-7".to_string()),
            },
            clinicians: vec![ClinicianRef {
                id: "c-1".to_string(),
                name: "Dr. Hale".to_string(),
            }],
            date: ymd(2026, 10, 19),
            time: "09:30".to_string(),
            status: AppointmentStatus::Confirmed,
            reason: reason.map(str::to_string),
            created_at: Utc
                .with_ymd_and_hms(2026, 10, 1, 8, 0, 0)
                .single()
                .expect("valid instant"),
        }
    }

    #[test]
    fn header_then_rows() {
        let csv = appointments_csv(&[appointment(None)]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Date,Time,Patient,MRN,Clinician,Status,Reason");
        assert_eq!(
            lines[1],
            "2026-10-19,09:30,\"Ada Obi\",MRN-7,\"Dr. Hale\",confirmed,\"\""
        );
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn embedded_comma_is_left_unescaped() {
        let csv = appointments_csv(&[appointment(Some("follow-up, urgent"))]);
        let row = csv.lines().nth(1).expect("data row");
        assert!(row.ends_with(",\"follow-up, urgent\""));
        assert_eq!(row.split(',').count(), APPOINTMENT_COLUMNS.len() + 1);
    }

    #[test]
    fn empty_set_is_header_only() {
        assert_eq!(appointments_csv(&[]), APPOINTMENT_COLUMNS.join(","));
    }

    #[test]
    fn filenames_embed_dates() {
        assert_eq!(
            appointments_filename(ymd(2026, 10, 19)),
            "appointments-2026-10-19.csv"
        );
        let bounds = DateBounds {
            start: ymd(2026, 10, 1),
            end: ymd(2026, 10, 31),
        };
        assert_eq!(
            billing_report_filename(BillingReportKind::Summary, ReportWindow::Range(bounds)),
            "billing-summary-2026-10-01-to-2026-10-31.csv"
        );
        assert_eq!(
            billing_report_filename(BillingReportKind::Aging, ReportWindow::AgingDays(90)),
            "billing-aging-90-days.csv"
        );
        assert_eq!(
            billing_report_filename(
                BillingReportKind::Transactions,
                ReportWindow::Period(BillingGranularity::Monthly, ymd(2026, 10, 1))
            ),
            "billing-transactions-monthly-2026-10-01.csv"
        );
    }

    #[test]
    fn billing_reports_follow_the_same_quoting() {
        let record = BillingRecord {
            id: "inv-7".to_string(),
            patient_id: "p-1".to_string(),
            patient_name: "Ada Obi".to_string(),
            description: "X-ray, chest".to_string(),
            amount: 240.0,
            amount_paid: 40.0,
            status: BillingStatus::Overdue,
            issued_date: ymd(2026, 8, 1),
            due_date: ymd(2026, 9, 1),
        };
        let csv = aging_csv(&[(&record, 48)]);
        assert_eq!(
            csv.lines().nth(1),
            Some("inv-7,\"Ada Obi\",\"X-ray, chest\",2026-09-01,200.00,48")
        );

        let summary = BillingSummary {
            period_start: ymd(2026, 9, 1),
            billed: 240.0,
            collected: 40.0,
            outstanding: 200.0,
            records: 1,
        };
        assert_eq!(
            billing_summary_csv(&[summary], BillingGranularity::Monthly),
            "Period,Granularity,Records,Billed,Collected,Outstanding\n2026-09-01,monthly,1,240.00,40.00,200.00"
        );
        assert_eq!(transactions_csv(&[]), "Date,Record,Amount,Method,Note");
    }
}
