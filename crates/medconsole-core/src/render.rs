use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::billing::BillingGranularity;
use crate::calendar::{DayHighlight, GridCell, MonthCursor, grid_rows};
use crate::config::Config;
use crate::datetime::{DateBounds, format_iso_date};
use crate::model::{
    Appointment, BillingRecord, BillingStatus, BillingSummary, Clinician, HealthRecord, Patient,
    QueueItem, TaxFigures, TaxPayment, Transaction,
};
use crate::notifications::{Page, page_numbers, render_page_markers};
use crate::query::{Toast, ToastKind};

const WEEKDAY_LABELS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Colour needs both the `color` setting and a terminal on stdout.
    pub fn new(cfg: &Config) -> Self {
        Self {
            color: cfg.color && io::stdout().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn bounds<W: Write>(&self, out: &mut W, bounds: Option<DateBounds>) -> anyhow::Result<()> {
        match bounds {
            Some(bounds) => writeln!(
                out,
                "start {}\nend   {}",
                format_iso_date(bounds.start),
                format_iso_date(bounds.end)
            )?,
            None => writeln!(out, "no date bounds (all dates)")?,
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, out, appointments))]
    pub fn appointments<W: Write>(&self, out: &mut W, appointments: &[Appointment]) -> anyhow::Result<()> {
        if appointments.is_empty() {
            writeln!(out, "No appointments found.")?;
            return Ok(());
        }

        let headers = ["ID", "Date", "Time", "Patient", "Clinician", "Status", "Reason"];
        let rows = appointments
            .iter()
            .map(|appt| {
                vec![
                    self.paint(&appt.id, "33"),
                    format_iso_date(appt.date),
                    appt.time.clone(),
                    appt.patient.name.clone(),
                    appt.clinician_names(),
                    appt.status.as_key().to_string(),
                    appt.reason.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(out, &headers, rows)
    }

    #[tracing::instrument(skip(self, out, cells))]
    pub fn calendar<W: Write>(
        &self,
        out: &mut W,
        cursor: MonthCursor,
        cells: &[GridCell],
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", cursor.label())?;
        let header = WEEKDAY_LABELS
            .iter()
            .map(|label| format!("{label:<6}"))
            .collect::<String>();
        writeln!(out, "{}", header.trim_end())?;

        for row in grid_rows(cells) {
            let mut line = String::new();
            for cell in row {
                let text = match cell {
                    GridCell::Blank => String::new(),
                    GridCell::Day(day) if day.appointments.is_empty() => format!("{:>2}", day.day),
                    GridCell::Day(day) => format!("{:>2}:{}", day.day, day.appointments.len()),
                };
                let padded = format!("{text:<6}");
                let painted = match cell.as_day().and_then(|day| day.highlight()) {
                    Some(DayHighlight::Past) => self.paint(&padded, "90"),
                    Some(DayHighlight::Today) => self.paint(&padded, "1;33"),
                    Some(DayHighlight::Upcoming) => self.paint(&padded, "32"),
                    None => padded,
                };
                line.push_str(&painted);
            }
            writeln!(out, "{}", line.trim_end())?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, out, page))]
    pub fn queue_page<W: Write>(&self, out: &mut W, page: &Page<'_, QueueItem>) -> anyhow::Result<()> {
        if page.total_items == 0 {
            writeln!(out, "No messages match the current filters.")?;
            return Ok(());
        }

        let headers = ["ID", "Patient", "Clinician", "Channel", "Provider", "Status", "Tries", "Created"];
        let rows = page
            .items
            .iter()
            .map(|item| {
                let status = item.status.as_key();
                let status = if status == "failed" {
                    self.paint(status, "31")
                } else {
                    status.to_string()
                };
                vec![
                    item.id.clone(),
                    item.patient_name.clone(),
                    item.clinician_name.clone(),
                    item.channel.as_key().to_string(),
                    item.provider.clone(),
                    status,
                    item.attempts.to_string(),
                    item.created_at.format("%Y-%m-%d %H:%M").to_string(),
                ]
            })
            .collect();
        write_table(&mut *out, &headers, rows)?;

        writeln!(
            out,
            "\npage {} of {} ({} messages)   {}",
            page.current,
            page.total_pages,
            page.total_items,
            render_page_markers(&page_numbers(page.current, page.total_pages), page.current)
        )?;
        Ok(())
    }

    pub fn tax_figures<W: Write>(&self, out: &mut W, figures: &TaxFigures) -> anyhow::Result<()> {
        let mut rows: Vec<Vec<String>> = figures
            .iter()
            .map(|(name, amount)| vec![name.clone(), format!("{amount:.2}")])
            .collect();
        let total: f64 = figures.values().sum();
        rows.push(vec![self.paint("total", "1"), format!("{total:.2}")]);
        write_table(out, &["Category", "Amount"], rows)
    }

    pub fn tax_payments<W: Write>(&self, out: &mut W, payments: &[TaxPayment]) -> anyhow::Result<()> {
        if payments.is_empty() {
            writeln!(out, "No tax payments recorded.")?;
            return Ok(());
        }
        let rows = payments
            .iter()
            .map(|p| {
                vec![
                    p.id.to_string(),
                    format_iso_date(p.payment_date),
                    p.tax_type.clone(),
                    format!("{:.2}", p.amount),
                    format!("{:?}", p.status).to_ascii_lowercase(),
                    p.note.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(out, &["ID", "Date", "Type", "Amount", "Status", "Note"], rows)
    }

    pub fn patients<W: Write>(&self, out: &mut W, patients: &[Patient]) -> anyhow::Result<()> {
        if patients.is_empty() {
            writeln!(out, "No patients found.")?;
            return Ok(());
        }
        let rows = patients
            .iter()
            .map(|p| {
                vec![
                    self.paint(&p.id, "33"),
                    p.name.clone(),
                    p.mrn.clone().unwrap_or_default(),
                    p.date_of_birth.map(format_iso_date).unwrap_or_default(),
                    p.phone.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(out, &["ID", "Name", "MRN", "Born", "Phone"], rows)
    }

    pub fn patient<W: Write>(&self, out: &mut W, patient: &Patient) -> anyhow::Result<()> {
        let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        writeln!(out, "{} ({})", self.paint(&patient.name, "1"), patient.id)?;
        writeln!(out, "  mrn      {}", field(&patient.mrn))?;
        writeln!(
            out,
            "  born     {}",
            patient
                .date_of_birth
                .map(format_iso_date)
                .unwrap_or_else(|| "-".to_string())
        )?;
        writeln!(out, "  phone    {}", field(&patient.phone))?;
        writeln!(out, "  email    {}", field(&patient.email))?;
        writeln!(out, "  address  {}", field(&patient.address))?;
        Ok(())
    }

    pub fn clinicians<W: Write>(&self, out: &mut W, clinicians: &[Clinician]) -> anyhow::Result<()> {
        if clinicians.is_empty() {
            writeln!(out, "No clinicians found.")?;
            return Ok(());
        }
        let rows = clinicians
            .iter()
            .map(|c| vec![c.id.clone(), c.name.clone(), c.specialty.clone().unwrap_or_default()])
            .collect();
        write_table(out, &["ID", "Name", "Specialty"], rows)
    }

    pub fn health_records<W: Write>(&self, out: &mut W, records: &[HealthRecord]) -> anyhow::Result<()> {
        if records.is_empty() {
            writeln!(out, "No health records on file.")?;
            return Ok(());
        }
        let rows = records
            .iter()
            .map(|r| {
                vec![
                    format_iso_date(r.date),
                    r.record_type.clone(),
                    r.title.clone(),
                    r.file_name.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(out, &["Date", "Type", "Title", "File"], rows)
    }

    #[tracing::instrument(skip(self, out, records))]
    pub fn billing_records<W: Write>(&self, out: &mut W, records: &[BillingRecord]) -> anyhow::Result<()> {
        if records.is_empty() {
            writeln!(out, "No billing records found.")?;
            return Ok(());
        }
        let rows = records
            .iter()
            .map(|r| {
                let status = match r.status {
                    BillingStatus::Paid => self.paint(r.status.as_key(), "32"),
                    BillingStatus::Overdue => self.paint(r.status.as_key(), "31"),
                    BillingStatus::Pending => r.status.as_key().to_string(),
                };
                vec![
                    r.id.clone(),
                    r.patient_name.clone(),
                    r.description.clone(),
                    format!("{:.2}", r.amount),
                    format!("{:.2}", r.outstanding()),
                    format_iso_date(r.due_date),
                    status,
                ]
            })
            .collect();
        write_table(
            out,
            &["ID", "Patient", "Description", "Amount", "Balance", "Due", "Status"],
            rows,
        )
    }

    pub fn transactions<W: Write>(&self, out: &mut W, transactions: &[Transaction]) -> anyhow::Result<()> {
        if transactions.is_empty() {
            writeln!(out, "No transactions recorded.")?;
            return Ok(());
        }
        let rows = transactions
            .iter()
            .map(|t| {
                vec![
                    format_iso_date(t.date),
                    t.billing_record_id.clone(),
                    format!("{:.2}", t.amount),
                    t.method.as_key().to_string(),
                    t.note.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(out, &["Date", "Record", "Amount", "Method", "Note"], rows)
    }

    pub fn billing_summary<W: Write>(
        &self,
        out: &mut W,
        granularity: BillingGranularity,
        rows: &[BillingSummary],
    ) -> anyhow::Result<()> {
        if rows.is_empty() {
            writeln!(out, "No billing activity in this period.")?;
            return Ok(());
        }
        let mut table: Vec<Vec<String>> = rows
            .iter()
            .map(|row| {
                vec![
                    format_iso_date(row.period_start),
                    row.records.to_string(),
                    format!("{:.2}", row.billed),
                    format!("{:.2}", row.collected),
                    format!("{:.2}", row.outstanding),
                ]
            })
            .collect();
        table.push(vec![
            self.paint("total", "1"),
            rows.iter().map(|r| r.records).sum::<usize>().to_string(),
            format!("{:.2}", rows.iter().map(|r| r.billed).sum::<f64>()),
            format!("{:.2}", rows.iter().map(|r| r.collected).sum::<f64>()),
            format!("{:.2}", rows.iter().map(|r| r.outstanding).sum::<f64>()),
        ]);
        writeln!(out, "{} billing summary", granularity.as_key())?;
        write_table(out, &["Period", "Records", "Billed", "Collected", "Outstanding"], table)
    }

    pub fn toast<W: Write>(&self, out: &mut W, toast: &Toast) -> anyhow::Result<()> {
        let line = match toast.kind {
            ToastKind::Success => self.paint(&toast.message, "32"),
            ToastKind::Error => self.paint(&format!("error: {}", toast.message), "31"),
        };
        writeln!(out, "{line}")?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(mut writer: W, headers: &[&str], rows: Vec<Vec<String>>) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(*header));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
