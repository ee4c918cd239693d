use std::io::Write;
use std::path::PathBuf;

use chrono::NaiveDate;
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::backend::ConsoleBackend;
use crate::billing::{BillingGranularity, aging};
use crate::calendar::{MonthCursor, build_month_grid, group_by_date};
use crate::cli::{BillingCommand, Command, PatientCommand, TaxCommand};
use crate::datetime::{DateBounds, DateRange, add_days, last_day_of_month, resolve};
use crate::export::{
    BillingReportKind, ReportWindow, aging_csv, appointments_csv, appointments_filename,
    billing_report_filename, billing_summary_csv, transactions_csv, write_export,
};
use crate::model::QueueItem;
use crate::notifications::{filter_queue, paginate, provider_options};
use crate::query::{Loaded, QuerySlot, write_outcome};
use crate::render::Renderer;
use crate::retry::retry_all_failed;
use crate::storage::{FileStore, TaxLedger, load_or_default, save};
use crate::validation::{
    AppointmentDraft, BillingDraft, PatientUpdate, TaxPaymentDraft, TransactionDraft,
};
use crate::view_state::{Action, ConsoleView, reduce};

/// Default payment term for new billing records.
const BILLING_TERM_DAYS: i64 = 30;

pub const VIEW_STATE_KEY: &str = "console_view";

/// Per-invocation environment shared by every command.
pub struct Console<'a, W: Write> {
    pub today: NaiveDate,
    pub timezone: Tz,
    pub data_dir: PathBuf,
    pub renderer: &'a Renderer,
    pub out: W,
}

impl<W: Write> Console<'_, W> {
    fn store(&self) -> anyhow::Result<FileStore> {
        FileStore::open(&self.data_dir.join("local"))
    }

    fn load_view(&self, store: &FileStore) -> ConsoleView {
        load_or_default(store, VIEW_STATE_KEY, ConsoleView::new(self.today))
    }
}

#[tracing::instrument(skip_all)]
pub async fn dispatch<B, W>(backend: &B, console: &mut Console<'_, W>, command: Command) -> anyhow::Result<()>
where
    B: ConsoleBackend + Sync,
    W: Write,
{
    debug!(?command, "dispatching command");
    match command {
        Command::Range { period } => {
            let bounds = resolve(period, console.today);
            console.renderer.bounds(&mut console.out, bounds)
        }
        Command::Calendar {
            month,
            year,
            next,
            prev,
        } => calendar(backend, console, month, year, next, prev).await,
        Command::Appointments { range } => {
            let loaded = Loaded::from_result(
                "appointments",
                backend.list_appointments(resolve(range, console.today)).await,
            );
            report_load_error(console, &loaded)?;
            console.renderer.appointments(&mut console.out, &loaded.items)
        }
        Command::Book {
            patient,
            clinicians,
            date,
            time,
            reason,
        } => {
            let draft = AppointmentDraft {
                patient_id: patient,
                clinician_ids: clinicians,
                date,
                time,
                reason,
            };
            draft.validate()?;
            let result = backend.create_appointment(&draft).await;
            let toast = write_outcome(&result, "Appointment booked");
            console.renderer.toast(&mut console.out, &toast)
        }
        Command::Status { id, status } => {
            let result = backend.update_appointment_status(&id, status).await;
            let toast = write_outcome(
                &result,
                &format!("Appointment {id} marked {}", status.as_key()),
            );
            console.renderer.toast(&mut console.out, &toast)
        }
        Command::Queue {
            range,
            channel,
            provider,
            status,
            page,
            reset,
            history,
        } => {
            let mut store = console.store()?;
            let mut actions = Vec::new();
            if reset {
                actions.push(Action::ResetQueueFilter);
            }
            actions.extend(range.map(Action::SetQueueRange));
            if channel.is_some() {
                actions.push(Action::SetChannel(channel));
            }
            if provider.is_some() {
                actions.push(Action::SetProvider(provider));
            }
            if status.is_some() {
                actions.push(Action::SetStatus(status));
            }
            actions.extend(page.map(Action::SetQueuePage));
            let view = actions
                .into_iter()
                .fold(console.load_view(&store), |state, action| reduce(&state, action));

            let mut slot: QuerySlot<String, QueueItem> = QuerySlot::new();
            let key = slot.request(format!(
                "{}:{}",
                if history { "history" } else { "queue" },
                view.queue_filter.cache_key()
            ));
            let fetched = if history {
                Loaded::from_result("notifications", backend.list_notifications().await)
            } else {
                Loaded::from_result("outbound queue", backend.list_queue().await)
            };
            slot.resolve(key, fetched);
            let loaded = slot.current().cloned().unwrap_or_default();
            report_load_error(console, &loaded)?;

            let matching = filter_queue(&loaded.items, &view.queue_filter, console.today, console.timezone);
            let page = paginate(&matching, view.queue_page);
            console.renderer.queue_page(&mut console.out, &page)?;

            save(&mut store, VIEW_STATE_KEY, &view)?;
            Ok(())
        }
        Command::Providers => {
            let queue = Loaded::from_result("outbound queue", backend.list_queue().await);
            let history = Loaded::from_result("notifications", backend.list_notifications().await);
            report_load_error(console, &queue)?;
            report_load_error(console, &history)?;
            for provider in provider_options(&queue.items, &history.items) {
                writeln!(console.out, "{provider}")?;
            }
            Ok(())
        }
        Command::Retry => {
            let queue = Loaded::from_result("outbound queue", backend.list_queue().await);
            report_load_error(console, &queue)?;
            let summary = retry_all_failed(backend, &queue.items).await;
            for (id, message) in &summary.failures {
                writeln!(console.out, "  {id}: {message}")?;
            }
            console.renderer.toast(&mut console.out, &summary.toast())
        }
        Command::Export { range, out } => {
            let loaded = Loaded::from_result(
                "appointments",
                backend.list_appointments(resolve(range, console.today)).await,
            );
            if skip_failed_export(console, &loaded)? {
                return Ok(());
            }
            let path = out.unwrap_or_else(|| PathBuf::from(appointments_filename(console.today)));
            write_export(&path, &appointments_csv(&loaded.items))?;
            writeln!(
                console.out,
                "Exported {} appointments to {}",
                loaded.items.len(),
                path.display()
            )?;
            Ok(())
        }
        Command::Patients => {
            let loaded = Loaded::from_result("patients", backend.list_patients().await);
            report_load_error(console, &loaded)?;
            console.renderer.patients(&mut console.out, &loaded.items)
        }
        Command::Patient { action } => patient(backend, console, action).await,
        Command::Clinicians => {
            let loaded = Loaded::from_result("clinicians", backend.list_clinicians().await);
            report_load_error(console, &loaded)?;
            console.renderer.clinicians(&mut console.out, &loaded.items)
        }
        Command::Billing { action } => billing(backend, console, action).await,
        Command::Tax { action } => tax(console, action),
    }
}

async fn calendar<B, W>(
    backend: &B,
    console: &mut Console<'_, W>,
    month: Option<u32>,
    year: Option<i32>,
    next: bool,
    prev: bool,
) -> anyhow::Result<()>
where
    B: ConsoleBackend + Sync,
    W: Write,
{
    let mut store = console.store()?;
    let mut view = console.load_view(&store);

    if month.is_some() || year.is_some() {
        view.cursor = MonthCursor::new(
            year.unwrap_or(view.cursor.year),
            month.unwrap_or(view.cursor.month),
        )?;
    }
    if next {
        view = reduce(&view, Action::NextMonth);
    }
    if prev {
        view = reduce(&view, Action::PrevMonth);
    }
    info!(year = view.cursor.year, month = view.cursor.month, "rendering calendar");

    let first = view.cursor.first_day();
    let bounds = DateBounds {
        start: first,
        end: last_day_of_month(view.cursor.year, view.cursor.month),
    };
    let loaded = Loaded::from_result("appointments", backend.list_appointments(Some(bounds)).await);
    report_load_error(console, &loaded)?;

    let grouped = group_by_date(&loaded.items);
    let cells = build_month_grid(view.cursor, &grouped, console.today);
    console.renderer.calendar(&mut console.out, view.cursor, &cells)?;

    save(&mut store, VIEW_STATE_KEY, &view)?;
    Ok(())
}

async fn patient<B, W>(backend: &B, console: &mut Console<'_, W>, action: PatientCommand) -> anyhow::Result<()>
where
    B: ConsoleBackend + Sync,
    W: Write,
{
    match action {
        PatientCommand::Show { id } => {
            let loaded = Loaded::from_result(
                &format!("patient {id}"),
                backend.get_patient(&id).await.map(|patient| vec![patient]),
            );
            report_load_error(console, &loaded)?;
            for patient in &loaded.items {
                console.renderer.patient(&mut console.out, patient)?;
            }
            Ok(())
        }
        PatientCommand::Update {
            id,
            name,
            phone,
            email,
            address,
        } => {
            let update = PatientUpdate {
                name,
                phone,
                email,
                address,
            };
            update.validate()?;
            let result = backend.update_patient(&id, &update).await;
            let toast = write_outcome(&result, &format!("Updated patient {id}"));
            console.renderer.toast(&mut console.out, &toast)?;
            if let Ok(patient) = result {
                console.renderer.patient(&mut console.out, &patient)?;
            }
            Ok(())
        }
        PatientCommand::Records { id } => {
            let loaded = Loaded::from_result("health records", backend.list_health_records(&id).await);
            report_load_error(console, &loaded)?;
            console.renderer.health_records(&mut console.out, &loaded.items)
        }
        PatientCommand::Upload { id, file } => {
            let result = backend.upload_document(&id, &file).await;
            let toast = write_outcome(&result, &format!("Uploaded {} for patient {id}", file.display()));
            console.renderer.toast(&mut console.out, &toast)
        }
    }
}

async fn billing<B, W>(backend: &B, console: &mut Console<'_, W>, action: BillingCommand) -> anyhow::Result<()>
where
    B: ConsoleBackend + Sync,
    W: Write,
{
    match action {
        BillingCommand::Records => {
            let loaded = Loaded::from_result("billing records", backend.list_billing_records().await);
            report_load_error(console, &loaded)?;
            console.renderer.billing_records(&mut console.out, &loaded.items)
        }
        BillingCommand::Add {
            patient,
            description,
            amount,
            due,
        } => {
            let draft = BillingDraft {
                patient_id: patient,
                description,
                amount,
                issued_date: Some(console.today),
                due_date: Some(due.unwrap_or_else(|| add_days(console.today, BILLING_TERM_DAYS))),
            };
            draft.validate()?;
            let result = backend.create_billing_record(&draft).await;
            let toast = write_outcome(&result, "Billing record created");
            console.renderer.toast(&mut console.out, &toast)
        }
        BillingCommand::Transactions => {
            let loaded = Loaded::from_result("transactions", backend.list_transactions().await);
            report_load_error(console, &loaded)?;
            console.renderer.transactions(&mut console.out, &loaded.items)
        }
        BillingCommand::Pay {
            record,
            amount,
            method,
            date,
            note,
        } => {
            let draft = TransactionDraft {
                billing_record_id: record,
                amount,
                method,
                date: Some(date.unwrap_or(console.today)),
                note,
            };
            draft.validate()?;
            let result = backend.create_transaction(&draft).await;
            let toast = write_outcome(&result, "Payment recorded");
            console.renderer.toast(&mut console.out, &toast)
        }
        BillingCommand::Summary { granularity, range } => {
            let loaded = Loaded::from_result(
                "billing summary",
                backend
                    .billing_summary(granularity, resolve(range, console.today))
                    .await,
            );
            report_load_error(console, &loaded)?;
            console
                .renderer
                .billing_summary(&mut console.out, granularity, &loaded.items)
        }
        BillingCommand::Report {
            kind,
            granularity,
            range,
            days,
            out,
        } => billing_report(backend, console, kind, granularity, range, days, out).await,
    }
}

#[tracing::instrument(skip(backend, console, out))]
async fn billing_report<B, W>(
    backend: &B,
    console: &mut Console<'_, W>,
    kind: BillingReportKind,
    granularity: BillingGranularity,
    range: DateRange,
    days: u32,
    out: Option<PathBuf>,
) -> anyhow::Result<()>
where
    B: ConsoleBackend + Sync,
    W: Write,
{
    let bounds = resolve(range, console.today);
    let period = bounds
        .map(ReportWindow::Range)
        .unwrap_or(ReportWindow::Period(granularity, console.today));

    let (csv, rows, window) = match kind {
        BillingReportKind::Summary => {
            let loaded = Loaded::from_result(
                "billing summary",
                backend.billing_summary(granularity, bounds).await,
            );
            if skip_failed_export(console, &loaded)? {
                return Ok(());
            }
            (billing_summary_csv(&loaded.items, granularity), loaded.items.len(), period)
        }
        BillingReportKind::Transactions => {
            let loaded = Loaded::from_result("transactions", backend.list_transactions().await);
            if skip_failed_export(console, &loaded)? {
                return Ok(());
            }
            let in_range: Vec<_> = loaded
                .items
                .into_iter()
                .filter(|t| bounds.is_none_or(|b| b.contains(t.date)))
                .collect();
            (transactions_csv(&in_range), in_range.len(), period)
        }
        BillingReportKind::Aging => {
            let loaded = Loaded::from_result("billing records", backend.list_billing_records().await);
            if skip_failed_export(console, &loaded)? {
                return Ok(());
            }
            let overdue = aging(&loaded.items, console.today, days);
            (aging_csv(&overdue), overdue.len(), ReportWindow::AgingDays(days))
        }
    };

    let path = out.unwrap_or_else(|| PathBuf::from(billing_report_filename(kind, window)));
    write_export(&path, &csv)?;
    writeln!(
        console.out,
        "Wrote {} {} rows to {}",
        rows,
        kind.as_key(),
        path.display()
    )?;
    Ok(())
}

fn tax<W: Write>(console: &mut Console<'_, W>, action: TaxCommand) -> anyhow::Result<()> {
    let mut ledger = TaxLedger::new(console.store()?);
    match action {
        TaxCommand::Show => console.renderer.tax_figures(&mut console.out, &ledger.figures()),
        TaxCommand::Set { category, amount } => {
            let result = ledger.set_figure(&category, amount);
            let toast = write_outcome(&result, &format!("Updated {category}"));
            console.renderer.toast(&mut console.out, &toast)?;
            if let Ok(figures) = result {
                console.renderer.tax_figures(&mut console.out, &figures)?;
            }
            Ok(())
        }
        TaxCommand::Pay {
            tax_type,
            amount,
            date,
            note,
        } => {
            let draft = TaxPaymentDraft {
                tax_type,
                amount,
                payment_date: Some(date.unwrap_or(console.today)),
                note,
            };
            draft.validate()?;
            let result = ledger.record_payment(draft);
            let toast = write_outcome(&result, "Tax payment recorded");
            console.renderer.toast(&mut console.out, &toast)
        }
        TaxCommand::History => console.renderer.tax_payments(&mut console.out, &ledger.payments()),
    }
}

fn report_load_error<T, W: Write>(console: &mut Console<'_, W>, loaded: &Loaded<T>) -> anyhow::Result<()> {
    if let Some(error) = loaded.error.as_deref() {
        warn!(error, "rendering empty state after failed load");
        writeln!(console.out, "! {error}")?;
    }
    Ok(())
}

/// True when the load failed; the error is reported and no file is
/// written.
fn skip_failed_export<T, W: Write>(console: &mut Console<'_, W>, loaded: &Loaded<T>) -> anyhow::Result<bool> {
    if !loaded.is_error() {
        return Ok(false);
    }
    report_load_error(console, loaded)?;
    writeln!(console.out, "Export skipped; nothing was written.")?;
    Ok(true)
}
