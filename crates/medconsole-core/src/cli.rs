use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::billing::BillingGranularity;
use crate::datetime::{DateRange, parse_iso_date};
use crate::export::BillingReportKind;
use crate::model::{AppointmentStatus, Channel, PaymentMethod, QueueStatus};

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

pub fn parse_range(s: &str) -> anyhow::Result<DateRange> {
    DateRange::from_key(s).ok_or_else(|| anyhow!("unknown period '{s}' (today, week, month, all)"))
}

pub fn parse_channel(s: &str) -> anyhow::Result<Channel> {
    Channel::from_key(s).ok_or_else(|| anyhow!("unknown channel '{s}' (email, sms, voice)"))
}

pub fn parse_queue_status(s: &str) -> anyhow::Result<QueueStatus> {
    QueueStatus::from_key(s).ok_or_else(|| anyhow!("unknown queue status '{s}' (queued, sent, failed)"))
}

pub fn parse_appointment_status(s: &str) -> anyhow::Result<AppointmentStatus> {
    AppointmentStatus::from_key(s).ok_or_else(|| {
        anyhow!("unknown appointment status '{s}' (scheduled, confirmed, completed, cancelled, no-show)")
    })
}

pub fn parse_granularity(s: &str) -> anyhow::Result<BillingGranularity> {
    BillingGranularity::from_key(s)
        .ok_or_else(|| anyhow!("unknown granularity '{s}' (daily, weekly, monthly, yearly)"))
}

pub fn parse_payment_method(s: &str) -> anyhow::Result<PaymentMethod> {
    PaymentMethod::from_key(s)
        .ok_or_else(|| anyhow!("unknown payment method '{s}' (cash, card, insurance, transfer)"))
}

pub fn parse_report_kind(s: &str) -> anyhow::Result<BillingReportKind> {
    BillingReportKind::from_key(s)
        .ok_or_else(|| anyhow!("unknown report '{s}' (summary, transactions, aging)"))
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "medconsole",
    version,
    about = "Hospital console: appointments, outbound queue, patients, billing and tax ledger"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Override a config key for this run.
    #[arg(
        long = "set",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub overrides: Vec<KeyVal>,

    #[arg(long = "rc")]
    pub rc: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    /// Reference date used instead of the current day.
    #[arg(long = "today", value_parser = parse_iso_date)]
    pub today: Option<NaiveDate>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Print the concrete dates a period resolves to.
    Range {
        #[arg(value_parser = parse_range)]
        period: DateRange,
    },
    /// Month grid with appointment counts.
    Calendar {
        #[arg(long)]
        month: Option<u32>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, conflicts_with = "prev")]
        next: bool,
        #[arg(long)]
        prev: bool,
    },
    Appointments {
        #[arg(long, value_parser = parse_range, default_value = "all")]
        range: DateRange,
    },
    /// Book a new appointment.
    Book {
        #[arg(long)]
        patient: String,
        #[arg(long = "clinician", action = ArgAction::Append)]
        clinicians: Vec<String>,
        #[arg(long)]
        date: String,
        #[arg(long)]
        time: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Status {
        id: String,
        #[arg(value_parser = parse_appointment_status)]
        status: AppointmentStatus,
    },
    /// Filtered, paginated outbound queue. Filters not given keep their
    /// last value.
    Queue {
        #[arg(long, value_parser = parse_range)]
        range: Option<DateRange>,
        #[arg(long, value_parser = parse_channel)]
        channel: Option<Channel>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long, value_parser = parse_queue_status)]
        status: Option<QueueStatus>,
        #[arg(long)]
        page: Option<usize>,
        /// Clear the remembered filters before applying the others.
        #[arg(long)]
        reset: bool,
        /// Show notification history instead of the live queue.
        #[arg(long)]
        history: bool,
    },
    Providers,
    /// Retry every failed queue item.
    Retry,
    /// Export appointments as CSV.
    Export {
        #[arg(long, value_parser = parse_range, default_value = "all")]
        range: DateRange,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Patients,
    Patient {
        #[command(subcommand)]
        action: PatientCommand,
    },
    Clinicians,
    Billing {
        #[command(subcommand)]
        action: BillingCommand,
    },
    Tax {
        #[command(subcommand)]
        action: TaxCommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum PatientCommand {
    Show {
        id: String,
    },
    /// Change contact details; only the given fields are sent.
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
    Records {
        id: String,
    },
    /// Attach a document to the patient's health records.
    Upload {
        id: String,
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum BillingCommand {
    Records,
    /// Raise a billing record against a patient.
    Add {
        #[arg(long)]
        patient: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        amount: f64,
        /// Defaults to 30 days after today.
        #[arg(long, value_parser = parse_iso_date)]
        due: Option<NaiveDate>,
    },
    Transactions,
    /// Record a payment against a billing record.
    Pay {
        record: String,
        amount: f64,
        #[arg(long, value_parser = parse_payment_method, default_value = "card")]
        method: PaymentMethod,
        #[arg(long, value_parser = parse_iso_date)]
        date: Option<NaiveDate>,
        #[arg(long)]
        note: Option<String>,
    },
    Summary {
        #[arg(long, value_parser = parse_granularity, default_value = "monthly")]
        granularity: BillingGranularity,
        #[arg(long, value_parser = parse_range, default_value = "all")]
        range: DateRange,
    },
    /// Write a billing report as CSV.
    Report {
        #[arg(value_parser = parse_report_kind)]
        kind: BillingReportKind,
        #[arg(long, value_parser = parse_granularity, default_value = "monthly")]
        granularity: BillingGranularity,
        #[arg(long, value_parser = parse_range, default_value = "all")]
        range: DateRange,
        /// Minimum days past due for the aging report.
        #[arg(long, default_value_t = 30)]
        days: u32,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaxCommand {
    Show,
    Set {
        category: String,
        amount: f64,
    },
    Pay {
        tax_type: String,
        amount: f64,
        #[arg(long, value_parser = parse_iso_date)]
        date: Option<NaiveDate>,
        #[arg(long)]
        note: Option<String>,
    },
    History,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
