use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    pub fn as_key(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no-show",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|status| status.as_key() == key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatientRef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mrn: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClinicianRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub patient: PatientRef,
    pub clinicians: Vec<ClinicianRef>,
    pub date: NaiveDate,
    pub time: String,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Appointment {
    pub fn clinician_names(&self) -> String {
        self.clinicians
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    Sms,
    Voice,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::Voice];

    pub fn as_key(self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Voice => "voice",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|channel| channel.as_key() == key)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Queued,
    Sent,
    Failed,
}

impl QueueStatus {
    pub const ALL: [QueueStatus; 3] = [QueueStatus::Queued, QueueStatus::Sent, QueueStatus::Failed];

    pub fn as_key(self) -> &'static str {
        match self {
            QueueStatus::Queued => "queued",
            QueueStatus::Sent => "sent",
            QueueStatus::Failed => "failed",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|status| status.as_key() == key)
    }
}

/// One outbound message, either still in the delivery queue or already
/// part of the notification history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub id: String,
    pub appointment_id: String,
    pub patient_name: String,
    pub clinician_name: String,
    pub channel: Channel,
    pub provider: String,
    pub status: QueueStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mrn: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl Patient {
    pub fn to_ref(&self) -> PatientRef {
        PatientRef {
            id: self.id.clone(),
            name: self.name.clone(),
            mrn: self.mrn.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Clinician {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub specialty: Option<String>,
}

impl Clinician {
    pub fn to_ref(&self) -> ClinicianRef {
        ClinicianRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BillingStatus {
    Pending,
    Paid,
    Overdue,
}

impl BillingStatus {
    pub fn as_key(self) -> &'static str {
        match self {
            BillingStatus::Pending => "pending",
            BillingStatus::Paid => "paid",
            BillingStatus::Overdue => "overdue",
        }
    }
}

/// An invoice raised against a patient. `amount_paid` accumulates the
/// transactions posted against it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BillingRecord {
    pub id: String,
    pub patient_id: String,
    pub patient_name: String,
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub amount_paid: f64,
    pub status: BillingStatus,
    pub issued_date: NaiveDate,
    pub due_date: NaiveDate,
}

impl BillingRecord {
    pub fn outstanding(&self) -> f64 {
        (self.amount - self.amount_paid).max(0.0)
    }

    /// Whole days past the due date while a balance remains.
    pub fn days_overdue(&self, today: NaiveDate) -> Option<i64> {
        if self.outstanding() <= 0.0 || today <= self.due_date {
            return None;
        }
        Some((today - self.due_date).num_days())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Card,
    Insurance,
    Transfer,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Insurance,
        PaymentMethod::Transfer,
    ];

    pub fn as_key(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Insurance => "insurance",
            PaymentMethod::Transfer => "transfer",
        }
    }

    pub fn from_key(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|method| method.as_key() == key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub billing_record_id: String,
    pub amount: f64,
    pub method: PaymentMethod,
    pub date: NaiveDate,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub id: String,
    pub patient_id: String,
    pub title: String,
    pub record_type: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Billing totals for one period bucket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BillingSummary {
    pub period_start: NaiveDate,
    pub billed: f64,
    pub collected: f64,
    pub outstanding: f64,
    pub records: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaxPaymentStatus {
    Paid,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaxPayment {
    pub id: Uuid,
    pub tax_type: String,
    pub amount: f64,
    pub payment_date: NaiveDate,
    pub status: TaxPaymentStatus,
    #[serde(default)]
    pub note: Option<String>,
}

pub type TaxFigures = BTreeMap<String, f64>;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn appointment_parses_backend_payload() {
        let value = json!({
            "id": "apt-1",
            "patient": { "id": "p-1", "name": "Ada Obi", "mrn": "MRN-001" },
            "clinicians": [
                { "id": "c-1", "name": "Dr. Hale" },
                { "id": "c-2", "name": "Dr. Moss" }
            ],
            "date": "2026-03-04",
            "time": "09:30",
            "status": "no-show",
            "createdAt": "2026-02-20T10:00:00Z"
        });

        let appt: Appointment = serde_json::from_value(value).expect("parse appointment");
        assert_eq!(appt.status, AppointmentStatus::NoShow);
        assert_eq!(appt.patient.mrn.as_deref(), Some("MRN-001"));
        assert_eq!(appt.reason, None);
        assert_eq!(appt.clinician_names(), "Dr. Hale, Dr. Moss");
    }

    #[test]
    fn enum_keys_are_case_insensitive() {
        assert_eq!(
            AppointmentStatus::from_key(" No-Show "),
            Some(AppointmentStatus::NoShow)
        );
        assert_eq!(Channel::from_key("SMS"), Some(Channel::Sms));
        assert_eq!(QueueStatus::from_key("failed"), Some(QueueStatus::Failed));
        assert_eq!(QueueStatus::from_key("bounced"), None);
        assert_eq!(PaymentMethod::from_key(" Card"), Some(PaymentMethod::Card));
    }

    #[test]
    fn billing_record_balance_and_overdue_days() {
        let value = json!({
            "id": "inv-1",
            "patientId": "p-1",
            "patientName": "Ada Obi",
            "description": "MRI scan",
            "amount": 900.0,
            "amountPaid": 400.0,
            "status": "pending",
            "issuedDate": "2026-09-01",
            "dueDate": "2026-10-01"
        });
        let mut record: BillingRecord = serde_json::from_value(value).expect("parse record");
        let day = |d| NaiveDate::from_ymd_opt(2026, 10, d).expect("valid date");

        assert_eq!(record.outstanding(), 500.0);
        assert_eq!(record.days_overdue(day(1)), None);
        assert_eq!(record.days_overdue(day(31)), Some(30));

        record.amount_paid = 900.0;
        assert_eq!(record.days_overdue(day(31)), None);
    }
}
