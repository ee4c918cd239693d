use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::Utc;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::billing::{BillingGranularity, apply_payment, summarize};
use crate::datetime::DateBounds;
use crate::model::{
    Appointment, AppointmentStatus, BillingRecord, BillingStatus, BillingSummary, Clinician,
    ClinicianRef, HealthRecord, Patient, QueueItem, QueueStatus, Transaction,
};
use crate::retry::QueueBackend;
use crate::validation::{AppointmentDraft, BillingDraft, PatientUpdate, TransactionDraft};

pub const APPOINTMENTS_FILE: &str = "appointments.json";
pub const QUEUE_FILE: &str = "outbound-queue.json";
pub const NOTIFICATIONS_FILE: &str = "notifications.json";
pub const PATIENTS_FILE: &str = "patients.json";
pub const CLINICIANS_FILE: &str = "clinicians.json";
pub const BILLING_FILE: &str = "billing-records.json";
pub const TRANSACTIONS_FILE: &str = "transactions.json";
pub const HEALTH_RECORDS_FILE: &str = "health-records.json";
pub const DOCUMENTS_DIR: &str = "documents";

/// The hospital API as seen by the console.
pub trait ConsoleBackend: QueueBackend {
    fn list_appointments(
        &self,
        bounds: Option<DateBounds>,
    ) -> impl Future<Output = anyhow::Result<Vec<Appointment>>> + Send;

    fn create_appointment(
        &self,
        draft: &AppointmentDraft,
    ) -> impl Future<Output = anyhow::Result<Appointment>> + Send;

    fn update_appointment_status(
        &self,
        id: &str,
        status: AppointmentStatus,
    ) -> impl Future<Output = anyhow::Result<Appointment>> + Send;

    fn list_queue(&self) -> impl Future<Output = anyhow::Result<Vec<QueueItem>>> + Send;

    fn list_notifications(&self) -> impl Future<Output = anyhow::Result<Vec<QueueItem>>> + Send;

    fn list_patients(&self) -> impl Future<Output = anyhow::Result<Vec<Patient>>> + Send;

    fn get_patient(&self, id: &str) -> impl Future<Output = anyhow::Result<Patient>> + Send;

    fn update_patient(
        &self,
        id: &str,
        update: &PatientUpdate,
    ) -> impl Future<Output = anyhow::Result<Patient>> + Send;

    fn list_clinicians(&self) -> impl Future<Output = anyhow::Result<Vec<Clinician>>> + Send;

    fn list_billing_records(&self) -> impl Future<Output = anyhow::Result<Vec<BillingRecord>>> + Send;

    fn create_billing_record(
        &self,
        draft: &BillingDraft,
    ) -> impl Future<Output = anyhow::Result<BillingRecord>> + Send;

    fn list_transactions(&self) -> impl Future<Output = anyhow::Result<Vec<Transaction>>> + Send;

    fn create_transaction(
        &self,
        draft: &TransactionDraft,
    ) -> impl Future<Output = anyhow::Result<Transaction>> + Send;

    fn list_health_records(
        &self,
        patient_id: &str,
    ) -> impl Future<Output = anyhow::Result<Vec<HealthRecord>>> + Send;

    fn upload_document(
        &self,
        patient_id: &str,
        file: &Path,
    ) -> impl Future<Output = anyhow::Result<HealthRecord>> + Send;

    fn billing_summary(
        &self,
        granularity: BillingGranularity,
        bounds: Option<DateBounds>,
    ) -> impl Future<Output = anyhow::Result<Vec<BillingSummary>>> + Send;
}

/// Backend over JSON exports sitting in a local directory.
///
/// File access runs on the blocking pool. Every read-modify-write holds
/// `writes` for its whole cycle.
#[derive(Debug, Clone)]
pub struct SnapshotBackend {
    pub dir: PathBuf,
    writes: Arc<Mutex<()>>,
}

fn read_records<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !path.exists() {
        debug!(file = %path.display(), "snapshot file missing; treating as empty");
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("failed parsing {}", path.display()))
}

fn document_file_name(file: &Path) -> anyhow::Result<String> {
    file.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| anyhow!("{} has no file name", file.display()))
}

impl SnapshotBackend {
    #[tracing::instrument(skip(dir))]
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        info!(dir = %dir.display(), "opened snapshot backend");
        Ok(Self {
            dir: dir.to_path_buf(),
            writes: Arc::new(Mutex::new(())),
        })
    }

    async fn load<T>(&self, file: &str) -> anyhow::Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = self.dir.join(file);
        tokio::task::spawn_blocking(move || read_records(&path))
            .await
            .context("snapshot read task failed")?
    }

    async fn store<T: Serialize + Sync>(&self, file: &str, records: &[T]) -> anyhow::Result<()> {
        let path = self.dir.join(file);
        let json = serde_json::to_string_pretty(records)?;
        tokio::task::spawn_blocking(move || {
            crate::storage::write_atomic(&path, &json)
                .with_context(|| format!("failed to save {}", path.display()))
        })
        .await
        .context("snapshot write task failed")?
    }

    async fn find_patient(&self, id: &str) -> anyhow::Result<Patient> {
        let id = id.trim();
        let patients: Vec<Patient> = self.load(PATIENTS_FILE).await?;
        patients
            .into_iter()
            .find(|patient| patient.id == id)
            .ok_or_else(|| anyhow!("patient not found: {id}"))
    }
}

impl QueueBackend for SnapshotBackend {
    #[tracing::instrument(skip(self))]
    async fn retry_item(&self, id: &str) -> anyhow::Result<()> {
        let _guard = self.writes.lock().await;
        let mut queue: Vec<QueueItem> = self.load(QUEUE_FILE).await?;
        let item = queue
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| anyhow!("queue item not found: {id}"))?;
        if item.status != QueueStatus::Failed {
            return Err(anyhow!("queue item {id} is {} and cannot be retried", item.status.as_key()));
        }
        item.status = QueueStatus::Queued;
        item.attempts += 1;
        item.next_retry_at = Some(Utc::now());
        self.store(QUEUE_FILE, &queue).await
    }
}

impl ConsoleBackend for SnapshotBackend {
    #[tracing::instrument(skip(self))]
    async fn list_appointments(&self, bounds: Option<DateBounds>) -> anyhow::Result<Vec<Appointment>> {
        let all: Vec<Appointment> = self.load(APPOINTMENTS_FILE).await?;
        Ok(crate::calendar::appointments_in_bounds(&all, bounds))
    }

    /// Patient and clinician names come from the directory files; unknown
    /// ids reject the booking.
    #[tracing::instrument(skip(self, draft))]
    async fn create_appointment(&self, draft: &AppointmentDraft) -> anyhow::Result<Appointment> {
        let date = draft.validate()?;
        let patient = self.find_patient(&draft.patient_id).await?;
        let directory: Vec<Clinician> = self.load(CLINICIANS_FILE).await?;
        let clinicians = draft
            .clinician_ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .map(|id| {
                directory
                    .iter()
                    .find(|clinician| clinician.id == id)
                    .map(Clinician::to_ref)
                    .ok_or_else(|| anyhow!("clinician not found: {id}"))
            })
            .collect::<anyhow::Result<Vec<ClinicianRef>>>()?;

        let _guard = self.writes.lock().await;
        let mut all: Vec<Appointment> = self.load(APPOINTMENTS_FILE).await?;
        let appointment = Appointment {
            id: Uuid::new_v4().to_string(),
            patient: patient.to_ref(),
            clinicians,
            date,
            time: draft.time.trim().to_string(),
            status: AppointmentStatus::Scheduled,
            reason: draft.reason.clone().filter(|r| !r.trim().is_empty()),
            created_at: Utc::now(),
        };
        all.push(appointment.clone());
        self.store(APPOINTMENTS_FILE, &all).await?;
        info!(id = %appointment.id, "created appointment");
        Ok(appointment)
    }

    #[tracing::instrument(skip(self))]
    async fn update_appointment_status(
        &self,
        id: &str,
        status: AppointmentStatus,
    ) -> anyhow::Result<Appointment> {
        let _guard = self.writes.lock().await;
        let mut all: Vec<Appointment> = self.load(APPOINTMENTS_FILE).await?;
        let appointment = all
            .iter_mut()
            .find(|appt| appt.id == id)
            .ok_or_else(|| anyhow!("appointment not found: {id}"))?;
        appointment.status = status;
        let updated = appointment.clone();
        self.store(APPOINTMENTS_FILE, &all).await?;
        Ok(updated)
    }

    async fn list_queue(&self) -> anyhow::Result<Vec<QueueItem>> {
        self.load(QUEUE_FILE).await
    }

    async fn list_notifications(&self) -> anyhow::Result<Vec<QueueItem>> {
        self.load(NOTIFICATIONS_FILE).await
    }

    async fn list_patients(&self) -> anyhow::Result<Vec<Patient>> {
        self.load(PATIENTS_FILE).await
    }

    async fn get_patient(&self, id: &str) -> anyhow::Result<Patient> {
        self.find_patient(id).await
    }

    #[tracing::instrument(skip(self, update))]
    async fn update_patient(&self, id: &str, update: &PatientUpdate) -> anyhow::Result<Patient> {
        update.validate()?;
        let _guard = self.writes.lock().await;
        let mut patients: Vec<Patient> = self.load(PATIENTS_FILE).await?;
        let patient = patients
            .iter_mut()
            .find(|patient| patient.id == id)
            .ok_or_else(|| anyhow!("patient not found: {id}"))?;
        update.apply_to(patient);
        let updated = patient.clone();
        self.store(PATIENTS_FILE, &patients).await?;
        info!(id, "updated patient record");
        Ok(updated)
    }

    async fn list_clinicians(&self) -> anyhow::Result<Vec<Clinician>> {
        self.load(CLINICIANS_FILE).await
    }

    async fn list_billing_records(&self) -> anyhow::Result<Vec<BillingRecord>> {
        self.load(BILLING_FILE).await
    }

    #[tracing::instrument(skip(self, draft))]
    async fn create_billing_record(&self, draft: &BillingDraft) -> anyhow::Result<BillingRecord> {
        let (issued_date, due_date) = draft.validate()?;
        let patient = self.find_patient(&draft.patient_id).await?;

        let _guard = self.writes.lock().await;
        let mut records: Vec<BillingRecord> = self.load(BILLING_FILE).await?;
        let record = BillingRecord {
            id: Uuid::new_v4().to_string(),
            patient_id: patient.id,
            patient_name: patient.name,
            description: draft.description.trim().to_string(),
            amount: draft.amount,
            amount_paid: 0.0,
            status: BillingStatus::Pending,
            issued_date,
            due_date,
        };
        records.push(record.clone());
        self.store(BILLING_FILE, &records).await?;
        info!(id = %record.id, amount = record.amount, "created billing record");
        Ok(record)
    }

    async fn list_transactions(&self) -> anyhow::Result<Vec<Transaction>> {
        self.load(TRANSACTIONS_FILE).await
    }

    /// Posts the payment and updates the balance of the billed record.
    #[tracing::instrument(skip(self, draft))]
    async fn create_transaction(&self, draft: &TransactionDraft) -> anyhow::Result<Transaction> {
        let date = draft.validate()?;
        let record_id = draft.billing_record_id.trim();

        let _guard = self.writes.lock().await;
        let mut records: Vec<BillingRecord> = self.load(BILLING_FILE).await?;
        let record = records
            .iter_mut()
            .find(|record| record.id == record_id)
            .ok_or_else(|| anyhow!("billing record not found: {record_id}"))?;
        apply_payment(record, draft.amount, date);

        let mut transactions: Vec<Transaction> = self.load(TRANSACTIONS_FILE).await?;
        let transaction = Transaction {
            id: Uuid::new_v4().to_string(),
            billing_record_id: record_id.to_string(),
            amount: draft.amount,
            method: draft.method,
            date,
            note: draft.note.clone().filter(|n| !n.trim().is_empty()),
        };
        transactions.push(transaction.clone());

        self.store(BILLING_FILE, &records).await?;
        self.store(TRANSACTIONS_FILE, &transactions).await?;
        info!(id = %transaction.id, record = record_id, "recorded transaction");
        Ok(transaction)
    }

    async fn list_health_records(&self, patient_id: &str) -> anyhow::Result<Vec<HealthRecord>> {
        let all: Vec<HealthRecord> = self.load(HEALTH_RECORDS_FILE).await?;
        Ok(all
            .into_iter()
            .filter(|record| record.patient_id == patient_id)
            .collect())
    }

    /// Copies the file under `documents/<patient>/` and lists it as a
    /// health record of type `document`.
    #[tracing::instrument(skip(self))]
    async fn upload_document(&self, patient_id: &str, file: &Path) -> anyhow::Result<HealthRecord> {
        let patient = self.find_patient(patient_id).await?;
        let file_name = document_file_name(file)?;
        let source = file.to_path_buf();
        let target = self.dir.join(DOCUMENTS_DIR).join(&patient.id).join(&file_name);
        tokio::task::spawn_blocking(move || -> anyhow::Result<u64> {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            fs::copy(&source, &target)
                .with_context(|| format!("failed to copy {} into the snapshot", source.display()))
        })
        .await
        .context("document upload task failed")??;

        let _guard = self.writes.lock().await;
        let mut records: Vec<HealthRecord> = self.load(HEALTH_RECORDS_FILE).await?;
        let record = HealthRecord {
            id: Uuid::new_v4().to_string(),
            patient_id: patient.id,
            title: file_name.clone(),
            record_type: "document".to_string(),
            date: Utc::now().date_naive(),
            file_name: Some(file_name),
            notes: None,
        };
        records.push(record.clone());
        self.store(HEALTH_RECORDS_FILE, &records).await?;
        info!(id = %record.id, "stored uploaded document");
        Ok(record)
    }

    async fn billing_summary(
        &self,
        granularity: BillingGranularity,
        bounds: Option<DateBounds>,
    ) -> anyhow::Result<Vec<BillingSummary>> {
        let records: Vec<BillingRecord> = self.load(BILLING_FILE).await?;
        let transactions: Vec<Transaction> = self.load(TRANSACTIONS_FILE).await?;
        Ok(summarize(&records, &transactions, granularity, bounds))
    }
}

/// Backend talking JSON over HTTP to the hospital API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

fn with_query(path: &str, params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{query}")
}

fn appointments_path(bounds: Option<DateBounds>) -> String {
    let params = bounds.map(|b| b.query_params().to_vec()).unwrap_or_default();
    with_query("appointments", &params)
}

fn billing_summary_path(granularity: BillingGranularity, bounds: Option<DateBounds>) -> String {
    let mut params = vec![("granularity", granularity.as_key().to_string())];
    if let Some(bounds) = bounds {
        params.extend(bounds.query_params());
    }
    with_query("billing/summary", &params)
}

impl HttpBackend {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(anyhow!("api.url cannot be empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("failed to build HTTP client")?;
        info!(base_url = %base_url, "using HTTP backend");
        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> anyhow::Result<T> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("{url} returned an error status"))?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed decoding response from {url}"))
    }

    async fn send_json<B, T>(&self, method: reqwest::Method, url: String, body: &B) -> anyhow::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!(url = %url, ?method, "sending");
        let response = self
            .client
            .request(method, &url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("{url} rejected the request"))?;
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed decoding response from {url}"))
    }
}

impl QueueBackend for HttpBackend {
    #[tracing::instrument(skip(self))]
    async fn retry_item(&self, id: &str) -> anyhow::Result<()> {
        let url = self.url(&format!("outbound-queue/{id}/retry"));
        self.client
            .post(&url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("retry of {id} was rejected"))?;
        Ok(())
    }
}

impl ConsoleBackend for HttpBackend {
    async fn list_appointments(&self, bounds: Option<DateBounds>) -> anyhow::Result<Vec<Appointment>> {
        self.get_json(self.url(&appointments_path(bounds))).await
    }

    #[tracing::instrument(skip(self, draft))]
    async fn create_appointment(&self, draft: &AppointmentDraft) -> anyhow::Result<Appointment> {
        draft.validate()?;
        self.send_json(reqwest::Method::POST, self.url("appointments"), draft)
            .await
            .context("appointment was not created")
    }

    #[tracing::instrument(skip(self))]
    async fn update_appointment_status(
        &self,
        id: &str,
        status: AppointmentStatus,
    ) -> anyhow::Result<Appointment> {
        self.send_json(
            reqwest::Method::PATCH,
            self.url(&format!("appointments/{id}")),
            &json!({ "status": status }),
        )
        .await
        .with_context(|| format!("status update of {id} was rejected"))
    }

    async fn list_queue(&self) -> anyhow::Result<Vec<QueueItem>> {
        self.get_json(self.url("outbound-queue")).await
    }

    async fn list_notifications(&self) -> anyhow::Result<Vec<QueueItem>> {
        self.get_json(self.url("notifications")).await
    }

    async fn list_patients(&self) -> anyhow::Result<Vec<Patient>> {
        self.get_json(self.url("patients")).await
    }

    async fn get_patient(&self, id: &str) -> anyhow::Result<Patient> {
        self.get_json(self.url(&format!("patients/{id}"))).await
    }

    #[tracing::instrument(skip(self, update))]
    async fn update_patient(&self, id: &str, update: &PatientUpdate) -> anyhow::Result<Patient> {
        update.validate()?;
        self.send_json(reqwest::Method::PATCH, self.url(&format!("patients/{id}")), update)
            .await
            .with_context(|| format!("update of patient {id} was rejected"))
    }

    async fn list_clinicians(&self) -> anyhow::Result<Vec<Clinician>> {
        self.get_json(self.url("clinicians")).await
    }

    async fn list_billing_records(&self) -> anyhow::Result<Vec<BillingRecord>> {
        self.get_json(self.url("billing/records")).await
    }

    #[tracing::instrument(skip(self, draft))]
    async fn create_billing_record(&self, draft: &BillingDraft) -> anyhow::Result<BillingRecord> {
        draft.validate()?;
        self.send_json(reqwest::Method::POST, self.url("billing/records"), draft)
            .await
            .context("billing record was not created")
    }

    async fn list_transactions(&self) -> anyhow::Result<Vec<Transaction>> {
        self.get_json(self.url("billing/transactions")).await
    }

    #[tracing::instrument(skip(self, draft))]
    async fn create_transaction(&self, draft: &TransactionDraft) -> anyhow::Result<Transaction> {
        draft.validate()?;
        self.send_json(reqwest::Method::POST, self.url("billing/transactions"), draft)
            .await
            .context("transaction was not recorded")
    }

    async fn list_health_records(&self, patient_id: &str) -> anyhow::Result<Vec<HealthRecord>> {
        self.get_json(self.url(&format!("patients/{patient_id}/health-records")))
            .await
    }

    /// Sends the raw file bytes; the file name travels as a query
    /// parameter.
    #[tracing::instrument(skip(self))]
    async fn upload_document(&self, patient_id: &str, file: &Path) -> anyhow::Result<HealthRecord> {
        let file_name = document_file_name(file)?;
        let source = file.to_path_buf();
        let bytes = tokio::task::spawn_blocking(move || {
            fs::read(&source).with_context(|| format!("failed reading {}", source.display()))
        })
        .await
        .context("document read task failed")??;

        let mut url = reqwest::Url::parse(&self.url(&format!("patients/{patient_id}/documents")))
            .context("invalid document upload URL")?;
        url.query_pairs_mut().append_pair("fileName", &file_name);
        debug!(url = %url, bytes = bytes.len(), "uploading document");

        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("upload of {file_name} was rejected"))?;
        response
            .json::<HealthRecord>()
            .await
            .context("failed decoding uploaded health record")
    }

    async fn billing_summary(
        &self,
        granularity: BillingGranularity,
        bounds: Option<DateBounds>,
    ) -> anyhow::Result<Vec<BillingSummary>> {
        self.get_json(self.url(&billing_summary_path(granularity, bounds)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::*;
    use crate::model::PaymentMethod;

    const QUEUE_JSON: &str = r#"[
      {"id":"q-1","appointmentId":"apt-1","patientName":"Ada Obi","clinicianName":"Dr. Hale",
       "channel":"sms","provider":"twilio","status":"failed","attempts":2,
       "createdAt":"2026-10-18T09:00:00Z"},
      {"id":"q-2","appointmentId":"apt-2","patientName":"Ben Roy","clinicianName":"Dr. Moss",
       "channel":"email","provider":"sendgrid","status":"sent","attempts":1,
       "createdAt":"2026-10-18T09:05:00Z"}
    ]"#;

    const APPOINTMENTS_JSON: &str = r#"[
      {"id":"apt-1","patient":{"id":"p-1","name":"Ada Obi"},
       "clinicians":[{"id":"c-1","name":"Dr. Hale"}],
       "date":"2026-10-19","time":"09:00","status":"scheduled",
       "createdAt":"2026-10-01T08:00:00Z"},
      {"id":"apt-2","patient":{"id":"p-2","name":"Ben Roy"},
       "clinicians":[{"id":"c-2","name":"Dr. Moss"}],
       "date":"2026-11-02","time":"14:30","status":"confirmed",
       "createdAt":"2026-10-02T08:00:00Z"}
    ]"#;

    const PATIENTS_JSON: &str = r#"[
      {"id":"p-1","name":"Ada Obi","mrn":"MRN-001","phone":"555-0100"},
      {"id":"p-9","name":"Ines Park"}
    ]"#;

    const CLINICIANS_JSON: &str = r#"[
      {"id":"c-1","name":"Dr. Hale","specialty":"cardiology"}
    ]"#;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn directory(dir: &Path) {
        fs::write(dir.join(PATIENTS_FILE), PATIENTS_JSON).expect("write patients");
        fs::write(dir.join(CLINICIANS_FILE), CLINICIANS_JSON).expect("write clinicians");
    }

    #[tokio::test]
    async fn missing_snapshot_files_are_empty() {
        let temp = tempdir().expect("tempdir");
        let backend = SnapshotBackend::open(temp.path()).expect("open");
        assert!(backend.list_queue().await.expect("queue").is_empty());
        assert!(backend.list_notifications().await.expect("history").is_empty());
        assert!(backend.list_appointments(None).await.expect("appointments").is_empty());
        assert!(backend.list_patients().await.expect("patients").is_empty());
        assert!(
            backend
                .billing_summary(BillingGranularity::Monthly, None)
                .await
                .expect("summary")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn retry_requeues_failed_item() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join(QUEUE_FILE), QUEUE_JSON).expect("write queue");
        let backend = SnapshotBackend::open(temp.path()).expect("open");

        backend.retry_item("q-1").await.expect("retry failed item");
        let queue = backend.list_queue().await.expect("queue");
        assert_eq!(queue[0].status, QueueStatus::Queued);
        assert_eq!(queue[0].attempts, 3);
        assert!(queue[0].next_retry_at.is_some());

        assert!(backend.retry_item("q-2").await.is_err());
        assert!(backend.retry_item("missing").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_retries_keep_every_update() {
        let temp = tempdir().expect("tempdir");
        let items: Vec<String> = (1..=6)
            .map(|i| {
                format!(
                    r#"{{"id":"q-{i}","appointmentId":"apt-{i}","patientName":"P{i}",
                    "clinicianName":"Dr. Hale","channel":"sms","provider":"twilio",
                    "status":"failed","attempts":0,"createdAt":"2026-10-18T09:00:00Z"}}"#
                )
            })
            .collect();
        fs::write(temp.path().join(QUEUE_FILE), format!("[{}]", items.join(","))).expect("write queue");
        let backend = SnapshotBackend::open(temp.path()).expect("open");

        let handles: Vec<_> = (1..=6)
            .map(|i| {
                let backend = backend.clone();
                tokio::spawn(async move { backend.retry_item(&format!("q-{i}")).await })
            })
            .collect();
        for handle in handles {
            handle.await.expect("join").expect("retry");
        }

        let queue = backend.list_queue().await.expect("queue");
        assert!(queue.iter().all(|item| item.status == QueueStatus::Queued));
        assert!(queue.iter().all(|item| item.attempts == 1));
    }

    #[tokio::test]
    async fn appointments_are_filtered_and_updated() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join(APPOINTMENTS_FILE), APPOINTMENTS_JSON).expect("write");
        let backend = SnapshotBackend::open(temp.path()).expect("open");

        let october = DateBounds {
            start: ymd(2026, 10, 1),
            end: ymd(2026, 10, 31),
        };
        let listed = backend.list_appointments(Some(october)).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "apt-1");

        let updated = backend
            .update_appointment_status("apt-2", AppointmentStatus::Cancelled)
            .await
            .expect("update");
        assert_eq!(updated.status, AppointmentStatus::Cancelled);
        let all = backend.list_appointments(None).await.expect("list all");
        assert_eq!(all[1].status, AppointmentStatus::Cancelled);
    }

    #[tokio::test]
    async fn booking_resolves_names_from_the_directory() {
        let temp = tempdir().expect("tempdir");
        directory(temp.path());
        let backend = SnapshotBackend::open(temp.path()).expect("open");
        let draft = AppointmentDraft {
            patient_id: "p-1".to_string(),
            clinician_ids: vec!["c-1".to_string()],
            date: "2026-12-01".to_string(),
            time: "08:00".to_string(),
            reason: Some("   ".to_string()),
        };
        let created = backend.create_appointment(&draft).await.expect("create");
        assert_eq!(created.status, AppointmentStatus::Scheduled);
        assert_eq!(created.reason, None);
        assert_eq!(created.patient.name, "Ada Obi");
        assert_eq!(created.patient.mrn.as_deref(), Some("MRN-001"));
        assert_eq!(created.clinician_names(), "Dr. Hale");
        assert_eq!(backend.list_appointments(None).await.expect("list").len(), 1);

        let unknown = AppointmentDraft {
            patient_id: "p-404".to_string(),
            ..draft.clone()
        };
        let err = backend.create_appointment(&unknown).await.expect_err("unknown patient");
        assert!(err.to_string().contains("patient not found: p-404"));
        let unknown = AppointmentDraft {
            clinician_ids: vec!["c-404".to_string()],
            ..draft
        };
        assert!(backend.create_appointment(&unknown).await.is_err());
        assert!(backend.create_appointment(&AppointmentDraft::default()).await.is_err());
        assert_eq!(backend.list_appointments(None).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn patient_update_and_document_upload() {
        let temp = tempdir().expect("tempdir");
        let snapshot = temp.path().join("snapshot");
        fs::create_dir_all(&snapshot).expect("snapshot dir");
        directory(&snapshot);
        let backend = SnapshotBackend::open(&snapshot).expect("open");

        let update = PatientUpdate {
            email: Some("ines@example.test".to_string()),
            ..PatientUpdate::default()
        };
        let updated = backend.update_patient("p-9", &update).await.expect("update");
        assert_eq!(updated.email.as_deref(), Some("ines@example.test"));
        assert_eq!(
            backend.get_patient("p-9").await.expect("fetch").email.as_deref(),
            Some("ines@example.test")
        );
        assert!(backend.update_patient("p-404", &update).await.is_err());

        let scan = temp.path().join("scan.pdf");
        fs::write(&scan, b"%PDF-1.7").expect("write scan");
        let record = backend.upload_document("p-9", &scan).await.expect("upload");
        assert_eq!(record.record_type, "document");
        assert_eq!(record.file_name.as_deref(), Some("scan.pdf"));
        assert!(snapshot.join(DOCUMENTS_DIR).join("p-9").join("scan.pdf").exists());

        let records = backend.list_health_records("p-9").await.expect("records");
        assert_eq!(records.len(), 1);
        assert!(backend.list_health_records("p-1").await.expect("records").is_empty());
        assert!(backend.upload_document("p-404", &scan).await.is_err());
    }

    #[tokio::test]
    async fn transactions_settle_billing_records() {
        let temp = tempdir().expect("tempdir");
        directory(temp.path());
        let backend = SnapshotBackend::open(temp.path()).expect("open");

        let record = backend
            .create_billing_record(&BillingDraft {
                patient_id: "p-1".to_string(),
                description: "Echocardiogram".to_string(),
                amount: 300.0,
                issued_date: Some(ymd(2026, 10, 1)),
                due_date: Some(ymd(2026, 10, 31)),
            })
            .await
            .expect("create record");
        assert_eq!(record.patient_name, "Ada Obi");

        let draft = TransactionDraft {
            billing_record_id: record.id.clone(),
            amount: 300.0,
            method: PaymentMethod::Insurance,
            date: Some(ymd(2026, 10, 12)),
            note: None,
        };
        backend.create_transaction(&draft).await.expect("transaction");
        let records = backend.list_billing_records().await.expect("records");
        assert_eq!(records[0].status, BillingStatus::Paid);
        assert_eq!(backend.list_transactions().await.expect("transactions").len(), 1);

        let summary = backend
            .billing_summary(BillingGranularity::Monthly, None)
            .await
            .expect("summary");
        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].billed, 300.0);
        assert_eq!(summary[0].collected, 300.0);
        assert_eq!(summary[0].outstanding, 0.0);

        let orphan = TransactionDraft {
            billing_record_id: "inv-404".to_string(),
            ..draft
        };
        assert!(backend.create_transaction(&orphan).await.is_err());
        assert_eq!(backend.list_transactions().await.expect("transactions").len(), 1);
    }

    #[test]
    fn request_paths_carry_query_parameters() {
        let bounds = DateBounds {
            start: ymd(2026, 10, 18),
            end: ymd(2026, 10, 24),
        };
        assert_eq!(
            appointments_path(Some(bounds)),
            "appointments?startDate=2026-10-18&endDate=2026-10-24"
        );
        assert_eq!(appointments_path(None), "appointments");
        assert_eq!(
            billing_summary_path(BillingGranularity::Weekly, Some(bounds)),
            "billing/summary?granularity=weekly&startDate=2026-10-18&endDate=2026-10-24"
        );
        assert_eq!(
            billing_summary_path(BillingGranularity::Yearly, None),
            "billing/summary?granularity=yearly"
        );
    }

    #[test]
    fn http_backend_rejects_blank_url() {
        assert!(HttpBackend::new("  ").is_err());
        let backend = HttpBackend::new("https://api.example.test/v1/").expect("backend");
        assert_eq!(backend.url("/notifications"), "https://api.example.test/v1/notifications");
    }
}
