use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::model::{TaxFigures, TaxPayment, TaxPaymentStatus};
use crate::validation::TaxPaymentDraft;

pub const TAX_FIGURES_KEY: &str = "hospital_tax_data";
pub const TAX_PAYMENTS_KEY: &str = "hospital_tax_payments";

const DEFAULT_TAX_CATEGORIES: [&str; 4] = ["income", "property", "payroll", "sales"];

/// Whole-document key/value persistence, the local stand-in for browser
/// storage.
pub trait KeyValueStore {
    fn get_raw(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set_raw(&mut self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Reads `key`, falling back to `default` when the entry is missing,
/// unreadable or not valid JSON for `T`.
pub fn load_or_default<S, T>(store: &S, key: &str, default: T) -> T
where
    S: KeyValueStore + ?Sized,
    T: DeserializeOwned,
{
    let raw = match store.get_raw(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!(key, "no stored value; using default");
            return default;
        }
        Err(err) => {
            warn!(key, error = %format!("{err:#}"), "failed reading stored value; using default");
            return default;
        }
    };

    match serde_json::from_str::<T>(&raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(key, error = %err, "stored value is corrupt; using default");
            default
        }
    }
}

pub fn save<S, T>(store: &mut S, key: &str, value: &T) -> anyhow::Result<()>
where
    S: KeyValueStore + ?Sized,
    T: Serialize + ?Sized,
{
    let json = serde_json::to_string(value)
        .with_context(|| format!("failed to serialize value for {key}"))?;
    store.set_raw(key, &json)
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_raw(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set_raw(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON document per key inside `dir`.
#[derive(Debug, Clone)]
pub struct FileStore {
    pub dir: PathBuf,
}

impl FileStore {
    #[tracing::instrument(skip(dir))]
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        info!(dir = %dir.display(), "opened local store");
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                    ch
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get_raw(&self, key: &str) -> anyhow::Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    #[tracing::instrument(skip(self, value))]
    fn set_raw(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key);
        write_atomic(&path, value)
    }
}

/// Writes `contents` to a temp file next to `path` and renames it over.
#[tracing::instrument(skip(path, contents))]
pub fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    debug!(file = %path.display(), bytes = contents.len(), "writing file atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(contents.as_bytes())?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

pub fn default_tax_figures() -> TaxFigures {
    DEFAULT_TAX_CATEGORIES
        .iter()
        .map(|name| (name.to_string(), 0.0))
        .collect()
}

/// Tax figures and payment history mirrored into local storage. Reads fall
/// back to defaults; every mutation rewrites the whole document.
#[derive(Debug)]
pub struct TaxLedger<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> TaxLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    pub fn figures(&self) -> TaxFigures {
        load_or_default(&self.store, TAX_FIGURES_KEY, default_tax_figures())
    }

    #[tracing::instrument(skip(self))]
    pub fn set_figure(&mut self, category: &str, amount: f64) -> anyhow::Result<TaxFigures> {
        let category = category.trim();
        if category.is_empty() {
            return Err(anyhow!("tax category cannot be empty"));
        }
        if !amount.is_finite() {
            return Err(anyhow!("tax amount must be a finite number"));
        }

        let mut figures = self.figures();
        figures.insert(category.to_string(), amount);
        save(&mut self.store, TAX_FIGURES_KEY, &figures)?;
        info!(category, amount, "updated tax figure");
        Ok(figures)
    }

    pub fn total(&self) -> f64 {
        self.figures().values().sum()
    }

    pub fn payments(&self) -> Vec<TaxPayment> {
        load_or_default(&self.store, TAX_PAYMENTS_KEY, Vec::new())
    }

    #[tracing::instrument(skip(self, draft), fields(tax_type = %draft.tax_type))]
    pub fn record_payment(&mut self, draft: TaxPaymentDraft) -> anyhow::Result<TaxPayment> {
        let payment_date: NaiveDate = draft.validate()?;
        let payment = TaxPayment {
            id: Uuid::new_v4(),
            tax_type: draft.tax_type.trim().to_string(),
            amount: draft.amount,
            payment_date,
            status: TaxPaymentStatus::Paid,
            note: draft.note.filter(|note| !note.trim().is_empty()),
        };

        let mut history = self.payments();
        history.push(payment.clone());
        save(&mut self.store, TAX_PAYMENTS_KEY, &history)?;
        info!(id = %payment.id, amount = payment.amount, "recorded tax payment");
        Ok(payment)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::validation::ValidationError;

    fn draft(amount: f64) -> TaxPaymentDraft {
        TaxPaymentDraft {
            tax_type: "payroll".to_string(),
            amount,
            payment_date: NaiveDate::from_ymd_opt(2026, 10, 15),
            note: Some("Q3".to_string()),
        }
    }

    #[test]
    fn missing_and_corrupt_entries_fall_back() {
        let mut store = MemoryStore::new();
        let fallback: Vec<String> = load_or_default(&store, "absent", vec!["x".to_string()]);
        assert_eq!(fallback, vec!["x".to_string()]);

        store.set_raw(TAX_FIGURES_KEY, "{not json").expect("set raw");
        let ledger = TaxLedger::new(store);
        assert_eq!(ledger.figures(), default_tax_figures());
    }

    #[test]
    fn figures_are_written_back_whole() {
        let mut ledger = TaxLedger::new(MemoryStore::new());
        ledger.set_figure("payroll", 1200.0).expect("set payroll");
        ledger.set_figure("vat", 300.5).expect("set vat");

        let figures = ledger.figures();
        assert_eq!(figures.get("payroll"), Some(&1200.0));
        assert_eq!(figures.get("vat"), Some(&300.5));
        assert_eq!(figures.get("income"), Some(&0.0));
        assert!((ledger.total() - 1500.5).abs() < f64::EPSILON);

        let store = ledger.into_inner();
        let raw = store
            .get_raw(TAX_FIGURES_KEY)
            .expect("get raw")
            .expect("stored");
        let parsed: TaxFigures = serde_json::from_str(&raw).expect("json");
        assert_eq!(parsed.len(), 5);
    }

    #[test]
    fn invalid_payment_is_rejected_before_write() {
        let mut ledger = TaxLedger::new(MemoryStore::new());
        let err = ledger.record_payment(draft(-5.0)).expect_err("negative amount");
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::NonPositiveAmount)
        );
        assert!(ledger.payments().is_empty());
    }

    #[test]
    fn file_store_persists_payment_history() {
        let temp = tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open store");
        let mut ledger = TaxLedger::new(store);
        let first = ledger.record_payment(draft(100.0)).expect("record");
        ledger.record_payment(draft(50.0)).expect("record");

        let reopened = TaxLedger::new(FileStore::open(temp.path()).expect("reopen"));
        let history = reopened.payments();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, first.id);
        assert_eq!(history[0].status, TaxPaymentStatus::Paid);
        assert!(temp.path().join("hospital_tax_payments.json").exists());
    }

    #[test]
    fn blank_category_is_refused() {
        let mut ledger = TaxLedger::new(MemoryStore::new());
        assert!(ledger.set_figure("  ", 10.0).is_err());
    }
}
