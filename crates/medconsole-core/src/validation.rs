use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::datetime::parse_iso_date;
use crate::model::{Patient, PaymentMethod};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("amount must be greater than zero")]
    NonPositiveAmount,
    #[error("invalid date: {0}")]
    InvalidDate(String),
    #[error("due date {due} is before issue date {issued}")]
    DueBeforeIssue { issued: NaiveDate, due: NaiveDate },
    #[error("invalid email address: {0}")]
    InvalidEmail(String),
    #[error("no patient fields to update")]
    EmptyUpdate,
}

fn positive_amount(amount: f64) -> Result<(), ValidationError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::NonPositiveAmount);
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDraft {
    pub patient_id: String,
    pub clinician_ids: Vec<String>,
    pub date: String,
    pub time: String,
    pub reason: Option<String>,
}

impl AppointmentDraft {
    /// Checks required fields before anything is sent to the backend and
    /// returns the parsed appointment date.
    pub fn validate(&self) -> Result<NaiveDate, ValidationError> {
        if self.patient_id.trim().is_empty() {
            return Err(ValidationError::MissingField("patient"));
        }
        if self.clinician_ids.iter().all(|id| id.trim().is_empty()) {
            return Err(ValidationError::MissingField("clinician"));
        }
        if self.date.trim().is_empty() {
            return Err(ValidationError::MissingField("date"));
        }
        let date = parse_iso_date(&self.date)
            .map_err(|_| ValidationError::InvalidDate(self.date.clone()))?;
        if self.time.trim().is_empty() {
            return Err(ValidationError::MissingField("time"));
        }
        Ok(date)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaxPaymentDraft {
    pub tax_type: String,
    pub amount: f64,
    pub payment_date: Option<NaiveDate>,
    pub note: Option<String>,
}

impl TaxPaymentDraft {
    pub fn validate(&self) -> Result<NaiveDate, ValidationError> {
        if self.tax_type.trim().is_empty() {
            return Err(ValidationError::MissingField("tax type"));
        }
        positive_amount(self.amount)?;
        self.payment_date
            .ok_or(ValidationError::MissingField("payment date"))
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BillingDraft {
    pub patient_id: String,
    pub description: String,
    pub amount: f64,
    pub issued_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

impl BillingDraft {
    /// Returns the issue and due dates once the draft is complete.
    pub fn validate(&self) -> Result<(NaiveDate, NaiveDate), ValidationError> {
        if self.patient_id.trim().is_empty() {
            return Err(ValidationError::MissingField("patient"));
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::MissingField("description"));
        }
        positive_amount(self.amount)?;
        let issued = self
            .issued_date
            .ok_or(ValidationError::MissingField("issue date"))?;
        let due = self.due_date.ok_or(ValidationError::MissingField("due date"))?;
        if due < issued {
            return Err(ValidationError::DueBeforeIssue { issued, due });
        }
        Ok((issued, due))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDraft {
    pub billing_record_id: String,
    pub amount: f64,
    pub method: PaymentMethod,
    pub date: Option<NaiveDate>,
    pub note: Option<String>,
}

impl TransactionDraft {
    pub fn validate(&self) -> Result<NaiveDate, ValidationError> {
        if self.billing_record_id.trim().is_empty() {
            return Err(ValidationError::MissingField("billing record"));
        }
        positive_amount(self.amount)?;
        self.date.ok_or(ValidationError::MissingField("payment date"))
    }
}

/// Partial patient edit; only the fields that are set are sent.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PatientUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl PatientUpdate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_none() && self.phone.is_none() && self.email.is_none() && self.address.is_none() {
            return Err(ValidationError::EmptyUpdate);
        }
        if let Some(name) = &self.name
            && name.trim().is_empty()
        {
            return Err(ValidationError::MissingField("name"));
        }
        if let Some(email) = &self.email
            && !email.trim().is_empty()
            && !email.contains('@')
        {
            return Err(ValidationError::InvalidEmail(email.clone()));
        }
        Ok(())
    }

    /// Copies the set fields onto `patient`. Blank contact fields clear
    /// the stored value.
    pub fn apply_to(&self, patient: &mut Patient) {
        if let Some(name) = &self.name {
            patient.name = name.trim().to_string();
        }
        let contact = |value: &String| Some(value.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(phone) = &self.phone {
            patient.phone = contact(phone);
        }
        if let Some(email) = &self.email {
            patient.email = contact(email);
        }
        if let Some(address) = &self.address {
            patient.address = contact(address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> AppointmentDraft {
        AppointmentDraft {
            patient_id: "p-1".to_string(),
            clinician_ids: vec!["c-1".to_string()],
            date: "2026-11-02".to_string(),
            time: "10:15".to_string(),
            reason: Some("follow-up".to_string()),
        }
    }

    #[test]
    fn complete_appointment_draft_passes() {
        let date = draft().validate().expect("valid draft");
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 11, 2).expect("valid date"));
    }

    #[test]
    fn appointment_draft_reports_first_missing_field() {
        let mut d = draft();
        d.clinician_ids = vec![" ".to_string()];
        assert_eq!(d.validate(), Err(ValidationError::MissingField("clinician")));

        let mut d = draft();
        d.date = "11/02/2026".to_string();
        assert_eq!(
            d.validate(),
            Err(ValidationError::InvalidDate("11/02/2026".to_string()))
        );
    }

    #[test]
    fn tax_payment_needs_positive_amount() {
        let mut d = TaxPaymentDraft {
            tax_type: "payroll".to_string(),
            amount: 0.0,
            payment_date: NaiveDate::from_ymd_opt(2026, 10, 1),
            note: None,
        };
        assert_eq!(d.validate(), Err(ValidationError::NonPositiveAmount));
        d.amount = f64::NAN;
        assert_eq!(d.validate(), Err(ValidationError::NonPositiveAmount));
        d.amount = 1250.5;
        assert!(d.validate().is_ok());
        d.payment_date = None;
        assert_eq!(
            d.validate(),
            Err(ValidationError::MissingField("payment date"))
        );
        assert_eq!(
            ValidationError::MissingField("payment date").to_string(),
            "payment date is required"
        );
    }

    #[test]
    fn billing_draft_checks_amount_and_dates() {
        let issued = NaiveDate::from_ymd_opt(2026, 10, 1).expect("valid date");
        let mut draft = BillingDraft {
            patient_id: "p-1".to_string(),
            description: "Lab panel".to_string(),
            amount: -5.0,
            issued_date: Some(issued),
            due_date: NaiveDate::from_ymd_opt(2026, 9, 1),
        };
        assert_eq!(draft.validate(), Err(ValidationError::NonPositiveAmount));
        draft.amount = 80.0;
        assert!(matches!(
            draft.validate(),
            Err(ValidationError::DueBeforeIssue { .. })
        ));
        draft.due_date = NaiveDate::from_ymd_opt(2026, 10, 31);
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn patient_update_needs_a_field_and_a_plausible_email() {
        assert_eq!(PatientUpdate::default().validate(), Err(ValidationError::EmptyUpdate));

        let update = PatientUpdate {
            email: Some("ada.example.test".to_string()),
            ..PatientUpdate::default()
        };
        assert!(matches!(update.validate(), Err(ValidationError::InvalidEmail(_))));

        let mut patient = Patient {
            id: "p-1".to_string(),
            name: "Ada Obi".to_string(),
            mrn: None,
            date_of_birth: None,
            phone: Some("555-0100".to_string()),
            email: None,
            address: None,
        };
        let update = PatientUpdate {
            phone: Some(" ".to_string()),
            email: Some("ada@example.test".to_string()),
            ..PatientUpdate::default()
        };
        update.validate().expect("valid update");
        update.apply_to(&mut patient);
        assert_eq!(patient.phone, None);
        assert_eq!(patient.email.as_deref(), Some("ada@example.test"));
        assert_eq!(
            serde_json::to_value(&update).expect("json"),
            serde_json::json!({ "phone": " ", "email": "ada@example.test" })
        );
    }
}
