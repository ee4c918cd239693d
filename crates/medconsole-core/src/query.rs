use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ToastKind {
    Success,
    Error,
}

/// Transient user-facing notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Toast {
    pub kind: ToastKind,
    pub message: String,
}

impl Toast {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ToastKind::Error,
            message: message.into(),
        }
    }
}

/// Converts the outcome of a create/update call into a toast. Write errors
/// stop here.
pub fn write_outcome<T>(result: &anyhow::Result<T>, success: &str) -> Toast {
    match result {
        Ok(_) => Toast::success(success),
        Err(err) => {
            error!(error = %format!("{err:#}"), "write request failed");
            Toast::error(format!("{err:#}"))
        }
    }
}

/// A list read: on failure the items are empty and `error` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub items: Vec<T>,
    pub error: Option<String>,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            error: None,
        }
    }
}

impl<T> Loaded<T> {
    pub fn from_result(what: &str, result: anyhow::Result<Vec<T>>) -> Self {
        match result {
            Ok(items) => {
                debug!(what, count = items.len(), "list loaded");
                Self { items, error: None }
            }
            Err(err) => {
                warn!(what, error = %format!("{err:#}"), "list request failed; showing empty state");
                Self {
                    items: Vec::new(),
                    error: Some(format!("failed to load {what}: {err:#}")),
                }
            }
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Holds the latest result for the current filter key. Responses that
/// arrive for any other key are dropped.
#[derive(Debug, Clone)]
pub struct QuerySlot<K, T> {
    current_key: Option<K>,
    resolved: Option<(K, Loaded<T>)>,
}

impl<K, T> Default for QuerySlot<K, T> {
    fn default() -> Self {
        Self {
            current_key: None,
            resolved: None,
        }
    }
}

impl<K: Clone + PartialEq + Debug, T> QuerySlot<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, key: K) -> K {
        debug!(key = ?key, "query requested");
        self.current_key = Some(key.clone());
        key
    }

    /// Returns whether the response was accepted.
    pub fn resolve(&mut self, key: K, loaded: Loaded<T>) -> bool {
        if self.current_key.as_ref() != Some(&key) {
            debug!(key = ?key, "ignoring stale response");
            return false;
        }
        self.resolved = Some((key, loaded));
        true
    }

    pub fn is_pending(&self) -> bool {
        match (&self.current_key, &self.resolved) {
            (Some(current), Some((key, _))) => current != key,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Result for the current key, if it has resolved.
    pub fn current(&self) -> Option<&Loaded<T>> {
        let current = self.current_key.as_ref()?;
        match &self.resolved {
            Some((key, loaded)) if key == current => Some(loaded),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn failed_read_becomes_empty_with_flag() {
        let loaded: Loaded<u32> = Loaded::from_result("appointments", Err(anyhow!("timeout")));
        assert!(loaded.items.is_empty());
        assert!(loaded.is_error());
        assert_eq!(
            loaded.error.as_deref(),
            Some("failed to load appointments: timeout")
        );

        let ok = Loaded::from_result("appointments", Ok(vec![1, 2]));
        assert_eq!(ok.items, vec![1, 2]);
        assert!(!ok.is_error());
    }

    #[test]
    fn stale_response_is_ignored() {
        let mut slot: QuerySlot<String, u32> = QuerySlot::new();
        let week = slot.request("week".to_string());
        let month = slot.request("month".to_string());
        assert!(slot.is_pending());

        assert!(slot.resolve(month.clone(), Loaded::from_result("q", Ok(vec![30]))));
        assert!(!slot.resolve(week, Loaded::from_result("q", Ok(vec![7]))));

        let current = slot.current().expect("resolved");
        assert_eq!(current.items, vec![30]);
        assert!(!slot.is_pending());
    }

    #[test]
    fn switching_keys_hides_old_result() {
        let mut slot: QuerySlot<&str, u32> = QuerySlot::new();
        let key = slot.request("all");
        slot.resolve(key, Loaded::from_result("q", Ok(vec![1])));
        slot.request("today");
        assert!(slot.current().is_none());
        assert!(slot.is_pending());
    }

    #[test]
    fn write_errors_turn_into_error_toasts() {
        let failed: anyhow::Result<()> = Err(anyhow!("409 conflict"));
        let toast = write_outcome(&failed, "Appointment updated");
        assert_eq!(toast.kind, ToastKind::Error);
        assert_eq!(toast.message, "409 conflict");

        let ok: anyhow::Result<u8> = Ok(1);
        assert_eq!(write_outcome(&ok, "Saved"), Toast::success("Saved"));
    }
}
