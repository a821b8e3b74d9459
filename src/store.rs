//! Profile and alert-state persistence.
//!
//! Two record kinds share one key-value backend, namespaced by kind and
//! owner: `PROFILE#<owner>` (read-only here) and `ALERT_STATE#<owner>`.
//! Records are stored as JSON text. Alert-state writes are compare-and-set
//! against the exact text that was read, so of two overlapping runs only
//! the first writer wins.

use crate::model::{AlertState, Profile, RunError};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use thiserror::Error;

/// Driver error from a concrete backend. The postgres conversion lives in
/// `db`.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[source] BackendError),
    #[error("record {key} is not valid JSON: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("cannot encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

impl From<StoreError> for RunError {
    fn from(e: StoreError) -> Self {
        RunError::StoreUnavailable(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Applied,
    /// The stored value no longer matched the expected previous value.
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Profile,
    AlertState,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Profile => "PROFILE",
            RecordKind::AlertState => "ALERT_STATE",
        }
    }
}

pub fn record_key(kind: RecordKind, owner_id: &str) -> String {
    format!("{}#{}", kind.as_str(), owner_id)
}

// ---------------------------------------------------------------------------
// Backend contract
// ---------------------------------------------------------------------------

pub trait KvBackend {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes `value` only if the stored value equals `expected`, where
    /// `None` means the key must not exist yet.
    fn conditional_put(
        &mut self,
        key: &str,
        value: &str,
        expected: Option<&str>,
    ) -> Result<PutOutcome, StoreError>;
}

/// In-process backend for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    records: HashMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditional write, standing in for the external seeding step.
    pub fn insert(&mut self, key: &str, value: &str) {
        self.records.insert(key.to_string(), value.to_string());
    }

    pub fn raw(&self, key: &str) -> Option<&str> {
        self.records.get(key).map(String::as_str)
    }
}

impl KvBackend for MemoryBackend {
    fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.records.get(key).cloned())
    }

    fn conditional_put(
        &mut self,
        key: &str,
        value: &str,
        expected: Option<&str>,
    ) -> Result<PutOutcome, StoreError> {
        if self.records.get(key).map(String::as_str) != expected {
            return Ok(PutOutcome::Conflict);
        }
        self.records.insert(key.to_string(), value.to_string());
        Ok(PutOutcome::Applied)
    }
}

// ---------------------------------------------------------------------------
// Typed adapter
// ---------------------------------------------------------------------------

/// A decoded record together with the exact stored text it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    raw: String,
}

impl<T> Versioned<T> {
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

pub struct StateStore<B> {
    backend: B,
}

impl<B: KvBackend> StateStore<B> {
    pub fn new(backend: B) -> Self {
        StateStore { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn get_json<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<Versioned<T>>, StoreError> {
        let Some(raw) = self.backend.get(key)? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(Versioned { value, raw }))
    }

    pub fn get_profile(&mut self, owner_id: &str) -> Result<Option<Profile>, StoreError> {
        let key = record_key(RecordKind::Profile, owner_id);
        Ok(self.get_json::<Profile>(&key)?.map(|v| v.value))
    }

    pub fn get_alert_state(
        &mut self,
        owner_id: &str,
    ) -> Result<Option<Versioned<AlertState>>, StoreError> {
        self.get_json(&record_key(RecordKind::AlertState, owner_id))
    }

    /// Compare-and-set write of the alert state against what was read.
    pub fn put_alert_state(
        &mut self,
        owner_id: &str,
        next: &AlertState,
        expected: Option<&Versioned<AlertState>>,
    ) -> Result<PutOutcome, StoreError> {
        let key = record_key(RecordKind::AlertState, owner_id);
        let body = serde_json::to_string(next)?;
        self.backend
            .conditional_put(&key, &body, expected.map(Versioned::raw))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
