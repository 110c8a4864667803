//! Clinic REST backend, as seen by the engine.
//!
//! Only the calls the engine relies on are modelled. Payload shapes beyond
//! these are owned by the backend.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    AppointmentPatch, ClinicalHistory, HistoryPatch, Id, PatientAppointments,
};

pub mod http;
#[cfg(test)]
pub mod mock;

pub use http::HttpBackend;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode error: {0}")]
    Decode(String),
}

/// Caller credentials forwarded verbatim to the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub bearer: Option<String>,
}

#[async_trait]
pub trait ClinicBackend: Send + Sync {
    /// Backend scoped to the caller's credentials.
    fn with_credentials(&self, creds: &Credentials) -> Arc<dyn ClinicBackend>;

    /// May return the empty placeholder history.
    async fn history_by_patient(&self, patient_id: Id) -> Result<ClinicalHistory, BackendError>;

    async fn history_by_id(&self, history_id: Id) -> Result<ClinicalHistory, BackendError>;

    async fn patch_history(&self, history_id: Id, payload: &HistoryPatch) -> Result<(), BackendError>;

    /// Write path for a history whose id is not known yet; the backend
    /// creates it on first write.
    async fn patch_history_by_patient(
        &self,
        patient_id: Id,
        payload: &HistoryPatch,
    ) -> Result<(), BackendError>;

    async fn appointments_by_patient(&self, patient_id: Id) -> Result<PatientAppointments, BackendError>;

    async fn patch_appointment(
        &self,
        appointment_id: Id,
        payload: &AppointmentPatch,
    ) -> Result<(), BackendError>;

    /// Raw therapist listing; see `engine::normalize::therapist_page`.
    async fn therapists(&self, page: u32, page_size: u32) -> Result<serde_json::Value, BackendError>;

    async fn search_therapists(
        &self,
        term: &str,
        page: u32,
        page_size: u32,
    ) -> Result<serde_json::Value, BackendError>;
}
