//! Dual-entity commit: history and appointment are written concurrently, both
//! outcomes are reported, and the resolved views are refreshed only when both
//! writes succeeded. A failed side is not rolled back.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use super::appointments::AppointmentSet;
use super::resolver::Resolution;
use crate::backend::ClinicBackend;
use crate::error::EngineError;
use crate::models::{AppointmentPatch, HistoryPatch, Id};

/// Where the history write goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKey {
    Id(Id),
    /// History not created yet; written through the patient path.
    Patient(Id),
}

#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub history_key: HistoryKey,
    pub history: HistoryPatch,
    pub appointment_id: Option<Id>,
    pub appointment: AppointmentPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SideOutcome {
    Success,
    Failure { error: String },
}

impl SideOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SideOutcome::Success)
    }

    fn label(&self) -> &'static str {
        match self {
            SideOutcome::Success => "succeeded",
            SideOutcome::Failure { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitResult {
    pub history: SideOutcome,
    pub appointment: SideOutcome,
    pub refreshed: bool,
}

impl CommitResult {
    pub fn is_success(&self) -> bool {
        self.history.is_success() && self.appointment.is_success()
    }

    pub fn error(&self) -> Option<EngineError> {
        if self.is_success() {
            return None;
        }
        Some(EngineError::PartialCommit {
            history: self.history.label(),
            appointment: self.appointment.label(),
        })
    }
}

/// Fresh copies of both resolved views.
#[async_trait]
pub trait Refresh: Send + Sync {
    async fn refresh_history(&self) -> Result<Resolution, EngineError>;
    async fn refresh_appointments(&self) -> Result<AppointmentSet, EngineError>;
}

pub struct Refreshed {
    pub history: Result<Resolution, EngineError>,
    pub appointments: Result<AppointmentSet, EngineError>,
}

pub struct CommitOutcome {
    pub result: CommitResult,
    pub refreshed: Option<Refreshed>,
}

pub async fn commit(
    backend: &dyn ClinicBackend,
    req: &CommitRequest,
    refresh: &dyn Refresh,
) -> Result<CommitOutcome, EngineError> {
    let Some(appointment_id) = req.appointment_id else {
        return Err(EngineError::Validation(
            "no visit selected; appointment id is required".into(),
        ));
    };

    let history_write = async {
        match req.history_key {
            HistoryKey::Id(id) => backend.patch_history(id, &req.history).await,
            HistoryKey::Patient(pid) => backend.patch_history_by_patient(pid, &req.history).await,
        }
    };
    let appointment_write = backend.patch_appointment(appointment_id, &req.appointment);

    let (history, appointment) = tokio::join!(history_write, appointment_write);

    let history = outcome("history", history);
    let appointment = outcome("appointment", appointment);

    let mut result = CommitResult {
        history,
        appointment,
        refreshed: false,
    };

    if !result.is_success() {
        warn!(
            history_key = ?req.history_key,
            appointment_id,
            history = result.history.label(),
            appointment = result.appointment.label(),
            "commit incomplete, no refresh"
        );
        return Ok(CommitOutcome {
            result,
            refreshed: None,
        });
    }

    info!(history_key = ?req.history_key, appointment_id, "commit succeeded, refreshing");
    let (history, appointments) = tokio::join!(refresh.refresh_history(), refresh.refresh_appointments());
    result.refreshed = true;

    Ok(CommitOutcome {
        result,
        refreshed: Some(Refreshed {
            history,
            appointments,
        }),
    })
}

fn outcome<E: std::fmt::Display>(side: &str, r: Result<(), E>) -> SideOutcome {
    match r {
        Ok(()) => SideOutcome::Success,
        Err(e) => {
            warn!(side, error = %e, "write failed");
            SideOutcome::Failure {
                error: e.to_string(),
            }
        }
    }
}
