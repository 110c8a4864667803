//! History resolution: one canonical clinical history per patient, found
//! either directly or through the history id a visit was recorded against.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use super::appointments::sort_by_date_descending;
use super::cache::TtlCache;
use super::normalize::has_text;
use crate::backend::ClinicBackend;
use crate::error::EngineError;
use crate::models::{ClinicalHistory, Id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    Direct,
    DerivedFromAppointment,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub history: ClinicalHistory,
    pub source: HistorySource,
}

/// A direct response only counts when at least one clinical field is filled.
pub fn is_populated(h: &ClinicalHistory) -> bool {
    h.height.is_some() || h.weight.is_some() || h.last_weight.is_some() || has_text(&h.observation)
}

pub struct HistoryResolver {
    cache: Mutex<TtlCache<(Id, Resolution)>>,
}

impl HistoryResolver {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Mutex::new(TtlCache::new(ttl)),
        }
    }

    pub async fn resolve(
        &self,
        backend: &dyn ClinicBackend,
        patient_id: Id,
    ) -> Result<Resolution, EngineError> {
        if let Some((cached_for, hit)) = self.cached() {
            if cached_for == patient_id {
                debug!(patient_id, "history served from cache");
                return Ok(hit);
            }
        }

        let resolution = resolve_uncached(backend, patient_id).await?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.put((patient_id, resolution.clone()));
        }
        Ok(resolution)
    }

    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.invalidate();
        }
    }

    fn cached(&self) -> Option<(Id, Resolution)> {
        self.cache.lock().ok().and_then(|c| c.get())
    }
}

async fn resolve_uncached(
    backend: &dyn ClinicBackend,
    patient_id: Id,
) -> Result<Resolution, EngineError> {
    let direct = backend
        .history_by_patient(patient_id)
        .await
        .map_err(|e| EngineError::Resolution(format!("history for patient {patient_id}: {e}")))?;

    if is_populated(&direct) {
        info!(patient_id, history_id = ?direct.id, "history resolved directly");
        return Ok(Resolution {
            history: direct,
            source: HistorySource::Direct,
        });
    }

    let mut visits = backend
        .appointments_by_patient(patient_id)
        .await
        .map_err(|e| {
            EngineError::Resolution(format!("appointments for patient {patient_id}: {e}"))
        })?
        .appointments;
    sort_by_date_descending(&mut visits);

    let Some((anchor, history_id)) = visits
        .into_iter()
        .find_map(|a| a.history_id.map(|id| (a, id)))
    else {
        debug!(patient_id, "no history found, keeping placeholder");
        return Ok(Resolution {
            history: direct,
            source: HistorySource::None,
        });
    };

    let mut history = backend
        .history_by_id(history_id)
        .await
        .map_err(|e| EngineError::Resolution(format!("history {history_id}: {e}")))?;

    // the by-id response does not carry the bound therapist
    history.therapist_id = anchor.therapist_id;
    history.therapist = anchor.therapist;
    if history.id.is_none() {
        history.id = Some(history_id);
    }

    info!(
        patient_id,
        history_id,
        appointment_id = anchor.id,
        "history derived from appointment"
    );
    Ok(Resolution {
        history,
        source: HistorySource::DerivedFromAppointment,
    })
}
