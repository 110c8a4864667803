use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::debug;

use crate::backend::ClinicBackend;
use crate::error::EngineError;
use crate::models::{Appointment, Id, Patient};

/// A patient's visits, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppointmentSet {
    pub appointments: Vec<Appointment>,
    pub patient: Option<Patient>,
}

pub async fn load(backend: &dyn ClinicBackend, patient_id: Id) -> Result<AppointmentSet, EngineError> {
    let resp = backend
        .appointments_by_patient(patient_id)
        .await
        .map_err(|e| EngineError::Resolution(format!("appointments for patient {patient_id}: {e}")))?;

    let mut appointments = resp.appointments;
    sort_by_date_descending(&mut appointments);
    debug!(patient_id, count = appointments.len(), "appointments loaded");

    Ok(AppointmentSet {
        appointments,
        patient: resp.patient,
    })
}

/// Stable sort, newest first. Dates that do not parse sort last in their
/// original order.
pub fn sort_by_date_descending(list: &mut [Appointment]) {
    list.sort_by(|a, b| sort_key(&b.date).cmp(&sort_key(&a.date)));
}

fn sort_key(date: &str) -> Option<NaiveDateTime> {
    let date = date.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(date.get(..10).unwrap_or(date), "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl AppointmentSet {
    /// Distinct visit dates in display order.
    pub fn unique_dates(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for a in &self.appointments {
            if !out.iter().any(|d| d == &a.date) {
                out.push(a.date.clone());
            }
        }
        out
    }

    /// First visit whose date string equals `date` exactly.
    pub fn find_by_date(&self, date: &str) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.date == date)
    }

    pub fn find_by_id(&self, id: Id) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn most_recent(&self) -> Option<&Appointment> {
        self.appointments.first()
    }
}
