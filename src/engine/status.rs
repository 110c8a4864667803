use crate::models::{AppointmentStatus, Id};

/// The only way this engine assigns a visit status.
pub fn derive_status(therapist_id: Option<Id>) -> AppointmentStatus {
    match therapist_id {
        Some(_) => AppointmentStatus::Confirmed,
        None => AppointmentStatus::Pending,
    }
}
