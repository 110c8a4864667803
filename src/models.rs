use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backend::ClinicBackend;
use crate::engine::directory::TherapistDirectory;
use crate::engine::session::PatientSession;

/// Backend identifiers are plain integers.
pub type Id = i64;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn ClinicBackend>,
    pub settings: EngineSettings,
    pub sessions: Arc<RwLock<HashMap<Uuid, Arc<PatientSession>>>>,
    pub therapists: Arc<TherapistDirectory>,
}

impl AppState {
    pub fn new(backend: Arc<dyn ClinicBackend>, settings: EngineSettings) -> Self {
        let therapists = Arc::new(TherapistDirectory::new(
            settings.therapist_cache_ttl,
            settings.therapist_page_size,
        ));
        Self {
            backend,
            settings,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            therapists,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub iud_method_id: Id,
    pub history_cache_ttl: Duration,
    pub therapist_cache_ttl: Duration,
    pub therapist_page_size: u32,
    /// Sessions untouched for this long are dropped.
    pub session_idle_ttl: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            iud_method_id: 4,
            history_cache_ttl: Duration::from_secs(60),
            therapist_cache_ttl: Duration::from_secs(300),
            therapist_page_size: 20,
            session_idle_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/* -------------------------
   Backend entities
--------------------------*/

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "F", alias = "f", alias = "female", alias = "FEMALE", alias = "FEMENINO")]
    Female,
    #[serde(rename = "M", alias = "m", alias = "male", alias = "MALE", alias = "MASCULINO")]
    Male,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub paternal_lastname: Option<String>,
    #[serde(default)]
    pub maternal_lastname: Option<String>,
    #[serde(default)]
    pub sex: Sex,
    #[serde(default)]
    pub document_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Therapist {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub paternal_lastname: Option<String>,
    #[serde(default)]
    pub maternal_lastname: Option<String>,
}

impl Therapist {
    pub fn display_name(&self) -> String {
        let mut parts = vec![self.name.trim()];
        for p in [&self.paternal_lastname, &self.maternal_lastname].into_iter().flatten() {
            let p = p.trim();
            if !p.is_empty() {
                parts.push(p);
            }
        }
        parts.retain(|p| !p.is_empty());
        parts.join(" ")
    }
}

/// Longitudinal clinical record. A default value is the empty placeholder
/// envelope the backend hands out before the first write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalHistory {
    #[serde(default)]
    pub id: Option<Id>,
    #[serde(default)]
    pub patient_id: Option<Id>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub height: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub last_weight: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub current_weight: Option<f64>,

    #[serde(default)]
    pub observation: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    #[serde(default)]
    pub chronic_conditions: Option<String>,
    #[serde(default)]
    pub family_history: Option<String>,
    #[serde(default)]
    pub habits: Option<String>,

    #[serde(default)]
    pub use_contraceptive: Option<bool>,
    #[serde(default)]
    pub contraceptive_method_id: Option<Id>,
    #[serde(default)]
    pub diu_type_id: Option<Id>,
    #[serde(default)]
    pub pregnant: Option<bool>,
    #[serde(default)]
    pub last_menstruation: Option<String>,

    #[serde(default)]
    pub therapist_id: Option<Id>,
    #[serde(default)]
    pub therapist: Option<Therapist>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Confirmed,
    /// Values this engine never assigns but may read back from the backend.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Id,
    /// Visit date exactly as the backend sends it.
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub status: AppointmentStatus,

    #[serde(default)]
    pub therapist_id: Option<Id>,
    #[serde(default)]
    pub therapist: Option<Therapist>,
    /// Reference to the clinical history this visit was recorded against.
    #[serde(default)]
    pub history_id: Option<Id>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub payment: Option<f64>,
    #[serde(default)]
    pub payment_type_id: Option<Id>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ticket_number: Option<f64>,
    /// Computed by the backend on write.
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total: Option<f64>,

    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub ailments: Option<String>,
    #[serde(default)]
    pub medications: Option<String>,
    #[serde(default)]
    pub surgeries: Option<String>,
    #[serde(default)]
    pub reflexology_notes: Option<String>,
    #[serde(default)]
    pub observation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientAppointments {
    #[serde(default)]
    pub appointments: Vec<Appointment>,
    #[serde(default)]
    pub patient: Option<Patient>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TherapistPage {
    pub items: Vec<Therapist>,
    pub total: u64,
}

/* -------------------------
   Write payloads
--------------------------*/

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistoryPatch {
    pub height: Option<f64>,
    pub last_weight: Option<f64>,
    pub current_weight: Option<f64>,
    pub observation: Option<String>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<String>,
    pub family_history: Option<String>,
    pub habits: Option<String>,
    pub therapist_id: Option<Id>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub reproductive: Option<ReproductivePatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReproductivePatch {
    pub use_contraceptive: Option<bool>,
    pub contraceptive_method_id: Option<Id>,
    pub diu_type_id: Option<Id>,
    pub pregnant: Option<bool>,
    pub last_menstruation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppointmentPatch {
    pub status: AppointmentStatus,
    pub therapist_id: Option<Id>,
    pub payment: Option<f64>,
    pub payment_type_id: Option<Id>,
    pub ticket_number: Option<f64>,
    pub diagnosis: Option<String>,
    pub ailments: Option<String>,
    pub medications: Option<String>,
    pub surgeries: Option<String>,
    pub reflexology_notes: Option<String>,
    pub observation: Option<String>,
}

/* -------------------------
   Helpers
--------------------------*/

/// Measurements show up as numbers, numeric strings or blanks depending on
/// which backend path produced them.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Num(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            s.replace(',', ".")
                .parse::<f64>()
                .map(Some)
                .map_err(serde::de::Error::custom)
        }
    }
}

/// Distinguishes an absent field from an explicit `null` in PATCH-like bodies.
pub fn deserialize_double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    // only called when the field is present: null => Some(None), value => Some(Some(value))
    let inner = Option::<T>::deserialize(deserializer)?;
    Ok(Some(inner))
}
