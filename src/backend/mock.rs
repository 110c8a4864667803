use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{BackendError, ClinicBackend, Credentials};
use crate::models::{
    Appointment, AppointmentPatch, ClinicalHistory, HistoryPatch, Id, Patient, PatientAppointments,
    Therapist,
};

#[derive(Default)]
pub struct Calls {
    pub history_by_patient: AtomicUsize,
    pub history_by_id: AtomicUsize,
    pub patch_history: AtomicUsize,
    pub patch_history_by_patient: AtomicUsize,
    pub appointments_by_patient: AtomicUsize,
    pub patch_appointment: AtomicUsize,
    pub therapists: AtomicUsize,
}

impl Calls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        Self::get(&self.patch_history)
            + Self::get(&self.patch_history_by_patient)
            + Self::get(&self.patch_appointment)
    }

    pub fn total(&self) -> usize {
        self.writes()
            + Self::get(&self.history_by_patient)
            + Self::get(&self.history_by_id)
            + Self::get(&self.appointments_by_patient)
            + Self::get(&self.therapists)
    }
}

#[derive(Default)]
struct Store {
    direct: HashMap<Id, ClinicalHistory>,
    by_id: HashMap<Id, ClinicalHistory>,
    appointments: HashMap<Id, Vec<Appointment>>,
    patients: HashMap<Id, Patient>,
    therapist_listing: Value,
    history_patches: Vec<(Option<Id>, Option<Id>, HistoryPatch)>,
    appointment_patches: Vec<(Id, AppointmentPatch)>,
    fail_history_reads: bool,
    fail_appointment_reads: bool,
    fail_history_write: bool,
    fail_appointment_write: bool,
    bearer: Option<String>,
    journal: Vec<String>,
}

/// In-memory backend with call counters and switchable failures.
#[derive(Clone, Default)]
pub struct MockBackend {
    store: Arc<Mutex<Store>>,
    pub calls: Arc<Calls>,
}

impl MockBackend {
    pub fn new() -> Self {
        let mock = Self::default();
        mock.store.lock().unwrap().therapist_listing = json!([]);
        mock
    }

    pub fn with_direct_history(self, patient_id: Id, h: ClinicalHistory) -> Self {
        self.store.lock().unwrap().direct.insert(patient_id, h);
        self
    }

    /// Replaces the direct history, as another writer would.
    pub fn set_direct_history(&self, patient_id: Id, h: ClinicalHistory) {
        self.store.lock().unwrap().direct.insert(patient_id, h);
    }

    pub fn with_history(self, h: ClinicalHistory) -> Self {
        let id = h.id.expect("history fixture needs an id");
        self.store.lock().unwrap().by_id.insert(id, h);
        self
    }

    pub fn with_appointments(self, patient_id: Id, list: Vec<Appointment>) -> Self {
        self.store.lock().unwrap().appointments.insert(patient_id, list);
        self
    }

    pub fn with_patient(self, p: Patient) -> Self {
        self.store.lock().unwrap().patients.insert(p.id, p);
        self
    }

    pub fn with_therapist_listing(self, v: Value) -> Self {
        self.store.lock().unwrap().therapist_listing = v;
        self
    }

    pub fn fail_history_reads(&self, on: bool) {
        self.store.lock().unwrap().fail_history_reads = on;
    }

    pub fn fail_appointment_reads(&self, on: bool) {
        self.store.lock().unwrap().fail_appointment_reads = on;
    }

    pub fn fail_history_write(&self, on: bool) {
        self.store.lock().unwrap().fail_history_write = on;
    }

    pub fn fail_appointment_write(&self, on: bool) {
        self.store.lock().unwrap().fail_appointment_write = on;
    }

    pub fn history_patches(&self) -> Vec<(Option<Id>, Option<Id>, HistoryPatch)> {
        self.store.lock().unwrap().history_patches.clone()
    }

    pub fn appointment_patches(&self) -> Vec<(Id, AppointmentPatch)> {
        self.store.lock().unwrap().appointment_patches.clone()
    }

    pub fn bearer(&self) -> Option<String> {
        self.store.lock().unwrap().bearer.clone()
    }

    /// Ordered `<call>:start` / `<call>:end` entries for writes, plus anything
    /// recorded through `note`.
    pub fn journal(&self) -> Vec<String> {
        self.store.lock().unwrap().journal.clone()
    }

    pub fn note(&self, entry: &str) {
        self.store.lock().unwrap().journal.push(entry.to_string());
    }

    /// Marks the start of a write and yields once, so a concurrent caller
    /// gets to start its own write before this one finishes.
    async fn begin_write(&self, name: &str) {
        self.note(&format!("{name}:start"));
        tokio::task::yield_now().await;
    }

    fn down() -> BackendError {
        BackendError::Status {
            status: 503,
            body: "unavailable".into(),
        }
    }
}

pub fn therapist(id: Id, name: &str) -> Therapist {
    Therapist {
        id,
        name: name.into(),
        paternal_lastname: None,
        maternal_lastname: None,
    }
}

pub fn visit(id: Id, date: &str) -> Appointment {
    Appointment {
        id,
        date: date.into(),
        ..Default::default()
    }
}

#[async_trait]
impl ClinicBackend for MockBackend {
    fn with_credentials(&self, creds: &Credentials) -> Arc<dyn ClinicBackend> {
        self.store.lock().unwrap().bearer = creds.bearer.clone();
        Arc::new(self.clone())
    }

    async fn history_by_patient(&self, patient_id: Id) -> Result<ClinicalHistory, BackendError> {
        self.calls.history_by_patient.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let store = self.store.lock().unwrap();
        if store.fail_history_reads {
            return Err(Self::down());
        }
        Ok(store.direct.get(&patient_id).cloned().unwrap_or_default())
    }

    async fn history_by_id(&self, history_id: Id) -> Result<ClinicalHistory, BackendError> {
        self.calls.history_by_id.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let store = self.store.lock().unwrap();
        if store.fail_history_reads {
            return Err(Self::down());
        }
        store.by_id.get(&history_id).cloned().ok_or(BackendError::Status {
            status: 404,
            body: "history not found".into(),
        })
    }

    async fn patch_history(&self, history_id: Id, payload: &HistoryPatch) -> Result<(), BackendError> {
        self.calls.patch_history.fetch_add(1, Ordering::SeqCst);
        self.begin_write("patch_history").await;
        let mut store = self.store.lock().unwrap();
        store.journal.push("patch_history:end".into());
        if store.fail_history_write {
            return Err(Self::down());
        }
        store
            .history_patches
            .push((Some(history_id), None, payload.clone()));
        Ok(())
    }

    async fn patch_history_by_patient(
        &self,
        patient_id: Id,
        payload: &HistoryPatch,
    ) -> Result<(), BackendError> {
        self.calls
            .patch_history_by_patient
            .fetch_add(1, Ordering::SeqCst);
        self.begin_write("patch_history_by_patient").await;
        let mut store = self.store.lock().unwrap();
        store.journal.push("patch_history_by_patient:end".into());
        if store.fail_history_write {
            return Err(Self::down());
        }
        store
            .history_patches
            .push((None, Some(patient_id), payload.clone()));
        Ok(())
    }

    async fn appointments_by_patient(&self, patient_id: Id) -> Result<PatientAppointments, BackendError> {
        self.calls
            .appointments_by_patient
            .fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        let store = self.store.lock().unwrap();
        if store.fail_appointment_reads {
            return Err(Self::down());
        }
        Ok(PatientAppointments {
            appointments: store
                .appointments
                .get(&patient_id)
                .cloned()
                .unwrap_or_default(),
            patient: store.patients.get(&patient_id).cloned(),
        })
    }

    async fn patch_appointment(
        &self,
        appointment_id: Id,
        payload: &AppointmentPatch,
    ) -> Result<(), BackendError> {
        self.calls.patch_appointment.fetch_add(1, Ordering::SeqCst);
        self.begin_write("patch_appointment").await;
        let mut store = self.store.lock().unwrap();
        store.journal.push("patch_appointment:end".into());
        if store.fail_appointment_write {
            return Err(Self::down());
        }
        store
            .appointment_patches
            .push((appointment_id, payload.clone()));
        Ok(())
    }

    async fn therapists(&self, _page: u32, _page_size: u32) -> Result<Value, BackendError> {
        self.calls.therapists.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.lock().unwrap().therapist_listing.clone())
    }

    async fn search_therapists(
        &self,
        _term: &str,
        _page: u32,
        _page_size: u32,
    ) -> Result<Value, BackendError> {
        self.calls.therapists.fetch_add(1, Ordering::SeqCst);
        Ok(self.store.lock().unwrap().therapist_listing.clone())
    }
}
