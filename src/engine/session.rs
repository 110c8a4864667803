//! Per-tab engine state for one patient at a time.
//!
//! Every patient-id change bumps a generation counter. Loads and post-commit
//! refreshes remember the generation they started under and are dropped if it
//! moved on while they were in flight. The state lock is never held across a
//! backend call.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::appointments::{self, AppointmentSet};
use super::cascade::{CascadeField, CascadeGraph, CascadeUpdate};
use super::commit::{self, CommitRequest, CommitResult, HistoryKey, Refresh};
use super::form::{FormDraft, FormValues};
use super::resolver::{HistoryResolver, HistorySource, Resolution};
use super::status::derive_status;
use super::therapist::{on_context_change, BoundContext, TherapistRef, TherapistSelection};
use super::weight::{next_weights, WeightField};
use crate::backend::ClinicBackend;
use crate::error::EngineError;
use crate::models::{
    Appointment, AppointmentStatus, ClinicalHistory, EngineSettings, Id, Patient, Sex,
};

#[derive(Debug, Clone)]
struct Snapshot {
    patient_id: Id,
    resolution: Resolution,
    appointments: AppointmentSet,
    history_error: Option<String>,
    appointments_error: Option<String>,
}

impl Snapshot {
    fn visit(&self, id: Option<Id>) -> Option<&Appointment> {
        id.and_then(|id| self.appointments.find_by_id(id))
    }

    fn show_reproductive(&self) -> bool {
        self.appointments
            .patient
            .as_ref()
            .is_some_and(|p| p.sex == Sex::Female)
    }
}

#[derive(Default)]
struct SessionState {
    generation: u64,
    patient_id: Option<Id>,
    snapshot: Option<Snapshot>,
    selected_visit: Option<Id>,
    draft: FormDraft,
    therapist: TherapistSelection,
    /// Generation a commit is in flight for.
    committing: Option<u64>,
}

impl SessionState {
    /// The snapshot, if it belongs to the current patient.
    fn current(&self) -> Result<&Snapshot, EngineError> {
        match (&self.snapshot, self.patient_id) {
            (Some(s), Some(pid)) if s.patient_id == pid => Ok(s),
            _ => Err(EngineError::NotLoaded),
        }
    }

    /// The snapshot, if the draft may be edited right now. The post-commit
    /// reseed would overwrite anything changed while a commit is in flight.
    fn editable(&self) -> Result<&Snapshot, EngineError> {
        if self.committing == Some(self.generation) {
            return Err(EngineError::CommitInProgress);
        }
        self.current()
    }

    /// Re-binds the therapist to whatever context is now active.
    fn rebind_therapist(&mut self) {
        let Some(snapshot) = self.snapshot.as_ref() else {
            self.therapist.clear();
            return;
        };
        let ctx = match snapshot.visit(self.selected_visit) {
            Some(v) => BoundContext::Visit(v),
            None => BoundContext::History(&snapshot.resolution.history),
        };
        let transition = on_context_change(ctx);
        self.therapist.apply(transition);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub patient_id: Option<Id>,
    pub loading: bool,
    pub patient: Option<Patient>,
    pub history_source: Option<HistorySource>,
    pub history: Option<ClinicalHistory>,
    pub visit_dates: Vec<String>,
    pub selected_visit: Option<Appointment>,
    pub draft: FormDraft,
    pub therapist: Option<TherapistRef>,
    pub status: AppointmentStatus,
    pub show_reproductive: bool,
    pub errors: Vec<String>,
}

pub struct PatientSession {
    resolver: HistoryResolver,
    graph: CascadeGraph,
    state: Mutex<SessionState>,
    last_seen: std::sync::Mutex<Instant>,
}

impl PatientSession {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            resolver: HistoryResolver::new(settings.history_cache_ttl),
            graph: CascadeGraph::contraceptive(settings.iud_method_id),
            state: Mutex::new(SessionState::default()),
            last_seen: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        if let Ok(mut seen) = self.last_seen.lock() {
            *seen = Instant::now();
        }
    }

    pub fn is_idle(&self, ttl: Duration, now: Instant) -> bool {
        self.last_seen
            .lock()
            .map(|seen| now.saturating_duration_since(*seen) >= ttl)
            .unwrap_or(false)
    }

    pub async fn view(&self) -> SessionView {
        let st = self.state.lock().await;
        render(&st)
    }

    /// Loads history and visits for `patient_id` concurrently and rebuilds the
    /// form once both have settled.
    pub async fn load_for_patient(
        &self,
        backend: &dyn ClinicBackend,
        patient_id: Id,
    ) -> Result<SessionView, EngineError> {
        let ticket = {
            let mut st = self.state.lock().await;
            st.generation += 1;
            st.patient_id = Some(patient_id);
            st.generation
        };

        // an explicit load always reads the backend
        self.resolver.invalidate();
        let (history, visits) = tokio::join!(
            self.resolver.resolve(backend, patient_id),
            appointments::load(backend, patient_id)
        );

        let mut st = self.state.lock().await;
        if st.generation != ticket {
            debug!(patient_id, ticket, current = st.generation, "discarding stale load");
            return Err(EngineError::Superseded);
        }

        let (resolution, history_error) = match history {
            Ok(r) => (r, None),
            Err(e) => {
                warn!(patient_id, error = %e, "history unavailable");
                (
                    Resolution {
                        history: ClinicalHistory::default(),
                        source: HistorySource::None,
                    },
                    Some(e.to_string()),
                )
            }
        };
        let (appointments, appointments_error) = match visits {
            Ok(a) => (a, None),
            Err(e) => {
                warn!(patient_id, error = %e, "appointments unavailable");
                (AppointmentSet::default(), Some(e.to_string()))
            }
        };

        let selected = appointments.most_recent().map(|a| a.id);
        let snapshot = Snapshot {
            patient_id,
            resolution,
            appointments,
            history_error,
            appointments_error,
        };
        st.draft = FormDraft::seed(
            &snapshot.resolution.history,
            snapshot.visit(selected),
            &self.graph,
        );
        st.snapshot = Some(snapshot);
        st.selected_visit = selected;
        st.rebind_therapist();

        info!(patient_id, visit = ?selected, "patient loaded");
        Ok(render(&st))
    }

    pub async fn select_visit(&self, date: &str) -> Result<SessionView, EngineError> {
        let mut st = self.state.lock().await;
        let visit = st
            .editable()?
            .appointments
            .find_by_date(date)
            .cloned()
            .ok_or_else(|| EngineError::UnknownVisit(date.to_string()))?;

        st.selected_visit = Some(visit.id);
        st.draft.reseed_visit(Some(&visit));
        st.rebind_therapist();
        Ok(render(&st))
    }

    pub async fn update_cascade_field(
        &self,
        update: CascadeUpdate,
    ) -> Result<(Vec<CascadeField>, SessionView), EngineError> {
        let mut st = self.state.lock().await;
        st.editable()?;
        let resets = self.graph.apply(&mut st.draft.contraceptive, update);
        Ok((resets, render(&st)))
    }

    pub async fn update_weight_field(
        &self,
        field: WeightField,
        value: Option<f64>,
    ) -> Result<SessionView, EngineError> {
        let mut st = self.state.lock().await;
        st.editable()?;
        st.draft.weights.set(field, value);
        Ok(render(&st))
    }

    pub async fn select_therapist(&self, therapist: TherapistRef) -> Result<SessionView, EngineError> {
        let mut st = self.state.lock().await;
        st.editable()?;
        st.therapist.select(therapist);
        Ok(render(&st))
    }

    pub async fn clear_therapist(&self) -> Result<SessionView, EngineError> {
        let mut st = self.state.lock().await;
        st.editable()?;
        st.therapist.clear();
        Ok(render(&st))
    }

    /// Merges the posted values, derives status and weights, and commits
    /// history and visit together.
    pub async fn submit(
        &self,
        backend: &dyn ClinicBackend,
        values: FormValues,
    ) -> Result<CommitResult, EngineError> {
        let (ticket, patient_id, request, weights) = {
            let mut st = self.state.lock().await;
            let snapshot = st.editable()?.clone();
            if let Some(e) = &snapshot.history_error {
                return Err(EngineError::Validation(format!(
                    "history was not resolved ({e}); reload before submitting"
                )));
            }

            values.merge_into(&mut st.draft, &self.graph);

            let therapist_id = st.therapist.selected_id();
            let status = derive_status(therapist_id);
            let weights = next_weights(&st.draft.weights, &snapshot.resolution.history);
            let history_key = snapshot
                .resolution
                .history
                .id
                .map(HistoryKey::Id)
                .unwrap_or(HistoryKey::Patient(snapshot.patient_id));

            let request = CommitRequest {
                history_key,
                history: st.draft.history_patch(
                    &self.graph,
                    weights,
                    therapist_id,
                    snapshot.show_reproductive(),
                ),
                appointment_id: st.selected_visit,
                appointment: st.draft.appointment_patch(status, therapist_id),
            };
            st.committing = Some(st.generation);
            (st.generation, snapshot.patient_id, request, weights)
        };

        let refresher = SessionRefresh {
            backend,
            resolver: &self.resolver,
            patient_id,
        };
        let outcome = commit::commit(backend, &request, &refresher).await;

        let mut guard = self.state.lock().await;
        let st = &mut *guard;
        if st.committing == Some(ticket) {
            st.committing = None;
        }
        let outcome = outcome?;

        // a full success already re-resolved through the refresh
        if outcome.result.history.is_success() && outcome.refreshed.is_none() {
            self.resolver.invalidate();
        }

        if st.generation != ticket {
            debug!(patient_id, "patient changed during commit, refresh discarded");
            return Ok(outcome.result);
        }

        if let Some(refreshed) = outcome.refreshed {
            let selected = st.selected_visit;
            if let Some(snapshot) = st.snapshot.as_mut() {
                match refreshed.history {
                    Ok(r) => {
                        snapshot.resolution = r;
                        snapshot.history_error = None;
                    }
                    Err(e) => snapshot.history_error = Some(e.to_string()),
                }
                match refreshed.appointments {
                    Ok(a) => {
                        snapshot.appointments = a;
                        snapshot.appointments_error = None;
                    }
                    Err(e) => snapshot.appointments_error = Some(e.to_string()),
                }
                st.draft = FormDraft::seed(
                    &snapshot.resolution.history,
                    snapshot.visit(selected),
                    &self.graph,
                );
            }
            st.draft.weights.after_commit(&weights);
            st.rebind_therapist();
        }

        Ok(outcome.result)
    }
}

struct SessionRefresh<'a> {
    backend: &'a dyn ClinicBackend,
    resolver: &'a HistoryResolver,
    patient_id: Id,
}

#[async_trait]
impl Refresh for SessionRefresh<'_> {
    async fn refresh_history(&self) -> Result<Resolution, EngineError> {
        self.resolver.invalidate();
        self.resolver.resolve(self.backend, self.patient_id).await
    }

    async fn refresh_appointments(&self) -> Result<AppointmentSet, EngineError> {
        appointments::load(self.backend, self.patient_id).await
    }
}

fn render(st: &SessionState) -> SessionView {
    let snapshot = st.current().ok();
    let therapist_id = st.therapist.selected_id();

    let mut errors = Vec::new();
    if let Some(s) = snapshot {
        errors.extend(s.history_error.iter().cloned());
        errors.extend(s.appointments_error.iter().cloned());
    }

    SessionView {
        patient_id: st.patient_id,
        loading: st.patient_id.is_some() && snapshot.is_none(),
        patient: snapshot.and_then(|s| s.appointments.patient.clone()),
        history_source: snapshot.map(|s| s.resolution.source),
        history: snapshot.map(|s| s.resolution.history.clone()),
        visit_dates: snapshot.map(|s| s.appointments.unique_dates()).unwrap_or_default(),
        selected_visit: snapshot.and_then(|s| s.visit(st.selected_visit).cloned()),
        draft: st.draft.clone(),
        therapist: st.therapist.selected().cloned(),
        status: derive_status(therapist_id),
        show_reproductive: snapshot.is_some_and(Snapshot::show_reproductive),
        errors,
    }
}
