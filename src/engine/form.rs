//! In-memory form draft. Edits land here; the last fetched snapshot is never
//! touched until a commit succeeds and the views are refreshed.

use serde::{Deserialize, Serialize};

use super::cascade::{CascadeGraph, CascadeUpdate, ContraceptiveSelection};
use super::normalize::clean_text;
use super::weight::{WeightField, WeightForm, WeightPair};
use crate::models::{
    deserialize_double_option, Appointment, AppointmentPatch, AppointmentStatus, ClinicalHistory,
    HistoryPatch, Id, ReproductivePatch,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VisitDraft {
    pub diagnosis: Option<String>,
    pub ailments: Option<String>,
    pub medications: Option<String>,
    pub surgeries: Option<String>,
    pub reflexology_notes: Option<String>,
    pub observation: Option<String>,
    pub payment: Option<f64>,
    pub payment_type_id: Option<Id>,
    pub ticket_number: Option<f64>,
}

impl VisitDraft {
    fn seed(a: &Appointment) -> Self {
        Self {
            diagnosis: a.diagnosis.clone(),
            ailments: a.ailments.clone(),
            medications: a.medications.clone(),
            surgeries: a.surgeries.clone(),
            reflexology_notes: a.reflexology_notes.clone(),
            observation: a.observation.clone(),
            payment: a.payment,
            payment_type_id: a.payment_type_id,
            ticket_number: a.ticket_number,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormDraft {
    pub height: Option<f64>,
    pub observation: Option<String>,
    pub allergies: Option<String>,
    pub chronic_conditions: Option<String>,
    pub family_history: Option<String>,
    pub habits: Option<String>,
    pub contraceptive: ContraceptiveSelection,
    pub pregnant: Option<bool>,
    pub last_menstruation: Option<String>,
    pub weights: WeightForm,
    pub visit: VisitDraft,
}

impl FormDraft {
    pub fn seed(h: &ClinicalHistory, visit: Option<&Appointment>, graph: &CascadeGraph) -> Self {
        let mut contraceptive = ContraceptiveSelection::from_history(h);
        graph.normalize(&mut contraceptive);

        Self {
            height: h.height,
            observation: h.observation.clone(),
            allergies: h.allergies.clone(),
            chronic_conditions: h.chronic_conditions.clone(),
            family_history: h.family_history.clone(),
            habits: h.habits.clone(),
            contraceptive,
            pregnant: h.pregnant,
            last_menstruation: h.last_menstruation.clone(),
            weights: WeightForm::seed(h),
            visit: visit.map(VisitDraft::seed).unwrap_or_default(),
        }
    }

    /// Visit-scoped fields follow the selected visit; history fields stay.
    pub fn reseed_visit(&mut self, visit: Option<&Appointment>) {
        self.visit = visit.map(VisitDraft::seed).unwrap_or_default();
    }

    pub fn history_patch(
        &self,
        graph: &CascadeGraph,
        weights: WeightPair,
        therapist_id: Option<Id>,
        show_reproductive: bool,
    ) -> HistoryPatch {
        let reproductive = show_reproductive.then(|| {
            let mut sel = self.contraceptive;
            graph.normalize(&mut sel);
            ReproductivePatch {
                use_contraceptive: sel.use_method,
                contraceptive_method_id: sel.method_id,
                diu_type_id: sel.diu_type_id,
                pregnant: self.pregnant,
                last_menstruation: self.last_menstruation.clone(),
            }
        });

        HistoryPatch {
            height: self.height,
            last_weight: weights.last_weight,
            current_weight: weights.current_weight,
            observation: self.observation.clone(),
            allergies: self.allergies.clone(),
            chronic_conditions: self.chronic_conditions.clone(),
            family_history: self.family_history.clone(),
            habits: self.habits.clone(),
            therapist_id,
            reproductive,
        }
    }

    pub fn appointment_patch(&self, status: AppointmentStatus, therapist_id: Option<Id>) -> AppointmentPatch {
        let v = &self.visit;
        AppointmentPatch {
            status,
            therapist_id,
            payment: v.payment,
            payment_type_id: v.payment_type_id,
            ticket_number: v.ticket_number,
            diagnosis: v.diagnosis.clone(),
            ailments: v.ailments.clone(),
            medications: v.medications.clone(),
            surgeries: v.surgeries.clone(),
            reflexology_notes: v.reflexology_notes.clone(),
            observation: v.observation.clone(),
        }
    }
}

/// Values posted with a submit. A missing field keeps the draft value, an
/// explicit `null` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FormValues {
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub height: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub observation: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub allergies: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub chronic_conditions: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub family_history: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub habits: Option<Option<String>>,

    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub use_contraceptive: Option<Option<bool>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub contraceptive_method_id: Option<Option<Id>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub diu_type_id: Option<Option<Id>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub pregnant: Option<Option<bool>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub last_menstruation: Option<Option<String>>,

    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub weight_today: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub previous_weight: Option<Option<f64>>,

    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub diagnosis: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub ailments: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub medications: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub surgeries: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub reflexology_notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub visit_observation: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub payment: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub payment_type_id: Option<Option<Id>>,
    #[serde(default, deserialize_with = "deserialize_double_option")]
    pub ticket_number: Option<Option<f64>>,
}

fn text(slot: &mut Option<String>, incoming: Option<Option<String>>) {
    if let Some(v) = incoming {
        *slot = clean_text(v.as_deref());
    }
}

fn keep_or<T>(slot: &mut Option<T>, incoming: Option<Option<T>>) {
    if let Some(v) = incoming {
        *slot = v;
    }
}

impl FormValues {
    /// Writes the posted values into the draft. Cascade fields go through the
    /// graph parent-first so the invariants hold afterwards.
    pub fn merge_into(self, draft: &mut FormDraft, graph: &CascadeGraph) {
        keep_or(&mut draft.height, self.height);
        text(&mut draft.observation, self.observation);
        text(&mut draft.allergies, self.allergies);
        text(&mut draft.chronic_conditions, self.chronic_conditions);
        text(&mut draft.family_history, self.family_history);
        text(&mut draft.habits, self.habits);

        if let Some(v) = self.use_contraceptive {
            graph.apply(&mut draft.contraceptive, CascadeUpdate::UseContraceptive(v));
        }
        if let Some(v) = self.contraceptive_method_id {
            graph.apply(&mut draft.contraceptive, CascadeUpdate::ContraceptiveMethod(v));
        }
        if let Some(v) = self.diu_type_id {
            graph.apply(&mut draft.contraceptive, CascadeUpdate::DiuType(v));
        }
        graph.normalize(&mut draft.contraceptive);
        keep_or(&mut draft.pregnant, self.pregnant);
        text(&mut draft.last_menstruation, self.last_menstruation);

        if let Some(v) = self.weight_today {
            draft.weights.set(WeightField::WeightToday, v);
        }
        if let Some(v) = self.previous_weight {
            draft.weights.set(WeightField::PreviousWeight, v);
        }

        let visit = &mut draft.visit;
        text(&mut visit.diagnosis, self.diagnosis);
        text(&mut visit.ailments, self.ailments);
        text(&mut visit.medications, self.medications);
        text(&mut visit.surgeries, self.surgeries);
        text(&mut visit.reflexology_notes, self.reflexology_notes);
        text(&mut visit.observation, self.visit_observation);
        keep_or(&mut visit.payment, self.payment);
        keep_or(&mut visit.payment_type_id, self.payment_type_id);
        keep_or(&mut visit.ticket_number, self.ticket_number);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::visit;
    use serde_json::json;

    fn graph() -> CascadeGraph {
        CascadeGraph::contraceptive(4)
    }

    #[test]
    fn seed_normalizes_stored_cascade() {
        let h = ClinicalHistory {
            use_contraceptive: Some(false),
            contraceptive_method_id: Some(4),
            diu_type_id: Some(2),
            current_weight: Some(70.0),
            ..Default::default()
        };
        let d = FormDraft::seed(&h, None, &graph());
        assert_eq!(d.contraceptive, ContraceptiveSelection { use_method: Some(false), ..Default::default() });
        assert_eq!(d.weights.previous_weight, Some(70.0));
        assert_eq!(d.visit, VisitDraft::default());
    }

    #[test]
    fn merge_distinguishes_absent_and_null() {
        let h = ClinicalHistory {
            allergies: Some("penicillin".into()),
            habits: Some("smoker".into()),
            ..Default::default()
        };
        let mut d = FormDraft::seed(&h, Some(&visit(1, "2024-01-01")), &graph());
        let values: FormValues = serde_json::from_value(json!({
            "habits": null,
            "diagnosis": "  lumbago ",
            "payment": 50
        }))
        .unwrap();
        values.merge_into(&mut d, &graph());
        assert_eq!(d.allergies.as_deref(), Some("penicillin"));
        assert_eq!(d.habits, None);
        assert_eq!(d.visit.diagnosis.as_deref(), Some("lumbago"));
        assert_eq!(d.visit.payment, Some(50.0));
    }

    #[test]
    fn merge_applies_cascade_parent_first() {
        let mut d = FormDraft::default();
        let values: FormValues = serde_json::from_value(json!({
            "diu_type_id": 3,
            "contraceptive_method_id": 4,
            "use_contraceptive": true
        }))
        .unwrap();
        values.merge_into(&mut d, &graph());
        assert_eq!(d.contraceptive.diu_type_id, Some(3));

        let values: FormValues =
            serde_json::from_value(json!({"contraceptive_method_id": 1})).unwrap();
        values.merge_into(&mut d, &graph());
        assert_eq!(d.contraceptive.diu_type_id, None);
    }

    #[test]
    fn hidden_reproductive_section_is_left_out() {
        let d = FormDraft {
            contraceptive: ContraceptiveSelection {
                use_method: Some(true),
                method_id: Some(4),
                diu_type_id: Some(1),
            },
            ..Default::default()
        };
        let hidden = d.history_patch(&graph(), WeightPair::default(), None, false);
        assert!(hidden.reproductive.is_none());
        let shown = d.history_patch(&graph(), WeightPair::default(), Some(2), true);
        assert_eq!(shown.reproductive.map(|r| r.diu_type_id), Some(Some(1)));
        assert_eq!(shown.therapist_id, Some(2));
    }

    #[test]
    fn appointment_patch_carries_visit_fields() {
        let a = Appointment {
            diagnosis: Some("x".into()),
            payment: Some(30.0),
            ..visit(1, "2024-01-01")
        };
        let d = FormDraft::seed(&ClinicalHistory::default(), Some(&a), &graph());
        let p = d.appointment_patch(AppointmentStatus::Confirmed, Some(7));
        assert_eq!(p.status, AppointmentStatus::Confirmed);
        assert_eq!(p.therapist_id, Some(7));
        assert_eq!(p.diagnosis.as_deref(), Some("x"));
        assert_eq!(p.payment, Some(30.0));
    }
}
