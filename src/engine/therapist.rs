//! Therapist bound to the active visit.
//!
//! Context changes go through [`on_context_change`], which always yields
//! either a select or a clear. A selection is never carried over silently.

use serde::Serialize;
use tracing::debug;

use crate::models::{Appointment, ClinicalHistory, Id, Therapist};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TherapistRef {
    pub id: Id,
    /// Cached for display only.
    pub display_name: Option<String>,
}

impl TherapistRef {
    fn from_parts(id: Id, therapist: Option<&Therapist>) -> Self {
        let display_name = therapist
            .filter(|t| t.id == id)
            .map(Therapist::display_name)
            .filter(|n| !n.is_empty());
        Self { id, display_name }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TherapistSelection {
    selected: Option<TherapistRef>,
}

impl TherapistSelection {
    pub fn select(&mut self, therapist: TherapistRef) {
        self.selected = Some(therapist);
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&TherapistRef> {
        self.selected.as_ref()
    }

    pub fn selected_id(&self) -> Option<Id> {
        self.selected.as_ref().map(|t| t.id)
    }

    pub fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::Select(t) => self.select(t),
            Transition::Clear => self.clear(),
        }
    }
}

/// What the therapist selection is bound to.
#[derive(Debug, Clone, Copy)]
pub enum BoundContext<'a> {
    History(&'a ClinicalHistory),
    Visit(&'a Appointment),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Select(TherapistRef),
    Clear,
}

pub fn on_context_change(ctx: BoundContext<'_>) -> Transition {
    let (id, therapist) = match ctx {
        BoundContext::History(h) => (h.therapist_id.or(h.therapist.as_ref().map(|t| t.id)), h.therapist.as_ref()),
        BoundContext::Visit(a) => (a.therapist_id.or(a.therapist.as_ref().map(|t| t.id)), a.therapist.as_ref()),
    };
    let transition = match id {
        Some(id) => Transition::Select(TherapistRef::from_parts(id, therapist)),
        None => Transition::Clear,
    };
    debug!(?transition, "therapist context changed");
    transition
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{therapist, visit};

    #[test]
    fn visit_with_therapist_selects() {
        let a = Appointment {
            therapist_id: Some(3),
            therapist: Some(therapist(3, "Lucia")),
            ..visit(1, "2024-01-01")
        };
        let mut s = TherapistSelection::default();
        s.apply(on_context_change(BoundContext::Visit(&a)));
        assert_eq!(s.selected_id(), Some(3));
        assert_eq!(s.selected().and_then(|t| t.display_name.clone()), Some("Lucia".into()));
    }

    #[test]
    fn visit_without_therapist_clears_stale_selection() {
        let mut s = TherapistSelection::default();
        s.select(TherapistRef { id: 9, display_name: None });
        s.apply(on_context_change(BoundContext::Visit(&visit(2, "2024-01-02"))));
        assert_eq!(s.selected_id(), None);
    }

    #[test]
    fn embedded_therapist_without_id_field_still_selects() {
        let h = ClinicalHistory {
            therapist: Some(therapist(5, "Pia")),
            ..Default::default()
        };
        assert_eq!(
            on_context_change(BoundContext::History(&h)),
            Transition::Select(TherapistRef { id: 5, display_name: Some("Pia".into()) })
        );
    }

    #[test]
    fn mismatched_embedded_therapist_is_not_used_for_name() {
        let h = ClinicalHistory {
            therapist_id: Some(6),
            therapist: Some(therapist(5, "Pia")),
            ..Default::default()
        };
        assert_eq!(
            on_context_change(BoundContext::History(&h)),
            Transition::Select(TherapistRef { id: 6, display_name: None })
        );
    }
}
