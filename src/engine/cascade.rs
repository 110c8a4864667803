//! Dependent contraceptive fields.
//!
//! Each field declares its parent and a validity predicate. After any change
//! the graph is walked in topological order starting at the changed field, and
//! every descendant whose predicate no longer holds is reset to `None`.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{ClinicalHistory, Id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeField {
    UseContraceptive,
    ContraceptiveMethod,
    DiuType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContraceptiveSelection {
    /// `None` is "unknown".
    pub use_method: Option<bool>,
    pub method_id: Option<Id>,
    pub diu_type_id: Option<Id>,
}

impl ContraceptiveSelection {
    pub fn from_history(h: &ClinicalHistory) -> Self {
        Self {
            use_method: h.use_contraceptive,
            method_id: h.contraceptive_method_id,
            diu_type_id: h.diu_type_id,
        }
    }

    fn is_set(&self, field: CascadeField) -> bool {
        match field {
            CascadeField::UseContraceptive => self.use_method.is_some(),
            CascadeField::ContraceptiveMethod => self.method_id.is_some(),
            CascadeField::DiuType => self.diu_type_id.is_some(),
        }
    }

    fn reset(&mut self, field: CascadeField) {
        match field {
            CascadeField::UseContraceptive => self.use_method = None,
            CascadeField::ContraceptiveMethod => self.method_id = None,
            CascadeField::DiuType => self.diu_type_id = None,
        }
    }
}

/// A user edit to one field, e.g. `{"field": "contraceptive_method", "value": 4}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum CascadeUpdate {
    UseContraceptive(Option<bool>),
    ContraceptiveMethod(Option<Id>),
    DiuType(Option<Id>),
}

impl CascadeUpdate {
    pub fn field(&self) -> CascadeField {
        match self {
            CascadeUpdate::UseContraceptive(_) => CascadeField::UseContraceptive,
            CascadeUpdate::ContraceptiveMethod(_) => CascadeField::ContraceptiveMethod,
            CascadeUpdate::DiuType(_) => CascadeField::DiuType,
        }
    }

    fn write(&self, sel: &mut ContraceptiveSelection) {
        match *self {
            CascadeUpdate::UseContraceptive(v) => sel.use_method = v,
            CascadeUpdate::ContraceptiveMethod(v) => sel.method_id = v,
            CascadeUpdate::DiuType(v) => sel.diu_type_id = v,
        }
    }
}

type Predicate = fn(&ContraceptiveSelection, Id) -> bool;

#[derive(Clone, Copy)]
struct Node {
    field: CascadeField,
    parent: Option<CascadeField>,
    valid: Predicate,
}

#[derive(Clone)]
pub struct CascadeGraph {
    iud_method_id: Id,
    /// Topologically sorted, parents first.
    order: Vec<Node>,
}

impl CascadeGraph {
    pub fn contraceptive(iud_method_id: Id) -> Self {
        let nodes = [
            Node {
                field: CascadeField::DiuType,
                parent: Some(CascadeField::ContraceptiveMethod),
                valid: |s, iud| s.use_method == Some(true) && s.method_id == Some(iud),
            },
            Node {
                field: CascadeField::ContraceptiveMethod,
                parent: Some(CascadeField::UseContraceptive),
                valid: |s, _| s.use_method == Some(true),
            },
            Node {
                field: CascadeField::UseContraceptive,
                parent: None,
                valid: |_, _| true,
            },
        ];
        Self {
            iud_method_id,
            order: topological(&nodes),
        }
    }

    pub fn iud_method_id(&self) -> Id {
        self.iud_method_id
    }

    /// Applies `update` and resets every now-invalid descendant. Returns the
    /// fields that were forced to `None`.
    pub fn apply(&self, sel: &mut ContraceptiveSelection, update: CascadeUpdate) -> Vec<CascadeField> {
        update.write(sel);
        self.walk(sel, Some(update.field()))
    }

    /// Re-derives the invariants from stored data.
    pub fn normalize(&self, sel: &mut ContraceptiveSelection) -> Vec<CascadeField> {
        self.walk(sel, None)
    }

    fn walk(&self, sel: &mut ContraceptiveSelection, from: Option<CascadeField>) -> Vec<CascadeField> {
        let mut affected: HashSet<CascadeField> = HashSet::new();
        let mut resets = Vec::new();

        for node in &self.order {
            let reached = match from {
                None => true,
                Some(start) => {
                    node.field == start || node.parent.is_some_and(|p| affected.contains(&p))
                }
            };
            if !reached {
                continue;
            }
            affected.insert(node.field);

            if sel.is_set(node.field) && !(node.valid)(sel, self.iud_method_id) {
                sel.reset(node.field);
                resets.push(node.field);
            }
        }

        if !resets.is_empty() {
            debug!(?resets, "cascade reset dependent fields");
        }
        resets
    }
}

/// Kahn's algorithm over the declared parent edges.
fn topological(nodes: &[Node]) -> Vec<Node> {
    let mut indegree: HashMap<CascadeField, usize> = nodes
        .iter()
        .map(|n| (n.field, usize::from(n.parent.is_some())))
        .collect();
    let mut queue: VecDeque<Node> = nodes.iter().copied().filter(|n| n.parent.is_none()).collect();
    let mut out = Vec::with_capacity(nodes.len());

    while let Some(node) = queue.pop_front() {
        out.push(node);
        for child in nodes.iter().filter(|c| c.parent == Some(node.field)) {
            if let Some(d) = indegree.get_mut(&child.field) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(*child);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const IUD: Id = 4;

    fn graph() -> CascadeGraph {
        CascadeGraph::contraceptive(IUD)
    }

    fn full() -> ContraceptiveSelection {
        ContraceptiveSelection {
            use_method: Some(true),
            method_id: Some(IUD),
            diu_type_id: Some(2),
        }
    }

    #[test]
    fn order_is_parents_first() {
        let fields: Vec<_> = graph().order.iter().map(|n| n.field).collect();
        assert_eq!(
            fields,
            vec![
                CascadeField::UseContraceptive,
                CascadeField::ContraceptiveMethod,
                CascadeField::DiuType
            ]
        );
    }

    #[test]
    fn use_false_or_unknown_clears_method_and_subtype() {
        for flag in [Some(false), None] {
            let mut s = full();
            let resets = graph().apply(&mut s, CascadeUpdate::UseContraceptive(flag));
            assert_eq!((s.method_id, s.diu_type_id), (None, None));
            assert_eq!(resets, vec![CascadeField::ContraceptiveMethod, CascadeField::DiuType]);
        }
    }

    #[test]
    fn non_iud_method_clears_subtype() {
        for method in [Some(1), Some(3), Some(99), None] {
            let mut s = full();
            graph().apply(&mut s, CascadeUpdate::ContraceptiveMethod(method));
            assert_eq!(s.diu_type_id, None);
            assert_eq!(s.method_id, method);
        }
    }

    #[test]
    fn iud_method_keeps_subtype_editable() {
        let mut s = ContraceptiveSelection {
            use_method: Some(true),
            ..Default::default()
        };
        let g = graph();
        g.apply(&mut s, CascadeUpdate::ContraceptiveMethod(Some(IUD)));
        let resets = g.apply(&mut s, CascadeUpdate::DiuType(Some(3)));
        assert!(resets.is_empty());
        assert_eq!(s.diu_type_id, Some(3));
    }

    #[test]
    fn iud_then_other_method_resets_subtype() {
        let g = graph();
        let mut s = ContraceptiveSelection::default();
        g.apply(&mut s, CascadeUpdate::UseContraceptive(Some(true)));
        g.apply(&mut s, CascadeUpdate::ContraceptiveMethod(Some(4)));
        g.apply(&mut s, CascadeUpdate::DiuType(Some(2)));
        assert_eq!(s.diu_type_id, Some(2));

        g.apply(&mut s, CascadeUpdate::ContraceptiveMethod(Some(1)));
        assert_eq!(s.diu_type_id, None);
    }

    #[test]
    fn child_set_while_invalid_is_rejected() {
        let mut s = ContraceptiveSelection {
            use_method: Some(false),
            ..Default::default()
        };
        let g = graph();
        assert_eq!(
            g.apply(&mut s, CascadeUpdate::ContraceptiveMethod(Some(2))),
            vec![CascadeField::ContraceptiveMethod]
        );
        assert_eq!(s.method_id, None);
        g.apply(&mut s, CascadeUpdate::DiuType(Some(2)));
        assert_eq!(s.diu_type_id, None);
    }

    #[test]
    fn normalize_repairs_stored_data() {
        let g = graph();
        let mut s = ContraceptiveSelection {
            use_method: None,
            method_id: Some(IUD),
            diu_type_id: Some(1),
        };
        g.normalize(&mut s);
        assert_eq!(s, ContraceptiveSelection::default());

        let mut s = ContraceptiveSelection {
            use_method: Some(true),
            method_id: Some(2),
            diu_type_id: Some(1),
        };
        g.normalize(&mut s);
        assert_eq!(s.method_id, Some(2));
        assert_eq!(s.diu_type_id, None);

        let mut s = full();
        assert!(g.normalize(&mut s).is_empty());
        assert_eq!(s, full());
    }

    #[test]
    fn update_deserializes_from_tagged_json() {
        let u: CascadeUpdate =
            serde_json::from_str(r#"{"field":"contraceptive_method","value":4}"#).unwrap();
        assert_eq!(u, CascadeUpdate::ContraceptiveMethod(Some(4)));
        let u: CascadeUpdate =
            serde_json::from_str(r#"{"field":"use_contraceptive","value":null}"#).unwrap();
        assert_eq!(u, CascadeUpdate::UseContraceptive(None));
    }
}
