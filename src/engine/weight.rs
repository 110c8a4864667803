use serde::{Deserialize, Serialize};

use crate::models::ClinicalHistory;

/// The two weight inputs on the form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightForm {
    pub weight_today: Option<f64>,
    pub previous_weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightField {
    WeightToday,
    PreviousWeight,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WeightPair {
    pub last_weight: Option<f64>,
    pub current_weight: Option<f64>,
}

impl WeightForm {
    pub fn seed(h: &ClinicalHistory) -> Self {
        Self {
            weight_today: None,
            previous_weight: h.current_weight.or(h.last_weight),
        }
    }

    pub fn set(&mut self, field: WeightField, value: Option<f64>) {
        let value = value.filter(|v| v.is_finite());
        match field {
            WeightField::WeightToday => self.weight_today = value,
            WeightField::PreviousWeight => self.previous_weight = value,
        }
    }

    /// Post-commit transition: today's entry is consumed and the committed
    /// value becomes the previous weight.
    pub fn after_commit(&mut self, committed: &WeightPair) {
        self.weight_today = None;
        self.previous_weight = committed.current_weight.or(committed.last_weight);
    }
}

pub fn next_weights(form: &WeightForm, current: &ClinicalHistory) -> WeightPair {
    match form.weight_today {
        Some(today) => WeightPair {
            last_weight: current.current_weight.or(current.last_weight),
            current_weight: Some(today),
        },
        None => WeightPair {
            last_weight: form.previous_weight,
            current_weight: None,
        },
    }
}
