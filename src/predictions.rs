use serde::{Deserialize, Serialize};

/// How many predictions survive ranking.
pub const TOP_K: usize = 5;

/// A single (class label, confidence score) pair from a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
}

impl Prediction {
    pub fn new(class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
        }
    }

    /// The display line for the top prediction, e.g. `healthy (Confidence: 0.91)`.
    pub fn summary(&self) -> String {
        format!("{} (Confidence: {:.2})", self.class_name, self.confidence)
    }

    /// The annotation line, e.g. `healthy 0.91`.
    pub fn overlay_line(&self) -> String {
        format!("{} {:.2}", self.class_name, self.confidence)
    }
}

/// Sort descending by confidence and keep the first `k` entries. NaN confidences
/// sort last so a single bad score cannot float to the top.
pub fn top_k(mut predictions: Vec<Prediction>, k: usize) -> Vec<Prediction> {
    // total_cmp alone would rank NaN above every finite score in a descending
    // sort, so NaN is pinned to the bottom explicitly.
    let key = |p: &Prediction| {
        if p.confidence.is_nan() {
            f32::NEG_INFINITY
        } else {
            p.confidence
        }
    };
    predictions.sort_by(|a, b| key(b).total_cmp(&key(a)));
    predictions.truncate(k);
    predictions
}
