use serde::{Deserialize, Serialize};

/// Raw detector output for one category, before normalization.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub class_name: String,
    pub count: u32,
}

impl CategoryCount {
    pub fn new(class_name: impl Into<String>, count: u32) -> Self {
        Self {
            class_name: class_name.into(),
            count,
        }
    }
}

/// One waste category's count and share of the image's detections.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    pub class_name: String,
    pub count: u32,
    pub percentage: f64,
}

/// Normalized batch: retained categories plus their total.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DetectionSummary {
    pub detected_objects: Vec<DetectedObject>,
    pub total_objects: u32,
}
