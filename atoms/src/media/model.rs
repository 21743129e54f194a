use serde::{Deserialize, Serialize};

use crate::detections::model::DetectedObject;

/// Client-facing view of one uploaded waste image.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageItem {
    pub id: String,
    pub url: String,
    pub name: String,
    pub uploaded_at: String,
    pub processed: bool,
    /// Present iff `processed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Results>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Results {
    pub annotated_image_url: String,
    pub detected_objects: Vec<DetectedObject>,
    pub total_objects: u32,
}

/// Raw backend shape: an `images` row with its `detected_objects` rows nested.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub url: String,
    pub uploaded_at: String,
    pub processed: bool,
    #[serde(default)]
    pub annotated_image_url: Option<String>,
    #[serde(default)]
    pub object_key: Option<String>,
    #[serde(default)]
    pub detected_objects: Option<Vec<DetectionRecord>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DetectionRecord {
    pub image_id: String,
    pub class_name: String,
    pub count: u32,
    pub percentage: f64,
}

/// Everything needed to write a fresh, unprocessed `images` row.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub url: String,
    pub object_key: Option<String>,
    pub uploaded_at: String,
}

impl NewImage {
    pub fn into_record(self) -> ImageRecord {
        ImageRecord {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            url: self.url,
            uploaded_at: self.uploaded_at,
            processed: false,
            annotated_image_url: None,
            object_key: self.object_key,
            detected_objects: None,
        }
    }
}
