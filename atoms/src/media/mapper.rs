use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

use super::model::{DetectionRecord, ImageItem, ImageRecord, Results};
use crate::detections::model::DetectedObject;
use crate::error::StoreError;

type Item = HashMap<String, AttributeValue>;

/// Shape a raw backend record into the client-facing item.
///
/// Unprocessed records never carry `results`. Missing detection rows read as an
/// empty batch, and a missing annotated URL falls back to the primary URL.
pub fn map_record(record: ImageRecord) -> ImageItem {
    let ImageRecord {
        id,
        name,
        url,
        uploaded_at,
        processed,
        annotated_image_url,
        detected_objects,
        ..
    } = record;

    let results = if processed {
        let detected_objects: Vec<DetectedObject> = detected_objects
            .unwrap_or_default()
            .into_iter()
            .filter(|row| row.count > 0)
            .map(|row| DetectedObject {
                class_name: row.class_name,
                count: row.count,
                percentage: row.percentage,
            })
            .collect();
        let total_objects = detected_objects.iter().map(|o| o.count).sum();

        Some(Results {
            annotated_image_url: annotated_image_url
                .filter(|u| !u.is_empty())
                .unwrap_or_else(|| url.clone()),
            detected_objects,
            total_objects,
        })
    } else {
        None
    };

    ImageItem {
        id,
        url,
        name,
        uploaded_at,
        processed,
        results,
    }
}

/// Order items oldest upload first. Unparsable timestamps fall back to string
/// order; ties break on id so the order is stable across backends.
pub fn sort_oldest_first(items: &mut [ImageItem]) {
    items.sort_by(|a, b| {
        let by_time = match (parse_uploaded_at(&a.uploaded_at), parse_uploaded_at(&b.uploaded_at)) {
            (Some(a_time), Some(b_time)) => a_time.cmp(&b_time),
            _ => a.uploaded_at.cmp(&b.uploaded_at),
        };
        by_time.then_with(|| a.id.cmp(&b.id))
    });
}

fn parse_uploaded_at(value: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&chrono::Utc))
}

impl ImageRecord {
    /// Parse an image row and its detection rows as read from DynamoDB.
    /// Detection rows are expected in sort-key order.
    pub fn from_items(image: &Item, detections: &[&Item]) -> Result<Self, StoreError> {
        let id = required_s(image, "image_id")?;
        let detected_objects = detections
            .iter()
            .map(|row| DetectionRecord::from_item(row))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ImageRecord {
            user_id: required_s(image, "user_id")?,
            name: required_s(image, "name")?,
            url: required_s(image, "url")?,
            uploaded_at: required_s(image, "uploaded_at")?,
            processed: image
                .get("processed")
                .and_then(|v| v.as_bool().ok())
                .copied()
                .unwrap_or(false),
            annotated_image_url: optional_s(image, "annotated_image_url"),
            object_key: optional_s(image, "object_key"),
            detected_objects: (!detected_objects.is_empty()).then_some(detected_objects),
            id,
        })
    }
}

impl DetectionRecord {
    pub fn from_item(item: &Item) -> Result<Self, StoreError> {
        Ok(DetectionRecord {
            image_id: required_s(item, "image_id")?,
            class_name: required_s(item, "class_name")?,
            count: required_n(item, "count")?,
            percentage: required_n(item, "percentage")?,
        })
    }
}

fn required_s(item: &Item, key: &str) -> Result<String, StoreError> {
    optional_s(item, key).ok_or_else(|| StoreError::Malformed(format!("missing attribute '{}'", key)))
}

fn optional_s(item: &Item, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).map(|s| s.to_string())
}

fn required_n<T: std::str::FromStr>(item: &Item, key: &str) -> Result<T, StoreError> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| StoreError::Malformed(format!("missing or invalid number '{}'", key)))
}
