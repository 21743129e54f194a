use serde::Serialize;
use wastelens_atoms::detections::{merge_totals, DetectionSummary};
use wastelens_atoms::media::ImageItem;

const RECENT_IMAGES: usize = 3;

/// Dashboard figures over one principal's images.
#[derive(Debug, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_images: usize,
    pub images_processed: usize,
    /// Rounded share of processed images, 0 when there are none.
    pub processed_percentage: u32,
    pub last_upload: Option<String>,
    /// Newest first.
    pub recent_images: Vec<ImageItem>,
    /// Category breakdown across every processed image.
    pub category_totals: DetectionSummary,
}

impl DashboardStats {
    /// `images` must be ordered oldest first, as `list` returns them.
    pub fn from_images(images: &[ImageItem]) -> Self {
        let total_images = images.len();
        let images_processed = images.iter().filter(|i| i.processed).count();
        let processed_percentage = if total_images == 0 {
            0
        } else {
            (images_processed as f64 * 100.0 / total_images as f64).round() as u32
        };

        let category_totals = merge_totals(
            images
                .iter()
                .filter_map(|i| i.results.as_ref())
                .map(|r| r.detected_objects.as_slice()),
        );

        Self {
            total_images,
            images_processed,
            processed_percentage,
            last_upload: images.last().map(|i| i.uploaded_at.clone()),
            recent_images: images.iter().rev().take(RECENT_IMAGES).cloned().collect(),
            category_totals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wastelens_atoms::detections::{aggregate, CategoryCount};
    use wastelens_atoms::media::Results;

    fn item(id: &str, counts: Option<Vec<CategoryCount>>) -> ImageItem {
        let results = counts.map(|c| {
            let summary = aggregate(c);
            Results {
                annotated_image_url: format!("https://media.example.com/{}.jpg", id),
                detected_objects: summary.detected_objects,
                total_objects: summary.total_objects,
            }
        });
        ImageItem {
            id: id.to_string(),
            url: format!("https://media.example.com/{}.jpg", id),
            name: format!("{}.jpg", id),
            uploaded_at: format!("2024-05-0{}T10:00:00+00:00", id),
            processed: results.is_some(),
            results,
        }
    }

    #[test]
    fn empty_collection() {
        assert_eq!(DashboardStats::from_images(&[]), DashboardStats::default());
    }

    #[test]
    fn counts_recent_and_totals() {
        let images = vec![
            item("1", Some(vec![CategoryCount::new("Plastic", 2), CategoryCount::new("Glass", 1)])),
            item("2", None),
            item("3", Some(vec![CategoryCount::new("Plastic", 1)])),
            item("4", None),
        ];

        let stats = DashboardStats::from_images(&images);
        assert_eq!(stats.total_images, 4);
        assert_eq!(stats.images_processed, 2);
        assert_eq!(stats.processed_percentage, 50);
        assert_eq!(stats.last_upload.as_deref(), Some("2024-05-04T10:00:00+00:00"));

        let recent: Vec<_> = stats.recent_images.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(recent, ["4", "3", "2"]);

        assert_eq!(stats.category_totals.total_objects, 4);
        assert_eq!(stats.category_totals.detected_objects[0].class_name, "Plastic");
        assert_eq!(stats.category_totals.detected_objects[0].count, 3);
    }

    #[test]
    fn share_is_rounded() {
        let images = vec![
            item("1", Some(vec![CategoryCount::new("Paper", 1)])),
            item("2", None),
            item("3", None),
        ];
        assert_eq!(DashboardStats::from_images(&images).processed_percentage, 33);
    }
}
