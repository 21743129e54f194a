use std::ops::RangeInclusive;

use async_trait::async_trait;
use rand::Rng;

use super::model::CategoryCount;
use crate::error::StoreError;
use crate::media::model::ImageItem;

/// What a detector hands back for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub counts: Vec<CategoryCount>,
    /// Set when the detector renders its own annotated asset.
    pub annotated_image_url: Option<String>,
}

/// Produces a detection batch for an image.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, image: &ImageItem) -> Result<Detection, StoreError>;
}

#[derive(Debug, Clone)]
pub struct CategoryRange {
    pub class_name: String,
    pub counts: RangeInclusive<u32>,
}

impl CategoryRange {
    pub fn new(class_name: impl Into<String>, counts: RangeInclusive<u32>) -> Self {
        Self {
            class_name: class_name.into(),
            counts,
        }
    }
}

/// Stand-in for a recognition model: every category gets a random count in its range.
#[derive(Debug, Clone)]
pub struct MockDetector {
    categories: Vec<CategoryRange>,
}

impl MockDetector {
    pub fn new(categories: Vec<CategoryRange>) -> Self {
        Self { categories }
    }

    pub fn detect_counts(&self) -> Vec<CategoryCount> {
        let mut rng = rand::rng();
        self.categories
            .iter()
            .map(|c| CategoryCount::new(c.class_name.clone(), rng.random_range(c.counts.clone())))
            .collect()
    }
}

impl Default for MockDetector {
    fn default() -> Self {
        Self::new(vec![
            CategoryRange::new("Plastic", 1..=5),
            CategoryRange::new("Paper", 1..=3),
            CategoryRange::new("Glass", 1..=2),
            CategoryRange::new("Metal", 0..=1),
            CategoryRange::new("Organic", 0..=2),
        ])
    }
}

#[async_trait]
impl Detector for MockDetector {
    async fn detect(&self, image: &ImageItem) -> Result<Detection, StoreError> {
        let counts = self.detect_counts();
        tracing::info!(
            "Mock detection for image_id={}: {} categories drawn",
            image.id,
            counts.len()
        );
        Ok(Detection {
            counts,
            // No distinct annotated asset; the mapper falls back to the original URL.
            annotated_image_url: None,
        })
    }
}

/// Replays the same batch for every image.
#[derive(Debug, Clone)]
pub struct FixedDetector {
    detection: Detection,
}

impl FixedDetector {
    pub fn new(counts: Vec<CategoryCount>) -> Self {
        Self {
            detection: Detection {
                counts,
                annotated_image_url: None,
            },
        }
    }

    pub fn with_annotated_url(mut self, url: impl Into<String>) -> Self {
        self.detection.annotated_image_url = Some(url.into());
        self
    }
}

#[async_trait]
impl Detector for FixedDetector {
    async fn detect(&self, _image: &ImageItem) -> Result<Detection, StoreError> {
        Ok(self.detection.clone())
    }
}
