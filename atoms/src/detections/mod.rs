pub mod aggregator;
pub mod detector;
pub mod model;

pub use aggregator::{aggregate, merge_totals};
pub use detector::{CategoryRange, Detection, Detector, FixedDetector, MockDetector};
pub use model::{CategoryCount, DetectedObject, DetectionSummary};
