// Re-export model types, the mapper and the DynamoDB service functions
pub mod mapper;
pub mod model;
pub mod service;

pub use mapper::{map_record, sort_oldest_first};
pub use model::{DetectionRecord, ImageItem, ImageRecord, NewImage, Results};
pub use service::*;
