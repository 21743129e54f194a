pub mod detections;
pub mod error;
pub mod media;
pub mod users;

pub use error::{AuthError, StoreError};
