pub mod client;
pub mod local;
pub mod remote;
pub mod stats;
pub mod store;
pub mod upload;

pub use client::ImageStoreClient;
pub use local::LocalImageStore;
pub use remote::RemoteImageStore;
pub use stats::DashboardStats;
pub use store::ImageStore;
pub use upload::{validate_upload, UploadFile, UploadLimits};
