use async_trait::async_trait;
use wastelens_atoms::detections::DetectionSummary;
use wastelens_atoms::media::ImageItem;
use wastelens_atoms::users::Principal;
use wastelens_atoms::StoreError;

use crate::upload::UploadFile;

/// Persistence behind the image store client.
///
/// Every method is scoped to `owner`: an image owned by someone else reads as
/// absent and is never modified.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store the binary and create an unprocessed record.
    async fn insert(&self, owner: &Principal, file: &UploadFile) -> Result<ImageItem, StoreError>;

    async fn fetch(&self, owner: &Principal, image_id: &str) -> Result<Option<ImageItem>, StoreError>;

    /// All owned images, oldest upload first.
    async fn fetch_all(&self, owner: &Principal) -> Result<Vec<ImageItem>, StoreError>;

    /// Attach a detection batch and flip `processed`, atomically and at most once.
    ///
    /// Fails with `NotFound` if the image is not owned by `owner` and with
    /// `AlreadyProcessed` if another batch was committed first. On failure
    /// nothing is written.
    async fn commit_results(
        &self,
        owner: &Principal,
        image_id: &str,
        summary: DetectionSummary,
        annotated_image_url: Option<String>,
    ) -> Result<ImageItem, StoreError>;

    /// Remove an owned image with its detections. Unknown or foreign ids are a no-op.
    async fn delete(&self, owner: &Principal, image_id: &str) -> Result<(), StoreError>;
}
