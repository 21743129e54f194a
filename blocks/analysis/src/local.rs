use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use wastelens_atoms::detections::DetectionSummary;
use wastelens_atoms::media::{sort_oldest_first, ImageItem, Results};
use wastelens_atoms::users::Principal;
use wastelens_atoms::StoreError;

use crate::store::ImageStore;
use crate::upload::UploadFile;

/// Fixed key of the persisted image list.
const IMAGES_KEY: &str = "images";
const BLOBS_DIR: &str = "blobs";

/// An image entry as persisted, tagged with its owner.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct StoredImage {
    owner_id: String,
    #[serde(flatten)]
    item: ImageItem,
}

/// Offline store: the whole image list lives in one JSON document that is
/// read, changed and written back wholesale on every mutation.
pub struct LocalImageStore {
    root: PathBuf,
    // Held across read-modify-write so concurrent calls cannot interleave.
    write_lock: Mutex<()>,
}

impl LocalImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn images_path(&self) -> PathBuf {
        self.root.join(format!("{}.json", IMAGES_KEY))
    }

    fn blob_path(&self, image_id: &str, extension: &str) -> PathBuf {
        self.root.join(BLOBS_DIR).join(format!("{}.{}", image_id, extension))
    }

    async fn read_all(&self) -> Result<Vec<StoredImage>, StoreError> {
        match tokio::fs::read(self.images_path()).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, images: &[StoredImage]) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.images_path();
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(images)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn append(&self, owner: &Principal, item: &ImageItem) -> Result<(), StoreError> {
        let mut images = self.read_all().await?;
        images.push(StoredImage {
            owner_id: owner.id.clone(),
            item: item.clone(),
        });
        self.write_all(&images).await
    }
}

fn owned<'a>(images: &'a [StoredImage], owner: &Principal, image_id: &str) -> Option<&'a StoredImage> {
    images
        .iter()
        .find(|s| s.owner_id == owner.id && s.item.id == image_id)
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn insert(&self, owner: &Principal, file: &UploadFile) -> Result<ImageItem, StoreError> {
        let _guard = self.write_lock.lock().await;

        let image_id = uuid::Uuid::new_v4().to_string();
        let blob = self.blob_path(&image_id, &file.extension());
        if let Some(parent) = blob.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&blob, &file.bytes).await?;

        let item = ImageItem {
            id: image_id,
            url: file_url(&blob),
            name: file.name.clone(),
            uploaded_at: chrono::Utc::now().to_rfc3339(),
            processed: false,
            results: None,
        };

        if let Err(e) = self.append(owner, &item).await {
            if let Err(remove_err) = tokio::fs::remove_file(&blob).await {
                tracing::warn!("Failed to remove blob {}: {}", blob.display(), remove_err);
            }
            return Err(e);
        }

        Ok(item)
    }

    async fn fetch(&self, owner: &Principal, image_id: &str) -> Result<Option<ImageItem>, StoreError> {
        let images = self.read_all().await?;
        Ok(owned(&images, owner, image_id).map(|s| s.item.clone()))
    }

    async fn fetch_all(&self, owner: &Principal) -> Result<Vec<ImageItem>, StoreError> {
        let mut items: Vec<ImageItem> = self
            .read_all()
            .await?
            .into_iter()
            .filter(|s| s.owner_id == owner.id)
            .map(|s| s.item)
            .collect();
        sort_oldest_first(&mut items);
        Ok(items)
    }

    async fn commit_results(
        &self,
        owner: &Principal,
        image_id: &str,
        summary: DetectionSummary,
        annotated_image_url: Option<String>,
    ) -> Result<ImageItem, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut images = self.read_all().await?;
        let stored = images
            .iter_mut()
            .find(|s| s.owner_id == owner.id && s.item.id == image_id)
            .ok_or_else(|| StoreError::NotFound(image_id.to_string()))?;

        if stored.item.processed {
            return Err(StoreError::AlreadyProcessed(image_id.to_string()));
        }

        stored.item.processed = true;
        stored.item.results = Some(Results {
            annotated_image_url: annotated_image_url.unwrap_or_else(|| stored.item.url.clone()),
            detected_objects: summary.detected_objects,
            total_objects: summary.total_objects,
        });
        let item = stored.item.clone();

        self.write_all(&images).await?;
        Ok(item)
    }

    async fn delete(&self, owner: &Principal, image_id: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut images = self.read_all().await?;
        let Some(position) = images
            .iter()
            .position(|s| s.owner_id == owner.id && s.item.id == image_id)
        else {
            return Ok(());
        };

        let removed = images.remove(position);
        self.write_all(&images).await?;

        if let Some(path) = removed.item.url.strip_prefix("file://") {
            if let Err(e) = tokio::fs::remove_file(path).await {
                tracing::warn!("Failed to remove blob {}: {}", path, e);
            }
        }

        Ok(())
    }
}
