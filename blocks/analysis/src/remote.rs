use async_trait::async_trait;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use wastelens_atoms::detections::DetectionSummary;
use wastelens_atoms::media::{self, map_record, sort_oldest_first, CommitOutcome, ImageItem, NewImage};
use wastelens_atoms::users::Principal;
use wastelens_atoms::StoreError;

use crate::store::ImageStore;
use crate::upload::UploadFile;

/// Hosted backend: rows in DynamoDB, binaries in S3.
#[derive(Clone)]
pub struct RemoteImageStore {
    dynamo_client: DynamoClient,
    s3_client: S3Client,
    table_name: String,
    bucket_name: String,
    media_base_url: String,
}

impl RemoteImageStore {
    pub fn new(
        dynamo_client: DynamoClient,
        s3_client: S3Client,
        table_name: impl Into<String>,
        bucket_name: impl Into<String>,
        media_base_url: impl Into<String>,
    ) -> Self {
        Self {
            dynamo_client,
            s3_client,
            table_name: table_name.into(),
            bucket_name: bucket_name.into(),
            media_base_url: media_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Best effort: a stray binary is only logged.
    async fn remove_object(&self, object_key: &str) {
        if let Err(e) = self
            .s3_client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(object_key)
            .send()
            .await
        {
            tracing::warn!(
                "S3 delete_object failed: bucket={}, key={}, error={}",
                self.bucket_name,
                object_key,
                e
            );
        }
    }

    async fn load(&self, owner: &Principal, image_id: &str) -> Result<Option<ImageItem>, StoreError> {
        let record =
            media::load_image_record(&self.dynamo_client, &self.table_name, &owner.id, image_id).await?;
        Ok(record.map(map_record))
    }
}

pub fn object_key(user_id: &str, image_id: &str, extension: &str) -> String {
    format!("users/{}/images/{}.{}", user_id, image_id, extension)
}

/// Interpret a commit outcome against the row as read back afterwards.
///
/// A cancelled transaction only means "already processed" when the row says so;
/// conflicts and throttling also cancel it while leaving the row unprocessed.
fn commit_result(
    outcome: CommitOutcome,
    current: Option<ImageItem>,
    image_id: &str,
) -> Result<ImageItem, StoreError> {
    match (outcome, current) {
        (CommitOutcome::Committed, Some(item)) => Ok(item),
        (CommitOutcome::Rejected, Some(item)) if item.processed => {
            Err(StoreError::AlreadyProcessed(image_id.to_string()))
        }
        (CommitOutcome::Rejected, Some(_)) => Err(StoreError::Remote(format!(
            "detection commit for image {} was cancelled without being applied",
            image_id
        ))),
        (_, None) => Err(StoreError::NotFound(image_id.to_string())),
    }
}

#[async_trait]
impl ImageStore for RemoteImageStore {
    async fn insert(&self, owner: &Principal, file: &UploadFile) -> Result<ImageItem, StoreError> {
        let image_id = uuid::Uuid::new_v4().to_string();
        let key = object_key(&owner.id, &image_id, &file.extension());

        self.s3_client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(&file.content_type)
            .body(ByteStream::from(file.bytes.clone()))
            .send()
            .await
            .map_err(|e| StoreError::Remote(format!("S3 put_object error: {}", e)))?;

        let new_image = NewImage {
            id: image_id,
            user_id: owner.id.clone(),
            name: file.name.clone(),
            url: format!("{}/{}", self.media_base_url, key),
            object_key: Some(key.clone()),
            uploaded_at: chrono::Utc::now().to_rfc3339(),
        };

        match media::put_image(&self.dynamo_client, &self.table_name, new_image).await {
            Ok(record) => Ok(map_record(record)),
            Err(e) => {
                self.remove_object(&key).await;
                Err(e)
            }
        }
    }

    async fn fetch(&self, owner: &Principal, image_id: &str) -> Result<Option<ImageItem>, StoreError> {
        self.load(owner, image_id).await
    }

    async fn fetch_all(&self, owner: &Principal) -> Result<Vec<ImageItem>, StoreError> {
        let records =
            media::load_image_records_for_user(&self.dynamo_client, &self.table_name, &owner.id).await?;
        let mut items: Vec<ImageItem> = records.into_iter().map(map_record).collect();
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
        let outcome = media::commit_detections(
            &self.dynamo_client,
            &self.table_name,
            &owner.id,
            image_id,
            &summary,
            annotated_image_url.as_deref(),
        )
        .await?;

        let current = self.load(owner, image_id).await?;
        commit_result(outcome, current, image_id)
    }

    async fn delete(&self, owner: &Principal, image_id: &str) -> Result<(), StoreError> {
        let deleted =
            media::delete_image_rows(&self.dynamo_client, &self.table_name, &owner.id, image_id).await?;

        if let Some(object_key) = deleted.and_then(|record| record.object_key) {
            self.remove_object(&object_key).await;
        }

        Ok(())
    }
}
