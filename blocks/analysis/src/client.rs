use std::sync::Arc;

use wastelens_atoms::detections::{aggregate, Detector};
use wastelens_atoms::media::ImageItem;
use wastelens_atoms::users::{Principal, Session};
use wastelens_atoms::StoreError;

use crate::stats::DashboardStats;
use crate::store::ImageStore;
use crate::upload::UploadFile;

/// Gated image operations over a pluggable store and detector.
///
/// Each operation resolves the principal from the session first and stops
/// with `Unauthenticated`, before touching the store, when there is none.
#[derive(Clone)]
pub struct ImageStoreClient {
    store: Arc<dyn ImageStore>,
    detector: Arc<dyn Detector>,
}

impl ImageStoreClient {
    pub fn new(store: Arc<dyn ImageStore>, detector: Arc<dyn Detector>) -> Self {
        Self { store, detector }
    }

    /// Store a new image in the unprocessed state. Does not validate the file;
    /// see [`crate::upload::validate_upload`].
    pub async fn upload(&self, session: &Session, file: UploadFile) -> Result<ImageItem, StoreError> {
        let owner = require_principal(session).await?;
        tracing::info!(
            "upload: user_id={}, name={}, size={}",
            owner.id,
            file.name,
            file.bytes.len()
        );

        let item = self.store.insert(&owner, &file).await.map_err(|e| {
            tracing::error!("upload failed: user_id={}, error={}", owner.id, e);
            e
        })?;

        tracing::info!("upload success: user_id={}, image_id={}", owner.id, item.id);
        Ok(item)
    }

    /// Run detection once and commit the batch together with the processed flag.
    pub async fn process(&self, session: &Session, image_id: &str) -> Result<ImageItem, StoreError> {
        let owner = require_principal(session).await?;
        tracing::info!("process: user_id={}, image_id={}", owner.id, image_id);

        let image = self
            .store
            .fetch(&owner, image_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(image_id.to_string()))?;

        if image.processed {
            return Err(StoreError::AlreadyProcessed(image_id.to_string()));
        }

        let detection = self.detector.detect(&image).await?;
        let summary = aggregate(detection.counts);
        let total_objects = summary.total_objects;

        let processed = self
            .store
            .commit_results(&owner, image_id, summary, detection.annotated_image_url)
            .await
            .map_err(|e| {
                tracing::error!(
                    "process failed: user_id={}, image_id={}, error={}",
                    owner.id,
                    image_id,
                    e
                );
                e
            })?;

        tracing::info!(
            "process success: user_id={}, image_id={}, total_objects={}",
            owner.id,
            image_id,
            total_objects
        );
        Ok(processed)
    }

    /// Owned images, oldest first. Anonymous callers get an empty list.
    pub async fn list(&self, session: &Session) -> Result<Vec<ImageItem>, StoreError> {
        let Some(owner) = session.current_principal().await? else {
            return Ok(Vec::new());
        };
        self.store.fetch_all(&owner).await
    }

    pub async fn get(&self, session: &Session, image_id: &str) -> Result<ImageItem, StoreError> {
        let owner = require_principal(session).await?;
        self.store
            .fetch(&owner, image_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(image_id.to_string()))
    }

    /// Delete an owned image. Ids that are unknown or owned by someone else
    /// succeed without effect, so the outcome says nothing about them.
    pub async fn remove(&self, session: &Session, image_id: &str) -> Result<(), StoreError> {
        let owner = require_principal(session).await?;
        tracing::info!("remove: user_id={}, image_id={}", owner.id, image_id);
        self.store.delete(&owner, image_id).await
    }

    /// Dashboard figures over the caller's images. Empty for anonymous callers.
    pub async fn stats(&self, session: &Session) -> Result<DashboardStats, StoreError> {
        let images = self.list(session).await?;
        Ok(DashboardStats::from_images(&images))
    }
}

async fn require_principal(session: &Session) -> Result<Principal, StoreError> {
    session
        .current_principal()
        .await?
        .ok_or(StoreError::Unauthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalImageStore;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::time::{sleep, Duration};
    use wastelens_atoms::detections::{CategoryCount, Detection, FixedDetector, MockDetector};
    use wastelens_atoms::users::{IdentityProvider, SessionTokens, SignUpOutcome};
    use wastelens_atoms::AuthError;

    const EPSILON: f64 = 1e-9;

    /// Maps fixed access tokens to principals.
    struct StaticIdentity {
        principals: HashMap<String, Principal>,
    }

    impl StaticIdentity {
        fn new(users: &[&str]) -> Arc<Self> {
            let principals = users
                .iter()
                .map(|name| {
                    (
                        format!("token-{}", name),
                        Principal {
                            id: format!("id-{}", name),
                            username: name.to_string(),
                            email: format!("{}@example.com", name),
                        },
                    )
                })
                .collect();
            Arc::new(Self { principals })
        }
    }

    #[async_trait]
    impl IdentityProvider for StaticIdentity {
        async fn current_principal(&self, access_token: &str) -> Result<Option<Principal>, AuthError> {
            Ok(self.principals.get(access_token).cloned())
        }

        async fn sign_in(&self, _username: &str, _password: &str) -> Result<SessionTokens, AuthError> {
            Err(AuthError::InvalidCredentials)
        }

        async fn sign_up(&self, _username: &str, _email: &str, _password: &str) -> Result<SignUpOutcome, AuthError> {
            Err(AuthError::Remote("sign-up disabled".to_string()))
        }

        async fn sign_out(&self, _access_token: &str) -> Result<(), AuthError> {
            Ok(())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        root: std::path::PathBuf,
        identity: Arc<StaticIdentity>,
        client: ImageStoreClient,
    }

    impl Harness {
        fn new(detector: Arc<dyn Detector>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = dir.path().join("store");
            let store = Arc::new(LocalImageStore::new(&root));
            Self {
                _dir: dir,
                root,
                identity: StaticIdentity::new(&["alice", "bob"]),
                client: ImageStoreClient::new(store, detector),
            }
        }

        fn fixed(counts: &[(&str, u32)]) -> Self {
            let counts = counts.iter().map(|(name, n)| CategoryCount::new(*name, *n)).collect();
            Self::new(Arc::new(FixedDetector::new(counts)))
        }

        fn session(&self, user: &str) -> Session {
            Session::with_access_token(self.identity.clone(), &format!("token-{}", user))
        }

        fn anonymous(&self) -> Session {
            Session::new(self.identity.clone())
        }
    }

    fn photo(name: &str) -> UploadFile {
        UploadFile::new(name, "image/jpeg", vec![0xFF, 0xD8, 0xFF, 0xE0])
    }

    #[tokio::test]
    async fn upload_returns_unprocessed_item() {
        let h = Harness::fixed(&[]);
        let item = h.client.upload(&h.session("alice"), photo("photo.jpg")).await.unwrap();

        assert_eq!(item.name, "photo.jpg");
        assert!(!item.processed);
        assert_eq!(item.results, None);
        assert!(!item.id.is_empty());
        assert!(chrono::DateTime::parse_from_rfc3339(&item.uploaded_at).is_ok());
    }

    #[tokio::test]
    async fn anonymous_upload_is_rejected_before_any_write() {
        let h = Harness::fixed(&[]);
        assert_matches!(
            h.client.upload(&h.anonymous(), photo("photo.jpg")).await,
            Err(StoreError::Unauthenticated)
        );
        assert!(!h.root.exists());
    }

    #[tokio::test]
    async fn expired_token_is_unauthenticated() {
        let h = Harness::fixed(&[]);
        let session = Session::with_access_token(h.identity.clone(), "token-mallory");
        assert_matches!(h.client.process(&session, "any").await, Err(StoreError::Unauthenticated));
        assert_matches!(h.client.remove(&session, "any").await, Err(StoreError::Unauthenticated));
        assert_matches!(h.client.get(&session, "any").await, Err(StoreError::Unauthenticated));
    }

    #[tokio::test]
    async fn process_normalizes_and_drops_zero_categories() {
        let h = Harness::fixed(&[("Plastic", 3), ("Paper", 0), ("Glass", 2)]);
        let alice = h.session("alice");
        let uploaded = h.client.upload(&alice, photo("photo.jpg")).await.unwrap();

        let item = h.client.process(&alice, &uploaded.id).await.unwrap();
        assert!(item.processed);

        let results = item.results.unwrap();
        assert_eq!(results.total_objects, 5);
        assert_eq!(results.annotated_image_url, uploaded.url);

        let names: Vec<_> = results.detected_objects.iter().map(|o| o.class_name.as_str()).collect();
        assert_eq!(names, ["Plastic", "Glass"]);
        assert!((results.detected_objects[0].percentage - 60.0).abs() < EPSILON);
        assert!((results.detected_objects[1].percentage - 40.0).abs() < EPSILON);
    }

    #[tokio::test]
    async fn detector_annotated_asset_is_kept() {
        let detector = FixedDetector::new(vec![CategoryCount::new("Metal", 1)])
            .with_annotated_url("https://media.example.com/annotated.jpg");
        let h = Harness::new(Arc::new(detector));
        let alice = h.session("alice");
        let uploaded = h.client.upload(&alice, photo("photo.jpg")).await.unwrap();

        let item = h.client.process(&alice, &uploaded.id).await.unwrap();
        assert_eq!(
            item.results.unwrap().annotated_image_url,
            "https://media.example.com/annotated.jpg"
        );
    }

    #[tokio::test]
    async fn all_zero_detection_gives_empty_results() {
        let h = Harness::fixed(&[("Metal", 0), ("Organic", 0)]);
        let alice = h.session("alice");
        let uploaded = h.client.upload(&alice, photo("photo.jpg")).await.unwrap();

        let results = h.client.process(&alice, &uploaded.id).await.unwrap().results.unwrap();
        assert_eq!(results.total_objects, 0);
        assert!(results.detected_objects.is_empty());
    }

    #[tokio::test]
    async fn second_process_is_rejected_and_keeps_first_batch() {
        let h = Harness::new(Arc::new(MockDetector::default()));
        let alice = h.session("alice");
        let uploaded = h.client.upload(&alice, photo("photo.jpg")).await.unwrap();

        let first = h.client.process(&alice, &uploaded.id).await.unwrap();
        assert_matches!(
            h.client.process(&alice, &uploaded.id).await,
            Err(StoreError::AlreadyProcessed(id)) if id == uploaded.id
        );

        let stored = h.client.get(&alice, &uploaded.id).await.unwrap();
        assert_eq!(stored, first);
    }

    #[tokio::test]
    async fn concurrent_process_commits_exactly_once() {
        let h = Harness::new(Arc::new(MockDetector::default()));
        let alice = h.session("alice");
        let uploaded = h.client.upload(&alice, photo("photo.jpg")).await.unwrap();

        let (a, b) = tokio::join!(
            h.client.process(&alice, &uploaded.id),
            h.client.process(&alice, &uploaded.id)
        );
        let outcomes = [a, b];
        let committed: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(committed.len(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(StoreError::AlreadyProcessed(_)))));

        let stored = h.client.get(&alice, &uploaded.id).await.unwrap();
        assert_eq!(&stored, committed[0]);
    }

    #[tokio::test]
    async fn process_unknown_or_foreign_image_is_not_found() {
        let h = Harness::fixed(&[("Plastic", 1)]);
        let alice = h.session("alice");
        let bob = h.session("bob");
        let uploaded = h.client.upload(&alice, photo("photo.jpg")).await.unwrap();

        assert_matches!(h.client.process(&alice, "missing").await, Err(StoreError::NotFound(_)));
        assert_matches!(h.client.process(&bob, &uploaded.id).await, Err(StoreError::NotFound(_)));

        let untouched = h.client.get(&alice, &uploaded.id).await.unwrap();
        assert!(!untouched.processed);
    }

    /// A detector whose backend is down.
    struct FailingDetector;

    #[async_trait]
    impl Detector for FailingDetector {
        async fn detect(&self, _image: &ImageItem) -> Result<Detection, StoreError> {
            Err(StoreError::Remote("detector unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn failed_detection_leaves_image_unprocessed() {
        let h = Harness::new(Arc::new(FailingDetector));
        let alice = h.session("alice");
        let uploaded = h.client.upload(&alice, photo("photo.jpg")).await.unwrap();

        assert_matches!(h.client.process(&alice, &uploaded.id).await, Err(StoreError::Remote(_)));

        let stored = h.client.get(&alice, &uploaded.id).await.unwrap();
        assert!(!stored.processed);
        assert_eq!(stored.results, None);
        assert_eq!(stored, uploaded);
    }

    #[tokio::test]
    async fn failed_commit_leaves_image_unprocessed() {
        let h = Harness::fixed(&[("Plastic", 2)]);
        let alice = h.session("alice");
        let uploaded = h.client.upload(&alice, photo("photo.jpg")).await.unwrap();

        // A directory at the temp-file path makes the document write fail.
        std::fs::create_dir_all(h.root.join("images.json.tmp")).unwrap();
        assert_matches!(h.client.process(&alice, &uploaded.id).await, Err(StoreError::Io(_)));

        let stored = h.client.get(&alice, &uploaded.id).await.unwrap();
        assert!(!stored.processed);
        assert_eq!(stored.results, None);
    }

    #[tokio::test]
    async fn list_is_owner_scoped_and_oldest_first() {
        let h = Harness::fixed(&[]);
        let alice = h.session("alice");
        let bob = h.session("bob");

        let first = h.client.upload(&alice, photo("first.jpg")).await.unwrap();
        sleep(Duration::from_millis(5)).await;
        h.client.upload(&bob, photo("bobs.jpg")).await.unwrap();
        sleep(Duration::from_millis(5)).await;
        let second = h.client.upload(&alice, photo("second.jpg")).await.unwrap();

        let listed = h.client.list(&alice).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, [first.id.as_str(), second.id.as_str()]);

        let bobs = h.client.list(&bob).await.unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].name, "bobs.jpg");
    }

    #[tokio::test]
    async fn anonymous_list_is_empty_not_an_error() {
        let h = Harness::fixed(&[]);
        h.client.upload(&h.session("alice"), photo("photo.jpg")).await.unwrap();
        assert!(h.client.list(&h.anonymous()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_of_foreign_image_is_silent_noop() {
        let h = Harness::fixed(&[]);
        let alice = h.session("alice");
        let bob = h.session("bob");
        let uploaded = h.client.upload(&alice, photo("photo.jpg")).await.unwrap();

        // Same outcome as removing an id that never existed.
        assert!(h.client.remove(&bob, &uploaded.id).await.is_ok());
        assert!(h.client.remove(&bob, "never-existed").await.is_ok());

        assert_eq!(h.client.list(&alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_deletes_image_and_results() {
        let h = Harness::fixed(&[("Glass", 2)]);
        let alice = h.session("alice");
        let uploaded = h.client.upload(&alice, photo("photo.jpg")).await.unwrap();
        h.client.process(&alice, &uploaded.id).await.unwrap();

        h.client.remove(&alice, &uploaded.id).await.unwrap();
        assert_matches!(h.client.get(&alice, &uploaded.id).await, Err(StoreError::NotFound(_)));
        assert!(h.client.list(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn processed_flag_and_results_stay_consistent() {
        let h = Harness::new(Arc::new(MockDetector::default()));
        let alice = h.session("alice");
        for i in 0..6 {
            let item = h.client.upload(&alice, photo(&format!("{}.jpg", i))).await.unwrap();
            if i % 2 == 0 {
                h.client.process(&alice, &item.id).await.unwrap();
            }
        }

        for item in h.client.list(&alice).await.unwrap() {
            match (&item.processed, &item.results) {
                (false, None) => {}
                (true, Some(results)) => {
                    let sum: u32 = results.detected_objects.iter().map(|o| o.count).sum();
                    assert_eq!(sum, results.total_objects);
                    for object in &results.detected_objects {
                        let expected = 100.0 * f64::from(object.count) / f64::from(results.total_objects);
                        assert!((object.percentage - expected).abs() < EPSILON);
                    }
                }
                other => panic!("inconsistent item state: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn stats_cover_callers_images() {
        let h = Harness::fixed(&[("Plastic", 1), ("Paper", 3)]);
        let alice = h.session("alice");
        let a = h.client.upload(&alice, photo("a.jpg")).await.unwrap();
        sleep(Duration::from_millis(5)).await;
        h.client.upload(&alice, photo("b.jpg")).await.unwrap();
        h.client.process(&alice, &a.id).await.unwrap();

        let stats = h.client.stats(&alice).await.unwrap();
        assert_eq!(stats.total_images, 2);
        assert_eq!(stats.images_processed, 1);
        assert_eq!(stats.category_totals.total_objects, 4);

        let anonymous = h.client.stats(&h.anonymous()).await.unwrap();
        assert_eq!(anonymous, DashboardStats::default());
    }
}
