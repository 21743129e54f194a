use std::collections::HashMap;

use aws_sdk_dynamodb::types::{AttributeValue, DeleteRequest, Put, TransactWriteItem, Update, WriteRequest};
use aws_sdk_dynamodb::Client as DynamoClient;
use tokio::time::{sleep, Duration};

use super::model::{ImageRecord, NewImage};
use crate::detections::model::DetectionSummary;
use crate::error::StoreError;

type Item = HashMap<String, AttributeValue>;

const IMAGE_PREFIX: &str = "IMAGE#";
const OBJECT_MARKER: &str = "#OBJECT#";
const BATCH_WRITE_LIMIT: usize = 25;
const MAX_BATCH_ATTEMPTS: u64 = 5;

/// Images and their detection rows live in the owner's partition,
/// so every query is owner-scoped by construction.
pub fn owner_pk(user_id: &str) -> String {
    format!("USER#{}", user_id)
}

pub fn image_sk(image_id: &str) -> String {
    format!("{}{}", IMAGE_PREFIX, image_id)
}

pub fn detection_sk(image_id: &str, index: usize) -> String {
    format!("{}{}{}{:03}", IMAGE_PREFIX, image_id, OBJECT_MARKER, index)
}

/// What a sort key points at.
#[derive(Debug, PartialEq, Eq)]
enum RowKind<'a> {
    Image(&'a str),
    Detection(&'a str),
}

fn row_kind(sk: &str) -> Option<RowKind<'_>> {
    let rest = sk.strip_prefix(IMAGE_PREFIX)?;
    match rest.split_once(OBJECT_MARKER) {
        Some((image_id, _)) => Some(RowKind::Detection(image_id)),
        None => Some(RowKind::Image(rest)),
    }
}

/// Outcome of the conditional processed-flag flip.
#[derive(Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The condition failed: the row is gone or was already processed.
    Rejected,
}

/// Insert a fresh, unprocessed image row.
pub async fn put_image(
    client: &DynamoClient,
    table_name: &str,
    image: NewImage,
) -> Result<ImageRecord, StoreError> {
    let mut builder = client
        .put_item()
        .table_name(table_name)
        .item("PK", AttributeValue::S(owner_pk(&image.user_id)))
        .item("SK", AttributeValue::S(image_sk(&image.id)))
        .item("image_id", AttributeValue::S(image.id.clone()))
        .item("user_id", AttributeValue::S(image.user_id.clone()))
        .item("name", AttributeValue::S(image.name.clone()))
        .item("url", AttributeValue::S(image.url.clone()))
        .item("uploaded_at", AttributeValue::S(image.uploaded_at.clone()))
        .item("processed", AttributeValue::Bool(false))
        .condition_expression("attribute_not_exists(SK)");

    if let Some(object_key) = &image.object_key {
        builder = builder.item("object_key", AttributeValue::S(object_key.clone()));
    }

    builder
        .send()
        .await
        .map_err(|e| StoreError::Remote(format!("DynamoDB put_item error: {}", e)))?;

    Ok(image.into_record())
}

/// Load every image owned by `user_id` with its detection rows joined in.
/// Records come back in table order; callers sort for presentation.
pub async fn load_image_records_for_user(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
) -> Result<Vec<ImageRecord>, StoreError> {
    let rows = query_rows(client, table_name, user_id, IMAGE_PREFIX).await?;
    join_rows(&rows)
}

/// Load one owned image. `None` when absent or owned by someone else.
pub async fn load_image_record(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    image_id: &str,
) -> Result<Option<ImageRecord>, StoreError> {
    let rows = query_rows(client, table_name, user_id, &image_sk(image_id)).await?;
    let records = join_rows(&rows)?;
    Ok(records.into_iter().find(|r| r.id == image_id))
}

/// Write the detection batch and flip `processed` in one transaction.
///
/// The flip is conditional on `processed = false`, so of several concurrent
/// callers at most one commits; the rest get `CommitOutcome::Rejected` and
/// nothing is written for them.
pub async fn commit_detections(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    image_id: &str,
    summary: &DetectionSummary,
    annotated_image_url: Option<&str>,
) -> Result<CommitOutcome, StoreError> {
    let pk = owner_pk(user_id);
    let now = chrono::Utc::now().to_rfc3339();

    let mut set_clauses = vec!["processed = :processed", "processed_at = :now"];
    let mut update = Update::builder()
        .table_name(table_name)
        .key("PK", AttributeValue::S(pk.clone()))
        .key("SK", AttributeValue::S(image_sk(image_id)))
        .condition_expression("attribute_exists(SK) AND processed = :unprocessed")
        .expression_attribute_values(":processed", AttributeValue::Bool(true))
        .expression_attribute_values(":unprocessed", AttributeValue::Bool(false))
        .expression_attribute_values(":now", AttributeValue::S(now));

    if let Some(url) = annotated_image_url {
        set_clauses.push("annotated_image_url = :annotated");
        update = update.expression_attribute_values(":annotated", AttributeValue::S(url.to_string()));
    }

    let update = update
        .update_expression(format!("SET {}", set_clauses.join(", ")))
        .build()
        .map_err(|e| StoreError::Remote(format!("DynamoDB update build error: {}", e)))?;

    let mut transact_items = vec![TransactWriteItem::builder().update(update).build()];

    for (index, object) in summary.detected_objects.iter().enumerate() {
        let put = Put::builder()
            .table_name(table_name)
            .item("PK", AttributeValue::S(pk.clone()))
            .item("SK", AttributeValue::S(detection_sk(image_id, index)))
            .item("image_id", AttributeValue::S(image_id.to_string()))
            .item("class_name", AttributeValue::S(object.class_name.clone()))
            .item("count", AttributeValue::N(object.count.to_string()))
            .item("percentage", AttributeValue::N(object.percentage.to_string()))
            .condition_expression("attribute_not_exists(SK)")
            .build()
            .map_err(|e| StoreError::Remote(format!("DynamoDB put build error: {}", e)))?;
        transact_items.push(TransactWriteItem::builder().put(put).build());
    }

    let result = client
        .transact_write_items()
        .set_transact_items(Some(transact_items))
        .send()
        .await;

    match result {
        Ok(_) => Ok(CommitOutcome::Committed),
        Err(err)
            if err
                .as_service_error()
                .is_some_and(|e| e.is_transaction_canceled_exception()) =>
        {
            tracing::warn!(
                "Detection commit rejected: user_id={}, image_id={}",
                user_id,
                image_id
            );
            Ok(CommitOutcome::Rejected)
        }
        Err(err) => Err(StoreError::Remote(format!(
            "DynamoDB transact_write_items error: {}",
            err
        ))),
    }
}

/// Delete an owned image row and all of its detection rows.
/// Returns the deleted record, or `None` if the caller owns no such image.
pub async fn delete_image_rows(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    image_id: &str,
) -> Result<Option<ImageRecord>, StoreError> {
    let rows = query_rows(client, table_name, user_id, &image_sk(image_id)).await?;

    let mut delete_keys = Vec::new();
    for row in &rows {
        let Some(sk) = row.get("SK").and_then(|v| v.as_s().ok()) else {
            continue;
        };
        let belongs = match row_kind(sk) {
            Some(RowKind::Image(id)) | Some(RowKind::Detection(id)) => id == image_id,
            None => false,
        };
        if belongs {
            delete_keys.push(HashMap::from([
                ("PK".to_string(), AttributeValue::S(owner_pk(user_id))),
                ("SK".to_string(), AttributeValue::S(sk.to_string())),
            ]));
        }
    }

    let deleted = join_rows(&rows)?.into_iter().find(|r| r.id == image_id);
    if delete_keys.is_empty() {
        return Ok(None);
    }

    batch_delete(client, table_name, delete_keys).await?;
    Ok(deleted)
}

async fn query_rows(
    client: &DynamoClient,
    table_name: &str,
    user_id: &str,
    sk_prefix: &str,
) -> Result<Vec<Item>, StoreError> {
    let mut rows = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let result = client
            .query()
            .table_name(table_name)
            .key_condition_expression("PK = :pk AND begins_with(SK, :sk_prefix)")
            .expression_attribute_values(":pk", AttributeValue::S(owner_pk(user_id)))
            .expression_attribute_values(":sk_prefix", AttributeValue::S(sk_prefix.to_string()))
            .consistent_read(true)
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|e| StoreError::Remote(format!("DynamoDB query error: {}", e)))?;

        rows.extend(result.items().iter().cloned());

        start_key = result.last_evaluated_key().cloned();
        if start_key.is_none() {
            break;
        }
    }

    Ok(rows)
}

/// Group image rows with the detection rows that follow them.
fn join_rows(rows: &[Item]) -> Result<Vec<ImageRecord>, StoreError> {
    let mut images: Vec<(&str, &Item)> = Vec::new();
    let mut detections: HashMap<&str, Vec<&Item>> = HashMap::new();

    for row in rows {
        let Some(sk) = row.get("SK").and_then(|v| v.as_s().ok()) else {
            continue;
        };
        match row_kind(sk) {
            Some(RowKind::Image(id)) => images.push((id, row)),
            Some(RowKind::Detection(id)) => detections.entry(id).or_default().push(row),
            None => {}
        }
    }

    images
        .into_iter()
        .map(|(id, row)| {
            let children = detections.remove(id).unwrap_or_default();
            ImageRecord::from_items(row, &children)
        })
        .collect()
}

async fn batch_delete(
    client: &DynamoClient,
    table_name: &str,
    delete_keys: Vec<Item>,
) -> Result<(), StoreError> {
    for chunk in delete_keys.chunks(BATCH_WRITE_LIMIT) {
        let write_reqs = chunk
            .iter()
            .map(|key| {
                DeleteRequest::builder()
                    .set_key(Some(key.clone()))
                    .build()
                    .map(|req| WriteRequest::builder().delete_request(req).build())
                    .map_err(|e| StoreError::Remote(format!("DynamoDB delete build error: {}", e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut unprocessed = Some(write_reqs);
        let mut attempts = 0;
        while let Some(reqs) = unprocessed {
            attempts += 1;
            let result = client
                .batch_write_item()
                .request_items(table_name, reqs)
                .send()
                .await
                .map_err(|e| StoreError::Remote(format!("DynamoDB batch_write_item error: {}", e)))?;

            unprocessed = result
                .unprocessed_items()
                .and_then(|m| m.get(table_name))
                .filter(|v| !v.is_empty())
                .cloned();

            if unprocessed.is_some() {
                if attempts >= MAX_BATCH_ATTEMPTS {
                    return Err(StoreError::Remote(format!(
                        "DynamoDB batch_write_item left {} items unprocessed",
                        unprocessed.map(|v| v.len()).unwrap_or_default()
                    )));
                }
                sleep(Duration::from_millis(100 * attempts)).await;
            }
        }
    }

    Ok(())
}
