//! Firestore-backed store implementations.
//!
//! Collections: `posts`, `authors`, `assets`. Documents are keyed by the
//! model IDs; field names are camelCase to match the wire format the rest
//! of the platform reads.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use ephem_models::{purge_after, Asset, AssetId, Derivative, Post, PostId, PostState};

use crate::client::StoreClient;
use crate::error::{StoreError, StoreResult};
use crate::repository::{AssetCatalog, AuthorStore, PostStore};
use crate::types::{
    get_integer, get_opt_string, get_opt_timestamp, get_string, get_string_array, get_timestamp,
    CollectionSelector, Filter, StructuredQuery, Value,
};

const POSTS_COLLECTION: &str = "posts";
const AUTHORS_COLLECTION: &str = "authors";
const ASSETS_COLLECTION: &str = "assets";

// ============================================================================
// Field-map conversions
// ============================================================================

fn post_to_fields(post: &Post) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("authorId".to_string(), Value::string(&post.author_id));
    fields.insert("content".to_string(), Value::string(&post.content));
    fields.insert("state".to_string(), Value::string(post.state.as_str()));
    fields.insert("createdAt".to_string(), Value::timestamp(post.created_at));
    fields.insert("expiresAt".to_string(), Value::timestamp(post.expires_at));
    if let Some(deleted_at) = post.deleted_at {
        fields.insert("deletedAt".to_string(), Value::timestamp(deleted_at));
    }
    fields.insert(
        "assetIds".to_string(),
        Value::array(
            post.asset_ids
                .iter()
                .map(|id| Value::string(id.as_str()))
                .collect(),
        ),
    );
    fields
}

fn post_from_fields(doc_id: &str, fields: &HashMap<String, Value>) -> StoreResult<Post> {
    let state_str = get_string(fields, "state")?;
    let state = PostState::parse(&state_str)
        .ok_or_else(|| StoreError::invalid_document(format!("unknown post state '{state_str}'")))?;

    Ok(Post {
        post_id: PostId::from_string(doc_id),
        author_id: get_string(fields, "authorId")?,
        content: get_string(fields, "content")?,
        state,
        created_at: get_timestamp(fields, "createdAt")?,
        expires_at: get_timestamp(fields, "expiresAt")?,
        deleted_at: get_opt_timestamp(fields, "deletedAt")?,
        asset_ids: get_string_array(fields, "assetIds")
            .into_iter()
            .map(AssetId::from_string)
            .collect(),
    })
}

fn asset_to_fields(asset: &Asset) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    if let Some(post_id) = &asset.owner_post_id {
        fields.insert("ownerPostId".to_string(), Value::string(post_id.as_str()));
    }
    fields.insert(
        "originalKey".to_string(),
        Value::string(&asset.original_key),
    );
    fields.insert("mimeType".to_string(), Value::string(&asset.mime_type));
    fields.insert(
        "sizeBytes".to_string(),
        Value::integer(asset.size_bytes as i64),
    );
    fields.insert("createdAt".to_string(), Value::timestamp(asset.created_at));
    if let Some(deleted_at) = asset.deleted_at {
        fields.insert("deletedAt".to_string(), Value::timestamp(deleted_at));
    }

    let derivatives: HashMap<String, Value> = asset
        .derivatives
        .iter()
        .map(|(profile, d)| {
            let mut entry = HashMap::new();
            entry.insert("key".to_string(), Value::string(&d.key));
            entry.insert("width".to_string(), Value::integer(d.width as i64));
            entry.insert("height".to_string(), Value::integer(d.height as i64));
            (profile.clone(), Value::map(entry))
        })
        .collect();
    fields.insert("derivatives".to_string(), Value::map(derivatives));
    fields
}

fn asset_from_fields(doc_id: &str, fields: &HashMap<String, Value>) -> StoreResult<Asset> {
    let mut derivatives = HashMap::new();
    if let Some(Value::MapValue(map)) = fields.get("derivatives") {
        for (profile, value) in map.fields.iter().flatten() {
            if let Value::MapValue(entry) = value {
                let entry_fields = entry.fields.clone().unwrap_or_default();
                derivatives.insert(
                    profile.clone(),
                    Derivative {
                        key: get_string(&entry_fields, "key")?,
                        width: get_integer(&entry_fields, "width")? as u32,
                        height: get_integer(&entry_fields, "height")? as u32,
                    },
                );
            }
        }
    }

    Ok(Asset {
        asset_id: AssetId::from_string(doc_id),
        owner_post_id: get_opt_string(fields, "ownerPostId").map(PostId::from_string),
        original_key: get_string(fields, "originalKey")?,
        mime_type: get_string(fields, "mimeType")?,
        size_bytes: get_integer(fields, "sizeBytes")? as u64,
        created_at: get_timestamp(fields, "createdAt")?,
        deleted_at: get_opt_timestamp(fields, "deletedAt")?,
        derivatives,
    })
}

// ============================================================================
// Post store
// ============================================================================

/// Posts in the `posts` collection.
#[derive(Clone)]
pub struct FirestorePostStore {
    client: StoreClient,
}

impl FirestorePostStore {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    async fn query_posts(&self, filter: Filter) -> StoreResult<Vec<Post>> {
        let query = StructuredQuery {
            from: vec![CollectionSelector {
                collection_id: POSTS_COLLECTION.to_string(),
            }],
            r#where: Some(filter),
            limit: None,
        };

        let docs = self.client.run_query(query).await?;
        let mut posts = Vec::with_capacity(docs.len());
        for doc in docs {
            let Some(doc_id) = doc.doc_id().map(|s| s.to_string()) else {
                continue;
            };
            let fields = doc.fields.unwrap_or_default();
            posts.push(post_from_fields(&doc_id, &fields)?);
        }
        Ok(posts)
    }

    fn state_filter(state: PostState) -> Filter {
        Filter::field("state", "EQUAL", Value::string(state.as_str()))
    }
}

#[async_trait]
impl PostStore for FirestorePostStore {
    async fn create(&self, post: &Post) -> StoreResult<()> {
        self.client
            .create_document(POSTS_COLLECTION, post.post_id.as_str(), post_to_fields(post))
            .await?;
        Ok(())
    }

    async fn get(&self, id: &PostId) -> StoreResult<Option<Post>> {
        let doc = self
            .client
            .get_document(POSTS_COLLECTION, id.as_str())
            .await?;
        match doc {
            Some(doc) => {
                let fields = doc.fields.unwrap_or_default();
                Ok(Some(post_from_fields(id.as_str(), &fields)?))
            }
            None => Ok(None),
        }
    }

    async fn list_due_for_expiry(&self, now: DateTime<Utc>) -> StoreResult<Vec<Post>> {
        self.query_posts(Filter::and(vec![
            Self::state_filter(PostState::Active),
            Filter::field("expiresAt", "LESS_THAN_OR_EQUAL", Value::timestamp(now)),
        ]))
        .await
    }

    async fn list_due_for_purge(&self, now: DateTime<Utc>) -> StoreResult<Vec<Post>> {
        let threshold = now - purge_after();
        self.query_posts(Filter::and(vec![
            Self::state_filter(PostState::Expired),
            Filter::field(
                "createdAt",
                "LESS_THAN_OR_EQUAL",
                Value::timestamp(threshold),
            ),
        ]))
        .await
    }

    async fn transition(
        &self,
        id: &PostId,
        from: PostState,
        to: PostState,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        if !from.can_transition(to) {
            return Ok(false);
        }

        // Read for the current state and updateTime, then patch with a
        // precondition on that updateTime. A concurrent writer makes the
        // precondition fail and we report the CAS as lost.
        let Some(doc) = self.client.get_document(POSTS_COLLECTION, id.as_str()).await? else {
            return Ok(false);
        };
        let fields = doc.fields.clone().unwrap_or_default();
        let current = post_from_fields(id.as_str(), &fields)?;
        if current.state != from {
            return Ok(false);
        }

        let mut patch = HashMap::new();
        let mut mask = vec!["state".to_string()];
        patch.insert("state".to_string(), Value::string(to.as_str()));
        if current.deleted_at.is_none() {
            patch.insert("deletedAt".to_string(), Value::timestamp(now));
            mask.push("deletedAt".to_string());
        }

        let result = self
            .client
            .patch_document(
                POSTS_COLLECTION,
                id.as_str(),
                patch,
                mask,
                doc.update_time.as_deref(),
            )
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if e.is_precondition_failed() => {
                debug!(post_id = %id, "transition lost compare-and-set race");
                Ok(false)
            }
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, id: &PostId) -> StoreResult<()> {
        self.client
            .delete_document(POSTS_COLLECTION, id.as_str())
            .await
    }

    async fn count_by_state(&self, state: PostState) -> StoreResult<u64> {
        let posts = self.query_posts(Self::state_filter(state)).await?;
        Ok(posts.len() as u64)
    }

    async fn count_active_by_author(&self, author_id: &str) -> StoreResult<u64> {
        let posts = self
            .query_posts(Filter::and(vec![
                Self::state_filter(PostState::Active),
                Filter::field("authorId", "EQUAL", Value::string(author_id)),
            ]))
            .await?;
        Ok(posts.len() as u64)
    }

    async fn count_expiring_within(
        &self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> StoreResult<u64> {
        let posts = self
            .query_posts(Filter::and(vec![
                Self::state_filter(PostState::Active),
                Filter::field("expiresAt", "GREATER_THAN", Value::timestamp(now)),
                Filter::field(
                    "expiresAt",
                    "LESS_THAN_OR_EQUAL",
                    Value::timestamp(now + window),
                ),
            ]))
            .await?;
        Ok(posts.len() as u64)
    }
}

// ============================================================================
// Author store
// ============================================================================

/// Denormalized author counters in the `authors` collection.
#[derive(Clone)]
pub struct FirestoreAuthorStore {
    client: StoreClient,
}

impl FirestoreAuthorStore {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AuthorStore for FirestoreAuthorStore {
    async fn set_post_count(&self, author_id: &str, count: u64) -> StoreResult<()> {
        let mut fields = HashMap::new();
        fields.insert("postsCount".to_string(), Value::integer(count as i64));
        fields.insert("updatedAt".to_string(), Value::timestamp(Utc::now()));

        // Patch without precondition upserts the document.
        self.client
            .patch_document(
                AUTHORS_COLLECTION,
                author_id,
                fields,
                vec!["postsCount".to_string(), "updatedAt".to_string()],
                None,
            )
            .await?;
        Ok(())
    }

    async fn get_post_count(&self, author_id: &str) -> StoreResult<Option<u64>> {
        let doc = self
            .client
            .get_document(AUTHORS_COLLECTION, author_id)
            .await?;
        match doc {
            Some(doc) => {
                let fields = doc.fields.unwrap_or_default();
                Ok(Some(get_integer(&fields, "postsCount")?.max(0) as u64))
            }
            None => Ok(None),
        }
    }
}

// ============================================================================
// Asset catalog
// ============================================================================

/// Asset metadata in the `assets` collection.
#[derive(Clone)]
pub struct FirestoreAssetCatalog {
    client: StoreClient,
}

impl FirestoreAssetCatalog {
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetCatalog for FirestoreAssetCatalog {
    async fn put(&self, asset: &Asset) -> StoreResult<()> {
        let fields = asset_to_fields(asset);
        let result = self
            .client
            .create_document(ASSETS_COLLECTION, asset.asset_id.as_str(), fields.clone())
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(StoreError::AlreadyExists(_)) => {
                let mask = fields.keys().cloned().collect();
                self.client
                    .patch_document(ASSETS_COLLECTION, asset.asset_id.as_str(), fields, mask, None)
                    .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn get(&self, id: &AssetId) -> StoreResult<Option<Asset>> {
        let doc = self
            .client
            .get_document(ASSETS_COLLECTION, id.as_str())
            .await?;
        match doc {
            Some(doc) => {
                let fields = doc.fields.unwrap_or_default();
                Ok(Some(asset_from_fields(id.as_str(), &fields)?))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &AssetId) -> StoreResult<()> {
        self.client
            .delete_document(ASSETS_COLLECTION, id.as_str())
            .await
    }
}
