//! Qdrant-backed `VectorStore`: the spec's "external service" vector index
//! backend (§6).
//!
//! Chunks are stored as JSON payload under a single `chunk_json` key plus a
//! top-level `scope_id` field Qdrant can filter on, so one collection serves
//! every scope. `PointId` is the chunk's `chunk_id` string.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollection, DeletePoints, Distance, Filter, GetCollectionInfoRequest,
    PointStruct, PointsSelector, ScrollPoints, SearchPoints, UpsertPoints, Value, VectorParams,
    points_selector::PointsSelectorOneOf,
};
use qdrant_client::{Payload, Qdrant};

use crate::chunk::Chunk;
use crate::error::{VectorDataError, VectorDataResult};
use crate::storage::traits::{ScoredChunk, SearchFilters, StorageStats, VectorStore};

/// `VectorStore` implementation backed by a remote Qdrant collection.
#[derive(Clone)]
pub struct QdrantStore {
    client: Qdrant,
    collection_name: String,
    vector_dimension: u64,
}

impl QdrantStore {
    /// Connect to `url` and ensure `collection_name` exists with the given
    /// `vector_dimension`.
    ///
    /// # Errors
    /// Returns [`VectorDataError::StorageUnavailable`] if the client cannot
    /// be constructed, or [`VectorDataError::CollectionError`] if collection
    /// creation fails for a reason other than it already existing.
    pub async fn connect(
        url: &str,
        collection_name: String,
        vector_dimension: u64,
    ) -> VectorDataResult<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Ok(api_key) = std::env::var("QDRANT_API_KEY") {
            builder = builder.api_key(api_key);
        }
        let client = builder
            .build()
            .map_err(|e| VectorDataError::StorageUnavailable(e.to_string()))?;

        let store = Self {
            client,
            collection_name,
            vector_dimension,
        };
        store.ensure_collection().await?;
        Ok(store)
    }

    async fn ensure_collection(&self) -> VectorDataResult<()> {
        let exists = self
            .client
            .collection_exists(self.collection_name.clone())
            .await
            .map_err(|e| VectorDataError::StorageUnavailable(e.to_string()))?;
        if exists {
            return Ok(());
        }

        let request = CreateCollection {
            collection_name: self.collection_name.clone(),
            vectors_config: Some(
                VectorParams {
                    size: self.vector_dimension,
                    distance: Distance::Cosine as i32,
                    ..Default::default()
                }
                .into(),
            ),
            ..Default::default()
        };

        match self.client.create_collection(request).await {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("already exists") => Ok(()),
            Err(e) => Err(VectorDataError::CollectionError(e.to_string())),
        }
    }

    fn scope_filter(scope_id: &str) -> Filter {
        Filter {
            must: vec![Condition::matches("scope_id", scope_id.to_string())],
            ..Default::default()
        }
    }

    fn to_point(chunk: &Chunk) -> VectorDataResult<PointStruct> {
        let json = serde_json::to_string(chunk)?;
        let mut payload = HashMap::new();
        payload.insert("scope_id".to_string(), Value::from(chunk.scope_id.clone()));
        payload.insert("path".to_string(), Value::from(chunk.path.clone()));
        payload.insert("source_id".to_string(), Value::from(chunk.source_id.clone()));
        payload.insert("chunk_json".to_string(), Value::from(json));
        Ok(PointStruct::new(
            chunk.chunk_id.clone(),
            chunk.embedding.clone(),
            Payload::from(payload),
        ))
    }

    fn from_payload(payload: &HashMap<String, Value>) -> VectorDataResult<Chunk> {
        let json = payload
            .get("chunk_json")
            .and_then(|v| v.as_str())
            .ok_or_else(|| VectorDataError::Serialization("missing chunk_json payload".into()))?;
        Ok(serde_json::from_str(json)?)
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn replace_scope(&self, scope_id: &str, chunks: Vec<Chunk>) -> VectorDataResult<()> {
        self.delete_scope(scope_id).await?;
        self.upsert_chunks(scope_id, chunks).await
    }

    async fn upsert_chunks(&self, _scope_id: &str, chunks: Vec<Chunk>) -> VectorDataResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let points = chunks.iter().map(Self::to_point).collect::<VectorDataResult<Vec<_>>>()?;
        let request = UpsertPoints {
            collection_name: self.collection_name.clone(),
            points,
            ..Default::default()
        };
        self.client
            .upsert_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn update_scope(
        &self,
        scope_id: &str,
        chunks: Vec<Chunk>,
        deleted_paths: &[String],
    ) -> VectorDataResult<()> {
        for path in deleted_paths {
            let filter = Filter {
                must: vec![
                    Condition::matches("scope_id", scope_id.to_string()),
                    Condition::matches("path", path.clone()),
                ],
                ..Default::default()
            };
            let request = DeletePoints {
                collection_name: self.collection_name.clone(),
                points: Some(PointsSelector {
                    points_selector_one_of: Some(PointsSelectorOneOf::Filter(filter)),
                }),
                ..Default::default()
            };
            self.client
                .delete_points(request)
                .await
                .map_err(|e| VectorDataError::Storage(e.to_string()))?;
        }
        self.upsert_chunks(scope_id, chunks).await
    }

    async fn delete_scope(&self, scope_id: &str) -> VectorDataResult<()> {
        let request = DeletePoints {
            collection_name: self.collection_name.clone(),
            points: Some(PointsSelector {
                points_selector_one_of: Some(PointsSelectorOneOf::Filter(Self::scope_filter(
                    scope_id,
                ))),
            }),
            ..Default::default()
        };
        self.client
            .delete_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn scope_exists(&self, scope_id: &str) -> VectorDataResult<bool> {
        let chunks = self.get_all_chunks(scope_id, &SearchFilters::default()).await?;
        Ok(!chunks.is_empty())
    }

    async fn get_all_chunks(
        &self,
        scope_id: &str,
        filters: &SearchFilters,
    ) -> VectorDataResult<Vec<Chunk>> {
        let request = ScrollPoints {
            collection_name: self.collection_name.clone(),
            filter: Some(Self::scope_filter(scope_id)),
            with_payload: Some(true.into()),
            limit: Some(10_000),
            ..Default::default()
        };
        let response = self
            .client
            .scroll(request)
            .await
            .map_err(|e| VectorDataError::Storage(e.to_string()))?;

        response
            .result
            .iter()
            .map(|p| Self::from_payload(&p.payload))
            .collect::<VectorDataResult<Vec<_>>>()
            .map(|chunks| chunks.into_iter().filter(|c| filters.matches(c)).collect())
    }

    async fn search(
        &self,
        scope_id: &str,
        vector: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> VectorDataResult<Vec<ScoredChunk>> {
        // Over-fetch to leave room for post-filtering by path_glob/source_ids,
        // which Qdrant's payload filter can't express directly.
        let request = SearchPoints {
            collection_name: self.collection_name.clone(),
            vector: vector.to_vec(),
            filter: Some(Self::scope_filter(scope_id)),
            limit: (limit * 4).max(limit) as u64,
            with_payload: Some(true.into()),
            ..Default::default()
        };
        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        for point in response.result {
            let chunk = Self::from_payload(&point.payload)?;
            if filters.matches(&chunk) {
                results.push(ScoredChunk {
                    chunk,
                    score: point.score,
                });
            }
        }
        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.chunk_id.cmp(&b.chunk.chunk_id))
        });
        results.truncate(limit);
        Ok(results)
    }

    async fn stats(&self, scope_id: &str) -> VectorDataResult<StorageStats> {
        let chunks = self.get_all_chunks(scope_id, &SearchFilters::default()).await?;
        let file_count = chunks
            .iter()
            .map(|c| c.source_id.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();
        Ok(StorageStats {
            chunk_count: chunks.len(),
            file_count,
            storage_type: "qdrant".to_string(),
        })
    }
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore").field("collection_name", &self.collection_name).finish()
    }
}

#[allow(dead_code)]
async fn collection_info(client: &Qdrant, name: &str) -> VectorDataResult<()> {
    let _ = client
        .collection_info(GetCollectionInfoRequest {
            collection_name: name.to_string(),
        })
        .await
        .map_err(|e| VectorDataError::Storage(e.to_string()))?;
    Ok(())
}
