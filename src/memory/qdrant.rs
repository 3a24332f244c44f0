// src/memory/qdrant.rs
// VectorIndex implementation backed by a Qdrant collection

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info};

use crate::memory::traits::{IndexPoint, VectorIndex};
use crate::memory::types::{MemoryRecord, Role, Scope};

/// Page size for scroll pagination.
const SCROLL_PAGE: u32 = 256;

pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
}

impl QdrantIndex {
    /// Connect to Qdrant and ensure the collection exists with the expected
    /// vector size and cosine distance.
    pub async fn connect(url: &str, collection: &str, dimensions: usize) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .context("failed to connect to Qdrant")?;

        let index = Self {
            client,
            collection: collection.to_string(),
        };
        index.ensure_collection(dimensions).await?;
        Ok(index)
    }

    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        let exists = self.client.collection_exists(&self.collection).await?;
        if exists {
            return Ok(());
        }

        info!("creating Qdrant collection: {}", self.collection);
        match self
            .client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(
                    VectorParamsBuilder::new(dimensions as u64, Distance::Cosine),
                ),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("already exists") => {
                // Lost the creation race to another process.
                debug!("collection {} already exists", self.collection);
                Ok(())
            }
            Err(e) => {
                Err(e).context(format!("failed to create collection: {}", self.collection))
            }
        }
    }

    fn scope_filter(scope: &Scope) -> Filter {
        let mut conditions = vec![Condition::matches("user_id", scope.user_id.clone())];
        if let Some(conv) = &scope.conversation_id {
            conditions.push(Condition::matches("conversation_id", conv.clone()));
        }
        Filter::must(conditions)
    }

    fn record_payload(record: &MemoryRecord) -> HashMap<String, QdrantValue> {
        let mut payload: HashMap<String, QdrantValue> = HashMap::new();
        payload.insert("user_id".to_string(), record.user_id.clone().into());
        if let Some(conv) = &record.conversation_id {
            payload.insert("conversation_id".to_string(), conv.clone().into());
        }
        payload.insert("role".to_string(), record.role.as_str().to_string().into());
        payload.insert("content".to_string(), record.content.clone().into());
        payload.insert(
            "timestamp".to_string(),
            record.timestamp.to_rfc3339().into(),
        );
        payload
    }

    fn payload_to_record(
        id: Option<&PointId>,
        payload: &HashMap<String, QdrantValue>,
        score: Option<f32>,
    ) -> Option<MemoryRecord> {
        let id = match id?.point_id_options.as_ref()? {
            qdrant_client::qdrant::point_id::PointIdOptions::Num(n) => *n,
            qdrant_client::qdrant::point_id::PointIdOptions::Uuid(_) => return None,
        };

        let user_id = payload.get("user_id")?.as_str()?.to_string();
        let conversation_id = payload
            .get("conversation_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let role: Role = payload.get("role")?.as_str()?.parse().ok()?;
        let content = payload.get("content")?.as_str()?.to_string();
        let timestamp = payload
            .get("timestamp")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))?;

        Some(MemoryRecord {
            id,
            user_id,
            conversation_id,
            role,
            content,
            timestamp,
            score,
        })
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<()> {
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| PointStruct::new(p.record.id, p.vector, Self::record_payload(&p.record)))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
            .await
            .context("failed to upsert points to Qdrant")?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], scope: &Scope, k: usize) -> Result<Vec<MemoryRecord>> {
        let results = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector.to_vec(), k as u64)
                    .filter(Self::scope_filter(scope))
                    .with_payload(true),
            )
            .await
            .context("failed to search Qdrant")?;

        Ok(results
            .result
            .into_iter()
            .filter_map(|point| {
                Self::payload_to_record(point.id.as_ref(), &point.payload, Some(point.score))
            })
            .collect())
    }

    async fn scroll(&self, scope: &Scope, limit: Option<usize>) -> Result<Vec<MemoryRecord>> {
        let mut records = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let page = match limit {
                Some(limit) => u32::min(SCROLL_PAGE, (limit - records.len()) as u32),
                None => SCROLL_PAGE,
            };
            if page == 0 {
                break;
            }

            let mut builder = ScrollPointsBuilder::new(&self.collection)
                .filter(Self::scope_filter(scope))
                .limit(page)
                .with_payload(true)
                .with_vectors(false);
            if let Some(ref off) = offset {
                builder = builder.offset(off.clone());
            }

            let response = self
                .client
                .scroll(builder)
                .await
                .context("failed to scroll Qdrant")?;

            if response.result.is_empty() {
                break;
            }

            let fetched = response.result.len();
            offset = response.result.last().and_then(|p| p.id.clone());
            records.extend(response.result.into_iter().filter_map(|point| {
                Self::payload_to_record(point.id.as_ref(), &point.payload, None)
            }));

            if fetched < page as usize {
                break;
            }
            if limit.is_some_and(|l| records.len() >= l) {
                break;
            }
        }

        Ok(records)
    }

    async fn delete(&self, ids: &[u64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let points: Vec<PointId> = ids.iter().map(|&id| PointId::from(id)).collect();
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(points)
                    .wait(true),
            )
            .await
            .context("failed to delete points from Qdrant")?;
        debug!("deleted {} points from {}", ids.len(), self.collection);
        Ok(())
    }

    async fn delete_by_scope(&self, scope: &Scope) -> Result<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(Self::scope_filter(scope))
                    .wait(true),
            )
            .await
            .context("failed to delete scope from Qdrant")?;
        debug!("deleted scope {} from {}", scope, self.collection);
        Ok(())
    }
}
