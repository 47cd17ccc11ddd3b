//! Read-only access to the skill catalog.
//!
//! The catalog is owned by another service; this server only needs to know
//! whether a skill exists, who owns it, and its display metadata.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::RwLock;

use super::models::SkillOffer;
use crate::common::SkillId;
use crate::domains::exchanges::error::ExchangeError;

#[async_trait]
pub trait SkillCatalog: Send + Sync {
    /// Look up a single skill. Fails with `NotFound` if it does not exist.
    async fn get_skill(&self, id: SkillId) -> Result<SkillOffer, ExchangeError>;

    /// Batch lookup for listings. Missing skills are simply absent from the map.
    async fn get_skills(&self, ids: &[SkillId])
        -> Result<HashMap<SkillId, SkillOffer>, ExchangeError>;
}

fn skill_not_found(id: SkillId) -> ExchangeError {
    ExchangeError::NotFound(format!("Skill {}", id))
}

/// Catalog backed by the shared `skills` table.
#[derive(Clone)]
pub struct PostgresSkillCatalog {
    pool: PgPool,
}

impl PostgresSkillCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SkillCatalog for PostgresSkillCatalog {
    async fn get_skill(&self, id: SkillId) -> Result<SkillOffer, ExchangeError> {
        sqlx::query_as::<_, SkillOffer>(
            "SELECT id, owner_id, title, description, tags, level, created_at FROM skills WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| skill_not_found(id))
    }

    async fn get_skills(
        &self,
        ids: &[SkillId],
    ) -> Result<HashMap<SkillId, SkillOffer>, ExchangeError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let skills = sqlx::query_as::<_, SkillOffer>(
            "SELECT id, owner_id, title, description, tags, level, created_at FROM skills WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(skills.into_iter().map(|s| (s.id, s)).collect())
    }
}

/// In-process catalog for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemorySkillCatalog {
    skills: Arc<RwLock<HashMap<SkillId, SkillOffer>>>,
}

impl InMemorySkillCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, skill: SkillOffer) -> SkillId {
        let id = skill.id;
        self.skills.write().await.insert(id, skill);
        id
    }

    pub async fn remove(&self, id: SkillId) -> Option<SkillOffer> {
        self.skills.write().await.remove(&id)
    }
}

#[async_trait]
impl SkillCatalog for InMemorySkillCatalog {
    async fn get_skill(&self, id: SkillId) -> Result<SkillOffer, ExchangeError> {
        self.skills
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| skill_not_found(id))
    }

    async fn get_skills(
        &self,
        ids: &[SkillId],
    ) -> Result<HashMap<SkillId, SkillOffer>, ExchangeError> {
        let skills = self.skills.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| skills.get(id).map(|s| (*id, s.clone())))
            .collect())
    }
}
