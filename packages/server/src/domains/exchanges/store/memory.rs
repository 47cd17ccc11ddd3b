use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{not_found, ExchangeStateStore};
use crate::common::{ExchangeId, MemberId};
use crate::domains::exchanges::error::ExchangeError;
use crate::domains::exchanges::models::{
    ConflictPredicate, ExchangeRequest, ExchangeStatus, NewExchange, ParticipantRole, Rating,
    StatusChange,
};

/// In-process exchange store for tests and local runs without a database.
///
/// Every mutation holds the write lock for its whole check-and-write, which
/// gives the same atomicity as the Postgres store.
#[derive(Clone, Default)]
pub struct InMemoryExchangeStore {
    records: Arc<RwLock<HashMap<ExchangeId, ExchangeRequest>>>,
}

impl InMemoryExchangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl ExchangeStateStore for InMemoryExchangeStore {
    async fn create_if_absent(
        &self,
        record: NewExchange,
        conflict: ConflictPredicate,
    ) -> Result<ExchangeRequest, ExchangeError> {
        let mut records = self.records.write().await;

        if records.values().any(|existing| conflict.matches(existing)) {
            return Err(ExchangeError::DuplicateRequest);
        }

        let exchange = ExchangeRequest {
            id: record.id,
            skill_id: record.skill_id,
            teacher_id: record.teacher_id,
            student_id: record.student_id,
            status: ExchangeStatus::Pending,
            created_at: Utc::now(),
            start_time: None,
            end_time: None,
            rating: None,
            feedback: None,
        };
        records.insert(exchange.id, exchange.clone());
        Ok(exchange)
    }

    async fn get_by_id(&self, id: ExchangeId) -> Result<ExchangeRequest, ExchangeError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn query_by_participant(
        &self,
        member_id: MemberId,
        role: ParticipantRole,
        status: Option<ExchangeStatus>,
    ) -> Result<Vec<ExchangeRequest>, ExchangeError> {
        let records = self.records.read().await;
        let mut matching: Vec<ExchangeRequest> = records
            .values()
            .filter(|r| r.role_of(member_id) == Some(role))
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();

        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(matching)
    }

    async fn update_status(
        &self,
        id: ExchangeId,
        change: StatusChange,
    ) -> Result<ExchangeRequest, ExchangeError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or_else(|| not_found(id))?;

        if record.status != change.expected {
            return Err(ExchangeError::Conflict);
        }

        change.apply(record);
        Ok(record.clone())
    }

    async fn set_rating(
        &self,
        id: ExchangeId,
        rating: Rating,
        feedback: Option<String>,
    ) -> Result<ExchangeRequest, ExchangeError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or_else(|| not_found(id))?;

        if record.status != ExchangeStatus::Completed {
            return Err(ExchangeError::InvalidState(
                "Can only rate completed exchanges".to_string(),
            ));
        }

        record.rating = Some(rating);
        record.feedback = feedback;
        Ok(record.clone())
    }

    async fn delete(&self, id: ExchangeId, expected: ExchangeStatus) -> Result<(), ExchangeError> {
        let mut records = self.records.write().await;
        let record = records.get(&id).ok_or_else(|| not_found(id))?;

        if record.status != expected {
            return Err(ExchangeError::Conflict);
        }

        records.remove(&id);
        Ok(())
    }
}
