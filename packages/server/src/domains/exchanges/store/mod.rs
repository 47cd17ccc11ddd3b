//! Persistence contract for exchange records.
//!
//! Races between concurrent callers are settled here, by atomic
//! create-if-absent and compare-and-set updates, never by locks held in the
//! lifecycle layer.

mod memory;
mod postgres;

pub use memory::InMemoryExchangeStore;
pub use postgres::PostgresExchangeStore;

use async_trait::async_trait;

use crate::common::{ExchangeId, MemberId};
use crate::domains::exchanges::error::ExchangeError;
use crate::domains::exchanges::models::{
    ConflictPredicate, ExchangeRequest, ExchangeStatus, NewExchange, ParticipantRole, Rating,
    StatusChange,
};

#[async_trait]
pub trait ExchangeStateStore: Send + Sync {
    /// Insert `record` as `pending` unless a record matching `conflict` exists.
    ///
    /// The check and the insert are one atomic step. Returns
    /// `ExchangeError::DuplicateRequest` when a matching record exists.
    async fn create_if_absent(
        &self,
        record: NewExchange,
        conflict: ConflictPredicate,
    ) -> Result<ExchangeRequest, ExchangeError>;

    async fn get_by_id(&self, id: ExchangeId) -> Result<ExchangeRequest, ExchangeError>;

    /// Records where `member_id` plays `role`, newest first.
    async fn query_by_participant(
        &self,
        member_id: MemberId,
        role: ParticipantRole,
        status: Option<ExchangeStatus>,
    ) -> Result<Vec<ExchangeRequest>, ExchangeError>;

    /// Apply `change` only if the stored status equals `change.expected`.
    ///
    /// Returns `ExchangeError::Conflict` if the status moved underneath the caller.
    async fn update_status(
        &self,
        id: ExchangeId,
        change: StatusChange,
    ) -> Result<ExchangeRequest, ExchangeError>;

    /// Store rating and feedback. Only a `completed` record accepts a rating.
    async fn set_rating(
        &self,
        id: ExchangeId,
        rating: Rating,
        feedback: Option<String>,
    ) -> Result<ExchangeRequest, ExchangeError>;

    /// Delete the record if its stored status still equals `expected`.
    async fn delete(&self, id: ExchangeId, expected: ExchangeStatus) -> Result<(), ExchangeError>;
}

pub(crate) fn not_found(id: ExchangeId) -> ExchangeError {
    ExchangeError::NotFound(format!("Exchange {}", id))
}
