//! Exchange lifecycle rules.
//!
//! ```text
//!            accept             end session
//! pending ──────────▶ active ──────────────▶ completed
//!    │
//!    ├── decline ───▶ rejected
//!    └── withdraw ──▶ (deleted)
//! ```
//!
//! Only the teacher moves the status; only the student withdraws or rates.
//! Callers arrive with an identity already resolved by the authorization gate.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::common::{ExchangeId, MemberId, SkillId, StorePolicy};
use crate::domains::exchanges::error::ExchangeError;
use crate::domains::exchanges::models::{
    ConflictPredicate, ExchangeRequest, ExchangeStatus, NewExchange, ParticipantRole, Rating,
    StatusChange,
};
use crate::domains::exchanges::store::ExchangeStateStore;
use crate::domains::skills::{SkillCatalog, SkillOffer};

/// An exchange joined with the display metadata of its skill.
///
/// `skill` is `None` when the skill has since been removed from the catalog.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeWithSkill {
    #[serde(flatten)]
    pub exchange: ExchangeRequest,
    pub skill: Option<SkillOffer>,
}

#[derive(Clone)]
pub struct ExchangeLifecycleManager {
    store: Arc<dyn ExchangeStateStore>,
    catalog: Arc<dyn SkillCatalog>,
    policy: StorePolicy,
}

impl ExchangeLifecycleManager {
    pub fn new(
        store: Arc<dyn ExchangeStateStore>,
        catalog: Arc<dyn SkillCatalog>,
        policy: StorePolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            policy,
        }
    }

    /// Student asks the owner of `skill_id` for a session.
    pub async fn request_exchange(
        &self,
        skill_id: SkillId,
        student_id: MemberId,
    ) -> Result<ExchangeRequest, ExchangeError> {
        let skill = self
            .policy
            .run_read("get_skill", || self.catalog.get_skill(skill_id))
            .await?;

        if skill.owner_id == student_id {
            return Err(ExchangeError::SelfRequestForbidden);
        }

        let record = NewExchange::new(skill_id, skill.owner_id, student_id);
        let conflict = ConflictPredicate::open_request(skill_id, student_id);
        let exchange = self
            .policy
            .run("create_if_absent", self.store.create_if_absent(record, conflict))
            .await?;

        info!(
            exchange_id = %exchange.id,
            skill_id = %skill_id,
            teacher_id = %exchange.teacher_id,
            student_id = %student_id,
            "Exchange requested"
        );
        Ok(exchange)
    }

    /// Load an exchange visible to `caller` (its teacher or its student).
    pub async fn get_exchange(
        &self,
        id: ExchangeId,
        caller: MemberId,
    ) -> Result<ExchangeRequest, ExchangeError> {
        let exchange = self.load(id).await?;
        if !exchange.is_participant(caller) {
            return Err(ExchangeError::Unauthorized(
                "Only participants can view this exchange".to_string(),
            ));
        }
        Ok(exchange)
    }

    /// Teacher advances the status along a legal edge.
    pub async fn transition_status(
        &self,
        id: ExchangeId,
        caller: MemberId,
        new_status: ExchangeStatus,
    ) -> Result<ExchangeRequest, ExchangeError> {
        let exchange = self.load_as_teacher(id, caller).await?;
        self.apply_transition(exchange, new_status).await
    }

    /// Same as [`Self::transition_status`] for a target named on the wire.
    ///
    /// The record and the caller are checked first; a name outside the status
    /// set is an illegal edge like any other.
    pub async fn transition_status_named(
        &self,
        id: ExchangeId,
        caller: MemberId,
        target: &str,
    ) -> Result<ExchangeRequest, ExchangeError> {
        let exchange = self.load_as_teacher(id, caller).await?;
        let new_status = target
            .parse::<ExchangeStatus>()
            .map_err(|_| ExchangeError::InvalidTransition {
                from: exchange.status,
                to: target.to_string(),
            })?;
        self.apply_transition(exchange, new_status).await
    }

    async fn load_as_teacher(
        &self,
        id: ExchangeId,
        caller: MemberId,
    ) -> Result<ExchangeRequest, ExchangeError> {
        let exchange = self.load(id).await?;
        if exchange.teacher_id != caller {
            return Err(ExchangeError::Unauthorized(
                "Only the teacher can change the exchange status".to_string(),
            ));
        }
        Ok(exchange)
    }

    async fn apply_transition(
        &self,
        exchange: ExchangeRequest,
        new_status: ExchangeStatus,
    ) -> Result<ExchangeRequest, ExchangeError> {
        if !exchange.status.can_transition_to(new_status) {
            return Err(ExchangeError::InvalidTransition {
                from: exchange.status,
                to: new_status.to_string(),
            });
        }

        let change = StatusChange::new(exchange.status, new_status, Utc::now());
        let updated = self
            .policy
            .run("update_status", self.store.update_status(exchange.id, change))
            .await?;

        info!(
            exchange_id = %exchange.id,
            from = %exchange.status,
            to = %new_status,
            "Exchange status changed"
        );
        Ok(updated)
    }

    /// Student cancels a request the teacher has not answered yet.
    pub async fn withdraw_exchange(
        &self,
        id: ExchangeId,
        caller: MemberId,
    ) -> Result<(), ExchangeError> {
        let exchange = self.load(id).await?;

        if exchange.student_id != caller {
            return Err(ExchangeError::Unauthorized(
                "Only the requesting student can withdraw".to_string(),
            ));
        }

        if exchange.status != ExchangeStatus::Pending {
            return Err(ExchangeError::InvalidState(format!(
                "Only pending exchanges can be withdrawn, this one is {}",
                exchange.status
            )));
        }

        self.policy
            .run("delete", self.store.delete(id, ExchangeStatus::Pending))
            .await?;

        info!(exchange_id = %id, "Exchange withdrawn");
        Ok(())
    }

    /// Student rates a completed exchange. A later rating replaces an earlier one.
    pub async fn rate_exchange(
        &self,
        id: ExchangeId,
        caller: MemberId,
        rating: i64,
        feedback: Option<String>,
    ) -> Result<ExchangeRequest, ExchangeError> {
        let exchange = self.load(id).await?;

        if exchange.student_id != caller {
            return Err(ExchangeError::Unauthorized(
                "Only the student can rate this exchange".to_string(),
            ));
        }

        if exchange.status != ExchangeStatus::Completed {
            return Err(ExchangeError::InvalidState(
                "Can only rate completed exchanges".to_string(),
            ));
        }

        let rating = Rating::new(rating)?;

        let rated = self
            .policy
            .run("set_rating", self.store.set_rating(id, rating, feedback))
            .await?;

        info!(exchange_id = %id, rating = rating.value(), "Exchange rated");
        Ok(rated)
    }

    /// Everything `caller` teaches or attends, newest first, with skill metadata.
    pub async fn list_exchanges(
        &self,
        caller: MemberId,
        status: Option<ExchangeStatus>,
    ) -> Result<Vec<ExchangeWithSkill>, ExchangeError> {
        let mut exchanges = self
            .policy
            .run_read("query_by_participant", || {
                self.store
                    .query_by_participant(caller, ParticipantRole::Student, status)
            })
            .await?;

        let teaching = self
            .policy
            .run_read("query_by_participant", || {
                self.store
                    .query_by_participant(caller, ParticipantRole::Teacher, status)
            })
            .await?;

        exchanges.extend(teaching);
        exchanges.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let mut skill_ids: Vec<SkillId> = exchanges.iter().map(|e| e.skill_id).collect();
        skill_ids.sort();
        skill_ids.dedup();

        let skills = self
            .policy
            .run_read("get_skills", || self.catalog.get_skills(&skill_ids))
            .await?;

        debug!(
            member_id = %caller,
            exchanges = exchanges.len(),
            skills = skills.len(),
            "Listed exchanges"
        );

        Ok(exchanges
            .into_iter()
            .map(|exchange| {
                let skill = skills.get(&exchange.skill_id).cloned();
                ExchangeWithSkill { exchange, skill }
            })
            .collect())
    }

    async fn load(&self, id: ExchangeId) -> Result<ExchangeRequest, ExchangeError> {
        self.policy
            .run_read("get_by_id", || self.store.get_by_id(id))
            .await
    }
}
