use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::{not_found, ExchangeStateStore};
use crate::common::{ExchangeId, MemberId};
use crate::domains::exchanges::error::ExchangeError;
use crate::domains::exchanges::models::{
    ConflictPredicate, ExchangeRequest, ExchangeStatus, NewExchange, ParticipantRole, Rating,
    StatusChange,
};

/// PostgreSQL-backed exchange store.
///
/// Duplicate detection rides on the `exchanges_one_open_per_student` partial
/// unique index, so `create_if_absent` is a single `INSERT .. ON CONFLICT`.
#[derive(Clone)]
pub struct PostgresExchangeStore {
    pool: PgPool,
}

impl PostgresExchangeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: ExchangeId) -> Result<bool, ExchangeError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM exchanges WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

#[async_trait]
impl ExchangeStateStore for PostgresExchangeStore {
    async fn create_if_absent(
        &self,
        record: NewExchange,
        conflict: ConflictPredicate,
    ) -> Result<ExchangeRequest, ExchangeError> {
        if conflict.skill_id != record.skill_id || conflict.student_id != record.student_id {
            return Err(ExchangeError::Internal(anyhow::anyhow!(
                "conflict predicate must target the inserted skill and student"
            )));
        }

        let inserted = sqlx::query_as::<_, ExchangeRequest>(
            r#"
            INSERT INTO exchanges (id, skill_id, teacher_id, student_id, status)
            VALUES ($1, $2, $3, $4, 'pending')
            ON CONFLICT (skill_id, student_id) WHERE status IN ('pending', 'active')
            DO NOTHING
            RETURNING *
            "#,
        )
        .bind(record.id)
        .bind(record.skill_id)
        .bind(record.teacher_id)
        .bind(record.student_id)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(exchange) => Ok(exchange),
            None => {
                debug!(
                    skill_id = %record.skill_id,
                    student_id = %record.student_id,
                    "Open exchange already exists"
                );
                Err(ExchangeError::DuplicateRequest)
            }
        }
    }

    async fn get_by_id(&self, id: ExchangeId) -> Result<ExchangeRequest, ExchangeError> {
        sqlx::query_as::<_, ExchangeRequest>("SELECT * FROM exchanges WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn query_by_participant(
        &self,
        member_id: MemberId,
        role: ParticipantRole,
        status: Option<ExchangeStatus>,
    ) -> Result<Vec<ExchangeRequest>, ExchangeError> {
        let column = match role {
            ParticipantRole::Teacher => "teacher_id",
            ParticipantRole::Student => "student_id",
        };

        let sql = format!(
            r#"
            SELECT * FROM exchanges
            WHERE {column} = $1
              AND ($2::exchange_status IS NULL OR status = $2)
            ORDER BY created_at DESC, id DESC
            "#
        );

        let exchanges = sqlx::query_as::<_, ExchangeRequest>(&sql)
            .bind(member_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        Ok(exchanges)
    }

    async fn update_status(
        &self,
        id: ExchangeId,
        change: StatusChange,
    ) -> Result<ExchangeRequest, ExchangeError> {
        let updated = sqlx::query_as::<_, ExchangeRequest>(
            r#"
            UPDATE exchanges
            SET status = $3,
                start_time = COALESCE($4, start_time),
                end_time = COALESCE($5, end_time)
            WHERE id = $1 AND status = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(change.expected)
        .bind(change.new_status)
        .bind(change.start_time)
        .bind(change.end_time)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(exchange) => Ok(exchange),
            None if self.exists(id).await? => Err(ExchangeError::Conflict),
            None => Err(not_found(id)),
        }
    }

    async fn set_rating(
        &self,
        id: ExchangeId,
        rating: Rating,
        feedback: Option<String>,
    ) -> Result<ExchangeRequest, ExchangeError> {
        let updated = sqlx::query_as::<_, ExchangeRequest>(
            r#"
            UPDATE exchanges
            SET rating = $2, feedback = $3
            WHERE id = $1 AND status = 'completed'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(rating)
        .bind(feedback)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(exchange) => Ok(exchange),
            None if self.exists(id).await? => Err(ExchangeError::InvalidState(
                "Can only rate completed exchanges".to_string(),
            )),
            None => Err(not_found(id)),
        }
    }

    async fn delete(&self, id: ExchangeId, expected: ExchangeStatus) -> Result<(), ExchangeError> {
        let result = sqlx::query("DELETE FROM exchanges WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(expected)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            Ok(())
        } else if self.exists(id).await? {
            Err(ExchangeError::Conflict)
        } else {
            Err(not_found(id))
        }
    }
}
