//! Test fixtures for creating test data.
//!
//! The skill catalog is read-only to the server, so skills are inserted
//! straight into the shared `skills` table.

use anyhow::Result;
use skillswap_core::common::{MemberId, SkillId};
use skillswap_core::domains::skills::SkillOffer;
use sqlx::PgPool;

/// Insert a skill offered by `owner_id`
pub async fn create_test_skill(pool: &PgPool, owner_id: MemberId, title: &str) -> Result<SkillId> {
    let skill = SkillOffer::new(owner_id, title)
        .with_description(format!("Learn {} from a patient teacher", title))
        .with_tags(["music", "beginner-friendly"])
        .with_level("beginner");

    sqlx::query(
        "INSERT INTO skills (id, owner_id, title, description, tags, level, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(skill.id)
    .bind(skill.owner_id)
    .bind(&skill.title)
    .bind(&skill.description)
    .bind(&skill.tags)
    .bind(&skill.level)
    .bind(skill.created_at)
    .execute(pool)
    .await?;

    Ok(skill.id)
}

/// A teacher with one skill and a fresh student
pub async fn create_teacher_and_student(
    pool: &PgPool,
    title: &str,
) -> Result<(MemberId, MemberId, SkillId)> {
    let teacher = MemberId::new();
    let student = MemberId::new();
    let skill_id = create_test_skill(pool, teacher, title).await?;
    Ok((teacher, student, skill_id))
}
