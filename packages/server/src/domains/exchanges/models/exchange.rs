use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{ExchangeId, MemberId, SkillId};
use crate::domains::exchanges::error::ExchangeError;

/// Exchange status. Advances only along the edges in [`ExchangeStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "exchange_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStatus {
    Pending,
    Active,
    Rejected,
    Completed,
}

impl ExchangeStatus {
    /// Statuses that count as an open request for duplicate detection.
    pub const OPEN: [ExchangeStatus; 2] = [ExchangeStatus::Pending, ExchangeStatus::Active];

    /// Legal teacher-driven transitions. Withdrawal is not a status change.
    pub fn can_transition_to(self, next: ExchangeStatus) -> bool {
        matches!(
            (self, next),
            (ExchangeStatus::Pending, ExchangeStatus::Active)
                | (ExchangeStatus::Pending, ExchangeStatus::Rejected)
                | (ExchangeStatus::Active, ExchangeStatus::Completed)
        )
    }

    pub fn is_open(self) -> bool {
        Self::OPEN.contains(&self)
    }
}

impl std::fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangeStatus::Pending => write!(f, "pending"),
            ExchangeStatus::Active => write!(f, "active"),
            ExchangeStatus::Rejected => write!(f, "rejected"),
            ExchangeStatus::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for ExchangeStatus {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExchangeStatus::Pending),
            "active" => Ok(ExchangeStatus::Active),
            "rejected" => Ok(ExchangeStatus::Rejected),
            "completed" => Ok(ExchangeStatus::Completed),
            _ => Err(ExchangeError::ValidationError(format!(
                "Invalid exchange status: {}",
                s
            ))),
        }
    }
}

/// Which side of an exchange a member is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantRole {
    Teacher,
    Student,
}

/// Student rating of a completed exchange, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Rating(i16);

impl Rating {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 5;

    pub fn new(value: i64) -> Result<Self, ExchangeError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value as i16))
        } else {
            Err(ExchangeError::ValidationError(format!(
                "Rating must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )))
        }
    }

    pub fn value(self) -> i16 {
        self.0
    }
}

/// ExchangeRequest - one student's request to learn one skill from its owner
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeRequest {
    pub id: ExchangeId,
    #[serde(rename = "skillRef")]
    pub skill_id: SkillId,
    #[serde(rename = "teacher")]
    pub teacher_id: MemberId,
    #[serde(rename = "student")]
    pub student_id: MemberId,
    pub status: ExchangeStatus,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub rating: Option<Rating>,
    pub feedback: Option<String>,
}

impl ExchangeRequest {
    pub fn is_participant(&self, member_id: MemberId) -> bool {
        self.teacher_id == member_id || self.student_id == member_id
    }

    pub fn role_of(&self, member_id: MemberId) -> Option<ParticipantRole> {
        if self.teacher_id == member_id {
            Some(ParticipantRole::Teacher)
        } else if self.student_id == member_id {
            Some(ParticipantRole::Student)
        } else {
            None
        }
    }
}

/// Input for creating a new exchange. Always starts `pending`.
#[derive(Debug, Clone)]
pub struct NewExchange {
    pub id: ExchangeId,
    pub skill_id: SkillId,
    pub teacher_id: MemberId,
    pub student_id: MemberId,
}

impl NewExchange {
    pub fn new(skill_id: SkillId, teacher_id: MemberId, student_id: MemberId) -> Self {
        Self {
            id: ExchangeId::new(),
            skill_id,
            teacher_id,
            student_id,
        }
    }
}

/// Records that block a new insert: same skill, same student, still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictPredicate {
    pub skill_id: SkillId,
    pub student_id: MemberId,
}

impl ConflictPredicate {
    pub fn open_request(skill_id: SkillId, student_id: MemberId) -> Self {
        Self {
            skill_id,
            student_id,
        }
    }

    pub fn matches(&self, record: &ExchangeRequest) -> bool {
        record.skill_id == self.skill_id
            && record.student_id == self.student_id
            && record.status.is_open()
    }
}

/// Conditional status update: applied only if the stored status is still `expected`.
#[derive(Debug, Clone, Copy)]
pub struct StatusChange {
    pub expected: ExchangeStatus,
    pub new_status: ExchangeStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl StatusChange {
    /// Build the change for `expected -> new_status`, stamping session times.
    pub fn new(expected: ExchangeStatus, new_status: ExchangeStatus, at: DateTime<Utc>) -> Self {
        Self {
            expected,
            new_status,
            start_time: (new_status == ExchangeStatus::Active).then_some(at),
            end_time: (new_status == ExchangeStatus::Completed).then_some(at),
        }
    }

    pub(crate) fn apply(&self, record: &mut ExchangeRequest) {
        record.status = self.new_status;
        if let Some(start) = self.start_time {
            record.start_time = Some(start);
        }
        if let Some(end) = self.end_time {
            record.end_time = Some(end);
        }
    }
}
