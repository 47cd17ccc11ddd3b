use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::{MemberId, SkillId};

/// SkillOffer - a catalog entry describing a skill one member teaches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SkillOffer {
    pub id: SkillId,
    #[serde(rename = "owner")]
    pub owner_id: MemberId,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub level: String,
    pub created_at: DateTime<Utc>,
}

impl SkillOffer {
    pub fn new(owner_id: MemberId, title: impl Into<String>) -> Self {
        Self {
            id: SkillId::new(),
            owner_id,
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            level: "beginner".to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self.tags.sort();
        self.tags.dedup();
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_behave_as_a_set() {
        let skill = SkillOffer::new(MemberId::new(), "Guitar").with_tags(["music", "strings", "music"]);
        assert_eq!(skill.tags, vec!["music".to_string(), "strings".to_string()]);
    }

    #[test]
    fn test_serializes_owner_under_api_name() {
        let owner = MemberId::new();
        let json = serde_json::to_value(SkillOffer::new(owner, "Guitar")).unwrap();
        assert_eq!(json["owner"], serde_json::json!(owner));
        assert_eq!(json["title"], "Guitar");
    }
}
