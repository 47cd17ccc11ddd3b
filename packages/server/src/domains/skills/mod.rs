// Skill catalog boundary (read-only)
pub mod catalog;
pub mod models;

pub use catalog::{InMemorySkillCatalog, PostgresSkillCatalog, SkillCatalog};
pub use models::SkillOffer;
