// Exchange lifecycle: records, persistence contract and transition rules
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod store;

pub use error::ExchangeError;
pub use lifecycle::{ExchangeLifecycleManager, ExchangeWithSkill};
pub use models::*;
pub use store::{ExchangeStateStore, InMemoryExchangeStore, PostgresExchangeStore};
