// SkillSwap - exchange lifecycle and live session relay
//
// Students request sessions for skills that teachers offer; once a teacher
// accepts, both sides meet in a relay room named after the exchange.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
