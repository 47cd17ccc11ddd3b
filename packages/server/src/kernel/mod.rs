//! Kernel module - server infrastructure shared by routes and domains.

pub mod session_relay;

pub use session_relay::{JoinError, RelayConfig, RelayEvent, SessionRelay, SignalKind};
