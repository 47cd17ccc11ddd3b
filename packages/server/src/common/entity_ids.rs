//! Typed ID definitions for all domain entities.
//!
//! ```rust
//! use skillswap_core::common::{ExchangeId, MemberId};
//!
//! let exchange_id: ExchangeId = ExchangeId::new();
//! let member_id: MemberId = MemberId::new();
//!
//! // This would be a compile error:
//! // let wrong: ExchangeId = member_id;
//! # let _ = (exchange_id, member_id);
//! ```

pub use super::id::{Id, V4, V7};

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for members (the identity behind a verified credential).
pub struct Member;

/// Marker type for SkillOffer catalog entries.
pub struct Skill;

/// Marker type for ExchangeRequest records.
pub struct Exchange;

/// Marker type for live real-time connections.
pub struct Connection;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for members. Both teachers and students are members.
pub type MemberId = Id<Member>;

/// Typed ID for skill offers.
pub type SkillId = Id<Skill>;

/// Typed ID for exchange requests. Doubles as the session room name.
pub type ExchangeId = Id<Exchange>;

/// Typed ID for relay connections. Random, never persisted.
pub type ConnectionId = Id<Connection, V4>;
