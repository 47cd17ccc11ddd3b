// Credential verification and identity resolution
pub mod gate;
pub mod jwt;

pub use gate::{AuthorizationGate, IdentityVerifier};
pub use jwt::{Claims, JwtService};
