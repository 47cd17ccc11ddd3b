// HTTP routes
pub mod exchanges;
pub mod health;
pub mod session;

pub use exchanges::*;
pub use health::*;
pub use session::*;
