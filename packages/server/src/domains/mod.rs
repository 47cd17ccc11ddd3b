// Business domains
pub mod auth;
pub mod exchanges;
pub mod skills;
