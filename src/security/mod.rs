//! Admin access control: sessions and request rate limiting

pub mod rate_limit;
pub mod session;

pub use rate_limit::RateLimiter;
pub use session::{Session, SessionStore};
