//! Application services: the message lifecycle, the rate limiter and the
//! media asset lifecycle. Everything here talks to the outside world only
//! through the ports in `domains`.

pub mod media;
pub mod messages;
pub mod rate_limit;

pub use media::{MediaService, SIGNED_UPLOAD_MAX_AGE_SECS};
pub use messages::{MessageService, MessageSettings};
pub use rate_limit::{RateLimitPolicy, RateLimiter};
