mod config;
mod dispatch;
mod poller;
mod tag_cache;

pub use config::CacheConfig;
pub use dispatch::Subscription;
pub use poller::PollSummary;
pub use tag_cache::{SharedLink, TagCache};
