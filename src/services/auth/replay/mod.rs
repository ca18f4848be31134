pub mod cache;
pub mod store;

pub use cache::CacheReplayStore;
pub use store::{ReplayError, ReplayStore};
