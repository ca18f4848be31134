pub mod client;
pub mod memory;
pub mod read_through;
pub mod valkey;

pub use client::{CacheClient, CacheError, CacheResult};
pub use memory::InMemoryCacheClient;
pub use read_through::{
    CacheEntry, Cached, Page, PageRequest, ReadThroughCache, derive_tag, entity_tag,
    if_none_match_matches, paginate,
};
pub use valkey::ValkeyClient;
