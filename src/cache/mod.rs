pub mod key;
pub mod store;

pub use key::QueryKey;
pub use store::{
    fetcher, CacheConfig, CacheEvent, CacheEventKind, CachedQueryResult, Fetcher, QueryCache,
    Target,
};
