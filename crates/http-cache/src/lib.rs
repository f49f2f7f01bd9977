pub mod disk_cache;
pub mod retrying_client;

pub use disk_cache::{CacheRecord, DiskCache, Validity};
pub use retrying_client::RetryingClient;
