pub mod config;
pub mod memory;
pub mod remote;
mod stamp;
pub mod upload;

pub use config::{StoreBackend, StoreConfig};
pub use memory::MemoryStore;
pub use remote::RedisStore;
pub use upload::MemoryFileStore;
