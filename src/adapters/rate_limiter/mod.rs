//! Rate limiter adapters.
//!
//! - `InMemoryRateLimiter` - fixed windows kept in process memory

mod in_memory;

pub use in_memory::InMemoryRateLimiter;
