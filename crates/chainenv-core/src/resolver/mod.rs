//! Account resolution
//!
//! Maps accounts to providers and defaults using the project config, and
//! fetches many accounts at once with one store per provider.

mod key_resolver;
mod batch;

pub use key_resolver::{resolve_key, ResolvedKey};
pub use batch::{fetch_all, fetch_one, BatchError, BatchResult, StoreCache};
