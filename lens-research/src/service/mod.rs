//! Service layer
//!
//! Services hold the business logic around the controller: the
//! fingerprint-keyed result cache and the multi-lens fan-out.

mod cache;
mod multi_lens;

pub use cache::{CACHE_EXPIRATION_HOURS, CACHE_PREFIX, CacheEntry, ResultCache};
pub use multi_lens::{MultiLensReport, run_multi_lens};
