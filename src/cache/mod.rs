//! Result cache bounding call volume to the rate-limited remote gateway.
//!
//! A transactional key/value store with per-entry expiry. Keys stay plain
//! text on purpose: they embed the query identity, the requesting user and
//! the requested field list, so a field-set change invalidates stale-shaped
//! entries by construction and an item URL can be substring-matched for
//! invalidation.

mod storage;

pub use storage::CacheStorage;
