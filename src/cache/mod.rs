//! Result cache for runnable code blocks.
//!
//! Run output is persisted in a string-keyed [`KeyValueStore`] under keys of
//! the form `run_code_result_<digest>`. The store is injected, so the same
//! cache works over the durable [`FileStore`] in the binary and over
//! [`MemoryStore`] in tests.
//!
//! Entries never expire on their own. The run-code plugin clears every
//! prefixed key once at startup; unrelated keys in the same store are left
//! alone.

mod lock;
mod results;
mod store;

pub(crate) use lock::{mutex_lock, rw_read, rw_write};
pub use results::{CACHE_PREFIX, ResultCache};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError};
