//! Build result cache
//!
//! [`ResultCache`] is the in-process map from (module, variant) to the
//! result of building it. Every key is written at most once per run, and a
//! hit means the build hook is never invoked again for that key.
//!
//! [`CacheStore`] persists successful results between runs so that a later
//! invocation can reuse install directories that still exist on disk.

mod memory;
mod result;
mod store;

pub use memory::ResultCache;
pub use result::{BuildError, BuildResult};
pub use store::{CacheStore, CachedResult};
