//! Shared stores that make invocation logs visible across processes.
//!
//! A store holds whole documents by identifier. The limiter keeps every key's log
//! in a single JSON document and reads, evaluates and writes it back on each call.
//! That sequence is only a critical section within one process: two processes
//! sharing a store can both read a stale count and both admit a call.

mod file;
mod memory;

pub use file::FileSharedLog;
pub use memory::MemorySharedLog;

use std::sync::Arc;

use crate::error::Result;

/// Document store backing a shared invocation log.
///
/// Implementations report failures as errors; the limiter does not retry, so a
/// store needing resilience must provide its own retry policy.
pub trait SharedLog: Send + Sync {
    /// Whether a document named `id` exists.
    fn exists(&self, id: &str) -> Result<bool>;

    /// Read the document named `id`, or `None` if it does not exist.
    fn get(&self, id: &str) -> Result<Option<String>>;

    /// Replace the document named `id`.
    fn set(&self, id: &str, document: &str) -> Result<()>;
}

impl<S: SharedLog + ?Sized> SharedLog for Arc<S> {
    fn exists(&self, id: &str) -> Result<bool> {
        (**self).exists(id)
    }

    fn get(&self, id: &str) -> Result<Option<String>> {
        (**self).get(id)
    }

    fn set(&self, id: &str, document: &str) -> Result<()> {
        (**self).set(id, document)
    }
}

impl<S: SharedLog + ?Sized> SharedLog for Box<S> {
    fn exists(&self, id: &str) -> Result<bool> {
        (**self).exists(id)
    }

    fn get(&self, id: &str) -> Result<Option<String>> {
        (**self).get(id)
    }

    fn set(&self, id: &str, document: &str) -> Result<()> {
        (**self).set(id, document)
    }
}
