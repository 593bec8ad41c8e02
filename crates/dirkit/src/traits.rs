//! Connection collaborator trait
//!
//! The core never talks to a directory server itself. Aggregating converters
//! and callers of the resolver borrow an implementation of this trait for
//! the duration of a call; it is never cached.

use crate::error::DirectoryResult;
use crate::operation::{AddOperation, QueryOperation};
use crate::record::DirectoryRecord;

/// Synchronous access to a directory server.
///
/// Timeouts, cancellation and retries are the implementation's concern.
pub trait DirectoryConnection {
    /// Run a search and return the matching entries.
    fn search(&self, query: &QueryOperation) -> DirectoryResult<Vec<DirectoryRecord>>;

    /// Create an entry.
    fn add(&self, operation: &AddOperation) -> DirectoryResult<()>;
}
