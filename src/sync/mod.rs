pub mod record;
pub mod registry;

pub use record::{Completion, SyncDescriptor, SyncId, SyncOutcome, SyncRecord, SyncStatus};
pub use registry::SyncRegistry;

// Sync bookkeeping: the record of a single deferred request and the
// registry that tracks every outstanding one. Both are plain data; all
// mutation goes through the store's dispatch funnel.
