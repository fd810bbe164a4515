// bullq - BullMQ-style job records for Redis
//
// Re-exports the queue helpers and the logger so applications depend on a
// single crate.

pub use bullq_log as log;

#[cfg(feature = "queue")]
pub use bullq_queue;

#[cfg(feature = "queue")]
pub use bullq_queue::{
    FieldRecord, FieldValue, Job, JobOptions, ParentOptions, Queue, QueueConfig, QueueError,
    QueueResult, TaskFailure, TaskOutcome, Worker, WorkerConfig, WorkerEvent, extract_result,
    is_version_lower_than, object_to_flat_array, parent_key, parse_json_string_values,
};

/// Prelude for common imports.
#[cfg(feature = "queue")]
pub mod prelude {
    pub use bullq_queue::prelude::*;
}
