//! Job record helpers and a thin Redis client for BullMQ-style queues.
//!
//! The core is the boundary between typed jobs and what Redis stores:
//! - 🔢 Version gating against the server's `redis_version`
//! - 🧾 Flat `key, value, ...` argument lists for `HSET` and scripts
//! - 🧩 JSON decoding of the string maps `HGETALL` returns
//! - 🔗 Parent keys linking child jobs to their parent
//! - 🚦 Classification of finished job tasks so one failure never stops a batch
//!
//! On top of it sit a small [`Queue`] client and a [`Worker`].
//!
//! ## Job Records
//!
//! ```
//! use bullq_queue::{Job, ParentOptions, codec::object_to_flat_array};
//! use serde_json::json;
//!
//! let job = Job::new("send_welcome", json!({"to": "user@example.com"}))
//!     .with_parent(ParentOptions::new("bull:signups", "17"));
//!
//! assert_eq!(job.parent_key.as_deref(), Some("bull:signups:17"));
//!
//! let record = job.to_field_record().unwrap();
//! let flat = object_to_flat_array(&record);
//! assert_eq!(flat[0], json!("name"));
//! assert_eq!(flat[1], json!("send_welcome"));
//! ```
//!
//! ## Task Outcomes
//!
//! ```
//! use bullq_queue::{extract_result, TaskFailure};
//!
//! let mut notified = 0;
//! let closed = Err::<(), _>(TaskFailure::message("Connection closed by server: reset"));
//! assert_eq!(extract_result(closed, |_, _| notified += 1), None);
//! assert_eq!(notified, 0);
//! ```
//!
//! ## Complete Example
//!
//! ```no_run
//! use bullq_queue::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueueError> {
//!     let queue = Queue::with_config(QueueConfig::from_env()?).await?;
//!
//!     queue.enqueue("send_email", serde_json::json!({"to": "user@example.com"})).await?;
//!
//!     let mut worker = Worker::new(queue);
//!     worker.register_handler("send_email", |job| async move {
//!         Ok(serde_json::json!({"delivered": job.data["to"]}))
//!     });
//!
//!     worker.start().await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod error;
pub mod job;
pub mod keys;
pub mod outcome;
pub mod queue;
pub mod version;
pub mod worker;

pub use codec::{
    FieldRecord, FieldValue, RedisArgs, encode_json_values, object_to_flat_array,
    parse_json_string_values,
};
pub use error::{QueueError, QueueResult};
pub use job::{Job, JobData, JobId, JobOptions, JobPriority, ParentOptions};
pub use keys::{compose_parent_key, parent_key};
pub use outcome::{TaskFailure, TaskOutcome, extract_result, extract_result_to};
pub use queue::{Queue, QueueConfig};
pub use version::{MIN_REDIS_VERSION, is_version_lower_than};
pub use worker::{JobHandler, Worker, WorkerConfig, WorkerEvent};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::codec::{FieldRecord, FieldValue, object_to_flat_array, parse_json_string_values};
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::job::{Job, JobData, JobId, JobPriority, ParentOptions};
    pub use crate::keys::parent_key;
    pub use crate::outcome::{TaskFailure, extract_result};
    pub use crate::queue::{Queue, QueueConfig};
    pub use crate::version::is_version_lower_than;
    pub use crate::worker::{Worker, WorkerConfig, WorkerEvent};
}
