//! Job definition and its Redis hash encoding.

use crate::codec::{FieldRecord, FieldValue, parse_json_string_values};
use crate::error::{QueueError, QueueResult};
use crate::keys::compose_parent_key;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Job unique identifier.
pub type JobId = String;

/// Job data payload.
pub type JobData = serde_json::Value;

/// Job hash fields holding JSON text.
const JSON_FIELDS: [&str; 4] = ["data", "opts", "parent", "returnvalue"];

/// Job priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum JobPriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

/// Reference from a child job to the job waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentOptions {
    /// Parent job id
    pub id: String,
    /// Fully qualified parent queue, e.g. `bull:reports`
    pub queue: String,
}

impl ParentOptions {
    pub fn new(queue: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            queue: queue.into(),
        }
    }

    /// The parent's job key, `"{queue}:{id}"`.
    pub fn key(&self) -> String {
        compose_parent_key(&self.queue, &self.id)
    }

    /// The string map form used by [`crate::keys::parent_key`].
    pub fn to_options_record(&self) -> HashMap<String, String> {
        HashMap::from([
            ("queue".to_string(), self.queue.clone()),
            ("id".to_string(), self.id.clone()),
        ])
    }
}

/// Options stored with a job as JSON in its `opts` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobOptions {
    pub priority: JobPriority,
    /// Milliseconds to wait before the job becomes ready
    pub delay: u64,
    /// Maximum number of attempts
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentOptions>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: JobPriority::default(),
            delay: 0,
            attempts: 3,
            parent: None,
        }
    }
}

/// A job to be processed.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,

    /// Job name, used to pick the handler
    pub name: String,

    pub data: JobData,

    pub opts: JobOptions,

    /// Creation time, milliseconds since the epoch
    pub timestamp: i64,

    pub attempts_made: u32,

    /// `"{queue}:{id}"` of the parent job, if any
    pub parent_key: Option<String>,

    pub return_value: Option<JobData>,

    pub failed_reason: Option<String>,

    /// Completion or final failure time, milliseconds since the epoch
    pub finished_on: Option<i64>,
}

impl Job {
    /// Create a new job.
    pub fn new(name: impl Into<String>, data: JobData) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            data,
            opts: JobOptions::default(),
            timestamp: Utc::now().timestamp_millis(),
            attempts_made: 0,
            parent_key: None,
            return_value: None,
            failed_reason: None,
            finished_on: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: JobPriority) -> Self {
        self.opts.priority = priority;
        self
    }

    /// Set max attempts.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.opts.attempts = attempts;
        self
    }

    /// Delay the job.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.opts.delay = delay.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Make this job a child of `parent`.
    pub fn with_parent(mut self, parent: ParentOptions) -> Self {
        self.parent_key = Some(parent.key());
        self.opts.parent = Some(parent);
        self
    }

    /// Epoch milliseconds at which the job may run.
    pub fn ready_at(&self) -> i64 {
        self.timestamp
            .saturating_add(i64::try_from(self.opts.delay).unwrap_or(i64::MAX))
    }

    pub fn is_ready(&self) -> bool {
        Utc::now().timestamp_millis() >= self.ready_at()
    }

    pub fn can_retry(&self) -> bool {
        self.attempts_made < self.opts.attempts
    }

    /// Fields of the job hash, in the order they are written.
    ///
    /// Structured values (`data`, `opts`, `parent`, `returnvalue`) are JSON
    /// text; everything else is a plain scalar.
    pub fn to_field_record(&self) -> QueueResult<FieldRecord> {
        let mut record = FieldRecord::new();
        record.insert("name".into(), self.name.clone().into());
        record.insert("data".into(), json_text(&self.data)?);
        record.insert("opts".into(), json_text(&self.opts)?);
        record.insert("timestamp".into(), self.timestamp.into());
        record.insert("delay".into(), self.opts.delay.into());
        record.insert("priority".into(), (self.opts.priority as u8).into());
        record.insert("attemptsMade".into(), self.attempts_made.into());

        if let (Some(parent_key), Some(parent)) = (&self.parent_key, &self.opts.parent) {
            record.insert("parentKey".into(), parent_key.clone().into());
            record.insert("parent".into(), json_text(parent)?);
        }
        if let Some(value) = &self.return_value {
            record.insert("returnvalue".into(), json_text(value)?);
        }
        if let Some(reason) = &self.failed_reason {
            record.insert("failedReason".into(), reason.clone().into());
        }
        if let Some(finished_on) = self.finished_on {
            record.insert("finishedOn".into(), finished_on.into());
        }

        Ok(record)
    }

    /// Rebuild a job from the string map `HGETALL` returns.
    pub fn from_hash(id: impl Into<String>, mut hash: HashMap<String, String>) -> QueueResult<Self> {
        let id = id.into();
        let name = hash
            .remove("name")
            .ok_or_else(|| QueueError::Deserialization(format!("job {} has no name", id)))?;

        let encoded: Vec<(String, String)> = JSON_FIELDS
            .iter()
            .filter_map(|field| hash.remove(*field).map(|text| (field.to_string(), text)))
            .collect();
        let mut decoded = parse_json_string_values(encoded)?;

        let mut opts: JobOptions = match decoded.remove("opts") {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| QueueError::Deserialization(format!("job {} opts: {}", id, e)))?,
            None => JobOptions::default(),
        };

        // Other clients keep the parent only in its own field
        if opts.parent.is_none() {
            if let Some(value) = decoded.remove("parent") {
                let parent = serde_json::from_value(value)
                    .map_err(|e| QueueError::Deserialization(format!("job {} parent: {}", id, e)))?;
                opts.parent = Some(parent);
            }
        }

        let parent_key = hash
            .remove("parentKey")
            .or_else(|| opts.parent.as_ref().map(ParentOptions::key));

        Ok(Self {
            name,
            data: decoded.remove("data").unwrap_or(FieldValue::Null),
            opts,
            timestamp: parse_number(&id, &hash, "timestamp")?.unwrap_or_default(),
            attempts_made: parse_number(&id, &hash, "attemptsMade")?.unwrap_or_default(),
            parent_key,
            return_value: decoded.remove("returnvalue"),
            failed_reason: hash.remove("failedReason"),
            finished_on: parse_number(&id, &hash, "finishedOn")?,
            id,
        })
    }
}

fn json_text<T: Serialize>(value: &T) -> QueueResult<FieldValue> {
    serde_json::to_string(value)
        .map(FieldValue::String)
        .map_err(|e| QueueError::Serialization(e.to_string()))
}

fn parse_number<T: std::str::FromStr>(
    id: &str,
    hash: &HashMap<String, String>,
    field: &str,
) -> QueueResult<Option<T>> {
    hash.get(field)
        .map(|raw| {
            raw.parse().map_err(|_| {
                QueueError::Deserialization(format!("job {} field {} is not a number: {}", id, field, raw))
            })
        })
        .transpose()
}
