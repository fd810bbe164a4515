//! Queue client with Redis backend.

use crate::codec::RedisArgs;
use crate::error::{QueueError, QueueResult};
use crate::job::{Job, JobData, JobId};
use crate::version::{MIN_REDIS_VERSION, is_version_lower_than, parse_redis_version};
use bullq_log::{debug, error, info, warn};
use chrono::Utc;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::collections::HashMap;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Queue name
    pub queue_name: String,

    /// Key prefix shared by every queue of an application
    pub key_prefix: String,

    /// Maximum number of waiting jobs (0 = unlimited)
    pub max_size: usize,

    /// Oldest Redis version accepted at connect time
    pub min_redis_version: String,
}

impl QueueConfig {
    /// Create a new queue configuration.
    pub fn new(redis_url: impl Into<String>, queue_name: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            queue_name: queue_name.into(),
            key_prefix: "bull".to_string(),
            max_size: 0,
            min_redis_version: MIN_REDIS_VERSION.to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `REDIS_URL`, `BULLQ_QUEUE`, `BULLQ_PREFIX`, `BULLQ_MAX_SIZE` and
    /// `BULLQ_MIN_REDIS_VERSION`, falling back to a local server and the
    /// `default` queue.
    pub fn from_env() -> QueueResult<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let queue_name = std::env::var("BULLQ_QUEUE").unwrap_or_else(|_| "default".to_string());
        let mut config = Self::new(redis_url, queue_name);

        if let Ok(prefix) = std::env::var("BULLQ_PREFIX") {
            config = config.with_key_prefix(prefix);
        }

        if let Ok(raw) = std::env::var("BULLQ_MAX_SIZE") {
            let max_size = raw
                .parse()
                .map_err(|_| QueueError::Config(format!("BULLQ_MAX_SIZE is not a number: {}", raw)))?;
            config = config.with_max_size(max_size);
        }

        if let Ok(version) = std::env::var("BULLQ_MIN_REDIS_VERSION") {
            config = config.with_min_redis_version(version);
        }

        Ok(config)
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the maximum queue size.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_min_redis_version(mut self, version: impl Into<String>) -> Self {
        self.min_redis_version = version.into();
        self
    }

    /// `{prefix}:{queue}`, the value a child job stores as its parent queue.
    pub fn queue_key(&self) -> String {
        format!("{}:{}", self.key_prefix, self.queue_name)
    }

    /// Build Redis key.
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.queue_key(), suffix)
    }
}

/// Job queue backed by Redis.
#[derive(Clone)]
pub struct Queue {
    connection: ConnectionManager,
    config: QueueConfig,
}

impl Queue {
    /// Create a new queue.
    pub async fn new(
        redis_url: impl Into<String>,
        queue_name: impl Into<String>,
    ) -> QueueResult<Self> {
        Self::with_config(QueueConfig::new(redis_url, queue_name)).await
    }

    /// Connect and check that the server is recent enough.
    pub async fn with_config(config: QueueConfig) -> QueueResult<Self> {
        info!("Initializing job queue: {}", config.queue_name);
        debug!("Queue config - prefix: {}, max_size: {}", config.key_prefix, config.max_size);

        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::Config(e.to_string()))?;
        let connection = ConnectionManager::new(client).await?;
        let queue = Self { connection, config };

        let current = queue.redis_version().await?;
        if is_version_lower_than(&current, &queue.config.min_redis_version)? {
            warn!(
                "Redis {} is older than the required {}",
                current, queue.config.min_redis_version
            );
            return Err(QueueError::UnsupportedRedisVersion {
                current,
                minimum: queue.config.min_redis_version.clone(),
            });
        }

        info!("Job queue '{}' ready (Redis {})", queue.config.queue_name, current);
        Ok(queue)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Version reported by `INFO server`.
    pub async fn redis_version(&self) -> QueueResult<String> {
        let mut conn = self.connection.clone();
        let info: String = redis::cmd("INFO").arg("server").query_async(&mut conn).await?;
        parse_redis_version(&info)
            .ok_or_else(|| QueueError::Config("INFO server did not report redis_version".into()))
    }

    /// Enqueue a job.
    pub async fn enqueue(&self, name: impl Into<String>, data: JobData) -> QueueResult<JobId> {
        let name = name.into();
        debug!("Enqueueing job: {} on queue '{}'", name, self.config.queue_name);
        self.enqueue_job(Job::new(name, data)).await
    }

    /// Store a job and make it visible to workers.
    ///
    /// The hash, the wait list (or delayed set) and the parent's dependency
    /// set are written in one transaction.
    pub async fn enqueue_job(&self, job: Job) -> QueueResult<JobId> {
        if self.config.max_size > 0 && self.size().await? >= self.config.max_size {
            return Err(QueueError::QueueFull);
        }

        let job_key = self.config.key(&job.id);
        let args = RedisArgs::from_record(&job.to_field_record()?);

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("HSET").arg(&job_key).arg(&args).ignore();

        if job.opts.delay > 0 {
            pipe.cmd("ZADD")
                .arg(self.config.key("delayed"))
                .arg(job.ready_at())
                .arg(&job.id)
                .ignore();
        } else {
            pipe.cmd("LPUSH").arg(self.config.key("wait")).arg(&job.id).ignore();
        }

        if let Some(parent_key) = &job.parent_key {
            pipe.cmd("SADD")
                .arg(format!("{}:dependencies", parent_key))
                .arg(&job_key)
                .ignore();
        }

        let mut conn = self.connection.clone();
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(job.id)
    }

    /// Get a job by ID.
    pub async fn get_job(&self, job_id: &str) -> QueueResult<Option<Job>> {
        let mut conn = self.connection.clone();
        let hash: HashMap<String, String> = conn.hgetall(self.config.key(job_id)).await?;

        if hash.is_empty() {
            return Ok(None);
        }
        Job::from_hash(job_id, hash).map(Some)
    }

    /// Take the next waiting job and count the attempt.
    ///
    /// A job whose hash cannot be decoded is moved to `failed` and skipped.
    pub async fn next_waiting(&self) -> QueueResult<Option<Job>> {
        self.move_delayed_jobs().await?;

        let mut conn = self.connection.clone();
        loop {
            let job_id: Option<String> = conn.rpop(self.config.key("wait"), None).await?;
            let Some(job_id) = job_id else {
                return Ok(None);
            };

            let hash: HashMap<String, String> = conn.hgetall(self.config.key(&job_id)).await?;
            if hash.is_empty() {
                warn!("Job {} was queued but its hash is gone", job_id);
                continue;
            }

            let mut job = match Job::from_hash(&job_id, hash) {
                Ok(job) => job,
                Err(e) => {
                    self.fail_undecodable(&job_id, &e).await?;
                    continue;
                }
            };

            job.attempts_made += 1;
            let _: () = conn
                .hset(self.config.key(&job_id), "attemptsMade", job.attempts_made)
                .await?;

            return Ok(Some(job));
        }
    }

    /// Park a job that cannot be decoded on the `failed` list.
    async fn fail_undecodable(&self, job_id: &str, err: &QueueError) -> QueueResult<()> {
        error!("Job {} cannot be decoded: {}", job_id, err);

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("HSET")
            .arg(self.config.key(job_id))
            .arg("failedReason")
            .arg(err.to_string())
            .arg("finishedOn")
            .arg(Utc::now().timestamp_millis())
            .ignore();
        pipe.cmd("LPUSH").arg(self.config.key("failed")).arg(job_id).ignore();

        let mut conn = self.connection.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Record a successful run.
    pub async fn complete(&self, mut job: Job, return_value: JobData) -> QueueResult<()> {
        job.return_value = Some(return_value);
        job.failed_reason = None;
        job.finished_on = Some(Utc::now().timestamp_millis());
        self.save_job(&job, "completed").await
    }

    /// Record a failed run; the job goes back to `wait` while attempts remain.
    pub async fn fail(&self, mut job: Job, error: String) -> QueueResult<()> {
        job.failed_reason = Some(error);

        if job.can_retry() {
            debug!(
                "Retrying job {} ({}/{})",
                job.id, job.attempts_made, job.opts.attempts
            );
            self.save_job(&job, "wait").await
        } else {
            job.finished_on = Some(Utc::now().timestamp_millis());
            self.save_job(&job, "failed").await
        }
    }

    async fn save_job(&self, job: &Job, list: &str) -> QueueResult<()> {
        let args = RedisArgs::from_record(&job.to_field_record()?);

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("HSET").arg(self.config.key(&job.id)).arg(&args).ignore();
        pipe.cmd("LPUSH").arg(self.config.key(list)).arg(&job.id).ignore();

        let mut conn = self.connection.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Number of waiting and delayed jobs.
    pub async fn size(&self) -> QueueResult<usize> {
        let mut conn = self.connection.clone();
        let waiting: usize = conn.llen(self.config.key("wait")).await?;
        let delayed: usize = conn.zcard(self.config.key("delayed")).await?;
        Ok(waiting + delayed)
    }

    /// Move due delayed jobs to the wait list.
    async fn move_delayed_jobs(&self) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let delayed_key = self.config.key("delayed");
        let now = Utc::now().timestamp_millis();

        let job_ids: Vec<String> = conn.zrangebyscore(&delayed_key, "-inf", now).await?;

        for job_id in job_ids {
            // Only the caller that removes the id gets to requeue it
            let removed: usize = conn.zrem(&delayed_key, &job_id).await?;
            if removed > 0 {
                let _: () = conn.lpush(self.config.key("wait"), &job_id).await?;
            }
        }

        Ok(())
    }

    /// Clear all keys of this queue.
    pub async fn clear(&self) -> QueueResult<()> {
        let mut conn = self.connection.clone();

        let pattern = format!("{}:*", self.config.queue_key());
        let keys: Vec<String> = conn.keys(&pattern).await?;

        if !keys.is_empty() {
            let _: () = conn.del(keys).await?;
        }

        Ok(())
    }
}
