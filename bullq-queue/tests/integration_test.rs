//! Integration tests for bullq-queue

use bullq_queue::*;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

#[test]
fn test_queue_config_creation() {
    let config = QueueConfig::new("redis://localhost:6379", "default");
    assert_eq!(config.redis_url, "redis://localhost:6379");
    assert_eq!(config.queue_name, "default");
    assert_eq!(config.queue_key(), "bull:default");
}

#[test]
fn test_version_gate_examples() {
    assert!(is_version_lower_than("4.0.0", "4.0.1").unwrap());
    assert!(!is_version_lower_than("4.1.0", "4.0.9").unwrap());
    assert!(!is_version_lower_than(MIN_REDIS_VERSION, MIN_REDIS_VERSION).unwrap());
    assert!(matches!(
        is_version_lower_than("seven", MIN_REDIS_VERSION),
        Err(QueueError::VersionParse { .. })
    ));
}

#[test]
fn test_parent_key_examples() {
    assert_eq!(parent_key(None), None);

    let opts: HashMap<String, String> = [("queue", "default"), ("id", "123")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    assert_eq!(parent_key(Some(&opts)).as_deref(), Some("default:123"));
}

#[test]
fn test_flatten_examples() {
    let record = match json!({"a": 1, "b": "x"}) {
        FieldValue::Object(map) => map,
        _ => unreachable!(),
    };
    assert_eq!(
        object_to_flat_array(&record),
        vec![json!("a"), json!(1), json!("b"), json!("x")]
    );
    assert!(object_to_flat_array(&FieldRecord::new()).is_empty());
}

#[test]
fn test_decode_examples() {
    let decoded = parse_json_string_values([("opts", "{\"a\":1}")]).unwrap();
    assert_eq!(FieldValue::Object(decoded), json!({"opts": {"a": 1}}));

    let err = parse_json_string_values([("opts", "not-json")]).unwrap_err();
    assert_eq!(err.decode_key(), Some("opts"));
}

#[test]
fn test_extract_result_examples() {
    let mut calls = Vec::new();

    assert_eq!(
        extract_result(Ok::<_, TaskFailure>(42), |k, e| calls.push((k, e.to_string()))),
        Some(42)
    );
    assert!(calls.is_empty());

    let closed = Err::<i32, _>(TaskFailure::message("Connection closed by server: reset"));
    assert_eq!(extract_result(closed, |k, e| calls.push((k, e.to_string()))), None);
    assert!(calls.is_empty());

    let boom = Err::<i32, _>(TaskFailure::message("boom"));
    assert_eq!(extract_result(boom, |k, e| calls.push((k, e.to_string()))), None);
    assert_eq!(calls, vec![("error", "boom".to_string())]);
}

#[tokio::test]
async fn test_batch_survives_failing_tasks() {
    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..5u32 {
        tasks.spawn(async move {
            match i {
                1 => Err(QueueError::ExecutionFailed("bad input".into())),
                3 => panic!("handler panicked"),
                _ => Ok(i),
            }
        });
    }

    let mut values = Vec::new();
    let mut errors = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Some(v) = extract_result(outcome::from_join(joined), |kind, f| {
            errors.push((kind, f.to_string()))
        }) {
            values.push(v);
        }
    }

    values.sort();
    assert_eq!(values, vec![0, 2, 4]);
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|(kind, _)| *kind == "error"));
}

#[test]
fn test_job_hash_round_trip_through_codec() {
    let job = Job::new("report", json!({"rows": [1, 2, 3]}))
        .with_priority(JobPriority::High)
        .with_parent(ParentOptions::new("bull:reports", "parent-1"));

    let stored: HashMap<String, String> = job
        .to_field_record()
        .unwrap()
        .into_iter()
        .map(|(k, v)| match v {
            FieldValue::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect();

    let restored = Job::from_hash(job.id.clone(), stored).unwrap();
    assert_eq!(restored, job);
}

#[test]
fn test_queue_error_display() {
    let err = QueueError::UnsupportedRedisVersion {
        current: "4.0.9".into(),
        minimum: "5.0.0".into(),
    };
    let display = err.to_string();
    assert!(display.contains("4.0.9"));
    assert!(display.contains("5.0.0"));
}

// These tests need a Redis server: cargo test -- --ignored

#[tokio::test]
#[ignore]
async fn test_enqueue_and_process() {
    let queue = Queue::with_config(
        QueueConfig::new("redis://localhost:6379", "bullq_integration").with_key_prefix("bullq-test"),
    )
    .await
    .unwrap();
    queue.clear().await.unwrap();

    let job_id = queue.enqueue("double", json!({"n": 21})).await.unwrap();
    let stored = queue.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(stored.data, json!({"n": 21}));

    let mut worker = Worker::with_config(
        queue.clone(),
        WorkerConfig {
            concurrency: 2,
            job_timeout: Duration::from_secs(5),
            ..WorkerConfig::default()
        },
    );
    worker.register_handler("double", |job| async move {
        let n = job.data["n"].as_i64().unwrap_or_default();
        Ok(json!(n * 2))
    });

    assert_eq!(worker.run_once().await.unwrap(), 1);

    let done = queue.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(done.return_value, Some(json!(42)));
    assert!(done.finished_on.is_some());

    queue.clear().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_redis_version_is_supported() {
    let queue = Queue::new("redis://localhost:6379", "bullq_version").await.unwrap();
    let version = queue.redis_version().await.unwrap();
    assert!(!is_version_lower_than(&version, MIN_REDIS_VERSION).unwrap());
}

#[tokio::test]
#[ignore]
async fn test_undecodable_job_moves_to_failed() {
    use redis::AsyncCommands;

    let queue = Queue::with_config(
        QueueConfig::new("redis://localhost:6379", "bullq_corrupt").with_key_prefix("bullq-test"),
    )
    .await
    .unwrap();
    queue.clear().await.unwrap();

    let client = redis::Client::open("redis://localhost:6379").unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();
    let _: () = conn
        .hset_multiple("bullq-test:bullq_corrupt:bad", &[("name", "resize"), ("data", "{oops")])
        .await
        .unwrap();
    let _: () = conn.lpush("bullq-test:bullq_corrupt:wait", "bad").await.unwrap();

    assert!(queue.next_waiting().await.unwrap().is_none());

    let failed: Vec<String> = conn.lrange("bullq-test:bullq_corrupt:failed", 0, -1).await.unwrap();
    assert_eq!(failed, vec!["bad".to_string()]);
    let reason: String = conn
        .hget("bullq-test:bullq_corrupt:bad", "failedReason")
        .await
        .unwrap();
    assert!(reason.contains("'data'"));

    queue.clear().await.unwrap();
}
