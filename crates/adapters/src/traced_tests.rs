// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::broker::{BrokerCall, FakeBroker};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// A writer that captures log output for testing
#[derive(Clone, Default)]
struct CapturedLogs {
    logs: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    fn contents(&self) -> String {
        let logs = self.logs.lock().unwrap();
        String::from_utf8_lossy(&logs).to_string()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.logs.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run a test with captured tracing output
fn with_tracing<F, Fut>(f: F) -> (String, Fut::Output)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future,
{
    let logs = CapturedLogs::default();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(logs.clone())
        .with_ansi(false)
        .without_time()
        .finish();

    let result = tracing::subscriber::with_default(subscriber, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f())
    });

    (logs.contents(), result)
}

fn config(group: &str, topics: &[&str]) -> ConsumerConfig {
    ConsumerConfig {
        group: group.to_string(),
        topics: topics.iter().map(|t| t.to_string()).collect(),
        from_beginning: true,
    }
}

// =============================================================================
// Precondition validation
// =============================================================================

#[tokio::test]
async fn join_without_topics_is_rejected_before_reaching_broker() {
    let fake = FakeBroker::new();
    let traced = TracedBroker::new(fake.clone());

    let err = match traced.consumer(config("g", &[])).await {
        Ok(_) => panic!("expected join to fail"),
        Err(e) => e,
    };

    assert!(err.to_string().contains("has no topics"), "got: {}", err);
    assert!(fake.calls().is_empty());
}

// =============================================================================
// Tracing output
// =============================================================================

#[test]
fn join_logs_entry_and_completion() {
    let (logs, result) = with_tracing(|| async {
        let traced = TracedBroker::new(FakeBroker::new());
        traced.consumer(config("inventory", &["orders"])).await.map(|_| ())
    });

    assert!(result.is_ok());
    assert!(logs.contains("broker.join"), "Logs:\n{}", logs);
    assert!(logs.contains("inventory"), "Logs:\n{}", logs);
    assert!(logs.contains("joining"), "Logs:\n{}", logs);
    assert!(logs.contains("joined"), "Logs:\n{}", logs);
    assert!(logs.contains("elapsed_ms"), "Logs:\n{}", logs);
}

#[test]
fn join_failure_is_logged() {
    let (logs, result) = with_tracing(|| async {
        let fake = FakeBroker::new();
        fake.fail_joins(true);
        TracedBroker::new(fake)
            .consumer(config("inventory", &["orders"]))
            .await
            .map(|_| ())
    });

    assert!(result.is_err());
    assert!(logs.contains("join failed"), "Logs:\n{}", logs);
}

#[test]
fn commit_failure_is_logged_with_partition() {
    let (logs, result) = with_tracing(|| async {
        let fake = FakeBroker::new();
        let traced = TracedBroker::new(fake.clone());
        let mut consumer = traced.consumer(config("g", &["orders"])).await.unwrap();

        fake.fail_commits(true);
        consumer.commit(&TopicPartition::new("orders", 0), 4).await
    });

    assert!(result.is_err());
    assert!(logs.contains("commit failed"), "Logs:\n{}", logs);
    assert!(logs.contains("orders/0"), "Logs:\n{}", logs);
}

#[test]
fn send_logs_span_and_landing_offset() {
    let (logs, result) = with_tracing(|| async {
        let traced = TracedBroker::new(FakeBroker::new());
        traced
            .producer()
            .send("alerts", Some("p1"), b"{}".to_vec())
            .await
    });

    assert_eq!(result.unwrap().offset, 0);
    assert!(logs.contains("broker.send"), "Logs:\n{}", logs);
    assert!(logs.contains("alerts"), "Logs:\n{}", logs);
    assert!(logs.contains("sent"), "Logs:\n{}", logs);
}

// =============================================================================
// Delegation
// =============================================================================

#[tokio::test]
async fn traced_consumer_delegates_to_inner() {
    let fake = FakeBroker::new();
    fake.seed("orders", None, r#"{"id":"p1"}"#).unwrap();
    let traced = TracedBroker::new(fake.clone());
    let tp = TopicPartition::new("orders", 0);

    let mut consumer = traced.consumer(config("g", &["orders"])).await.unwrap();
    assert_eq!(consumer.group(), "g");
    consumer.seek(&tp, 0).await.unwrap();
    let record = consumer.next().await.unwrap();
    consumer.commit(&tp, record.next_offset()).await.unwrap();
    consumer.disconnect().await.unwrap();

    assert_eq!(
        fake.calls(),
        vec![
            BrokerCall::Join {
                group: "g".to_string(),
                topics: vec!["orders".to_string()],
            },
            BrokerCall::Seek {
                group: "g".to_string(),
                partition: tp.clone(),
                offset: 0,
            },
            BrokerCall::Commit {
                group: "g".to_string(),
                partition: tp.clone(),
                offset: 1,
            },
            BrokerCall::Disconnect {
                group: "g".to_string(),
            },
        ]
    );
    assert_eq!(fake.memory().committed("g", &tp), Some(1));
}
