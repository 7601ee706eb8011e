use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::dispatcher::NotificationDispatcher;
use crate::errors::IndexingError;
use crate::indexing::IndexingClient;
use crate::models::{NotificationJob, ServiceAccountCredentials};

/// Records when each URL was published and fails the configured call numbers (1-based).
#[derive(Default)]
struct RecordingClient {
    calls: Mutex<Vec<(String, Instant)>>,
    fail_on: Vec<usize>,
}

impl RecordingClient {
    fn failing_on(calls: &[usize]) -> Self {
        Self {
            fail_on: calls.to_vec(),
            ..Default::default()
        }
    }

    fn urls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }

    fn times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }
}

#[async_trait]
impl IndexingClient for RecordingClient {
    async fn publish(
        &self,
        url: &str,
        _credentials: &ServiceAccountCredentials,
    ) -> Result<(), IndexingError> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((url.to_string(), Instant::now()));
            calls.len()
        };
        if self.fail_on.contains(&n) {
            return Err(IndexingError::Rejected {
                url: url.to_string(),
                status: 403,
            });
        }
        Ok(())
    }
}

fn credentials() -> ServiceAccountCredentials {
    ServiceAccountCredentials {
        client_email: "indexer@blog.iam.gserviceaccount.com".to_string(),
        private_key: "unused".to_string(),
        token_uri: "https://oauth2.googleapis.com/token".to_string(),
    }
}

fn job(count: usize) -> NotificationJob {
    NotificationJob {
        urls: (1..=count)
            .map(|i| format!("https://blog.example/post-{}", i))
            .collect(),
        credentials: credentials(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_budget_caps_calls() {
    let client = Arc::new(RecordingClient::default());
    let dispatcher = NotificationDispatcher::new(client.clone(), 5, Duration::from_millis(3000));

    let report = dispatcher.dispatch(&job(10)).await;

    assert_eq!(report.attempted, 5);
    assert_eq!(report.skipped, 5);
    assert_eq!(
        client.urls(),
        (1..=5)
            .map(|i| format!("https://blog.example/post-{}", i))
            .collect::<Vec<_>>()
    );
    assert_eq!(dispatcher.budget().calls_made, 5);
}

#[tokio::test(start_paused = true)]
async fn test_calls_are_spaced_by_min_interval() {
    let client = Arc::new(RecordingClient::default());
    let dispatcher = NotificationDispatcher::new(client.clone(), 5, Duration::from_millis(3000));

    dispatcher.dispatch(&job(3)).await;

    let times = client.times();
    assert_eq!(times.len(), 3);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(3000));
    }
}

#[tokio::test(start_paused = true)]
async fn test_throttle_spans_batches() {
    let client = Arc::new(RecordingClient::default());
    let dispatcher = NotificationDispatcher::new(client.clone(), 5, Duration::from_millis(3000));

    dispatcher.dispatch(&job(1)).await;
    tokio::time::advance(Duration::from_millis(1000)).await;
    dispatcher.dispatch(&job(1)).await;

    let times = client.times();
    assert!(times[1] - times[0] >= Duration::from_millis(3000));
}

#[tokio::test(start_paused = true)]
async fn test_no_wait_once_interval_elapsed() {
    let client = Arc::new(RecordingClient::default());
    let dispatcher = NotificationDispatcher::new(client.clone(), 5, Duration::from_millis(3000));

    dispatcher.dispatch(&job(1)).await;
    tokio::time::advance(Duration::from_millis(5000)).await;
    let before = Instant::now();
    dispatcher.dispatch(&job(1)).await;

    assert_eq!(client.times()[1], before);
}

#[tokio::test(start_paused = true)]
async fn test_failure_does_not_abort_batch() {
    let client = Arc::new(RecordingClient::failing_on(&[3]));
    let dispatcher = NotificationDispatcher::new(client.clone(), 5, Duration::from_millis(3000));

    let report = dispatcher.dispatch(&job(5)).await;

    assert_eq!(client.urls().len(), 5);
    assert_eq!(report.attempted, 5);
    assert_eq!(report.succeeded, 4);
    assert_eq!(report.failed, 1);
    assert_eq!(dispatcher.budget().calls_made, 5);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_budget_sends_nothing() {
    let client = Arc::new(RecordingClient::default());
    let dispatcher = NotificationDispatcher::new(client.clone(), 2, Duration::from_millis(10));

    dispatcher.dispatch(&job(2)).await;
    let report = dispatcher.dispatch(&job(3)).await;

    assert_eq!(report.attempted, 0);
    assert_eq!(report.skipped, 3);
    assert_eq!(client.urls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_announce_shares_budget_between_links_and_images() {
    let client = Arc::new(RecordingClient::default());
    let dispatcher = NotificationDispatcher::new(client.clone(), 5, Duration::from_millis(100));

    let links = vec![
        "https://blog.example/a".to_string(),
        "https://blog.example/b".to_string(),
        "https://blog.example/c".to_string(),
    ];
    let images = vec![
        "https://blog.example/a.png".to_string(),
        "https://blog.example/b.png".to_string(),
        "https://blog.example/c.png".to_string(),
    ];
    let report = dispatcher.announce(links, images, &credentials()).await;

    assert_eq!(report.attempted, 5);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        client.urls(),
        vec![
            "https://blog.example/a",
            "https://blog.example/b",
            "https://blog.example/c",
            "https://blog.example/a.png",
            "https://blog.example/b.png",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_budget_readable_while_batch_sleeps() {
    let client = Arc::new(RecordingClient::default());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        client.clone(),
        5,
        Duration::from_millis(1000),
    ));

    let running = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.dispatch(&job(3)).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!running.is_finished());
    assert_eq!(dispatcher.budget().calls_made, 1);

    let report = running.await.unwrap();
    assert_eq!(report.attempted, 3);
    assert_eq!(dispatcher.budget().calls_made, 3);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_batches_do_not_interleave() {
    let client = Arc::new(RecordingClient::default());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        client.clone(),
        5,
        Duration::from_millis(100),
    ));
    let second = NotificationJob {
        urls: vec!["https://blog.example/other".to_string()],
        credentials: credentials(),
    };

    let first = job(2);
    let (a, b) = tokio::join!(dispatcher.dispatch(&first), dispatcher.dispatch(&second));
    assert_eq!(a.attempted + b.attempted, 3);
    assert_eq!(
        client.urls(),
        vec![
            "https://blog.example/post-1",
            "https://blog.example/post-2",
            "https://blog.example/other",
        ]
    );
}
