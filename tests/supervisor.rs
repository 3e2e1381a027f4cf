mod common;

use async_trait::async_trait;
use common::{eventually, mock_transport, MockHandle, RecordingPublisher};
use feeder_session::backends::memory::MemoryBackend;
use feeder_session::backends::{FeedResult, FeedingResultStore, StoreError};
use feeder_session::mqtt::{ConnectionState, SessionConfig, SessionStatus, TopicConfig};
use feeder_session::{Backends, ConnectionSupervisor, MessageRouter, TaskSupervisor};
use rumqttc::QoS;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Running {
    handle: MockHandle,
    status: watch::Receiver<SessionStatus>,
    backend: Arc<MemoryBackend>,
    publisher: Arc<RecordingPublisher>,
    tasks: TaskSupervisor,
    session: JoinHandle<()>,
}

fn start() -> Running {
    let (transport, handle) = mock_transport();
    let backend = Arc::new(MemoryBackend::new());
    let publisher = RecordingPublisher::new();
    let router = Arc::new(MessageRouter::new(
        TopicConfig::default(),
        publisher.clone(),
        Backends::shared(backend.clone()),
    ));
    let tasks = TaskSupervisor::new();
    let supervisor = ConnectionSupervisor::new(
        Box::new(transport),
        SessionConfig::default(),
        "#",
        router,
        tasks.clone(),
    );
    let status = supervisor.status();
    let session = tokio::spawn(supervisor.run());

    Running {
        handle,
        status,
        backend,
        publisher,
        tasks,
        session,
    }
}

async fn advance_to(start: tokio::time::Instant, secs: u64) {
    tokio::time::sleep_until(start + Duration::from_secs(secs)).await;
}

#[tokio::test(start_paused = true)]
async fn subscribes_to_everything_at_least_once() {
    let running = start();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(running.handle.connects(), 1);
    assert_eq!(
        running.handle.subscriptions(),
        vec![("#".to_string(), QoS::AtLeastOnce)]
    );
    assert_eq!(
        running.status.borrow().connection_state,
        ConnectionState::Receiving
    );
    running.session.abort();
}

#[tokio::test(start_paused = true)]
async fn silent_session_reconnects_once_after_stall_threshold() {
    let t0 = tokio::time::Instant::now();
    let running = start();

    // Polls time out at 60..300s; 300s is not yet past the threshold.
    advance_to(t0, 299).await;
    assert_eq!(running.handle.connects(), 1);
    advance_to(t0, 355).await;
    assert_eq!(running.handle.connects(), 1);
    assert_eq!(running.handle.disconnects(), 0);

    // The poll ending at 360s sees 360s of silence.
    advance_to(t0, 365).await;
    assert_eq!(running.handle.connects(), 2);
    assert_eq!(running.handle.disconnects(), 1);
    {
        let status = running.status.borrow();
        assert_eq!(status.stalls, 1);
        assert_eq!(status.connection_state, ConnectionState::Receiving);
    }
    running.session.abort();
}

#[tokio::test(start_paused = true)]
async fn traffic_keeps_an_idle_session_alive() {
    let t0 = tokio::time::Instant::now();
    let running = start();

    for secs in [200, 400, 600] {
        advance_to(t0, secs).await;
        running.handle.deliver("krs.tel.gts.gw", br#"{"_|deviceHid":"d","s|msg_type":"hb"}"#);
    }
    advance_to(t0, 850).await;

    assert_eq!(running.handle.connects(), 1);
    assert_eq!(running.status.borrow().messages_received, 3);
    running.session.abort();
}

#[tokio::test(start_paused = true)]
async fn connect_failures_retry_every_five_seconds() {
    let (transport, handle) = mock_transport();
    handle.fail_next_connects(2);
    let router = Arc::new(MessageRouter::new(
        TopicConfig::default(),
        RecordingPublisher::new(),
        Backends::shared(Arc::new(MemoryBackend::new())),
    ));
    let supervisor = ConnectionSupervisor::new(
        Box::new(transport),
        SessionConfig::default(),
        "#",
        router,
        TaskSupervisor::new(),
    );
    let status = supervisor.status();
    let t0 = tokio::time::Instant::now();
    let session = tokio::spawn(supervisor.run());

    advance_to(t0, 4).await;
    assert_eq!(handle.connects(), 1);
    advance_to(t0, 6).await;
    assert_eq!(handle.connects(), 2);
    advance_to(t0, 11).await;
    assert_eq!(handle.connects(), 3);
    {
        let status = status.borrow();
        assert_eq!(status.connection_state, ConnectionState::Receiving);
        assert_eq!(status.failures, 2);
        assert_eq!(status.connect_attempts, 3);
    }
    session.abort();
}

#[tokio::test(start_paused = true)]
async fn receive_error_reconnects_after_delay() {
    let t0 = tokio::time::Instant::now();
    let running = start();
    advance_to(t0, 1).await;
    running.handle.fail_receive("connection reset by peer");

    advance_to(t0, 5).await;
    assert_eq!(running.handle.connects(), 1);
    assert_eq!(running.handle.disconnects(), 1);

    advance_to(t0, 7).await;
    assert_eq!(running.handle.connects(), 2);
    assert_eq!(
        running.status.borrow().last_error.as_deref(),
        Some("Transport failure: connection reset by peer")
    );
    running.session.abort();
}

#[tokio::test]
async fn inbound_messages_are_routed_through_task_supervisor() {
    let running = start();

    running
        .handle
        .deliver("krs.api.gts.gw-1", br#"{"requestId":"r-9"}"#);
    running.handle.deliver(
        "krs.tel.gts.gw-1",
        br#"{"_|deviceHid":"dev-1","s|msg_type":"hb"}"#,
    );

    let publisher = running.publisher.clone();
    assert!(eventually(|| {
        let publisher = publisher.clone();
        async move { publisher.published().len() == 1 }
    })
    .await);

    let backend = running.backend.clone();
    assert!(eventually(|| {
        let backend = backend.clone();
        async move { backend.device("dev-1").await.is_some() }
    })
    .await);

    assert_eq!(running.publisher.published()[0].topic, "krs/api/stg/gw-1");
    running.tasks.drain().await;
    assert_eq!(running.tasks.in_flight(), 0);
    running.session.abort();
}

#[tokio::test]
async fn malformed_message_does_not_stop_the_session() {
    let running = start();

    running.handle.deliver("krs.tel.gts.gw-1", b"{{{{");
    running.handle.deliver(
        "krs.tel.gts.gw-1",
        br#"{"_|deviceHid":"dev-2","s|msg_type":"hb"}"#,
    );

    let backend = running.backend.clone();
    assert!(eventually(|| {
        let backend = backend.clone();
        async move { backend.device("dev-2").await.is_some() }
    })
    .await);
    assert_eq!(running.backend.write_count().await, 1);
    assert_eq!(running.handle.connects(), 1);
    running.session.abort();
}

/// Rejects the first feed result, then stores the rest.
struct RejectFirstFeed {
    rejected: AtomicBool,
    inner: Arc<MemoryBackend>,
}

#[async_trait]
impl FeedingResultStore for RejectFirstFeed {
    async fn record_feed_result(&self, result: FeedResult) -> Result<(), StoreError> {
        if !self.rejected.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Backend("database unavailable".to_string()));
        }
        self.inner.record_feed_result(result).await
    }
}

#[tokio::test]
async fn failing_handler_does_not_block_later_messages() {
    let (transport, handle) = mock_transport();
    let backend = Arc::new(MemoryBackend::new());
    let feeding = Arc::new(RejectFirstFeed {
        rejected: AtomicBool::new(false),
        inner: backend.clone(),
    });
    let router = Arc::new(MessageRouter::new(
        TopicConfig::default(),
        RecordingPublisher::new(),
        Backends::new(backend.clone(), backend.clone(), feeding),
    ));
    let supervisor = ConnectionSupervisor::new(
        Box::new(transport),
        SessionConfig::default(),
        "#",
        router,
        TaskSupervisor::new(),
    );
    let tasks = supervisor.tasks();
    let session = tokio::spawn(supervisor.run());

    let feed = br#"{"_|deviceHid":"dev-4","s|msg_type":"feed_result","i|pour":1}"#;
    handle.deliver("krs.tel.gts.gw-4", feed);

    let failures = tasks.clone();
    assert!(eventually(|| {
        let failures = failures.clone();
        async move { failures.failed() == 1 }
    })
    .await);

    handle.deliver("krs.tel.gts.gw-4", feed);
    handle.deliver(
        "krs.tel.gts.gw-4",
        br#"{"_|deviceHid":"dev-4","s|msg_type":"hb"}"#,
    );

    let stored = backend.clone();
    assert!(eventually(|| {
        let stored = stored.clone();
        async move {
            stored.feed_results().await.len() == 1 && stored.device("dev-4").await.is_some()
        }
    })
    .await);
    tasks.drain().await;
    assert_eq!(tasks.failed(), 1);
    assert_eq!(tasks.completed(), 2);
    assert_eq!(handle.connects(), 1);
    session.abort();
}
