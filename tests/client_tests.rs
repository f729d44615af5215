//! Client state machine tests
//!
//! Driven by the scripted transport on paused tokio time, so heartbeat
//! timeouts and backoff delays elapse instantly.
//! Run with: cargo test --test client_tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chat_stream_client::transport::mock::{ScriptedResponse, ScriptedTransport, Step};
use chat_stream_client::{
    ChatMessage, ClientConfig, DisconnectReason, EventKind, StreamClient, StreamError,
    StreamEvent, StreamOutcome, StreamState,
};
use tokio::sync::broadcast;

fn test_config() -> ClientConfig {
    ClientConfig {
        endpoint: "http://scripted.invalid/chat".into(),
        ..ClientConfig::default()
    }
}

fn client_with(transport: &Arc<ScriptedTransport>, config: ClientConfig) -> StreamClient {
    StreamClient::new(config, transport.clone()).expect("valid config")
}

fn drain(rx: &mut broadcast::Receiver<StreamEvent>) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn kinds(events: &[StreamEvent]) -> Vec<EventKind> {
    events.iter().map(StreamEvent::kind).collect()
}

fn count(events: &[StreamEvent], kind: EventKind) -> usize {
    events.iter().filter(|e| e.kind() == kind).count()
}

fn delta(seq: u64, content: &str) -> String {
    format!(r#"{{"type":"delta","content":"{content}","sequenceNumber":{seq}}}"#)
}

const DONE: &str = r#"{"event":"done"}"#;

fn hello() -> Vec<ChatMessage> {
    vec![ChatMessage::user("hello")]
}

// ============================================================================
// Clean stream
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_clean_stream_completes() {
    let transport = Arc::new(ScriptedTransport::new().with_response(ScriptedResponse::lines([
        delta(0, "Hel"),
        delta(1, "lo"),
        r#"{"type":"final","content":"Hello!","sequenceNumber":2}"#.to_string(),
        DONE.to_string(),
    ])));
    let client = client_with(&transport, test_config());
    let mut rx = client.subscribe();

    let outcome = client
        .stream_chat(hello(), Some("session-a".into()))
        .await
        .unwrap();
    assert_eq!(outcome, StreamOutcome::Completed);

    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        vec![
            EventKind::Start,
            EventKind::Delta,
            EventKind::Delta,
            EventKind::Final,
            EventKind::Done,
            EventKind::Complete,
        ]
    );
    assert!(matches!(
        &events[0],
        StreamEvent::Start { session_id, is_reconnection: false, .. } if session_id == "session-a"
    ));
    assert_eq!(
        events[2],
        StreamEvent::Delta {
            content: "lo".into(),
            buffer: "Hello".into()
        }
    );
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Complete {
            content: "Hello!".into()
        })
    );

    assert_eq!(client.state().await, StreamState::Idle);
    assert!(!client.is_streaming().await);
    assert_eq!(client.current_buffer().await, "Hello!");

    let telemetry = client.telemetry().await;
    assert_eq!(telemetry.connections, 1);
    assert_eq!(telemetry.disconnections, 0);
    assert_eq!(telemetry.reconnections, 0);
    assert_eq!(telemetry.connection_success_rate, 100.0);

    let requests = transport.requests().await;
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].is_reconnection);
    assert!(requests[0].resilient);
    assert_eq!(requests[0].messages, hello());
}

#[tokio::test(start_paused = true)]
async fn test_unterminated_last_line_is_dispatched() {
    let transport = Arc::new(ScriptedTransport::new().with_response(ScriptedResponse::steps(
        vec![
            Step::raw(format!("{}\n{}", delta(0, "a"), delta(1, "b"))),
        ],
    )));
    let client = client_with(&transport, test_config());

    let outcome = client.stream_chat(hello(), None).await.unwrap();
    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(client.current_buffer().await, "ab");
}

#[tokio::test(start_paused = true)]
async fn test_malformed_line_is_non_fatal() {
    let transport = Arc::new(ScriptedTransport::new().with_response(ScriptedResponse::lines([
        delta(0, "a"),
        "not json".to_string(),
        r#"{"type":"mystery"}"#.to_string(),
        delta(1, "b"),
        DONE.to_string(),
    ])));
    let client = client_with(&transport, test_config());
    let mut rx = client.subscribe();

    let outcome = client.stream_chat(hello(), None).await.unwrap();
    assert_eq!(outcome, StreamOutcome::Completed);

    let events = drain(&mut rx);
    assert_eq!(count(&events, EventKind::ChunkError), 2);
    assert!(events.iter().any(
        |e| matches!(e, StreamEvent::ChunkError { line, .. } if line == "not json")
    ));
    assert_eq!(client.current_buffer().await, "ab");
    assert_eq!(client.telemetry().await.disconnections, 0);
}

#[tokio::test(start_paused = true)]
async fn test_tool_events_reach_handlers() {
    let transport = Arc::new(ScriptedTransport::new().with_response(ScriptedResponse::lines([
        r#"{"type":"tool","status":"start","name":"lookup","args":{"q":"rates"}}"#,
        r#"{"type":"tool","status":"result","name":"lookup","data":{"rate":0.2}}"#,
        DONE,
    ])));
    let client = client_with(&transport, test_config());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_start = Arc::clone(&seen);
    client.on(EventKind::ToolStart, move |event| {
        seen_start.lock().unwrap().push(event.clone());
    });
    let seen_result = Arc::clone(&seen);
    let result_id = client.on(EventKind::ToolResult, move |event| {
        seen_result.lock().unwrap().push(event.clone());
    });

    client.stream_chat(hello(), None).await.unwrap();

    let seen_events = seen.lock().unwrap().clone();
    assert_eq!(
        seen_events,
        vec![
            StreamEvent::ToolStart {
                name: "lookup".into(),
                args: serde_json::json!({"q": "rates"})
            },
            StreamEvent::ToolResult {
                name: "lookup".into(),
                data: serde_json::json!({"rate": 0.2})
            },
        ]
    );

    assert!(client.off(result_id));
    assert!(!client.off(result_id));
}

// ============================================================================
// Reconnection
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_timeout_reconnects_without_duplicates() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_response(ScriptedResponse::steps(vec![
                Step::line(delta(0, "a")),
                Step::line(delta(1, "b")),
                Step::Hang,
            ]))
            .with_response(ScriptedResponse::lines([
                delta(1, "b"),
                delta(2, "c"),
                DONE.to_string(),
            ])),
    );
    let client = client_with(&transport, test_config());
    let mut rx = client.subscribe();

    let outcome = client
        .stream_chat(hello(), Some("session-c".into()))
        .await
        .unwrap();
    assert_eq!(outcome, StreamOutcome::Completed);

    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        vec![
            EventKind::Start,
            EventKind::Delta,
            EventKind::Delta,
            EventKind::Disconnection,
            EventKind::ReconnectionAttempt,
            EventKind::ReconnectionSuccess,
            EventKind::Start,
            EventKind::Delta,
            EventKind::Done,
            EventKind::Complete,
        ]
    );
    assert_eq!(
        events[3],
        StreamEvent::Disconnection {
            reason: DisconnectReason::HeartbeatTimeout,
            attempts: 0
        }
    );
    let StreamEvent::ReconnectionAttempt {
        attempt,
        max_attempts,
        delay_ms,
    } = events[4]
    else {
        panic!("expected reconnection_attempt, got {:?}", events[4]);
    };
    assert_eq!(attempt, 1);
    assert_eq!(max_attempts, 10);
    assert!((1500..=1650).contains(&delay_ms), "delay {delay_ms}");
    assert!(matches!(
        events[5],
        StreamEvent::ReconnectionSuccess { attempts: 1, duration_ms } if (1500..=1650).contains(&duration_ms)
    ));
    assert!(matches!(
        events[6],
        StreamEvent::Start { is_reconnection: true, .. }
    ));
    // The replayed chunk 1 was dropped
    assert_eq!(
        events[7],
        StreamEvent::Delta {
            content: "c".into(),
            buffer: "abc".into()
        }
    );

    let requests = transport.requests().await;
    assert_eq!(requests.len(), 2);
    assert!(requests[1].is_reconnection);
    assert_eq!(requests[0].session_id, requests[1].session_id);
    assert_eq!(requests[0].continuity_id, requests[1].continuity_id);
    assert!(requests[0].last_chunk_timestamp.is_none());
    assert!(requests[1].last_chunk_timestamp.is_some());

    let telemetry = client.telemetry().await;
    assert_eq!(telemetry.connections, 2);
    assert_eq!(telemetry.disconnections, 1);
    assert_eq!(telemetry.reconnections, 1);
    assert_eq!(telemetry.connection_success_rate, 50.0);
    assert_eq!(
        telemetry.last_disconnect_reason,
        Some(DisconnectReason::HeartbeatTimeout)
    );
    assert_eq!(telemetry.reconnect_attempts, 0);

    let metrics = client.prometheus_metrics().await;
    assert!(metrics.contains("\nchat_stream_connections_total 2\n"));
    assert!(metrics.contains("\nchat_stream_disconnections_total 1\n"));
    assert!(metrics.contains("\nchat_stream_reconnections_total 1\n"));
    assert!(metrics.contains("\nchat_stream_currently_streaming 0\n"));
}

#[tokio::test(start_paused = true)]
async fn test_replayed_tail_is_delivered_once() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_response(ScriptedResponse::steps(vec![
                Step::line(delta(0, "a")),
                Step::line(delta(1, "b")),
                Step::line(delta(2, "c")),
                Step::Error("connection reset".into()),
            ]))
            .with_response(ScriptedResponse::lines([
                delta(1, "b"),
                delta(2, "c"),
                delta(3, "d"),
                DONE.to_string(),
            ])),
    );
    let client = client_with(&transport, test_config());
    let mut rx = client.subscribe();

    let outcome = client.stream_chat(hello(), None).await.unwrap();
    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(client.current_buffer().await, "abcd");

    let events = drain(&mut rx);
    let contents: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Delta { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(contents, vec!["a", "b", "c", "d"]);
    assert!(events.contains(&StreamEvent::Disconnection {
        reason: DisconnectReason::TransportError,
        attempts: 0
    }));
    assert_eq!(count(&events, EventKind::ReconnectionSuccess), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnection_budget_exhausted() {
    // Every request fails, including the 3 retries
    let mut transport = ScriptedTransport::new();
    for _ in 0..4 {
        transport = transport.with_response(ScriptedResponse::fail("connection refused"));
    }
    let transport = Arc::new(transport);

    let mut config = test_config();
    config.reconnect.max_attempts = 3;
    let client = client_with(&transport, config);
    let mut rx = client.subscribe();

    let err = client.stream_chat(hello(), None).await.unwrap_err();
    assert!(matches!(
        err,
        StreamError::ReconnectionExhausted { attempts: 3 }
    ));

    let events = drain(&mut rx);
    assert_eq!(count(&events, EventKind::Disconnection), 4);
    assert_eq!(count(&events, EventKind::ReconnectionAttempt), 3);
    assert_eq!(count(&events, EventKind::Start), 0);
    assert_eq!(
        events.last(),
        Some(&StreamEvent::ReconnectionFailed { attempts: 3 })
    );

    let attempts: Vec<u32> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::ReconnectionAttempt { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2, 3]);

    let requests = transport.requests().await;
    assert_eq!(requests.len(), 4);
    assert!(!requests[0].is_reconnection);
    assert!(requests[1..].iter().all(|r| r.is_reconnection));

    assert_eq!(client.state().await, StreamState::Failed);
    assert!(!client.is_streaming().await);

    let telemetry = client.telemetry().await;
    assert_eq!(telemetry.connections, 4);
    assert_eq!(telemetry.disconnections, 4);
    assert_eq!(telemetry.connection_success_rate, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_status_error_counts_as_disconnection() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_response(ScriptedResponse::status(502))
            .with_response(ScriptedResponse::lines([delta(0, "ok"), DONE.to_string()])),
    );
    let client = client_with(&transport, test_config());
    let mut rx = client.subscribe();

    client.stream_chat(hello(), None).await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(
        events[0],
        StreamEvent::Disconnection {
            reason: DisconnectReason::HttpStatus,
            attempts: 0
        }
    );
    assert_eq!(client.telemetry().await.reconnections, 1);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_covers_header_wait() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_response(ScriptedResponse::Pending)
            .with_response(ScriptedResponse::lines([DONE])),
    );
    let client = client_with(&transport, test_config());
    let mut rx = client.subscribe();

    let detected_at = Arc::new(Mutex::new(None));
    let detected = Arc::clone(&detected_at);
    client.on(EventKind::Disconnection, move |_| {
        detected.lock().unwrap().get_or_insert(tokio::time::Instant::now());
    });

    let started = tokio::time::Instant::now();
    let outcome = client.stream_chat(hello(), None).await.unwrap();
    assert_eq!(outcome, StreamOutcome::Completed);

    let events = drain(&mut rx);
    assert_eq!(
        events[0],
        StreamEvent::Disconnection {
            reason: DisconnectReason::HeartbeatTimeout,
            attempts: 0
        }
    );

    // Past the 45s timeout, within one 10s tick of it
    let elapsed = detected_at.lock().unwrap().unwrap() - started;
    assert!(elapsed > Duration::from_secs(45), "{elapsed:?}");
    assert!(elapsed <= Duration::from_secs(55), "{elapsed:?}");
}

// ============================================================================
// Non-resilient mode
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_non_resilient_error_is_returned() {
    let transport = Arc::new(ScriptedTransport::new().with_response(ScriptedResponse::status(500)));
    let mut config = test_config();
    config.resilience = false;
    let client = client_with(&transport, config);
    let mut rx = client.subscribe();

    let err = client.stream_chat(hello(), None).await.unwrap_err();
    assert!(matches!(err, StreamError::Status { status: 500, .. }));

    let events = drain(&mut rx);
    assert_eq!(kinds(&events), vec![EventKind::Error]);
    assert!(matches!(
        &events[0],
        StreamEvent::Error { message } if message.contains("500")
    ));

    let requests = transport.requests().await;
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].resilient);
    assert_eq!(client.state().await, StreamState::Idle);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_is_idempotent() {
    let transport = Arc::new(ScriptedTransport::new().with_response(ScriptedResponse::steps(
        vec![Step::line(delta(0, "partial")), Step::Hang],
    )));
    let client = client_with(&transport, test_config());
    let mut rx = client.subscribe();

    let streaming = client.clone();
    let handle = tokio::spawn(async move { streaming.stream_chat(hello(), None).await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(client.is_streaming().await);
    assert_eq!(client.state().await, StreamState::Streaming);

    client.stop().await;
    client.stop().await;

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome, StreamOutcome::Aborted);

    let events = drain(&mut rx);
    assert_eq!(count(&events, EventKind::Stop), 1);
    assert_eq!(count(&events, EventKind::Abort), 1);
    assert_eq!(count(&events, EventKind::Disconnection), 0);
    assert!(!client.is_streaming().await);
    assert_eq!(client.state().await, StreamState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_nothing_dispatched_after_stop_returns() {
    let mut steps = Vec::new();
    for seq in 0..500 {
        steps.push(Step::line(delta(seq, "x")));
        steps.push(Step::Delay(Duration::from_millis(1)));
    }
    steps.push(Step::line(DONE));
    let transport =
        Arc::new(ScriptedTransport::new().with_response(ScriptedResponse::steps(steps)));
    let client = client_with(&transport, test_config());
    let mut rx = client.subscribe();

    let streaming = client.clone();
    let handle = tokio::spawn(async move { streaming.stream_chat(hello(), None).await });

    for _ in 0..1000 {
        if !client.current_buffer().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    client.stop().await;
    let frozen = client.current_buffer().await;
    assert!(!frozen.is_empty());

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome, StreamOutcome::Aborted);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(client.current_buffer().await, frozen);
    assert_eq!(client.state().await, StreamState::Idle);

    let events = drain(&mut rx);
    assert_eq!(count(&events, EventKind::Complete), 0);
    assert_eq!(count(&events, EventKind::Stop), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_reconnection() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_response(ScriptedResponse::fail("connection refused"))
            .with_response(ScriptedResponse::lines([DONE])),
    );
    let client = client_with(&transport, test_config());

    let streaming = client.clone();
    let handle = tokio::spawn(async move { streaming.stream_chat(hello(), None).await });

    // Backoff is at least 1.5s; stop while waiting
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.state().await, StreamState::Reconnecting);
    client.stop().await;

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome, StreamOutcome::Aborted);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(transport.requests().await.len(), 1);
    assert_eq!(client.telemetry().await.reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_new_stream_aborts_previous() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_response(ScriptedResponse::steps(vec![
                Step::line(delta(0, "old")),
                Step::Hang,
            ]))
            .with_response(ScriptedResponse::lines([delta(0, "new"), DONE.to_string()])),
    );
    let client = client_with(&transport, test_config());
    let mut rx = client.subscribe();

    let first = client.clone();
    let handle = tokio::spawn(async move {
        first
            .stream_chat(hello(), Some("session-x".into()))
            .await
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let outcome = client
        .stream_chat(vec![ChatMessage::user("again")], None)
        .await
        .unwrap();
    assert_eq!(outcome, StreamOutcome::Completed);
    assert_eq!(handle.await.unwrap().unwrap(), StreamOutcome::Aborted);

    assert_eq!(client.current_buffer().await, "new");

    let events = drain(&mut rx);
    assert_eq!(count(&events, EventKind::Abort), 1);
    assert!(events.contains(&StreamEvent::Complete {
        content: "new".into()
    }));

    let requests = transport.requests().await;
    assert_eq!(requests.len(), 2);
    // Same conversation, new logical stream
    assert_eq!(requests[1].session_id, "session-x");
    assert_ne!(requests[0].continuity_id, requests[1].continuity_id);
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_session_and_keeps_telemetry() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_response(ScriptedResponse::lines([delta(0, "first"), DONE.to_string()]))
            .with_response(ScriptedResponse::lines([delta(0, "second"), DONE.to_string()])),
    );
    let client = client_with(&transport, test_config());
    let mut rx = client.subscribe();

    client
        .stream_chat(hello(), Some("session-r".into()))
        .await
        .unwrap();
    client.reset().await;

    assert!(client.session().await.is_none());
    assert_eq!(client.current_buffer().await, "");
    assert_eq!(client.telemetry().await.connections, 1);
    // Nothing was active, so no stop event
    assert_eq!(count(&drain(&mut rx), EventKind::Stop), 0);

    // Sequence state was forgotten: seq 0 is admitted again
    client.stream_chat(hello(), None).await.unwrap();
    assert_eq!(client.current_buffer().await, "second");
    let requests = transport.requests().await;
    assert_ne!(requests[1].session_id, "session-r");
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let mut config = test_config();
    config.heartbeat.interval = Duration::ZERO;
    let result = StreamClient::new(config, Arc::new(ScriptedTransport::new()));
    assert!(matches!(result, Err(StreamError::Config(_))));
}
