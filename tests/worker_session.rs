//! Worker session and signaling channel tests
//!
//! Drives a Worker against scripted collaborators: frame routing and
//! entity materialization, event-bus exactness, token rotation, reconnect
//! with resynchronization, and terminal disconnect.

use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskrouter_sdk::testing::{
    reservation_payload, transfer_payload, worker_payload, MockHttpClient, MockSignalingTransport,
    TaskPayloadBuilder,
};
use taskrouter_sdk::{
    Frame, ReconnectionStrategy, ReservationStatus, TaskEventKind, TaskStatus, Worker, WorkerEvent,
    WorkerEventKind, WorkerOptions,
};

fn worker_with_strategy(
    strategy: ReconnectionStrategy,
) -> (Arc<Worker>, Arc<MockHttpClient>, Arc<MockSignalingTransport>) {
    let http = Arc::new(MockHttpClient::new());
    let transport = Arc::new(MockSignalingTransport::new());
    let options = WorkerOptions {
        workspace_sid: "WSxxx".to_string(),
        worker_sid: "WKxxx".to_string(),
        reconnection: Some(strategy),
        ..Default::default()
    };
    let worker = Arc::new(
        Worker::new("initialJwt", options, http.clone(), transport.clone()).unwrap(),
    );
    (worker, http, transport)
}

fn worker() -> (Arc<Worker>, Arc<MockHttpClient>, Arc<MockSignalingTransport>) {
    worker_with_strategy(ReconnectionStrategy::fixed(Duration::from_millis(1), 3))
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not met within the wait budget");
}

fn reserved_task_frame(reservation_sid: &str, task_sid: &str) -> Frame {
    let task = TaskPayloadBuilder::new(task_sid)
        .status(TaskStatus::Reserved)
        .build();
    Frame::new(
        "reservation.created",
        reservation_payload(reservation_sid, "WKxxx", task),
    )
}

#[tokio::test]
async fn emit_event_notifies_exactly_the_subscribed_kind() {
    let (worker, ..) = worker();
    let frame = reserved_task_frame("WRxx1", "WTxx1");
    worker.route_frame(&frame).unwrap();
    let task = worker.reservation("WRxx1").unwrap().task();

    let canceled_first = Arc::new(AtomicU32::new(0));
    let canceled_second = Arc::new(AtomicU32::new(0));
    let completed = Arc::new(AtomicU32::new(0));

    let counter = canceled_first.clone();
    task.on(TaskEventKind::Canceled, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = canceled_second.clone();
    task.on(TaskEventKind::Canceled, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = completed.clone();
    task.on(TaskEventKind::Completed, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let payload = TaskPayloadBuilder::new("WTxx1")
        .status(TaskStatus::Canceled)
        .build();
    task.emit_event(TaskEventKind::Canceled, &payload).unwrap();

    // Each canceled subscriber exactly once, other kinds untouched.
    assert_eq!(canceled_first.load(Ordering::SeqCst), 1);
    assert_eq!(canceled_second.load(Ordering::SeqCst), 1);
    assert_eq!(completed.load(Ordering::SeqCst), 0);

    // Emission normalized the payload into the public fields first.
    assert_eq!(task.status(), TaskStatus::Canceled);
}

#[tokio::test]
async fn update_token_swaps_credential_and_fires_once() {
    let (worker, _http, transport) = worker();

    let notifications = Arc::new(AtomicU32::new(0));
    let counter = notifications.clone();
    worker.on(WorkerEventKind::TokenUpdated, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    worker.update_token("updatedJwt").await.unwrap();

    assert_eq!(worker.config().token(), "updatedJwt");
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert!(worker.signaling().reconnect_required());
    // No connection existed, so nothing was propagated; the replaced
    // token is held for the next connect attempt.
    assert!(transport.token_updates().is_empty());
}

#[tokio::test]
async fn update_token_propagates_to_live_connection() {
    let (worker, _http, transport) = worker();
    let handle = worker.connect();
    wait_until(|| worker.signaling().state().is_connected()).await;

    worker.update_token("updatedJwt").await.unwrap();

    assert_eq!(transport.token_updates(), vec!["updatedJwt".to_string()]);
    assert!(worker.signaling().reconnect_required());

    worker.disconnect().await;
    let _ = handle.await;
}

#[tokio::test]
async fn update_token_rejects_empty_credential() {
    let (worker, ..) = worker();
    assert!(worker.update_token("").await.is_err());
    assert_eq!(worker.config().token(), "initialJwt");
}

#[tokio::test]
async fn disconnect_fires_exactly_once_with_reason_and_stops_reconnection() {
    let (worker, _http, transport) = worker();
    let handle = worker.connect();
    wait_until(|| worker.signaling().state().is_connected()).await;
    assert_eq!(transport.open_calls(), 1);

    let reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = reasons.clone();
    worker.on(WorkerEventKind::Disconnected, move |event| {
        if let WorkerEvent::Disconnected { reason } = event {
            sink.lock().push(reason.clone());
        }
    });

    worker.disconnect().await;
    // A second disconnect is a no-op, not a second notification.
    worker.disconnect().await;
    let _ = handle.await;

    assert_eq!(*reasons.lock(), vec!["SDK Disconnect".to_string()]);
    assert!(worker.signaling().state().is_closed());

    // Connection loss after a terminal disconnect triggers nothing.
    transport.push_closed("late close");
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.open_calls(), 1);
}

#[tokio::test]
async fn ready_fires_after_first_handshake() {
    let (worker, _http, _transport) = worker();

    let ready = Arc::new(AtomicU32::new(0));
    let counter = ready.clone();
    worker.on(WorkerEventKind::Ready, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let handle = worker.connect();
    wait_until(|| ready.load(Ordering::SeqCst) == 1).await;

    worker.disconnect().await;
    let _ = handle.await;
}

#[tokio::test]
async fn reservation_created_frame_materializes_entities() {
    let (worker, _http, transport) = worker();

    let created = Arc::new(Mutex::new(Vec::new()));
    let sink = created.clone();
    worker.on(WorkerEventKind::ReservationCreated, move |event| {
        if let WorkerEvent::ReservationCreated { reservation_sid } = event {
            sink.lock().push(reservation_sid.clone());
        }
    });

    let handle = worker.connect();
    transport.push_frame(reserved_task_frame("WRxx1", "WTxx1"));
    wait_until(|| !worker.reservations().is_empty()).await;

    assert_eq!(*created.lock(), vec!["WRxx1".to_string()]);
    let reservation = worker.reservation("WRxx1").unwrap();
    assert_eq!(reservation.status(), ReservationStatus::Pending);
    assert_eq!(reservation.worker_sid(), "WKxxx");
    assert_eq!(reservation.task().sid(), "WTxx1");
    assert_eq!(reservation.task().status(), TaskStatus::Reserved);

    worker.disconnect().await;
    let _ = handle.await;
}

#[tokio::test]
async fn task_canceled_frame_retires_the_reservation() {
    let (worker, ..) = worker();
    worker
        .route_frame(&reserved_task_frame("WRxx1", "WTxx1"))
        .unwrap();
    let task = worker.reservation("WRxx1").unwrap().task();

    let canceled = Arc::new(AtomicU32::new(0));
    let counter = canceled.clone();
    task.on(TaskEventKind::Canceled, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let payload = TaskPayloadBuilder::new("WTxx1")
        .status(TaskStatus::Canceled)
        .build();
    worker
        .route_frame(&Frame::new("task.canceled", payload))
        .unwrap();

    assert_eq!(canceled.load(Ordering::SeqCst), 1);
    assert_eq!(task.status(), TaskStatus::Canceled);
    // Terminal reservation left the active set.
    assert!(worker.reservation("WRxx1").is_none());
}

#[tokio::test]
async fn unknown_task_sid_materializes_fresh_from_frame() {
    let (worker, ..) = worker();
    assert!(worker.reservations().is_empty());

    let payload = TaskPayloadBuilder::new("WTxx9")
        .status(TaskStatus::Wrapping)
        .reservation_sid("WRxx9")
        .build();
    worker
        .route_frame(&Frame::new("task.wrapup", payload))
        .unwrap();

    let reservation = worker.reservation("WRxx9").unwrap();
    assert_eq!(reservation.task().sid(), "WTxx9");
    assert_eq!(reservation.task().status(), TaskStatus::Wrapping);
    assert_eq!(reservation.status(), ReservationStatus::Wrapping);
}

#[tokio::test]
async fn transfer_frames_reach_the_initiating_reservation() {
    let (worker, ..) = worker();
    worker
        .route_frame(&reserved_task_frame("WRxx1", "WTxx1"))
        .unwrap();
    let task = worker.reservation("WRxx1").unwrap().task();

    let initiated = Arc::new(AtomicU32::new(0));
    let failed = Arc::new(AtomicU32::new(0));
    let counter = initiated.clone();
    task.on(TaskEventKind::TransferInitiated, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = failed.clone();
    task.on(TaskEventKind::TransferFailed, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    worker
        .route_frame(&Frame::new(
            "task.transfer-initiated",
            transfer_payload("TRxx1", "WRxx1", "warm"),
        ))
        .unwrap();

    assert_eq!(initiated.load(Ordering::SeqCst), 1);
    assert_eq!(failed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn token_expiring_frame_surfaces_as_worker_event() {
    let (worker, ..) = worker();

    let expiring = Arc::new(AtomicU32::new(0));
    let counter = expiring.clone();
    worker.on(WorkerEventKind::TokenAboutToExpire, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    worker
        .route_frame(&Frame::new("token.expiring", json!({})))
        .unwrap();
    assert_eq!(expiring.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn worker_updated_frame_applies_activity_and_attributes() {
    let (worker, ..) = worker();

    let activity_events = Arc::new(AtomicU32::new(0));
    let counter = activity_events.clone();
    worker.on(WorkerEventKind::ActivityUpdated, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let payload = worker_payload("WKxxx", "WAxx2", true, json!({"languages": ["en"]}));
    worker
        .route_frame(&Frame::new("worker.updated", payload))
        .unwrap();

    assert_eq!(worker.activity_sid(), "WAxx2");
    assert!(worker.available());
    assert_eq!(worker.attributes(), json!({"languages": ["en"]}));
    assert_eq!(activity_events.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reconnect_resynchronizes_with_a_fresh_snapshot() {
    let (worker, _http, transport) = worker();
    let handle = worker.connect();
    wait_until(|| worker.signaling().state().is_connected()).await;
    assert_eq!(transport.open_calls(), 1);
    assert_eq!(transport.snapshot_requests(), 0);

    transport.push_closed("socket reset");
    wait_until(|| transport.open_calls() == 2).await;
    wait_until(|| worker.signaling().state().is_connected()).await;

    // Push events during the gap are not replayed, so the channel asked
    // for a fresh snapshot.
    assert_eq!(transport.snapshot_requests(), 1);

    worker.disconnect().await;
    let _ = handle.await;
}

#[tokio::test]
async fn exhausted_reconnect_budget_surfaces_terminal_disconnect() {
    let (worker, _http, transport) =
        worker_with_strategy(ReconnectionStrategy::fixed(Duration::from_millis(1), 2));

    let reasons = Arc::new(Mutex::new(Vec::new()));
    let sink = reasons.clone();
    worker.on(WorkerEventKind::Disconnected, move |event| {
        if let WorkerEvent::Disconnected { reason } = event {
            sink.lock().push(reason.clone());
        }
    });

    let handle = worker.connect();
    wait_until(|| worker.signaling().state().is_connected()).await;

    // Every future open fails, so the budget of 2 attempts drains.
    transport.fail_next_opens(u32::MAX);
    transport.push_closed("socket reset");

    let _ = handle.await;
    assert!(worker.signaling().state().is_closed());
    assert_eq!(
        *reasons.lock(),
        vec!["Reconnection attempts exhausted".to_string()]
    );
}

#[tokio::test]
async fn worker_set_attributes_round_trip() {
    let (worker, http, _transport) = worker();

    http.enqueue_ok(worker_payload(
        "WKxxx",
        "WAxx1",
        true,
        json!({"name": "Ms. Alice"}),
    ));

    let updated = Arc::new(AtomicU32::new(0));
    let counter = updated.clone();
    worker.on(WorkerEventKind::AttributesUpdated, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let applied = worker
        .set_attributes(&json!({"name": "Ms. Alice"}))
        .await
        .unwrap();

    assert_eq!(applied, json!({"name": "Ms. Alice"}));
    assert_eq!(worker.attributes(), json!({"name": "Ms. Alice"}));
    assert_eq!(updated.load(Ordering::SeqCst), 1);

    let requests = http.requests();
    assert_eq!(requests[0].url, "Workspaces/WSxxx/Workers/WKxxx");
    assert_eq!(
        requests[0].params["Attributes"],
        json!({"name": "Ms. Alice"})
    );
}

#[tokio::test]
async fn worker_set_attributes_requires_object() {
    let (worker, http, _transport) = worker();
    assert!(worker.set_attributes(&json!("foo")).await.is_err());
    assert_eq!(http.request_count(), 0);
}

#[tokio::test]
async fn worker_update_activity_round_trip() {
    let (worker, http, _transport) = worker();

    http.enqueue_ok(worker_payload("WKxxx", "WAxx2", true, json!({})));
    let activity = worker.update_activity("WAxx2").await.unwrap();

    assert_eq!(activity, "WAxx2");
    assert_eq!(worker.activity_sid(), "WAxx2");
    assert_eq!(http.requests()[0].params["ActivitySid"], json!("WAxx2"));
}

#[tokio::test]
async fn reservation_accept_round_trip() {
    let (worker, http, _transport) = worker();
    worker
        .route_frame(&reserved_task_frame("WRxx1", "WTxx1"))
        .unwrap();
    let reservation = worker.reservation("WRxx1").unwrap();

    http.enqueue_ok(json!({"sid": "WRxx1", "reservation_status": "accepted"}));
    let status = reservation.accept().await.unwrap();

    assert_eq!(status, ReservationStatus::Accepted);
    assert_eq!(reservation.status(), ReservationStatus::Accepted);

    let requests = http.requests();
    assert_eq!(
        requests[0].url,
        "Workspaces/WSxxx/Tasks/WTxx1/Reservations/WRxx1"
    );
    assert_eq!(
        requests[0].params["ReservationStatus"],
        json!("accepted")
    );
}

#[tokio::test]
async fn malformed_frame_surfaces_as_error_event_not_corruption() {
    let (worker, _http, transport) = worker();

    let errors = Arc::new(AtomicU32::new(0));
    let counter = errors.clone();
    worker.on(WorkerEventKind::Error, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let handle = worker.connect();
    transport.push_frame(Frame::new("reservation.created", json!({"sid": "WRxx1"})));
    wait_until(|| errors.load(Ordering::SeqCst) == 1).await;

    // The bad frame never half-materialized anything.
    assert!(worker.reservations().is_empty());

    worker.disconnect().await;
    let _ = handle.await;
}

#[tokio::test]
async fn push_events_apply_in_arrival_order() {
    let (worker, ..) = worker();
    worker
        .route_frame(&reserved_task_frame("WRxx1", "WTxx1"))
        .unwrap();
    let task = worker.reservation("WRxx1").unwrap().task();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    task.on(TaskEventKind::Updated, move |event| {
        if let taskrouter_sdk::TaskEvent::Updated { task } = event {
            sink.lock().push(task.priority);
        }
    });

    for priority in [1, 2, 3] {
        let payload = TaskPayloadBuilder::new("WTxx1")
            .status(TaskStatus::Reserved)
            .priority(priority)
            .build();
        worker
            .route_frame(&Frame::new("task.updated", payload))
            .unwrap();
    }

    assert_eq!(*seen.lock(), vec![1, 2, 3]);
    assert_eq!(task.fields().priority, 3);
}
