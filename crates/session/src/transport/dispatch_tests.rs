// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use super::{RequestDispatcher, RequestOptions};
use crate::credential::paths;
use crate::credential::refresh::RefreshCoordinator;
use crate::envelope::Envelope;
use crate::error::ErrorCode;
use crate::events::{self, SessionEvent};
use crate::state::{RefreshedToken, Session, SessionState};
use crate::test_support::{
    auth_failed, fail, ok, refreshed, session, unreachable, MockReply, MockTransport,
};
use crate::transport::ApiRequest;

const LATENCY: Duration = Duration::from_millis(200);
const NEARBY: &str = "/groups/nearby";

struct Harness {
    session: Arc<SessionState>,
    dispatcher: RequestDispatcher,
    transport: Arc<MockTransport>,
    events: broadcast::Receiver<SessionEvent>,
}

fn harness(transport: Arc<MockTransport>, initial: Option<Session>) -> Harness {
    let session = Arc::new(SessionState::restore(initial));
    let tx = events::channel();
    let events = tx.subscribe();
    let coordinator =
        RefreshCoordinator::new(Arc::clone(&session), transport.clone(), tx.clone());
    let dispatcher =
        RequestDispatcher::new(Arc::clone(&session), coordinator, transport.clone(), tx);
    Harness { session, dispatcher, transport, events }
}

/// Backend that accepts only `valid` and refreshes to `valid`.
fn backend(valid: &'static str) -> impl Fn(&ApiRequest) -> MockReply + Send + Sync + 'static {
    move |req| {
        if req.path == paths::REFRESH_TOKEN {
            return refreshed(valid);
        }
        match req.bearer.as_deref() {
            Some(token) if token == valid => ok(json!({ "seen": token })),
            _ => auth_failed(),
        }
    }
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn invalid_count(events: &[SessionEvent]) -> usize {
    events.iter().filter(|e| matches!(e, SessionEvent::SessionInvalid { .. })).count()
}

async fn get(h: &Harness, path: &str) -> Envelope<Value> {
    h.dispatcher.dispatch(Method::GET, path, None, RequestOptions::default()).await
}

#[tokio::test]
async fn protected_path_carries_bearer() {
    let h = harness(MockTransport::new(backend("t1")), Some(session("t1")));
    let env = get(&h, NEARBY).await;
    assert!(env.is_success());
    assert_eq!(h.transport.requests()[0].bearer.as_deref(), Some("t1"));
}

#[tokio::test]
async fn public_path_never_carries_bearer() {
    let h = harness(MockTransport::new(|_| ok(json!({}))), Some(session("t1")));
    let _ = get(&h, paths::LOGIN).await;
    let _ = get(&h, NEARBY).await;
    let _ = h.dispatcher.dispatch::<Value>(Method::GET, NEARBY, None, RequestOptions::public()).await;

    let bearers: Vec<_> = h.transport.requests().into_iter().map(|r| r.bearer).collect();
    assert_eq!(bearers, vec![None, Some("t1".to_owned()), None]);
}

#[tokio::test]
async fn auth_failed_on_public_path_is_not_recovered() {
    let mut h = harness(MockTransport::new(|_| auth_failed()), Some(session("t1")));
    let env = get(&h, paths::LOGIN).await;
    assert_eq!(env.error_code(), Some(ErrorCode::AuthFailed));
    assert_eq!(h.transport.refresh_calls(), 0);
    assert!(h.session.is_logged_in());
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test]
async fn transport_failure_is_internal_error() {
    let h = harness(MockTransport::new(|_| unreachable("connection reset")), Some(session("t1")));
    let env = get(&h, NEARBY).await;
    assert_eq!(env.error_code(), Some(ErrorCode::InternalError));
    assert!(env.message.contains("connection reset"));
    assert!(env.data.is_none());
    assert_eq!(h.transport.refresh_calls(), 0);
}

#[yare::parameterized(
    invalid_param = { ErrorCode::InvalidParam },
    not_found     = { ErrorCode::ResourceNotFound },
    duplicate     = { ErrorCode::DuplicateResource },
    internal      = { ErrorCode::InternalError },
)]
#[test_macro(tokio::test)]
async fn domain_errors_pass_through(code: ErrorCode) {
    let h = harness(MockTransport::new(move |_| fail(code, "domain")), Some(session("t1")));
    let env = get(&h, NEARBY).await;
    assert_eq!(env.code, code.code());
    assert_eq!(env.message, "domain");
    assert_eq!(h.transport.requests().len(), 1);
    assert!(h.session.is_logged_in());
}

#[tokio::test]
async fn permission_denied_surfaces_with_event() -> anyhow::Result<()> {
    let mut h = harness(
        MockTransport::new(|_| fail(ErrorCode::PermissionDenied, "admins only")),
        Some(session("t1")),
    );
    let env = get(&h, "/groups/g1/members/u2/role").await;
    assert_eq!(env.error_code(), Some(ErrorCode::PermissionDenied));
    assert_eq!(h.transport.refresh_calls(), 0);
    assert_eq!(
        h.events.try_recv()?,
        SessionEvent::PermissionDenied {
            path: "/groups/g1/members/u2/role".into(),
            message: "admins only".into(),
        }
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_rejections_share_one_refresh() {
    let h = harness(MockTransport::with_delay(LATENCY, backend("t2")), Some(session("t1")));

    let results = join_all((0..3).map(|_| get(&h, NEARBY))).await;

    for env in &results {
        assert!(env.is_success(), "unexpected {env:?}");
        assert_eq!(env.data, Some(json!({ "seen": "t2" })));
    }
    assert_eq!(h.transport.refresh_calls(), 1);
    assert_eq!(h.transport.count(NEARBY), 6);
    assert_eq!(h.session.token().as_deref(), Some("t2"));
}

#[tokio::test]
async fn persistent_rejection_retries_once() {
    let mut h = harness(
        MockTransport::new(|req| {
            if req.path == paths::REFRESH_TOKEN {
                refreshed("t2")
            } else {
                auth_failed()
            }
        }),
        Some(session("t1")),
    );

    let env = get(&h, NEARBY).await;
    assert_eq!(env.error_code(), Some(ErrorCode::AuthFailed));
    assert_eq!(h.transport.refresh_calls(), 1);
    assert_eq!(h.transport.count(NEARBY), 2);
    assert_eq!(invalid_count(&drain(&mut h.events)), 0);
}

#[tokio::test]
async fn failed_refresh_invalidates_session() {
    let mut h = harness(
        MockTransport::new(|req| {
            if req.path == paths::REFRESH_TOKEN {
                unreachable("connection refused")
            } else {
                fail(ErrorCode::AuthFailed, "token expired")
            }
        }),
        Some(session("t1")),
    );

    let env = get(&h, NEARBY).await;
    assert_eq!(env.error_code(), Some(ErrorCode::AuthFailed));
    assert_eq!(env.message, "token expired");
    assert_eq!(h.transport.count(NEARBY), 1);
    assert!(!h.session.is_logged_in());

    let events = drain(&mut h.events);
    assert_eq!(invalid_count(&events), 1);
    assert!(events.contains(&SessionEvent::SessionInvalid { message: "token expired".into() }));
}

#[tokio::test(start_paused = true)]
async fn concurrent_invalidations_emit_once() {
    let mut h = harness(
        MockTransport::with_delay(LATENCY, |req| {
            if req.path == paths::REFRESH_TOKEN {
                fail(ErrorCode::AuthFailed, "refresh token revoked")
            } else {
                auth_failed()
            }
        }),
        Some(session("t1")),
    );

    let results = join_all((0..4).map(|_| get(&h, NEARBY))).await;
    assert!(results.iter().all(|env| env.error_code() == Some(ErrorCode::AuthFailed)));
    assert_eq!(h.transport.refresh_calls(), 1);
    assert_eq!(invalid_count(&drain(&mut h.events)), 1);
}

fn spawn_get(h: &Harness) -> tokio::task::JoinHandle<Envelope<Value>> {
    let dispatcher = h.dispatcher.clone();
    tokio::spawn(async move {
        dispatcher.dispatch::<Value>(Method::GET, NEARBY, None, RequestOptions::default()).await
    })
}

fn bearers(h: &Harness) -> Vec<Option<String>> {
    h.transport.requests().into_iter().filter(|r| r.path == NEARBY).map(|r| r.bearer).collect()
}

fn other_user(token: &str) -> Session {
    Session { user_id: "u2".to_owned(), display_name: "Grace".to_owned(), ..session(token) }
}

#[tokio::test(start_paused = true)]
async fn replays_with_token_rotated_in_flight() {
    let h = harness(MockTransport::with_delay(LATENCY, backend("t9")), Some(session("t1")));

    let pending = spawn_get(&h);
    tokio::time::sleep(LATENCY / 2).await;
    let rotated = RefreshedToken { token: "t9".into(), ..Default::default() };
    assert!(h.session.replace_token_if("t1", rotated));

    let env = pending.await.ok();
    assert_eq!(env.map(|e| e.is_success()), Some(true));
    assert_eq!(h.transport.refresh_calls(), 0);
    assert_eq!(bearers(&h), vec![Some("t1".to_owned()), Some("t9".to_owned())]);
}

async fn assert_relogin_not_replayed(next: Session) {
    let mut h = harness(MockTransport::with_delay(LATENCY, backend("t9")), Some(session("t1")));

    let pending = spawn_get(&h);
    tokio::time::sleep(LATENCY / 2).await;
    h.session.clear();
    h.session.set(next.clone());

    let env = pending.await.ok();
    assert_eq!(env.and_then(|e| e.error_code()), Some(ErrorCode::AuthFailed));
    assert_eq!(h.transport.refresh_calls(), 0);
    assert_eq!(bearers(&h), vec![Some("t1".to_owned())]);
    assert_eq!(h.session.snapshot(), Some(next));
    assert_eq!(invalid_count(&drain(&mut h.events)), 0);
}

#[tokio::test(start_paused = true)]
async fn other_user_login_in_flight_is_not_replayed() {
    assert_relogin_not_replayed(other_user("t9")).await;
}

#[tokio::test(start_paused = true)]
async fn same_user_relogin_in_flight_is_not_replayed() {
    assert_relogin_not_replayed(session("t9")).await;
}

#[tokio::test(start_paused = true)]
async fn relogin_during_refresh_keeps_new_session() {
    let mut h = harness(MockTransport::with_delay(LATENCY, backend("t2")), Some(session("t1")));

    let pending = spawn_get(&h);
    // Rejection arrives at LATENCY, the refresh settles at 2 * LATENCY.
    tokio::time::sleep(LATENCY + LATENCY / 2).await;
    assert_eq!(h.transport.refresh_calls(), 1);
    h.session.clear();
    h.session.set(other_user("t9"));

    let env = pending.await.ok();
    assert_eq!(env.and_then(|e| e.error_code()), Some(ErrorCode::AuthFailed));
    assert_eq!(bearers(&h), vec![Some("t1".to_owned())]);
    assert_eq!(h.session.token().as_deref(), Some("t9"));
    assert_eq!(h.session.current_user().user_id, "u2");
    assert_eq!(invalid_count(&drain(&mut h.events)), 0);
}

#[tokio::test(start_paused = true)]
async fn anonymous_call_is_not_replayed_after_login() {
    let mut h = harness(MockTransport::with_delay(LATENCY, backend("t9")), None);

    let pending = spawn_get(&h);
    tokio::time::sleep(LATENCY / 2).await;
    h.session.set(other_user("t9"));

    let env = pending.await.ok();
    assert_eq!(env.and_then(|e| e.error_code()), Some(ErrorCode::AuthFailed));
    assert_eq!(bearers(&h), vec![None]);
    assert!(h.session.is_logged_in());
    assert_eq!(invalid_count(&drain(&mut h.events)), 0);
}

#[tokio::test]
async fn anonymous_protected_call_signals_invalid_session() {
    let mut h = harness(MockTransport::new(|_| auth_failed()), None);
    let env = get(&h, NEARBY).await;
    assert_eq!(env.error_code(), Some(ErrorCode::AuthFailed));
    assert_eq!(h.transport.refresh_calls(), 0);
    assert!(h.transport.requests()[0].bearer.is_none());
    assert_eq!(invalid_count(&drain(&mut h.events)), 1);
}

#[tokio::test]
async fn retry_transport_failure_is_internal_error() {
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let h = harness(
        MockTransport::new(move |req| {
            if req.path == paths::REFRESH_TOKEN {
                return refreshed("t2");
            }
            match counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) {
                0 => auth_failed(),
                _ => unreachable("timed out"),
            }
        }),
        Some(session("t1")),
    );

    let env = get(&h, NEARBY).await;
    assert_eq!(env.error_code(), Some(ErrorCode::InternalError));
    assert_eq!(h.transport.refresh_calls(), 1);
}

#[derive(Debug, PartialEq, Deserialize)]
struct Seen {
    seen: String,
}

#[tokio::test]
async fn typed_helpers_decode_payload() {
    let h = harness(MockTransport::new(backend("t1")), Some(session("t1")));

    let env: Envelope<Seen> = h.dispatcher.get(NEARBY, Some(&json!({"radius": 3}))).await;
    assert_eq!(env.data, Some(Seen { seen: "t1".into() }));

    let env: Envelope<Seen> = h.dispatcher.post("/groups/join", Some(&json!({"id": "g1"}))).await;
    assert!(env.is_success());

    let methods: Vec<_> = h.transport.requests().into_iter().map(|r| r.method).collect();
    assert_eq!(methods, vec![Method::GET, Method::POST]);
    assert_eq!(h.transport.requests()[0].body, Some(json!({"radius": 3})));
}
