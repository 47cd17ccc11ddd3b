//! HTTP and WebSocket tests driving the full router against Postgres.

mod common;

use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::{create_teacher_and_student, TestHarness};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use skillswap_core::common::{ExchangeId, MemberId};
use test_context::test_context;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

/// Create a pending exchange over HTTP and return its id.
async fn request_exchange(ctx: &TestHarness, student_token: &str, skill_id: &str) -> String {
    let (status, body) = send(
        ctx.app(),
        Method::POST,
        "/exchanges",
        Some(student_token),
        Some(json!({ "skillId": skill_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

async fn set_status(ctx: &TestHarness, token: &str, id: &str, status: &str) -> (StatusCode, Value) {
    send(
        ctx.app(),
        Method::PATCH,
        &format!("/exchanges/{}/status", id),
        Some(token),
        Some(json!({ "status": status })),
    )
    .await
}

#[test_context(TestHarness)]
#[tokio::test]
async fn requests_without_token_are_unauthenticated(ctx: &TestHarness) {
    let (status, body) = send(ctx.app(), Method::GET, "/exchanges", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");
    assert_eq!(body["retryable"], false);

    let (status, _) = send(
        ctx.app(),
        Method::GET,
        "/exchanges",
        Some("not-a-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn create_then_get_returns_same_record(ctx: &TestHarness) {
    let (teacher, student, skill_id) = create_teacher_and_student(&ctx.db_pool, "Guitar")
        .await
        .unwrap();
    let student_token = ctx.token_for(student);

    let id = request_exchange(ctx, &student_token, &skill_id.to_string()).await;

    let (status, body) = send(
        ctx.app(),
        Method::GET,
        &format!("/exchanges/{}", id),
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["skillRef"], skill_id.to_string());
    assert_eq!(body["teacher"], teacher.to_string());
    assert_eq!(body["student"], student.to_string());
    assert_eq!(body["status"], "pending");
    assert!(body["startTime"].is_null());

    // Outsiders can't see it
    let (status, body) = send(
        ctx.app(),
        Method::GET,
        &format!("/exchanges/{}", id),
        Some(&ctx.token_for(MemberId::new())),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "unauthorized");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn create_rejects_self_duplicate_and_unknown_skill(ctx: &TestHarness) {
    let (teacher, student, skill_id) = create_teacher_and_student(&ctx.db_pool, "Cello")
        .await
        .unwrap();

    let (status, body) = send(
        ctx.app(),
        Method::POST,
        "/exchanges",
        Some(&ctx.token_for(teacher)),
        Some(json!({ "skillId": skill_id.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "self_request_forbidden");

    let student_token = ctx.token_for(student);
    request_exchange(ctx, &student_token, &skill_id.to_string()).await;

    let (status, body) = send(
        ctx.app(),
        Method::POST,
        "/exchanges",
        Some(&student_token),
        Some(json!({ "skillId": skill_id.to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "duplicate_request");

    let (status, body) = send(
        ctx.app(),
        Method::POST,
        "/exchanges",
        Some(&student_token),
        Some(json!({ "skillId": MemberId::new().to_string() })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = send(
        ctx.app(),
        Method::POST,
        "/exchanges",
        Some(&student_token),
        Some(json!({ "skillId": "guitar" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn only_teacher_moves_status_along_legal_edges(ctx: &TestHarness) {
    let (teacher, student, skill_id) = create_teacher_and_student(&ctx.db_pool, "Violin")
        .await
        .unwrap();
    let teacher_token = ctx.token_for(teacher);
    let student_token = ctx.token_for(student);
    let id = request_exchange(ctx, &student_token, &skill_id.to_string()).await;

    let (status, _) = set_status(ctx, &student_token, &id, "active").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = set_status(ctx, &teacher_token, &id, "completed").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");

    let (status, body) = set_status(ctx, &teacher_token, &id, "archived").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_transition");

    let missing = ExchangeId::new().to_string();
    let (status, body) = set_status(ctx, &teacher_token, &missing, "archived").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = set_status(ctx, &teacher_token, &id, "active").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert!(body["startTime"].is_string());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn guitar_lesson_over_http(ctx: &TestHarness) {
    let (teacher, student, skill_id) = create_teacher_and_student(&ctx.db_pool, "Guitar")
        .await
        .unwrap();
    let teacher_token = ctx.token_for(teacher);
    let student_token = ctx.token_for(student);
    let id = request_exchange(ctx, &student_token, &skill_id.to_string()).await;
    let rate_uri = format!("/exchanges/{}/rate", id);

    // Not completed yet
    let (status, body) = send(
        ctx.app(),
        Method::POST,
        &rate_uri,
        Some(&student_token),
        Some(json!({ "rating": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");

    assert_eq!(set_status(ctx, &teacher_token, &id, "active").await.0, StatusCode::OK);
    let (status, body) = set_status(ctx, &teacher_token, &id, "completed").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["endTime"].is_string());

    let (status, body) = send(
        ctx.app(),
        Method::POST,
        &rate_uri,
        Some(&student_token),
        Some(json!({ "rating": 6 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = send(
        ctx.app(),
        Method::POST,
        &rate_uri,
        Some(&teacher_token),
        Some(json!({ "rating": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        ctx.app(),
        Method::POST,
        &rate_uri,
        Some(&student_token),
        Some(json!({ "rating": 5, "feedback": "great session" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rating"], 5);
    assert_eq!(body["feedback"], "great session");
    assert_eq!(body["status"], "completed");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn student_withdraws_pending_request(ctx: &TestHarness) {
    let (teacher, student, skill_id) = create_teacher_and_student(&ctx.db_pool, "Knitting")
        .await
        .unwrap();
    let student_token = ctx.token_for(student);
    let id = request_exchange(ctx, &student_token, &skill_id.to_string()).await;
    let uri = format!("/exchanges/{}", id);

    let (status, _) = send(ctx.app(), Method::DELETE, &uri, Some(&ctx.token_for(teacher)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(ctx.app(), Method::DELETE, &uri, Some(&student_token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());

    let (status, _) = send(ctx.app(), Method::GET, &uri, Some(&student_token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The slot is free again
    request_exchange(ctx, &student_token, &skill_id.to_string()).await;
}

#[test_context(TestHarness)]
#[tokio::test]
async fn list_merges_roles_and_filters_by_status(ctx: &TestHarness) {
    let (teacher, student, skill_id) = create_teacher_and_student(&ctx.db_pool, "Baking")
        .await
        .unwrap();
    let teacher_token = ctx.token_for(teacher);
    let student_token = ctx.token_for(student);
    let id = request_exchange(ctx, &student_token, &skill_id.to_string()).await;

    let (status, body) = send(ctx.app(), Method::GET, "/exchanges", Some(&teacher_token), None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = body.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], id);
    assert_eq!(listed[0]["skill"]["title"], "Baking");
    assert_eq!(listed[0]["skill"]["owner"], teacher.to_string());

    let (status, body) = send(
        ctx.app(),
        Method::GET,
        "/exchanges?status=active",
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());

    let (status, body) = send(
        ctx.app(),
        Method::GET,
        "/exchanges?status=bogus",
        Some(&student_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn malformed_exchange_id_is_validation_error(ctx: &TestHarness) {
    let (status, body) = send(
        ctx.app(),
        Method::GET,
        "/exchanges/not-an-id",
        Some(&ctx.token_for(MemberId::new())),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn ice_servers_and_health(ctx: &TestHarness) {
    let (status, _) = send(ctx.app(), Method::GET, "/session/ice-servers", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        ctx.app(),
        Method::GET,
        "/session/ice-servers",
        Some(&ctx.token_for(MemberId::new())),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["iceServers"][0]["urls"], "stun:stun.test:3478");

    let (status, body) = send(ctx.app(), Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"]["status"], "ok");
    assert_eq!(body["session"]["openRooms"], 0);
}

// =============================================================================
// Session channel
// =============================================================================

type Socket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn open_socket(addr: std::net::SocketAddr, token: &str) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws?token={}", addr, token))
        .await
        .unwrap();
    socket
}

async fn send_frame(socket: &mut Socket, frame: Value) {
    socket.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Next JSON event, or `None` if nothing arrives within `wait`.
async fn next_event(socket: &mut Socket, wait: Duration) -> Option<Value> {
    loop {
        let frame = tokio::time::timeout(wait, socket.next()).await.ok()??.ok()?;
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).ok();
        }
    }
}

const WAIT: Duration = Duration::from_secs(5);

#[test_context(TestHarness)]
#[tokio::test]
async fn session_relays_chat_between_room_members(ctx: &TestHarness) {
    let (teacher, student, skill_id) = create_teacher_and_student(&ctx.db_pool, "Guitar")
        .await
        .unwrap();
    let teacher_token = ctx.token_for(teacher);
    let student_token = ctx.token_for(student);
    let room = request_exchange(ctx, &student_token, &skill_id.to_string()).await;
    assert_eq!(set_status(ctx, &teacher_token, &room, "active").await.0, StatusCode::OK);

    let addr = ctx.serve().await.unwrap();
    let mut a = open_socket(addr, &student_token).await;
    let mut b = open_socket(addr, &teacher_token).await;

    send_frame(&mut a, json!({ "type": "join", "room": room })).await;
    let joined = next_event(&mut a, WAIT).await.unwrap();
    assert_eq!(joined, json!({ "type": "joined", "room": room, "peers": 0 }));

    send_frame(&mut b, json!({ "type": "join", "room": room })).await;
    let joined = next_event(&mut b, WAIT).await.unwrap();
    assert_eq!(joined["peers"], 1);
    let peer_joined = next_event(&mut a, WAIT).await.unwrap();
    assert_eq!(peer_joined, json!({ "type": "peer-joined", "room": room }));

    send_frame(&mut a, json!({ "type": "chat", "room": room, "payload": "hi" })).await;
    let chat = next_event(&mut b, WAIT).await.unwrap();
    assert_eq!(chat, json!({ "type": "chat", "room": room, "payload": "hi" }));
    assert!(next_event(&mut a, Duration::from_millis(200)).await.is_none());

    // Garbage is ignored and the connection stays usable
    a.send(Message::Text("{not json".to_string())).await.unwrap();
    send_frame(
        &mut a,
        json!({ "type": "offer", "room": room, "payload": { "sdp": "v=0" } }),
    )
    .await;
    let offer = next_event(&mut b, WAIT).await.unwrap();
    assert_eq!(offer["type"], "offer");
    assert_eq!(offer["payload"]["sdp"], "v=0");

    b.close(None).await.unwrap();
    let left = next_event(&mut a, WAIT).await.unwrap();
    assert_eq!(left, json!({ "type": "peer-left", "room": room }));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn session_room_ids_are_case_insensitive(ctx: &TestHarness) {
    let (teacher, student, skill_id) = create_teacher_and_student(&ctx.db_pool, "Cello")
        .await
        .unwrap();
    let teacher_token = ctx.token_for(teacher);
    let student_token = ctx.token_for(student);
    let room = request_exchange(ctx, &student_token, &skill_id.to_string()).await;
    assert_eq!(set_status(ctx, &teacher_token, &room, "active").await.0, StatusCode::OK);
    let shouted = room.to_uppercase();

    let addr = ctx.serve().await.unwrap();
    let mut a = open_socket(addr, &student_token).await;
    let mut b = open_socket(addr, &teacher_token).await;

    send_frame(&mut a, json!({ "type": "join", "room": shouted })).await;
    let joined = next_event(&mut a, WAIT).await.unwrap();
    assert_eq!(joined, json!({ "type": "joined", "room": room, "peers": 0 }));

    send_frame(&mut b, json!({ "type": "join", "room": room })).await;
    let joined = next_event(&mut b, WAIT).await.unwrap();
    assert_eq!(joined["peers"], 1);
    assert_eq!(ctx.relay.room_count().await, 1);

    send_frame(&mut a, json!({ "type": "chat", "room": shouted, "payload": "hi" })).await;
    let chat = next_event(&mut b, WAIT).await.unwrap();
    assert_eq!(chat, json!({ "type": "chat", "room": room, "payload": "hi" }));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn session_refuses_rooms_of_inactive_exchanges(ctx: &TestHarness) {
    let (_, student, skill_id) = create_teacher_and_student(&ctx.db_pool, "Flute")
        .await
        .unwrap();
    let student_token = ctx.token_for(student);
    let room = request_exchange(ctx, &student_token, &skill_id.to_string()).await;

    let addr = ctx.serve().await.unwrap();
    let mut socket = open_socket(addr, &student_token).await;

    send_frame(&mut socket, json!({ "type": "join", "room": room })).await;
    let event = next_event(&mut socket, WAIT).await.unwrap();
    assert_eq!(event["type"], "error");
    assert_eq!(ctx.relay.room_count().await, 0);

    // Non-participants are refused as well
    let mut outsider = open_socket(addr, &ctx.token_for(MemberId::new())).await;
    send_frame(&mut outsider, json!({ "type": "join", "room": room })).await;
    let event = next_event(&mut outsider, WAIT).await.unwrap();
    assert_eq!(event["type"], "error");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn session_upgrade_requires_token(ctx: &TestHarness) {
    let addr = ctx.serve().await.unwrap();
    let result = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr)).await;
    assert!(result.is_err());
}
