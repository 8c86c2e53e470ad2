use super::*;
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response as HttpResponse},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use shared::domain::{Bucket, ConnectionStatus};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct SeenRequest {
    method: &'static str,
    path: String,
    authorization: Option<String>,
    csrf: Option<String>,
    body: Value,
}

#[derive(Clone)]
struct BackendState {
    connections_reply: Arc<Mutex<(StatusCode, String)>>,
    review_reply: Arc<Mutex<(StatusCode, Value)>>,
    delete_reply: Arc<Mutex<(StatusCode, Value)>>,
    send_reply: Arc<Mutex<(StatusCode, Value)>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl BackendState {
    fn new() -> Self {
        Self {
            connections_reply: Arc::new(Mutex::new((
                StatusCode::OK,
                buckets_json(vec![], vec![], vec![]).to_string(),
            ))),
            review_reply: Arc::new(Mutex::new((StatusCode::OK, Value::Null))),
            delete_reply: Arc::new(Mutex::new((StatusCode::NO_CONTENT, Value::Null))),
            send_reply: Arc::new(Mutex::new((StatusCode::CREATED, Value::Null))),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    async fn set_connections(&self, status: StatusCode, body: Value) {
        *self.connections_reply.lock().await = (status, body.to_string());
    }

    async fn set_connections_raw(&self, status: StatusCode, body: &str) {
        *self.connections_reply.lock().await = (status, body.to_string());
    }

    async fn set_review(&self, status: StatusCode, body: Value) {
        *self.review_reply.lock().await = (status, body);
    }

    async fn set_send(&self, status: StatusCode, body: Value) {
        *self.send_reply.lock().await = (status, body);
    }

    async fn record(&self, method: &'static str, path: String, headers: &HeaderMap, body: Value) {
        self.seen.lock().await.push(SeenRequest {
            method,
            path,
            authorization: header_value(headers, "authorization"),
            csrf: header_value(headers, "x-csrftoken"),
            body,
        });
    }

    async fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().await.clone()
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn handle_login(
    State(state): State<BackendState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.record("POST", "/login/".to_string(), &headers, body).await;
    (
        [(header::SET_COOKIE, "csrftoken=csrf-abc; Path=/; SameSite=Lax")],
        Json(json!({
            "token": "token-123",
            "user": {
                "id": 5,
                "username": "casey",
                "email": "casey@example.com",
                "name": "Casey Jones"
            }
        })),
    )
}

async fn handle_logout(State(state): State<BackendState>, headers: HeaderMap) -> impl IntoResponse {
    state
        .record("POST", "/logout/".to_string(), &headers, Value::Null)
        .await;
    Json(json!({ "message": "Successfully logged out." }))
}

async fn handle_connections(State(state): State<BackendState>, headers: HeaderMap) -> HttpResponse {
    state
        .record("GET", "/connections/".to_string(), &headers, Value::Null)
        .await;
    let (status, body) = state.connections_reply.lock().await.clone();
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}

async fn handle_send(
    State(state): State<BackendState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> HttpResponse {
    state
        .record("POST", "/connections/request/".to_string(), &headers, body)
        .await;
    let (status, reply) = state.send_reply.lock().await.clone();
    (status, Json(reply)).into_response()
}

async fn handle_review(
    State(state): State<BackendState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> HttpResponse {
    state
        .record("PUT", format!("/connections/{id}/"), &headers, body)
        .await;
    let (status, reply) = state.review_reply.lock().await.clone();
    if status == StatusCode::NO_CONTENT {
        status.into_response()
    } else {
        (status, Json(reply)).into_response()
    }
}

async fn handle_delete(
    State(state): State<BackendState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> HttpResponse {
    state
        .record("DELETE", format!("/connections/{id}/"), &headers, Value::Null)
        .await;
    let (status, reply) = state.delete_reply.lock().await.clone();
    if status == StatusCode::NO_CONTENT {
        status.into_response()
    } else {
        (status, Json(reply)).into_response()
    }
}

async fn spawn_backend(state: BackendState) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route("/login/", post(handle_login))
        .route("/logout/", post(handle_logout))
        .route("/connections/", get(handle_connections))
        .route("/connections/request/", post(handle_send))
        .route("/connections/:id/", put(handle_review).delete(handle_delete))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn signed_in_client(state: &BackendState) -> Arc<MentorshipClient> {
    let server_url = spawn_backend(state.clone()).await;
    let client = MentorshipClient::new(server_url);
    client.login("casey", "hunter22").await.expect("login");
    client
}

fn user_json(id: i64, username: &str) -> Value {
    json!({ "id": id, "username": username, "first_name": "", "last_name": "" })
}

fn pending_json(id: i64, requester: Value, receiver: Value) -> Value {
    json!({
        "id": id,
        "requester": requester,
        "receiver": receiver,
        "status": "pending",
        "created_at": "2024-05-01T12:00:00Z",
        "accepted_at": null,
        "requester_profile": { "role": "mentor", "profile_picture_url": null },
        "receiver_profile": { "role": "mentee", "profile_picture_url": null }
    })
}

fn accepted_json(id: i64, requester: Value, receiver: Value) -> Value {
    json!({
        "id": id,
        "requester": requester,
        "receiver": receiver,
        "status": "accepted",
        "created_at": "2024-05-01T12:00:00Z",
        "accepted_at": "2024-05-02T09:00:00Z",
        "requester_profile": { "role": "mentor", "profile_picture_url": null },
        "receiver_profile": { "role": "mentee", "profile_picture_url": null }
    })
}

fn buckets_json(incoming: Vec<Value>, outgoing: Vec<Value>, current: Vec<Value>) -> Value {
    json!({ "incoming": incoming, "outgoing": outgoing, "current": current })
}

fn rendered_ids(view: &ConnectionListsView) -> Vec<i64> {
    let mut ids: Vec<i64> = Bucket::ALL
        .iter()
        .flat_map(|bucket| view.list(*bucket).items.iter().map(|item| item.id.0))
        .collect();
    ids.sort_unstable();
    ids
}

#[tokio::test]
async fn login_captures_token_viewer_and_csrf_cookie() {
    let state = BackendState::new();
    let client = signed_in_client(&state).await;

    let snapshot = client.session_snapshot().await.expect("snapshot");
    assert_eq!(snapshot.token, "token-123");
    assert_eq!(snapshot.csrf_token.as_deref(), Some("csrf-abc"));
    assert_eq!(snapshot.user.id, UserId(5));
    assert_eq!(snapshot.user.username, "casey");
}

#[tokio::test]
async fn load_renders_every_bucket_record_exactly_once() {
    let state = BackendState::new();
    state
        .set_connections(
            StatusCode::OK,
            buckets_json(
                vec![
                    pending_json(1, user_json(9, "mia"), user_json(5, "casey")),
                    pending_json(2, user_json(8, "theo"), user_json(5, "casey")),
                ],
                vec![pending_json(3, user_json(5, "casey"), user_json(7, "ines"))],
                vec![accepted_json(4, user_json(5, "casey"), user_json(6, "ravi"))],
            ),
        )
        .await;
    let client = signed_in_client(&state).await;

    let view = client.load_connections().await.expect("load");
    assert_eq!(rendered_ids(&view), vec![1, 2, 3, 4]);
    assert_eq!(view.incoming.items.len(), 2);
    assert_eq!(view.outgoing.items.len(), 1);
    assert_eq!(view.current.items.len(), 1);
    assert!(!view.incoming.placeholder_visible);
    assert!(!view.outgoing.placeholder_visible);
    assert!(!view.current.placeholder_visible);
    // The viewer received request 1, so its counterpart is the requester.
    assert_eq!(view.incoming.items[0].counterpart.display_name(), "mia");
    // The viewer sent request 3, so its counterpart is the receiver.
    assert_eq!(view.outgoing.items[0].counterpart.display_name(), "ines");
}

#[tokio::test]
async fn load_treats_missing_bucket_keys_as_empty() {
    let state = BackendState::new();
    state
        .set_connections(
            StatusCode::OK,
            json!({
                "incoming": [pending_json(1, user_json(9, "mia"), user_json(5, "casey"))]
            }),
        )
        .await;
    let client = signed_in_client(&state).await;

    let view = client.load_connections().await.expect("load");
    assert_eq!(view.incoming.items.len(), 1);
    assert!(view.outgoing.items.is_empty());
    assert!(view.outgoing.placeholder_visible);
    assert!(view.current.items.is_empty());
    assert!(view.current.placeholder_visible);
}

#[tokio::test]
async fn failed_load_replaces_lists_and_keeps_no_stale_items() {
    let state = BackendState::new();
    state
        .set_connections(
            StatusCode::OK,
            buckets_json(
                vec![pending_json(1, user_json(9, "mia"), user_json(5, "casey"))],
                vec![],
                vec![],
            ),
        )
        .await;
    let client = signed_in_client(&state).await;
    client.load_connections().await.expect("first load");

    state
        .set_connections(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "detail": "temporarily unavailable" }),
        )
        .await;
    let err = client.load_connections().await.expect_err("must fail");
    assert!(matches!(err, ClientError::Rejected(_)));

    let view = client.lists_view().await.expect("view");
    let error = view.load_error.as_deref().expect("load error");
    assert!(error.contains("temporarily unavailable"), "got: {error}");
    assert_eq!(view.total_items(), 0);
}

#[tokio::test]
async fn malformed_load_body_is_a_malformed_response_error() {
    let state = BackendState::new();
    state
        .set_connections_raw(StatusCode::OK, "this is not json")
        .await;
    let client = signed_in_client(&state).await;

    let err = client.load_connections().await.expect_err("must fail");
    assert!(matches!(err, ClientError::MalformedResponse(_)));
    let view = client.lists_view().await.expect("view");
    assert!(view.load_error.is_some());
}

#[tokio::test]
async fn accept_moves_the_record_into_current_and_flips_placeholders() {
    let state = BackendState::new();
    state
        .set_connections(
            StatusCode::OK,
            buckets_json(
                vec![pending_json(1, user_json(9, "mia"), user_json(5, "casey"))],
                vec![],
                vec![],
            ),
        )
        .await;
    state
        .set_review(
            StatusCode::OK,
            accepted_json(1, user_json(9, "mia"), user_json(5, "casey")),
        )
        .await;
    let client = signed_in_client(&state).await;
    client.load_connections().await.expect("load");

    let outcome = client
        .submit_action(ConnectionId(1), ConnectionAction::Accept)
        .await
        .expect("accept");
    assert!(matches!(outcome, ActionOutcome::Updated(_)));

    let view = client.lists_view().await.expect("view");
    assert!(view.incoming.items.is_empty());
    assert!(view.incoming.placeholder_visible);
    assert_eq!(view.current.items.len(), 1);
    assert!(!view.current.placeholder_visible);
    let item = &view.current.items[0];
    assert_eq!(item.id, ConnectionId(1));
    assert_eq!(item.status, ConnectionStatus::Accepted);
    assert!(item.accepted_at.is_some());
    assert_eq!(item.counterpart.display_name(), "mia");

    let requests = state.requests().await;
    let review = requests
        .iter()
        .find(|request| request.method == "PUT")
        .expect("review call");
    assert_eq!(review.path, "/connections/1/");
    assert_eq!(review.authorization.as_deref(), Some("Token token-123"));
    assert_eq!(review.csrf.as_deref(), Some("csrf-abc"));
    assert_eq!(review.body, json!({ "action": "accept" }));
}

#[tokio::test]
async fn decline_removes_exactly_one_node_and_touches_nothing_else() {
    let state = BackendState::new();
    state
        .set_connections(
            StatusCode::OK,
            buckets_json(
                vec![pending_json(7, user_json(9, "mia"), user_json(5, "casey"))],
                vec![],
                vec![accepted_json(9, user_json(5, "casey"), user_json(6, "ravi"))],
            ),
        )
        .await;
    state.set_review(StatusCode::NO_CONTENT, Value::Null).await;
    let client = signed_in_client(&state).await;
    client.load_connections().await.expect("load");

    let outcome = client
        .submit_action(ConnectionId(7), ConnectionAction::Decline)
        .await
        .expect("decline");
    assert!(matches!(outcome, ActionOutcome::NoContent));

    let view = client.lists_view().await.expect("view");
    assert!(view.incoming.items.is_empty());
    assert!(view.incoming.placeholder_visible);
    assert_eq!(view.current.items.len(), 1);
    assert_eq!(rendered_ids(&view), vec![9]);

    let requests = state.requests().await;
    let review = requests
        .iter()
        .find(|request| request.method == "PUT")
        .expect("review call");
    assert_eq!(review.body, json!({ "action": "decline" }));
}

#[tokio::test]
async fn cancel_and_remove_issue_deletes_and_empty_their_lists() {
    let state = BackendState::new();
    state
        .set_connections(
            StatusCode::OK,
            buckets_json(
                vec![],
                vec![pending_json(3, user_json(5, "casey"), user_json(7, "ines"))],
                vec![accepted_json(4, user_json(5, "casey"), user_json(6, "ravi"))],
            ),
        )
        .await;
    let client = signed_in_client(&state).await;
    client.load_connections().await.expect("load");

    client
        .submit_action(ConnectionId(3), ConnectionAction::Cancel)
        .await
        .expect("cancel");
    client
        .submit_action(ConnectionId(4), ConnectionAction::Remove)
        .await
        .expect("remove");

    let view = client.lists_view().await.expect("view");
    assert_eq!(view.total_items(), 0);
    assert!(view.outgoing.placeholder_visible);
    assert!(view.current.placeholder_visible);

    let requests = state.requests().await;
    let deletes: Vec<&SeenRequest> = requests
        .iter()
        .filter(|request| request.method == "DELETE")
        .collect();
    assert_eq!(deletes.len(), 2);
    assert_eq!(deletes[0].path, "/connections/3/");
    assert_eq!(deletes[1].path, "/connections/4/");
    assert!(deletes
        .iter()
        .all(|request| request.csrf.as_deref() == Some("csrf-abc")));
}

#[tokio::test]
async fn failed_action_restores_the_item_and_surfaces_the_server_message() {
    let state = BackendState::new();
    state
        .set_connections(
            StatusCode::OK,
            buckets_json(
                vec![pending_json(7, user_json(9, "mia"), user_json(5, "casey"))],
                vec![],
                vec![],
            ),
        )
        .await;
    state
        .set_review(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "detail": "server exploded" }),
        )
        .await;
    let client = signed_in_client(&state).await;
    client.load_connections().await.expect("load");
    let mut events = client.subscribe_events();

    let err = client
        .submit_action(ConnectionId(7), ConnectionAction::Accept)
        .await
        .expect_err("must fail");
    assert!(matches!(err, ClientError::Rejected(_)));
    assert!(err.to_string().contains("server exploded"));

    let view = client.lists_view().await.expect("view");
    assert_eq!(view.total_items(), 1);
    let item = view.item(ConnectionId(7)).expect("item");
    assert!(!item.in_flight());
    let labels: Vec<&str> = item
        .controls
        .iter()
        .map(|control| control.label.as_str())
        .collect();
    assert_eq!(labels, vec!["Accept", "Decline"]);

    match events.recv().await.expect("event") {
        ClientEvent::ActionFailed {
            connection_id,
            message,
        } => {
            assert_eq!(connection_id, ConnectionId(7));
            assert!(message.contains("server exploded"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn expired_token_on_action_reports_session_expiry() {
    let state = BackendState::new();
    state
        .set_connections(
            StatusCode::OK,
            buckets_json(
                vec![pending_json(7, user_json(9, "mia"), user_json(5, "casey"))],
                vec![],
                vec![],
            ),
        )
        .await;
    state
        .set_review(StatusCode::UNAUTHORIZED, json!({ "detail": "Invalid token." }))
        .await;
    let client = signed_in_client(&state).await;
    client.load_connections().await.expect("load");

    let err = client
        .submit_action(ConnectionId(7), ConnectionAction::Accept)
        .await
        .expect_err("must fail");
    assert!(matches!(err, ClientError::SessionExpired(_)));
    let item = client
        .lists_view()
        .await
        .expect("view")
        .item(ConnectionId(7))
        .cloned()
        .expect("item");
    assert!(!item.in_flight());
}

#[tokio::test]
async fn missing_credentials_short_circuit_without_network_calls() {
    let state = BackendState::new();
    let server_url = spawn_backend(state.clone()).await;
    let client = MentorshipClient::new(server_url);

    let err = client.load_connections().await.expect_err("no session");
    assert!(matches!(err, ClientError::AuthRequired(_)));
    let err = client.send_request(UserId(8)).await.expect_err("no session");
    assert!(matches!(err, ClientError::AuthRequired(_)));
    let err = client
        .submit_action(ConnectionId(7), ConnectionAction::Accept)
        .await
        .expect_err("no session");
    assert!(matches!(err, ClientError::AuthRequired(_)));

    assert!(state.requests().await.is_empty());
}

#[tokio::test]
async fn send_request_tracks_the_created_record_in_outgoing() {
    let state = BackendState::new();
    state
        .set_send(
            StatusCode::CREATED,
            pending_json(11, user_json(5, "casey"), user_json(8, "theo")),
        )
        .await;
    let client = signed_in_client(&state).await;
    client.load_connections().await.expect("load");

    let record = client.send_request(UserId(8)).await.expect("send");
    assert_eq!(record.id, ConnectionId(11));

    let view = client.lists_view().await.expect("view");
    assert_eq!(view.outgoing.items.len(), 1);
    assert!(!view.outgoing.placeholder_visible);
    assert_eq!(view.outgoing.items[0].counterpart.display_name(), "theo");

    let requests = state.requests().await;
    let send = requests
        .iter()
        .find(|request| request.path == "/connections/request/")
        .expect("send call");
    assert_eq!(send.body, json!({ "user_id": 8 }));
    assert_eq!(send.csrf.as_deref(), Some("csrf-abc"));
}

#[tokio::test]
async fn acknowledgement_body_on_review_counts_as_no_content() {
    let state = BackendState::new();
    state
        .set_connections(
            StatusCode::OK,
            buckets_json(
                vec![pending_json(7, user_json(9, "mia"), user_json(5, "casey"))],
                vec![],
                vec![],
            ),
        )
        .await;
    state
        .set_review(StatusCode::OK, json!({ "message": "Request declined." }))
        .await;
    let client = signed_in_client(&state).await;
    client.load_connections().await.expect("load");

    let outcome = client
        .submit_action(ConnectionId(7), ConnectionAction::Decline)
        .await
        .expect("decline");
    assert!(matches!(outcome, ActionOutcome::NoContent));
    let view = client.lists_view().await.expect("view");
    assert_eq!(view.total_items(), 0);
    assert!(view.incoming.placeholder_visible);
}

#[tokio::test]
async fn logout_clears_the_local_session() {
    let state = BackendState::new();
    let client = signed_in_client(&state).await;

    client.logout().await.expect("logout");
    assert!(client.session_snapshot().await.is_none());
    assert!(client.lists_view().await.is_none());
}
