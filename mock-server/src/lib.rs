//! Stand-in for the remote API used by integration tests and local runs.
//!
//! Routes:
//! - `/users`, `/users/{id}`: user resource behind `Authorization: Bearer <token>`.
//!   Failures answer with JSON error envelopes the client knows how to read.
//! - `/echo`: reflects method, query, headers and body back as JSON. No auth.
//! - `/boom`: always 500 with an empty body.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

/// Token accepted by `app()`.
pub const VALID_TOKEN: &str = "test-token";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateUser {
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub name: Option<String>,
}

pub type Db = Arc<RwLock<BTreeMap<u64, User>>>;

#[derive(Clone)]
pub struct AppState {
    db: Db,
    next_id: Arc<AtomicU64>,
    token: Arc<str>,
}

impl AppState {
    /// One seeded user: `{"id":5,"name":"Ada"}`.
    fn seeded(token: &str) -> Self {
        let mut users = BTreeMap::new();
        users.insert(
            5,
            User {
                id: 5,
                name: "Ada".to_string(),
            },
        );
        Self {
            db: Arc::new(RwLock::new(users)),
            next_id: Arc::new(AtomicU64::new(6)),
            token: Arc::from(token),
        }
    }
}

pub fn app() -> Router {
    app_with_token(VALID_TOKEN)
}

pub fn app_with_token(token: &str) -> Router {
    let state = AppState::seeded(token);
    let users: Router<AppState> = Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user).delete(delete_user))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .merge(users)
        .route("/echo", any(echo))
        .route("/boom", get(boom))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = format!("Bearer {}", state.token);
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected);
    if !authorized {
        tracing::debug!(uri = %request.uri(), "rejecting request without valid token");
        return error_body(StatusCode::UNAUTHORIZED, "unauthorized");
    }
    next.run(request).await
}

async fn list_users(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Json<Vec<User>> {
    let users = state.db.read().await;
    Json(
        users
            .values()
            .filter(|u| query.name.as_deref().map_or(true, |name| u.name == name))
            .cloned()
            .collect(),
    )
}

async fn create_user(State(state): State<AppState>, Json(input): Json<CreateUser>) -> Response {
    if input.name.trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "errors": ["name is required"] })),
        )
            .into_response();
    }
    let user = User {
        id: state.next_id.fetch_add(1, Ordering::SeqCst),
        name: input.name,
    };
    state.db.write().await.insert(user.id, user.clone());
    (StatusCode::CREATED, Json(user)).into_response()
}

async fn get_user(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.db.read().await.get(&id) {
        Some(user) => Json(user.clone()).into_response(),
        None => error_body(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn delete_user(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    match state.db.write().await.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => error_body(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: String) -> Json<Value> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect();
    Json(json!({
        "method": method.as_str(),
        "query": uri.query(),
        "headers": headers,
        "body": body,
    }))
}

async fn boom() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_serializes_to_json() {
        let user = User {
            id: 5,
            name: "Ada".to_string(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json, json!({"id": 5, "name": "Ada"}));
    }

    #[test]
    fn create_user_defaults_missing_name_to_empty() {
        let input: CreateUser = serde_json::from_str(r#"{}"#).unwrap();
        assert!(input.name.is_empty());
    }

    #[test]
    fn seeded_state_has_ada() {
        let state = AppState::seeded("t");
        let users = state.db.try_read().unwrap();
        assert_eq!(users.get(&5).map(|u| u.name.as_str()), Some("Ada"));
        assert_eq!(state.next_id.load(Ordering::SeqCst), 6);
    }
}
