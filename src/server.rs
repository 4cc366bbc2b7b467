//!
//! beacon HTTP/WS server
//! ---------------------
//! This module defines the Axum-based HTTP API and the WebSocket event feed.
//!
//! Responsibilities:
//! - Login endpoint issuing signed bearer tokens and the matching session cookie.
//! - Credential extraction (auth header + cookie) handed to the validator unmodified.
//! - Item and user CRUD endpoints delegating to the repositories.
//! - Publishing `<action>:<entity>` events to the change notifier after
//!   every successful mutation, with the entity's external representation.
//! - WebSocket endpoint forwarding published events to connected observers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{AppError, AppResult};
use crate::identity::{require_active, require_superuser, CredentialValidator, Principal};
use crate::model::{Item, ItemCreate, ItemUpdate, User, UserCreate, UserUpdate};
use crate::notify::ChangeNotifier;
use crate::repo::{ItemRepo, UserRepo};
use crate::store::MemStore;
use crate::token::TokenCodec;

const SESSION_COOKIE: &str = "session";
const DEFAULT_ADMIN_EMAIL: &str = "admin@beacon.local";

type Users = UserRepo<MemStore<User>>;
type Items = ItemRepo<MemStore<Item>>;

/// Holds the repositories, the credential validator and the change
/// notifier registry shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<CredentialValidator<Users>>,
    pub users: Users,
    pub items: Items,
    pub notifier: Arc<ChangeNotifier>,
    pub token_ttl: chrono::Duration,
}

/// Start the beacon HTTP server with settings read from the environment.
pub async fn run() -> anyhow::Result<()> {
    run_with_settings(Settings::from_env()).await
}

pub async fn run_with_settings(settings: Settings) -> anyhow::Result<()> {
    let users: Users = UserRepo::new(MemStore::new());
    let items: Items = ItemRepo::new(MemStore::new());
    ensure_default_admin(&users).await?;

    let codec = TokenCodec::new(&settings.secret_key);
    let state = AppState {
        auth: Arc::new(CredentialValidator::new(codec, users.clone())),
        users,
        items,
        notifier: Arc::new(ChangeNotifier::new(settings.subscriber_queue)),
        token_ttl: settings.token_ttl(),
    };

    let app = router(state);
    let addr: SocketAddr = format!("0.0.0.0:{}", settings.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "beacon ok" }))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/items", get(list_items).post(create_item))
        // reads address an item by its natural code, writes by id
        .route("/items/{key}", get(get_item_by_code).put(update_item).delete(delete_item))
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/events", get(events_ws))
        .with_state(state)
}

/// Seed a superuser on an empty user collection so the service is
/// administrable on first start.
async fn ensure_default_admin(users: &Users) -> anyhow::Result<()> {
    if users.get_by_email(DEFAULT_ADMIN_EMAIL).await?.is_some() {
        return Ok(());
    }
    let password = match std::env::var("BEACON_ADMIN_PASSWORD") {
        Ok(p) if !p.trim().is_empty() => p,
        _ => {
            let generated = generated_password();
            warn!(
                "BEACON_ADMIN_PASSWORD is unset; bootstrap credential for {} is '{}'",
                DEFAULT_ADMIN_EMAIL, generated
            );
            generated
        }
    };
    let admin = users
        .create(
            UserCreate {
                email: DEFAULT_ADMIN_EMAIL.into(),
                password,
                full_name: Some("Beacon Admin".into()),
                phone: None,
                is_active: true,
                is_verified: true,
                is_superuser: true,
            },
            None,
        )
        .await?;
    info!("created default admin {} ({})", DEFAULT_ADMIN_EMAIL, admin.id);
    Ok(())
}

fn generated_password() -> String {
    let mut bytes = [0u8; 12];
    let _ = getrandom::getrandom(&mut bytes);
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name { return Some(v[1..].to_string()); }
        }
    }
    None
}

fn bearer_from_headers(headers: &HeaderMap) -> Option<String> {
    let value = headers.get("authorization").or_else(|| headers.get("Authorization"))?;
    let s = value.to_str().ok()?;
    let token = s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer "))?.trim();
    if token.is_empty() { None } else { Some(token.to_string()) }
}

fn set_session_cookie(token: &str) -> HeaderValue {
    // HttpOnly cookie scoped to path / with SameSite=Strict
    HeaderValue::from_str(&format!("{}={}; HttpOnly; Secure; SameSite=Strict; Path=/", SESSION_COOKIE, token)).unwrap()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_str(&format!("{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/", SESSION_COOKIE)).unwrap()
}

fn error_response(err: &AppError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"status": "error", "code": err.code_str(), "message": err.message()}))).into_response()
}

/// Hand both credential carriers to the validator unmodified.
async fn authenticate_request(state: &AppState, headers: &HeaderMap) -> AppResult<Principal> {
    let bearer = bearer_from_headers(headers);
    let cookie = parse_cookie(headers, SESSION_COOKIE);
    state.auth.authenticate(bearer.as_deref(), cookie.as_deref()).await
}

async fn require_active_principal(state: &AppState, headers: &HeaderMap) -> AppResult<Principal> {
    let principal = authenticate_request(state, headers).await?;
    require_active(&principal)?;
    Ok(principal)
}

async fn require_active_superuser(state: &AppState, headers: &HeaderMap) -> AppResult<Principal> {
    let principal = require_active_principal(state, headers).await?;
    require_superuser(&principal)?;
    Ok(principal)
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

async fn login(State(state): State<AppState>, Json(payload): Json<LoginPayload>) -> Response {
    let user = match state.users.authenticate_password(&payload.email, &payload.password).await {
        Ok(u) => u,
        Err(e) => return error_response(&e),
    };
    if !user.is_active {
        return error_response(&AppError::inactive("inactive user"));
    }
    let issued = match state.auth.codec().issue(&user.id.to_string(), state.token_ttl) {
        Ok(t) => t,
        Err(e) => {
            error!("token issue failed: {e}");
            return error_response(&e);
        }
    };
    info!(target: "beacon::auth", "login ok user={}", user.id);
    let mut headers = HeaderMap::new();
    headers.insert("Set-Cookie", set_session_cookie(&issued.access_token));
    (StatusCode::OK, headers, Json(json!(issued))).into_response()
}

async fn logout() -> Response {
    // Tokens are self-contained; logging out clears the cookie carrier.
    let mut headers = HeaderMap::new();
    headers.insert("Set-Cookie", clear_session_cookie());
    (StatusCode::OK, headers, Json(json!({"status": "ok"}))).into_response()
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListParams {
    after_field: Option<String>,
    after_value: Option<String>,
    limit: Option<usize>,
}

async fn list_items(State(state): State<AppState>, Query(params): Query<ListParams>) -> Response {
    match state
        .items
        .list(params.after_field.as_deref(), params.after_value.as_deref(), params.limit)
        .await
    {
        Ok(items) => {
            let out: Vec<_> = items.iter().map(Item::to_public).collect();
            (StatusCode::OK, Json(json!(out))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn get_item_by_code(State(state): State<AppState>, Path(code): Path<String>) -> Response {
    match state.items.get_by_code(&code).await {
        Ok(Some(item)) => (StatusCode::OK, Json(json!(item.to_public()))).into_response(),
        Ok(None) => error_response(&AppError::not_found("item_not_found", "item does not exist")),
        Err(e) => error_response(&e),
    }
}

async fn create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ItemCreate>,
) -> Response {
    let principal = match require_active_superuser(&state, &headers).await {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    match state.items.create(payload, Some(principal.id)).await {
        Ok(item) => {
            let out = item.to_public();
            state.notifier.publish("create:item", json!(out));
            (StatusCode::CREATED, Json(json!(out))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn update_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<ItemUpdate>,
) -> Response {
    let principal = match require_active_superuser(&state, &headers).await {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    match state.items.update(id, payload, Some(principal.id)).await {
        Ok(item) => {
            let out = item.to_public();
            state.notifier.publish("update:item", json!(out));
            (StatusCode::OK, Json(json!(out))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn delete_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    if let Err(e) = require_active_superuser(&state, &headers).await {
        return error_response(&e);
    }
    match state.items.delete(id).await {
        Ok(item) => {
            let out = item.to_public();
            state.notifier.publish("delete:item", json!(out));
            (StatusCode::OK, Json(json!(out))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Response {
    if let Err(e) = require_active_superuser(&state, &headers).await {
        return error_response(&e);
    }
    match state
        .users
        .list(params.after_field.as_deref(), params.after_value.as_deref(), params.limit)
        .await
    {
        Ok(users) => {
            let out: Vec<_> = users.iter().map(User::to_public).collect();
            (StatusCode::OK, Json(json!(out))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UserCreate>,
) -> Response {
    let principal = match require_active_superuser(&state, &headers).await {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    match state.users.create(payload, Some(principal.id)).await {
        Ok(user) => {
            let out = user.to_public();
            state.notifier.publish("create:user", json!(out));
            (StatusCode::CREATED, Json(json!(out))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn get_user(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> Response {
    let principal = match require_active_principal(&state, &headers).await {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    // a user may read their own record; everyone else's requires superuser
    if principal.id != id {
        if let Err(e) = require_superuser(&principal) {
            return error_response(&e);
        }
    }
    match state.users.get(id).await {
        Ok(user) => (StatusCode::OK, Json(json!(user.to_public()))).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn update_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UserUpdate>,
) -> Response {
    let principal = match require_active_superuser(&state, &headers).await {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    match state.users.update(id, payload, Some(principal.id)).await {
        Ok(user) => {
            let out = user.to_public();
            state.notifier.publish("update:user", json!(out));
            (StatusCode::OK, Json(json!(out))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Response {
    if let Err(e) = require_active_superuser(&state, &headers).await {
        return error_response(&e);
    }
    match state.users.delete(id).await {
        Ok(user) => {
            let out = user.to_public();
            state.notifier.publish("delete:user", json!(out));
            (StatusCode::OK, Json(json!(out))).into_response()
        }
        Err(e) => error_response(&e),
    }
}

// ---------------------------------------------------------------------------
// Event feed
// ---------------------------------------------------------------------------

async fn events_ws(State(state): State<AppState>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    // Require an authenticated, active principal before upgrading
    let principal = match require_active_principal(&state, &headers).await {
        Ok(p) => p,
        Err(e) => return error_response(&e),
    };
    ws.on_upgrade(move |socket| async move {
        let mut sub = state.notifier.subscribe();
        info!(target: "beacon::notify", "observer connected user={} sub={}", principal.id, sub.id());
        let (mut sender, mut receiver) = socket.split();
        loop {
            tokio::select! {
                evt = sub.recv() => {
                    let Some(evt) = evt else { break };
                    let text = match serde_json::to_string(&evt) {
                        Ok(t) => t,
                        Err(e) => {
                            error!(target: "beacon::notify", "event serialization failed: {e}");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                msg = receiver.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        // inbound frames on the feed are ignored
                        _ => {}
                    }
                }
            }
        }
        state.notifier.unsubscribe(sub.id());
        info!(target: "beacon::notify", "observer disconnected user={} sub={}", principal.id, sub.id());
    })
}
