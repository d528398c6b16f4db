//! Session record HTTP API
//!
//! Records are only created by `POST /session` under a freshly generated id,
//! since creating wipes whatever is stored. Every other request is a complete
//! read-modify-write cycle against an existing record: exclusive read, local
//! change, `set_and_release`.

use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, delete, get, post, put, web};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use latchkey_common::Result;
use latchkey_core::{ReadOutcome, SessionData, SessionStateStore, WriteOutcome};

use crate::model::{AppState, RestResult, SessionItems, error_response};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub items: SessionItems,
    pub timeout_secs: u64,
    pub was_uninitialized: bool,
}

impl SessionView {
    fn new(data: SessionData<SessionItems>, was_uninitialized: bool) -> Self {
        Self {
            items: data.items,
            timeout_secs: data.timeout.as_secs(),
            was_uninitialized,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedView {
    pub id: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockView {
    pub lock_age_secs: f64,
}

fn locked(age: Duration) -> HttpResponse {
    HttpResponse::build(StatusCode::LOCKED).json(RestResult::err_with(
        423,
        "session is locked",
        LockView {
            lock_age_secs: age.as_secs_f64(),
        },
    ))
}

fn not_found(id: &str) -> HttpResponse {
    HttpResponse::NotFound().json(RestResult::<()>::err(
        404,
        &format!("session '{}' not found", id),
    ))
}

fn write_failed(id: &str, outcome: WriteOutcome) -> HttpResponse {
    match outcome {
        WriteOutcome::NotFound => not_found(id),
        WriteOutcome::Rejected => {
            HttpResponse::BadRequest().json(RestResult::<()>::err(400, "write rejected"))
        }
        _ => HttpResponse::Conflict().json(RestResult::<()>::err(
            409,
            "lock was lost before the write completed",
        )),
    }
}

fn respond(result: Result<HttpResponse>) -> HttpResponse {
    result.unwrap_or_else(|e| {
        warn!(error = %e, "Session request failed");
        error_response(&e)
    })
}

/// Exclusive read that breaks locks older than the configured threshold, once
async fn acquire(state: &AppState, id: &str) -> Result<ReadOutcome<SessionItems>> {
    let outcome = state.sessions.get_exclusive(id).await?;
    if let ReadOutcome::Locked { lock, age } = &outcome
        && let Some(limit) = state.lock_stale_after
        && *age >= limit
    {
        warn!(id, age_secs = age.as_secs(), "Releasing stale session lock");
        state.sessions.release(id, lock).await?;
        return state.sessions.get_exclusive(id).await;
    }
    Ok(outcome)
}

async fn read_session(state: &AppState, id: &str) -> Result<HttpResponse> {
    Ok(match state.sessions.get(id).await? {
        ReadOutcome::NotFound => not_found(id),
        ReadOutcome::Locked { age, .. } => locked(age),
        ReadOutcome::Available {
            data,
            was_uninitialized,
            ..
        } => HttpResponse::Ok().json(RestResult::ok(Some(SessionView::new(
            data,
            was_uninitialized,
        )))),
    })
}

async fn create(state: &AppState) -> Result<HttpResponse> {
    let id = Uuid::new_v4().simple().to_string();
    state
        .sessions
        .create_uninitialized(&id, state.session_timeout)
        .await?;
    debug!(id = %id, "Created session record");
    Ok(HttpResponse::Created().json(RestResult::ok(Some(CreatedView {
        id,
        timeout_secs: state.session_timeout.as_secs(),
    }))))
}

async fn write_item(
    state: &AppState,
    id: &str,
    name: String,
    value: serde_json::Value,
) -> Result<HttpResponse> {
    let (mut data, lock, was_uninitialized) = match acquire(state, id).await? {
        ReadOutcome::NotFound => return Ok(not_found(id)),
        ReadOutcome::Locked { age, .. } => return Ok(locked(age)),
        ReadOutcome::Available {
            data,
            lock,
            was_uninitialized,
        } => (data, lock, was_uninitialized),
    };

    data.items.insert(name, value);
    let outcome = state
        .sessions
        .set_and_release(id, &data, lock.as_ref(), false)
        .await?;
    if !outcome.is_applied() {
        return Ok(write_failed(id, outcome));
    }
    Ok(HttpResponse::Ok().json(RestResult::ok(Some(SessionView::new(
        data,
        was_uninitialized,
    )))))
}

async fn remove_session(state: &AppState, id: &str) -> Result<HttpResponse> {
    let lock = match acquire(state, id).await? {
        ReadOutcome::NotFound => return Ok(not_found(id)),
        ReadOutcome::Locked { age, .. } => return Ok(locked(age)),
        ReadOutcome::Available { lock, .. } => lock,
    };

    let outcome = state.sessions.remove(id, lock.as_ref()).await?;
    if !outcome.is_applied() {
        return Ok(write_failed(id, outcome));
    }
    Ok(HttpResponse::Ok().json(RestResult::ok(Some(true))))
}

async fn extend_session(state: &AppState, id: &str) -> Result<HttpResponse> {
    Ok(if state.sessions.reset_timeout(id).await? {
        HttpResponse::Ok().json(RestResult::ok(Some(true)))
    } else {
        not_found(id)
    })
}

/// Create an empty record under a new id
#[post("/session")]
pub async fn create_session(state: web::Data<AppState>) -> HttpResponse {
    respond(create(&state).await)
}

/// Shared read of a session record
#[get("/session/{id}")]
pub async fn get_session(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    respond(read_session(&state, &path.into_inner()).await)
}

/// Set one item on an existing record
#[put("/session/{id}/{name}")]
pub async fn put_item(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    let (id, name) = path.into_inner();
    respond(write_item(&state, &id, name, body.into_inner()).await)
}

/// Remove a session record once its lock can be taken
#[delete("/session/{id}")]
pub async fn delete_session(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    respond(remove_session(&state, &path.into_inner()).await)
}

/// Extend a session record's lifetime without reading it
#[post("/session/{id}/touch")]
pub async fn touch_session(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    respond(extend_session(&state, &path.into_inner()).await)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(create_session)
        .service(get_session)
        .service(put_item)
        .service(delete_session)
        .service(touch_session);
}
