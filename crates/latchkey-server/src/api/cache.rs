//! Insertion cache HTTP API

use std::time::Duration;

use actix_web::{HttpResponse, delete, get, post, put, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use latchkey_common::Result;
use latchkey_core::InsertionCache;

use crate::model::{AppState, RestResult, error_response};

/// Longest lifetime accepted for a cache entry (30 days)
const MAX_CACHE_TTL_SECS: u64 = 30 * 24 * 3600;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExpiryQuery {
    /// Lifetime in seconds; the configured default when absent
    pub ttl_secs: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddView {
    pub inserted: bool,
    pub value: serde_json::Value,
}

fn expiry(state: &AppState, query: &ExpiryQuery) -> DateTime<Utc> {
    let ttl = query
        .ttl_secs
        .map(|secs| Duration::from_secs(secs.min(MAX_CACHE_TTL_SECS)))
        .unwrap_or(state.cache_ttl);
    let ttl = chrono::Duration::from_std(ttl)
        .unwrap_or_else(|_| chrono::Duration::seconds(MAX_CACHE_TTL_SECS as i64));
    Utc::now() + ttl
}

fn respond(result: Result<HttpResponse>) -> HttpResponse {
    result.unwrap_or_else(|e| {
        warn!(error = %e, "Cache request failed");
        error_response(&e)
    })
}

async fn lookup(state: &AppState, key: &str) -> Result<HttpResponse> {
    Ok(match state.cache.get(key).await? {
        Some(value) => HttpResponse::Ok().json(RestResult::ok(Some(value))),
        None => HttpResponse::NotFound().json(RestResult::<()>::err(
            404,
            &format!("cache key '{}' not found", key),
        )),
    })
}

async fn store(
    state: &AppState,
    key: &str,
    value: serde_json::Value,
    query: &ExpiryQuery,
) -> Result<HttpResponse> {
    state.cache.set(key, &value, expiry(state, query)).await?;
    Ok(HttpResponse::Ok().json(RestResult::ok(Some(value))))
}

async fn insert(
    state: &AppState,
    key: &str,
    value: serde_json::Value,
    query: &ExpiryQuery,
) -> Result<HttpResponse> {
    let outcome = state.cache.add(key, &value, expiry(state, query)).await?;
    let view = AddView {
        inserted: outcome.is_inserted(),
        value: outcome.into_value(),
    };
    Ok(HttpResponse::Ok().json(RestResult::ok(Some(view))))
}

async fn evict(state: &AppState, key: &str) -> Result<HttpResponse> {
    state.cache.remove(key).await?;
    Ok(HttpResponse::Ok().json(RestResult::ok(Some(true))))
}

#[get("/cache/{key}")]
pub async fn get_entry(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    respond(lookup(&state, &path.into_inner()).await)
}

/// Overwrite unconditionally
#[put("/cache/{key}")]
pub async fn put_entry(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ExpiryQuery>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    respond(store(&state, &path.into_inner(), body.into_inner(), &query).await)
}

/// Insert if absent; responds with the value that won
#[post("/cache/{key}")]
pub async fn add_entry(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ExpiryQuery>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    respond(insert(&state, &path.into_inner(), body.into_inner(), &query).await)
}

#[delete("/cache/{key}")]
pub async fn delete_entry(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    respond(evict(&state, &path.into_inner()).await)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_entry)
        .service(put_entry)
        .service(add_entry)
        .service(delete_entry);
}
