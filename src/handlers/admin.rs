use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use time::Duration;
use tracing::{info, warn};

use crate::middleware::auth::{
    ADMIN_COOKIE, ClientIp, SESSION_MAX_AGE_SECS, has_admin_session, key_matches, session_value,
};
use crate::types::{Quote, QuoteQuery, QuoteStats};
use crate::{NexusError, router::NexusState};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: String,
}

/// Body of create/update. Missing fields read as empty and fail validation.
#[derive(Debug, Default, Deserialize)]
pub struct QuotePayload {
    #[serde(default)]
    pub quote: String,
    #[serde(default)]
    pub author: String,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub motivation_count: u64,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub quote_count: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub logged_in: bool,
}

fn session_cookie(value: String, insecure: bool) -> Cookie<'static> {
    Cookie::build((ADMIN_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(!insecure)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(SESSION_MAX_AGE_SECS))
        .build()
}

/// POST /api/admin/login
///
/// Attempts are limited per client address.
pub async fn admin_login(
    State(state): State<NexusState>,
    ClientIp(ip): ClientIp,
    jar: PrivateCookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(PrivateCookieJar, Json<SessionResponse>), NexusError> {
    if state.login_limiter.check_key(&ip).is_err() {
        warn!(client = %ip, "admin login rate limited");
        return Err(NexusError::RateLimited);
    }
    if !key_matches(req.password.trim(), &state.admin_key) {
        warn!(client = %ip, "admin login rejected");
        return Err(NexusError::Unauthorized);
    }
    info!(client = %ip, "admin logged in");
    let value = session_value(state.session_epoch(), Utc::now().timestamp());
    let jar = jar.add(session_cookie(value, state.insecure_cookie));
    Ok((jar, Json(SessionResponse { logged_in: true })))
}

/// POST /api/admin/logout
///
/// A live session also revokes every other cookie issued so far.
pub async fn admin_logout(
    State(state): State<NexusState>,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Json<SessionResponse>) {
    if has_admin_session(&jar, &state) {
        state.end_sessions();
        info!("admin logged out; sessions revoked");
    }
    let jar = jar.remove(Cookie::build(ADMIN_COOKIE).path("/"));
    (jar, Json(SessionResponse { logged_in: false }))
}

/// GET /api/admin/quotes?search=&sort_by=&order=
pub async fn list_quotes(
    State(state): State<NexusState>,
    Query(query): Query<QuoteQuery>,
) -> Json<Vec<Quote>> {
    Json(state.quotes.admin_list(&query).await)
}

/// POST /api/admin/quotes
pub async fn create_quote(
    State(state): State<NexusState>,
    Json(body): Json<QuotePayload>,
) -> Result<(StatusCode, Json<Vec<Quote>>), NexusError> {
    state.quotes.create_quote(&body.quote, &body.author).await?;
    let list = state.quotes.admin_list(&QuoteQuery::default()).await;
    Ok((StatusCode::CREATED, Json(list)))
}

/// PUT /api/admin/quotes/{id}
pub async fn update_quote(
    State(state): State<NexusState>,
    Path(id): Path<i64>,
    Json(body): Json<QuotePayload>,
) -> Result<Json<Vec<Quote>>, NexusError> {
    state
        .quotes
        .update_quote(id, &body.quote, &body.author)
        .await?;
    Ok(Json(state.quotes.admin_list(&QuoteQuery::default()).await))
}

/// DELETE /api/admin/quotes/{id}
pub async fn delete_quote(
    State(state): State<NexusState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Quote>>, NexusError> {
    state.quotes.delete_quote(id).await?;
    Ok(Json(state.quotes.admin_list(&QuoteQuery::default()).await))
}

/// GET /api/admin/stats
///
/// Re-reads both figures. A failed quote count shows as zero.
pub async fn stats(State(state): State<NexusState>) -> Result<Json<QuoteStats>, NexusError> {
    let motivation_count = state.counter.refresh().await?;
    let quote_count = state
        .quotes
        .count_quotes()
        .await
        .inspect_err(|e| warn!(error = %e, "failed to count quotes"))
        .unwrap_or(0);
    Ok(Json(QuoteStats {
        motivation_count,
        quote_count,
    }))
}

/// POST /api/admin/stats/increment
pub async fn increment_stats(
    State(state): State<NexusState>,
) -> Result<Json<CountResponse>, NexusError> {
    let motivation_count = state.counter.increment().await?;
    Ok(Json(CountResponse { motivation_count }))
}

/// POST /api/admin/stats/reset
pub async fn reset_stats(
    State(state): State<NexusState>,
) -> Result<Json<CountResponse>, NexusError> {
    let motivation_count = state.counter.reset().await?;
    Ok(Json(CountResponse { motivation_count }))
}

/// POST /api/admin/reload
pub async fn reload_deck(State(state): State<NexusState>) -> Json<ReloadResponse> {
    let quote_count = state.deck.reload(&state.quotes).await;
    Json(ReloadResponse { quote_count })
}
