use crate::handlers::admin::{
    admin_login, admin_logout, create_quote, delete_quote, increment_stats, list_quotes,
    reload_deck, reset_stats, stats, update_quote,
};
use crate::handlers::display::{motivation, motivation_stream, random_quote};
use crate::middleware::auth::RequireAdmin;
use crate::service::{CounterHandle, QuoteDeck, QuoteService};

use axum::{
    Router,
    extract::{FromRef, Request},
    http::{HeaderName, HeaderValue, StatusCode, header::USER_AGENT},
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use axum_extra::extract::cookie::Key;
use base64::Engine as _;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use rand::RngCore;
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::{error, info, warn};

/// Global cookie signing/encryption key for PrivateCookieJar.
static COOKIE_KEY: LazyLock<Key> = LazyLock::new(Key::generate);

const MAX_REQUEST_ID_LEN: usize = 128;
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

fn generate_request_id() -> String {
    // 96 bits => 16 chars base64url (no padding).
    let mut bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone)]
pub struct NexusState {
    pub counter: CounterHandle,
    pub quotes: QuoteService,
    pub deck: QuoteDeck,
    pub admin_key: Arc<str>,
    pub insecure_cookie: bool,
    pub login_limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
    session_epoch: Arc<AtomicU64>,
}

impl NexusState {
    pub fn new(
        counter: CounterHandle,
        quotes: QuoteService,
        deck: QuoteDeck,
        admin_key: Arc<str>,
        insecure_cookie: bool,
        login_per_minute: u32,
    ) -> Self {
        let per_minute = NonZeroU32::new(login_per_minute).unwrap_or(NonZeroU32::MIN);
        let login_limiter = Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute)));
        Self {
            counter,
            quotes,
            deck,
            admin_key,
            insecure_cookie,
            login_limiter,
            session_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Admin cookies carry the epoch they were issued in.
    pub fn session_epoch(&self) -> u64 {
        self.session_epoch.load(Ordering::SeqCst)
    }

    /// Revoke every admin cookie issued so far.
    pub fn end_sessions(&self) {
        self.session_epoch.fetch_add(1, Ordering::SeqCst);
    }
}

impl FromRef<NexusState> for Key {
    fn from_ref(state: &NexusState) -> Self {
        let _ = state; // state not used to fetch the static key
        COOKIE_KEY.clone()
    }
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
}

fn log_by_status(status: StatusCode, line: &str) {
    if status.is_server_error() {
        error!("{line}");
    } else if status.is_client_error() {
        warn!("{line}");
    } else {
        info!("{line}");
    }
}

async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let mut resp = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        resp.headers_mut().insert(X_REQUEST_ID, value);
    }

    // For the SSE stream the latency is time-to-first-byte only.
    let line = format!(
        "| {:>3} | {} | {:^7} | {:?} | {} | {}ms | {}",
        resp.status().as_u16(),
        request_id,
        method.as_str(),
        version,
        uri.path(),
        start.elapsed().as_millis(),
        user_agent
    );
    log_by_status(resp.status(), &line);

    resp
}

pub fn nexus_router(state: NexusState) -> Router {
    let display = Router::new()
        .route("/api/quote", get(random_quote))
        .route("/api/motivation", get(motivation))
        .route("/api/motivation/stream", get(motivation_stream));

    let session = Router::new()
        .route("/api/admin/login", post(admin_login))
        .route("/api/admin/logout", post(admin_logout));

    let admin = Router::new()
        .route("/api/admin/quotes", get(list_quotes).post(create_quote))
        .route("/api/admin/quotes/{id}", put(update_quote).delete(delete_quote))
        .route("/api/admin/stats", get(stats))
        .route("/api/admin/stats/increment", post(increment_stats))
        .route("/api/admin/stats/reset", post(reset_stats))
        .route("/api/admin/reload", post(reload_deck))
        .layer(middleware::from_extractor_with_state::<RequireAdmin, _>(
            state.clone(),
        ));

    Router::new()
        .merge(display)
        .merge(session)
        .merge(admin)
        .fallback(not_found_handler)
        .with_state(state)
        .layer(middleware::from_fn(access_log))
}
