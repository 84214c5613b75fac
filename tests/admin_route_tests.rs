use axum::{
    Router,
    body::{Body, to_bytes},
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
};
use futures::StreamExt;
use quote_nexus::api::{MemoryStore, Remote};
use quote_nexus::db::LocalStorage;
use quote_nexus::router::{NexusState, nexus_router};
use quote_nexus::service::{CounterHandle, CounterOps, QuoteDeck, QuoteService, counter_actor};
use quote_nexus::types::Quote;
use serde_json::Value;
use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tower::ServiceExt;

const ADMIN_KEY: &str = "pwd";

async fn build_app(
    store: Arc<MemoryStore>,
    login_per_minute: u32,
) -> (Router, CounterHandle) {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX_EPOCH")
        .as_nanos();

    let mut temp_path = std::env::temp_dir();
    temp_path.push(format!(
        "quote-nexus-routes-{}-{}.sqlite",
        std::process::id(),
        nanos
    ));
    let local = LocalStorage::connect(&format!("sqlite:{}", temp_path.display()))
        .await
        .expect("failed to open temp sqlite");

    let remote = Remote::in_memory(store);
    let quotes = QuoteService::new(Some(remote.store.clone()));
    let deck = QuoteDeck::default();
    deck.reload(&quotes).await;

    let counter = counter_actor::spawn(CounterOps::new(local, Some(remote)))
        .await
        .expect("spawn counter");
    let state = NexusState::new(
        counter.clone(),
        quotes,
        deck,
        Arc::from(ADMIN_KEY),
        true,
        login_per_minute,
    );
    (nexus_router(state), counter)
}

fn seeded_store() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::default()
            .with_counter(0)
            .with_quotes(vec![Quote {
                id: Some(1),
                text: "Keep going".to_string(),
                author: "Ada".to_string(),
            }]),
    )
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("failed to build request")
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    serde_json::from_slice(&bytes).expect("body is not json")
}

fn authed(method: &str, uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .expect("failed to build request")
}

fn login_from(client: [u8; 4], password: &str) -> Request<Body> {
    let mut req = json_request(
        "POST",
        "/api/admin/login",
        &format!(r#"{{"password":"{password}"}}"#),
    );
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((client, 40000))));
    req
}

async fn login_cookie(app: &Router) -> String {
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/admin/login",
            r#"{"password":"pwd"}"#,
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let set_cookie = resp
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("missing set-cookie");
    assert!(set_cookie.starts_with("adminLoggedIn="));
    assert!(set_cookie.contains("HttpOnly"));
    set_cookie
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string()
}

#[tokio::test]
async fn admin_routes_require_session_or_bearer_key() {
    let (app, counter) = build_app(seeded_store(), 10).await;

    // 1) no credentials -> 401
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/quotes")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await["error"]["code"], "UNAUTHORIZED");

    // 2) wrong password -> 401, no cookie
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/admin/login",
            r#"{"password":"nope"}"#,
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().get(header::SET_COOKIE).is_none());

    // 3) session cookie -> 200
    let cookie = login_cookie(&app).await;
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/quotes")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let list = body_json(resp).await;
    assert_eq!(list[0]["quote"], "Keep going");

    // 4) bearer admin key -> 200
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/stats")
                .header(header::AUTHORIZATION, format!("Bearer {ADMIN_KEY}"))
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let stats = body_json(resp).await;
    assert_eq!(stats["quote_count"], 1);
    assert_eq!(stats["motivation_count"], 0);

    // 5) forged cookie -> 401
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/admin/quotes")
                .header(header::COOKIE, "adminLoggedIn=true")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    counter.stop();
}

#[tokio::test]
async fn admin_quote_mutations_validate_and_map_errors() {
    let store = seeded_store();
    let (app, counter) = build_app(store.clone(), 10).await;
    let cookie = login_cookie(&app).await;
    let calls_before = store.calls();

    let mut req = json_request(
        "POST",
        "/api/admin/quotes",
        r#"{"quote":"   ","author":"Ada"}"#,
    );
    req.headers_mut()
        .insert(header::COOKIE, cookie.parse().expect("cookie header"));
    let resp = app.clone().oneshot(req).await.expect("request failed");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"]["code"], "VALIDATION");
    assert_eq!(store.calls(), calls_before);

    let mut req = json_request(
        "POST",
        "/api/admin/quotes",
        r#"{"quote":"Stay strong","author":"Ada"}"#,
    );
    req.headers_mut()
        .insert(header::COOKIE, cookie.parse().expect("cookie header"));
    let resp = app.clone().oneshot(req).await.expect("request failed");
    assert_eq!(resp.status(), StatusCode::CREATED);
    let list = body_json(resp).await;
    assert_eq!(list.as_array().map(Vec::len), Some(2));

    let mut req = json_request(
        "PUT",
        "/api/admin/quotes/99",
        r#"{"quote":"x","author":"y"}"#,
    );
    req.headers_mut()
        .insert(header::COOKIE, cookie.parse().expect("cookie header"));
    let resp = app.clone().oneshot(req).await.expect("request failed");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"]["message"], "Quote 99 not found.");

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/api/admin/quotes/1")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let list = body_json(resp).await;
    assert_eq!(list[0]["quote"], "Stay strong");

    counter.stop();
}

#[tokio::test]
async fn login_attempts_are_rate_limited() {
    let (app, counter) = build_app(seeded_store(), 1).await;

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/admin/login",
            r#"{"password":"nope"}"#,
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/admin/login",
            r#"{"password":"pwd"}"#,
        ))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(resp).await["error"]["code"], "RATE_LIMIT");

    counter.stop();
}

#[tokio::test]
async fn display_routes_count_every_request() {
    let (app, counter) = build_app(seeded_store(), 10).await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/quote")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
    let body = body_json(resp).await;
    assert_eq!(body["quote"]["author"], "Ada");
    assert_eq!(body["motivation_count"], 1);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/motivation")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["count"], 1);

    counter.stop();
}

#[tokio::test]
async fn empty_deck_is_unavailable_and_not_counted() {
    let store = Arc::new(MemoryStore::default().with_counter(7));
    let (app, counter) = build_app(store, 10).await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/quote")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["error"]["code"], "NO_QUOTES");
    assert_eq!(counter.snapshot().await.unwrap().count, 7);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/nope")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    counter.stop();
}

#[tokio::test]
async fn login_limit_is_per_client() {
    let (app, counter) = build_app(seeded_store(), 1).await;

    let resp = app
        .clone()
        .oneshot(login_from([10, 0, 0, 1], "nope"))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = app
        .clone()
        .oneshot(login_from([10, 0, 0, 1], "pwd"))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);

    // A flood from one address does not lock out another.
    let resp = app
        .clone()
        .oneshot(login_from([10, 0, 0, 2], "pwd"))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);

    counter.stop();
}

#[tokio::test]
async fn logout_revokes_issued_cookies() {
    let (app, counter) = build_app(seeded_store(), 10).await;
    let cookie = login_cookie(&app).await;

    let resp = app
        .clone()
        .oneshot(authed("POST", "/api/admin/logout", &cookie))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let cleared = resp
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .expect("missing set-cookie")
        .to_string();
    assert!(cleared.starts_with("adminLoggedIn="));
    assert!(cleared.contains("Max-Age=0"));
    assert_eq!(body_json(resp).await["logged_in"], false);

    // A copy of the old cookie is no longer accepted.
    let resp = app
        .clone()
        .oneshot(authed("GET", "/api/admin/quotes", &cookie))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let fresh = login_cookie(&app).await;
    let resp = app
        .clone()
        .oneshot(authed("GET", "/api/admin/quotes", &fresh))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);

    counter.stop();
}

#[tokio::test]
async fn reload_and_reset_report_new_values() {
    let (app, counter) = build_app(seeded_store(), 10).await;
    let cookie = login_cookie(&app).await;

    // A created quote joins the display list on the next reload.
    let mut req = json_request(
        "POST",
        "/api/admin/quotes",
        r#"{"quote":"Start small","author":"Lin"}"#,
    );
    req.headers_mut()
        .insert(header::COOKIE, cookie.parse().expect("cookie header"));
    let resp = app.clone().oneshot(req).await.expect("request failed");
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = app
        .clone()
        .oneshot(authed("POST", "/api/admin/reload", &cookie))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["quote_count"], 2);

    let resp = app
        .clone()
        .oneshot(authed("POST", "/api/admin/stats/increment", &cookie))
        .await
        .expect("request failed");
    assert_eq!(body_json(resp).await["motivation_count"], 1);

    let resp = app
        .clone()
        .oneshot(authed("POST", "/api/admin/stats/reset", &cookie))
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["motivation_count"], 0);
    assert_eq!(counter.snapshot().await.unwrap().count, 0);

    counter.stop();
}

#[tokio::test]
async fn motivation_stream_opens_with_current_count() {
    let (app, counter) = build_app(seeded_store(), 10).await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/motivation/stream")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let mut body = resp.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(5), body.next())
        .await
        .expect("no event within timeout")
        .expect("stream ended")
        .expect("body error");
    let text = String::from_utf8_lossy(&first);
    assert!(text.contains("event: motivation"));
    assert!(text.contains(r#""count":0"#));

    counter.stop();
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let (app, counter) = build_app(seeded_store(), 10).await;

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/motivation")
                .header("x-request-id", "abc-123")
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.headers()["x-request-id"], "abc-123");

    // Oversized ids are replaced; 404s still get one.
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/nope")
                .header("x-request-id", "x".repeat(200))
                .body(Body::empty())
                .expect("failed to build request"),
        )
        .await
        .expect("request failed");
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let generated = resp.headers()["x-request-id"]
        .to_str()
        .expect("ascii id")
        .to_string();
    assert_eq!(generated.len(), 16);

    counter.stop();
}
