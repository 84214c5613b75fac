use super::{ChangeFeed, Subscription};
use crate::error::NexusError;
use crate::types::{ChangeEvent, ChangeFilter, ChangeKind};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 64;

/// Realtime change feed over the hosted store's Phoenix websocket
/// (`{base}/realtime/v1/websocket`).
pub struct RealtimeFeed {
    ws_url: Url,
    api_key: String,
}

impl RealtimeFeed {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, NexusError> {
        let base = format!("{}/", base_url.trim_end_matches('/'));
        let mut ws_url = Url::parse(&base)?.join("realtime/v1/websocket")?;
        let scheme = if ws_url.scheme() == "http" { "ws" } else { "wss" };
        // http(s) -> ws(s) is a permitted special-scheme swap.
        let _ = ws_url.set_scheme(scheme);
        ws_url
            .query_pairs_mut()
            .append_pair("apikey", api_key)
            .append_pair("vsn", "1.0.0");
        Ok(Self {
            ws_url,
            api_key: api_key.to_string(),
        })
    }
}

impl ChangeFeed for RealtimeFeed {
    fn subscribe(&self, filter: ChangeFilter) -> Subscription {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let ws_url = self.ws_url.clone();
        let api_key = self.api_key.clone();
        let task = tokio::spawn(async move {
            let table = filter.table.clone();
            match run_channel(ws_url, api_key, filter, tx).await {
                Ok(()) => info!(table = %table, "realtime channel closed"),
                Err(e) => warn!(table = %table, error = %e, "realtime channel failed"),
            }
        });
        Subscription::new(rx, task)
    }
}

/// One connection, one joined topic. Returns when the socket or the subscriber goes away.
async fn run_channel(
    ws_url: Url,
    api_key: String,
    filter: ChangeFilter,
    tx: mpsc::Sender<ChangeEvent>,
) -> Result<(), NexusError> {
    let (ws, _resp) = connect_async(ws_url.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    let topic = format!("realtime:{}-changes", filter.table);
    let mut msg_ref: u64 = 1;
    sink.send(Message::Text(
        join_message(&topic, &filter, &api_key, msg_ref)
            .to_string()
            .into(),
    ))
    .await?;
    info!(topic = %topic, event = ?filter.event, "realtime channel joining");

    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                msg_ref += 1;
                sink.send(Message::Text(heartbeat_message(msg_ref).to_string().into()))
                    .await?;
            }
            frame = stream.next() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                match frame? {
                    Message::Text(text) => {
                        let Some(event) = parse_frame(text.as_str(), &filter) else {
                            continue;
                        };
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    Message::Close(_) => return Ok(()),
                    _ => {}
                }
            }
        }
    }
}

fn join_message(topic: &str, filter: &ChangeFilter, api_key: &str, msg_ref: u64) -> Value {
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": {
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [filter],
                "private": false
            },
            "access_token": api_key
        },
        "ref": msg_ref.to_string()
    })
}

fn heartbeat_message(msg_ref: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": msg_ref.to_string()
    })
}

#[derive(Debug, Deserialize)]
struct PhoenixFrame {
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct PostgresChange {
    table: String,
    #[serde(rename = "type")]
    kind: ChangeKind,
    #[serde(default)]
    record: Value,
    #[serde(default)]
    old_record: Value,
}

/// Decode a `postgres_changes` frame that matches `filter`; everything else is skipped.
fn parse_frame(text: &str, filter: &ChangeFilter) -> Option<ChangeEvent> {
    let frame: PhoenixFrame = serde_json::from_str(text).ok()?;
    match frame.event.as_str() {
        "postgres_changes" => {}
        "phx_reply" => {
            if frame.payload.get("status").and_then(Value::as_str) == Some("error") {
                warn!(payload = %frame.payload, "realtime join rejected");
            }
            return None;
        }
        "system" | "phx_error" | "phx_close" => {
            debug!(event = %frame.event, payload = %frame.payload, "realtime control frame");
            return None;
        }
        _ => return None,
    }
    let data = frame.payload.get("data")?.clone();
    let change: PostgresChange = serde_json::from_value(data).ok()?;
    let event = ChangeEvent {
        table: change.table,
        kind: change.kind,
        record: change.record,
        old_record: change.old_record,
    };
    filter.matches(&event).then_some(event)
}
