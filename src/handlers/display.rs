use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use serde::Serialize;
use tokio_stream::{StreamExt, wrappers::WatchStream};

use crate::types::{CounterSnapshot, Quote};
use crate::{NexusError, router::NexusState};

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub quote: Quote,
    pub motivation_count: u64,
}

/// GET /api/quote
///
/// Draws a random quote from the display list, then counts the request.
/// Nothing is counted when the list is empty.
pub async fn random_quote(
    State(state): State<NexusState>,
) -> Result<Json<QuoteResponse>, NexusError> {
    let quote = state.deck.pick()?;
    let motivation_count = state.counter.increment().await?;
    Ok(Json(QuoteResponse {
        quote,
        motivation_count,
    }))
}

/// GET /api/motivation
pub async fn motivation(
    State(state): State<NexusState>,
) -> Result<Json<CounterSnapshot>, NexusError> {
    Ok(Json(state.counter.snapshot().await?))
}

/// GET /api/motivation/stream
///
/// One `motivation` event per published snapshot, starting with the current one.
pub async fn motivation_stream(State(state): State<NexusState>) -> impl IntoResponse {
    let events = WatchStream::new(state.counter.subscribe())
        .map(|snapshot| Event::default().event("motivation").json_data(snapshot));
    Sse::new(events).keep_alive(KeepAlive::default())
}
