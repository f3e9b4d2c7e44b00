use std::convert::Infallible;

use axum::extract::State;
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use axum::routing::get;
use axum::Router;
use growsync_api::models::EngineEvent;
use tokio::sync::broadcast::Sender;
use tokio_stream::StreamExt;
use tokio_stream::{Stream, wrappers};

#[derive(Clone)]
pub struct SSEState {
    pub sender: Sender<EngineEvent>,
}

pub fn sse_router(sse_state: SSEState) -> Router {
    Router::new()
        .route("/engine/events", get(sse_handler))
        .with_state(sse_state)
}

fn event_name(event: &EngineEvent) -> &'static str {
    match event {
        EngineEvent::Command(_) => "command",
        EngineEvent::Alert(_) => "alert",
        EngineEvent::SafetyTrip { .. } => "safety_trip",
        EngineEvent::RuleOutcome(_) => "rule_outcome",
    }
}

pub async fn sse_handler(
    State(state): State<SSEState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.sender.subscribe();

    let stream = wrappers::BroadcastStream::new(receiver).filter_map(|result| match result {
        Ok(event) => match Event::default().event(event_name(&event)).json_data(&event) {
            Ok(sse_event) => Some(Ok(sse_event)),
            Err(e) => {
                tracing::warn!("Failed to encode event: {}", e);
                None
            }
        },
        // lagging observers skip what they missed
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
