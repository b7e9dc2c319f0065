//! Server-Sent Events for fire image and vision job progress
//!
//! GET /api/vision-events streams vision job lifecycle events only.
//! GET /api/events streams everything on the bus, fire image events included.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use oracle_common::events::OracleEvent;

use crate::AppState;

/// GET /api/vision-events
pub async fn vision_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_bus.subscribe();
    info!(
        subscribers = state.event_bus.subscriber_count(),
        "New SSE client connected to vision events"
    );
    event_stream(rx, OracleEvent::is_vision_event)
}

/// GET /api/events
pub async fn all_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_bus.subscribe();
    info!(
        subscribers = state.event_bus.subscriber_count(),
        "New SSE client connected to all events"
    );
    event_stream(rx, |_| true)
}

fn event_stream(
    mut rx: broadcast::Receiver<OracleEvent>,
    wanted: fn(&OracleEvent) -> bool,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(15)) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => {
                    match received {
                        Ok(event) if !wanted(&event) => {}
                        Ok(event) => {
                            let event_type = event.event_type().to_string();
                            match serde_json::to_string(&event) {
                                Ok(event_json) => {
                                    debug!("SSE: Broadcasting event: {}", event_type);
                                    yield Ok(Event::default().event(event_type).data(event_json));
                                }
                                Err(e) => {
                                    warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                                }
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "SSE: Client lagged, events dropped");
                        }
                        Err(RecvError::Closed) => {
                            info!("SSE: Event bus closed, ending stream");
                            break;
                        }
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
