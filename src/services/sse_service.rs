use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    dto::sse::ServerEvent,
    services::broadcast::{EVENT_RACE_DATA, build_snapshot},
    state::SharedState,
};

/// Subscribe to the shared event stream.
pub fn subscribe(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.events().subscribe()
}

/// Current snapshot wrapped as a `race_data` event.
pub async fn snapshot_event(state: &SharedState) -> Option<ServerEvent> {
    let snapshot = match build_snapshot(state).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            warn!(error = %err, "failed to build race snapshot for subscriber");
            return None;
        }
    };
    match ServerEvent::json(EVENT_RACE_DATA, &snapshot) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "failed to encode race snapshot");
            None
        }
    }
}

/// Convert a broadcast receiver into an SSE response. The client first gets a
/// full snapshot, then every event; a lagging client is resynchronised with a
/// fresh snapshot instead of the events it missed.
pub fn to_sse_stream(
    state: SharedState,
    mut receiver: broadcast::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(initial) = snapshot_event(&state).await {
            if tx.send(Ok(to_event(&initial))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    let payload = match recv_result {
                        Ok(payload) => payload,
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "SSE subscriber lagged; resending snapshot");
                            match snapshot_event(&state).await {
                                Some(snapshot) => snapshot,
                                None => continue,
                            }
                        }
                    };
                    if tx.send(Ok(to_event(&payload))).await.is_err() {
                        break;
                    }
                }
            }
        }

        info!("SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: &ServerEvent) -> Event {
    Event::default().event(&payload.event).data(payload.data())
}
