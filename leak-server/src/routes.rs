use std::fmt::Display;

use axum::Extension;
use axum::Json;
use axum::extract::State;
use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::response::Response;
use futures::Sink;
use futures::SinkExt;
use futures::Stream;
use futures::StreamExt;
use leak_limit::ChannelId;
use leak_limit::StatusFeed;
use leak_limit::Subscription;
use serde::Serialize;
use tower::BoxError;
use tower_leak::AdmissionError;
use tracing::debug;
use tracing::warn;

use crate::AppState;

/// Body returned for an admitted request.
#[derive(Debug, Serialize)]
pub struct Admitted {
    pub channel: ChannelId,
    pub status: &'static str,
}

pub async fn request(Extension(channel): Extension<ChannelId>) -> Json<Admitted> {
    Json(Admitted {
        channel,
        status: "Allowed",
    })
}

/// Turns middleware failures into responses.
pub async fn handle_admission_error(err: BoxError) -> Response {
    match err.downcast::<AdmissionError>() {
        Ok(err) => err.into_response(),
        Err(err) => AdmissionError::Inner(err.to_string()).into_response(),
    }
}

pub async fn status(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_status(socket, state.feed))
}

async fn stream_status(socket: WebSocket, feed: StatusFeed) {
    let subscription = feed.subscribe();
    debug!(subscribers = feed.subscriber_count(), "status subscriber connected");

    let (sink, incoming) = socket.split();
    let exit = pump(sink, incoming, subscription).await;
    debug!(?exit, "status subscriber finished");
}

/// Why a status pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The peer closed the socket or could no longer be written to.
    Disconnected,
    /// The service is shutting down.
    Shutdown,
}

/// Forward snapshots from `subscription` to `sink` until either side goes away.
///
/// Inbound frames are drained and ignored, except for close frames.
pub async fn pump<Si, St>(mut sink: Si, mut incoming: St, mut subscription: Subscription) -> PumpExit
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        tokio::select! {
            snapshot = subscription.next() => {
                let Some(snapshot) = snapshot else {
                    // Best effort, the peer may already be gone.
                    let _ = sink.send(Message::Close(None)).await;
                    return PumpExit::Shutdown;
                };
                let text = match serde_json::to_string(&snapshot) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(%err, "failed to encode status snapshot");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(text.into())).await {
                    debug!(%err, "status subscriber unreachable");
                    return PumpExit::Disconnected;
                }
            }
            frame = incoming.next() => match frame {
                None | Some(Ok(Message::Close(_))) => return PumpExit::Disconnected,
                Some(Err(err)) => {
                    debug!(%err, "status subscriber read failed");
                    return PumpExit::Disconnected;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}
