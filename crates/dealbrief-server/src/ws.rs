use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::api::AppState;
use crate::hub::{HubMessage, CLOSE_UNKNOWN_SUBMISSION};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// `GET /ws/{submission_id}`: stream the submission's step history.
pub async fn ws_progress(
    ws: WebSocketUpgrade,
    Path(submission_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, submission_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, submission_id: String) {
    let (mut sender, receiver) = socket.split();

    let subscription = match state.hub.subscribe(&submission_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            tracing::warn!(submission_id = %submission_id, error = %e, "rejecting progress subscription");
            let frame = CloseFrame {
                code: CLOSE_UNKNOWN_SUBMISSION,
                reason: Utf8Bytes::from_static("No active execution found for this submission ID"),
            };
            let _ = sender.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    run_socket_loop(sender, receiver, subscription.receiver).await;
    state
        .hub
        .unsubscribe(&submission_id, subscription.subscriber_id)
        .await;
}

/// Forward hub messages to the socket until either side goes away.
///
/// Client text frames are ignored. If no Pong arrives within
/// [`PONG_TIMEOUT`] after a Ping, the connection is treated as dead.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut updates: mpsc::UnboundedReceiver<HubMessage>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::debug!("progress socket missed pong, closing");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            update = updates.recv() => {
                match update {
                    Some(HubMessage::Snapshot(json)) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Some(HubMessage::Close { code, reason }) => {
                        let frame = CloseFrame {
                            code,
                            reason: Utf8Bytes::from_static(reason),
                        };
                        let _ = sender.send(Message::Close(Some(frame))).await;
                        return;
                    }
                    None => break,
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(chars = text.len(), "ignoring client message on progress socket");
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}
