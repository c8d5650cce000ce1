//! `WebSocket` bridge onto the active thread count stream.
//!
//! Clients connect to `GET /ws/active-thread-count`. Each socket gets its
//! own [`LocalStreamChannel`] backed by a bounded queue:
//!
//! ```text
//! upgrade ─► attach_stream ─► change_state(Connected)
//!                                   │
//!          broadcast tick ─► channel.send ─► queue ─► text frame
//!                                   │
//! client close / gone ─► Closed     │     socket error ─► IllegalState
//! ```
//!
//! A client that reads too slowly fills its queue; further payloads for it
//! are dropped by the broadcast (and logged there) until it catches up.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use threadpulse_core::{LocalStreamChannel, ObserverChannel, StreamChannelContext};
use threadpulse_types::{ActiveThreadCountRequest, ChannelState};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` and attach it to the stream.
///
/// # Route
///
/// `GET /ws/active-thread-count`
pub async fn ws_active_thread_count(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    let (channel, mut payloads) = LocalStreamChannel::with_queue(state.channel_buffer);
    let context = StreamChannelContext::new(channel.clone());

    let code = state.service.attach_stream(&ActiveThreadCountRequest, &context);
    if !code.is_ok() {
        warn!(channel = %channel.id(), ?code, "stream attach refused; closing socket");
        if let Err(e) = socket.send(Message::Close(None)).await {
            debug!("WebSocket close frame not sent: {e}");
        }
        return;
    }

    channel.change_state(ChannelState::Connected);
    debug!(channel = %channel.id(), "WebSocket observer connected");

    let outcome = pump(&mut socket, &mut payloads).await;
    info!(channel = %channel.id(), state = %outcome, "WebSocket observer finished");
    channel.change_state(outcome);
}

/// Forward queued payloads to the socket until either side goes away.
/// Returns the terminal state the channel should move to.
async fn pump(socket: &mut WebSocket, payloads: &mut mpsc::Receiver<Vec<u8>>) -> ChannelState {
    loop {
        tokio::select! {
            payload = payloads.recv() => {
                let Some(payload) = payload else {
                    return ChannelState::Closed;
                };
                if let Err(e) = socket.send(frame(payload)).await {
                    debug!("WebSocket send failed: {e}");
                    return ChannelState::IllegalState;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => return ChannelState::Closed,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            return ChannelState::IllegalState;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return ChannelState::IllegalState;
                    }
                    Some(Ok(_)) => {
                        // Observers only listen; client text/binary is ignored.
                    }
                }
            }
        }
    }
}

fn frame(payload: Vec<u8>) -> Message {
    match String::from_utf8(payload) {
        Ok(text) => Message::Text(text.into()),
        Err(e) => Message::Binary(e.into_bytes().into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_payloads_become_text_frames() {
        let msg = frame(br#"{"timeStamp":1}"#.to_vec());
        assert!(matches!(msg, Message::Text(ref t) if t.as_str() == r#"{"timeStamp":1}"#));
    }

    #[test]
    fn non_utf8_payloads_become_binary_frames() {
        let msg = frame(vec![0xff, 0xfe]);
        assert!(matches!(msg, Message::Binary(_)));
    }
}
