//! The per-connection reader/writer task split that backs `GET /ws/{u}`.
//!
//! A successful upgrade registers a session with the hub, then runs two
//! cooperating tasks: a reader pumping inbound frames to the hub, and a
//! writer pumping the session's outbound queue (plus periodic pings) to the
//! socket. Either task exiting tears down both and unregisters the session.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use relay_types::{Envelope, Username};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::http::dto::EnvelopeWire;
use crate::hub::{HubHandle, SESSION_OUTBOX_CAP};

/// Time allowed to write a single frame.
const WRITE_DEADLINE: Duration = Duration::from_secs(10);
/// Time allowed to wait for a pong before the reader gives up.
const PONG_WAIT: Duration = Duration::from_secs(60);
/// Ping cadence; 90% of `PONG_WAIT` to tolerate one lost ping.
const PING_PERIOD: Duration = Duration::from_secs(54);
/// Maximum frame size accepted from a peer.
const MAX_FRAME_SIZE: usize = 1 << 20;

/// Runs a session to completion. `username` is the already-authenticated
/// identity this socket is bound to (verified by the bearer-auth layer
/// before the upgrade was accepted).
pub async fn run_session(socket: WebSocket, username: Username, hub: HubHandle) {
    let session_id = Uuid::new_v4();
    let (outbox_tx, outbox_rx) = mpsc::channel::<Envelope>(SESSION_OUTBOX_CAP);
    hub.register(username.clone(), session_id, outbox_tx).await;

    let (sink, stream) = socket.split();

    let mut writer = tokio::spawn(write_pump(sink, outbox_rx));
    let mut reader = tokio::spawn(read_pump(stream, username.clone(), hub.clone()));

    // Either half finishing tears down the session; abort whichever one
    // didn't resolve so it doesn't linger until its own read/write deadline.
    tokio::select! {
        _ = &mut writer => { reader.abort(); },
        _ = &mut reader => { writer.abort(); },
    }

    hub.unregister(username, session_id).await;
}

async fn read_pump(
    mut stream: futures_util::stream::SplitStream<WebSocket>,
    username: Username,
    hub: HubHandle,
) {
    loop {
        let next = tokio::time::timeout(PONG_WAIT, stream.next()).await;
        let message = match next {
            Ok(Some(Ok(m))) => m,
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, %username, "websocket read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::info!(%username, "no activity within pong wait, closing session");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                if text.len() > MAX_FRAME_SIZE {
                    tracing::warn!(%username, size = text.len(), "frame exceeds max size, dropping");
                    continue;
                }
                match serde_json::from_str::<EnvelopeWire>(&text) {
                    Ok(wire) if wire.sender == username => {
                        hub.route(wire.into_envelope()).await;
                    }
                    Ok(wire) => {
                        tracing::warn!(
                            %username,
                            claimed_sender = %wire.sender,
                            "dropping frame with spoofed sender"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(%username, error = %e, "failed to decode inbound envelope");
                    }
                }
            }
            Message::Close(_) => break,
            // Pongs reset the read deadline implicitly via the timeout above;
            // pings are answered automatically by the underlying websocket crate.
            _ => {}
        }
    }
}

async fn write_pump(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut outbox: mpsc::Receiver<Envelope>,
) {
    let mut ping_ticker = tokio::time::interval(PING_PERIOD);
    ping_ticker.tick().await; // first tick fires immediately; consume it

    loop {
        tokio::select! {
            envelope = outbox.recv() => {
                match envelope {
                    Some(envelope) => {
                        let wire = EnvelopeWire::from(envelope);
                        let Ok(text) = serde_json::to_string(&wire) else {
                            tracing::error!("failed to encode outbound envelope");
                            continue;
                        };
                        if tokio::time::timeout(WRITE_DEADLINE, sink.send(Message::Text(text))).await.is_err() {
                            tracing::warn!("write deadline exceeded, closing session");
                            break;
                        }
                    }
                    None => {
                        let _ = tokio::time::timeout(WRITE_DEADLINE, sink.send(Message::Close(None))).await;
                        break;
                    }
                }
            }
            _ = ping_ticker.tick() => {
                if tokio::time::timeout(WRITE_DEADLINE, sink.send(Message::Ping(Vec::new()))).await.is_err() {
                    tracing::warn!("ping write deadline exceeded, closing session");
                    break;
                }
            }
        }
    }
}
