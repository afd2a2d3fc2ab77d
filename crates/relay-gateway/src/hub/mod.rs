//! The single-writer WebSocket fan-out hub.
//!
//! One task owns the routing table (`Username -> live sessions`); it is
//! mutated only by messages sent over `events`, never by a shared
//! `Mutex`/`DashMap`. Per-connection reader/writer tasks in
//! [`crate::ws`] talk to the hub exclusively through a [`HubHandle`].
//!
//! Routing: an inbound envelope destined for a recipient with zero live
//! sessions is dropped by the hub (durability is the sender's
//! responsibility via `POST /messages/{u}`); a recipient with N live
//! sessions receives it on every session (multi-device fan-out).

use std::collections::HashMap;

use relay_types::{Envelope, Username};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Bound on a session's outbound queue. A session that can't keep up is
/// unregistered rather than allowed to back-pressure the hub.
const SESSION_OUTBOX_CAPACITY: usize = 256;

#[derive(Debug)]
pub enum HubEvent {
    Register {
        username: Username,
        session_id: Uuid,
        outbox: mpsc::Sender<Envelope>,
    },
    Unregister {
        username: Username,
        session_id: Uuid,
    },
    Inbound {
        envelope: Envelope,
    },
    Shutdown,
}

struct Session {
    id: Uuid,
    outbox: mpsc::Sender<Envelope>,
}

/// Handle for talking to a running [`Hub`]. Cheap to clone; every session
/// task and the HTTP façade hold one.
#[derive(Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    pub async fn register(&self, username: Username, session_id: Uuid, outbox: mpsc::Sender<Envelope>) {
        let _ = self
            .events
            .send(HubEvent::Register {
                username,
                session_id,
                outbox,
            })
            .await;
    }

    pub async fn unregister(&self, username: Username, session_id: Uuid) {
        let _ = self.events.send(HubEvent::Unregister { username, session_id }).await;
    }

    pub async fn route(&self, envelope: Envelope) {
        let _ = self.events.send(HubEvent::Inbound { envelope }).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.events.send(HubEvent::Shutdown).await;
    }
}

/// The hub actor. Call [`Hub::spawn`] to start it; interact with it only
/// through the returned [`HubHandle`].
pub struct Hub {
    registry: HashMap<Username, Vec<Session>>,
    events: mpsc::Receiver<HubEvent>,
}

impl Hub {
    /// Spawns the hub's run loop on the current tokio runtime and returns a
    /// handle to it.
    pub fn spawn() -> HubHandle {
        let (tx, rx) = mpsc::channel(1024);
        let hub = Hub {
            registry: HashMap::new(),
            events: rx,
        };
        tokio::spawn(hub.run());
        HubHandle { events: tx }
    }

    async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            match event {
                HubEvent::Register {
                    username,
                    session_id,
                    outbox,
                } => {
                    self.registry.entry(username).or_default().push(Session {
                        id: session_id,
                        outbox,
                    });
                }
                HubEvent::Unregister { username, session_id } => {
                    self.remove_session(&username, session_id);
                }
                HubEvent::Inbound { envelope } => {
                    self.dispatch(envelope).await;
                }
                HubEvent::Shutdown => {
                    tracing::info!("hub received shutdown event");
                    break;
                }
            }
        }
    }

    fn remove_session(&mut self, username: &Username, session_id: Uuid) {
        if let Some(sessions) = self.registry.get_mut(username) {
            sessions.retain(|s| s.id != session_id);
            if sessions.is_empty() {
                self.registry.remove(username);
            }
        }
    }

    async fn dispatch(&mut self, envelope: Envelope) {
        let Some(sessions) = self.registry.get_mut(&envelope.recipient) else {
            return;
        };

        let mut dead = Vec::new();
        for session in sessions.iter() {
            match session.outbox.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(recipient = %envelope.recipient, session = %session.id, "outbox full, dropping session");
                    dead.push(session.id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(session.id);
                }
            }
        }
        sessions.retain(|s| !dead.contains(&s.id));
        if sessions.is_empty() {
            self.registry.remove(&envelope.recipient);
        }
    }
}

pub const SESSION_OUTBOX_CAP: usize = SESSION_OUTBOX_CAPACITY;
