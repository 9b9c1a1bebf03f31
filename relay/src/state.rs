//! Shared relay state.
//!
//! DESIGN
//! ======
//! [`RelayState`] is injected into the Axum websocket handler via the
//! `State` extractor. It holds the live roster: participant ids, their
//! colors, and a per-connection outbound channel. The relay keeps no scene
//! state beyond what naming requires — clients reconcile everything else
//! from the frames themselves.

use std::collections::HashMap;
use std::sync::Arc;

use protocol::Rgb;
use rand::seq::SliceRandom;
use tokio::sync::{RwLock, mpsc};
use tracing::warn;

/// Distinct participant colors, assigned round-robin from a per-process
/// shuffle so concurrent sessions do not all start on the same hue.
const PALETTE: [Rgb; 8] = [
    Rgb([0.91, 0.30, 0.24]),
    Rgb([0.20, 0.60, 0.86]),
    Rgb([0.18, 0.80, 0.44]),
    Rgb([0.95, 0.77, 0.06]),
    Rgb([0.61, 0.35, 0.71]),
    Rgb([0.90, 0.49, 0.13]),
    Rgb([0.10, 0.74, 0.61]),
    Rgb([0.75, 0.22, 0.17]),
];

/// What a freshly joined connection needs to know.
pub struct Joined {
    pub user_id: u32,
    pub color: Rgb,
    /// Everyone already connected, for the roster replay.
    pub roster: Vec<(u32, Rgb)>,
}

struct Client {
    color: Rgb,
    tx: mpsc::Sender<String>,
}

struct Roster {
    next_user_id: u32,
    palette: Vec<Rgb>,
    clients: HashMap<u32, Client>,
    primitive_seq: HashMap<String, u32>,
}

/// Shared relay state. Clone is required by Axum; the inner roster is
/// Arc-wrapped.
#[derive(Clone)]
pub struct RelayState {
    inner: Arc<RwLock<Roster>>,
}

impl RelayState {
    #[must_use]
    pub fn new() -> Self {
        let mut palette = PALETTE.to_vec();
        palette.shuffle(&mut rand::rng());
        Self {
            inner: Arc::new(RwLock::new(Roster {
                next_user_id: 1,
                palette,
                clients: HashMap::new(),
                primitive_seq: HashMap::new(),
            })),
        }
    }

    /// Register a connection: assign the next participant id and a color,
    /// and snapshot the existing roster for replay.
    pub async fn join(&self, tx: mpsc::Sender<String>) -> Joined {
        let mut roster = self.inner.write().await;

        let user_id = roster.next_user_id;
        roster.next_user_id += 1;
        let color = roster.palette[(user_id as usize - 1) % roster.palette.len()];

        let existing = roster
            .clients
            .iter()
            .map(|(&id, client)| (id, client.color))
            .collect();
        roster.clients.insert(user_id, Client { color, tx });

        Joined {
            user_id,
            color,
            roster: existing,
        }
    }

    pub async fn leave(&self, user_id: u32) {
        self.inner.write().await.clients.remove(&user_id);
    }

    /// Assign a stable name for an unnamed primitive: `Kind.NNN`, counted
    /// per kind across the whole session.
    pub async fn assign_primitive_name(&self, kind: &str) -> String {
        let mut roster = self.inner.write().await;
        let seq = roster.primitive_seq.entry(kind.to_owned()).or_insert(0);
        *seq += 1;
        format!("{kind}.{seq:03}")
    }

    /// Queue a frame to every connected client, optionally skipping one.
    /// A client whose channel is full or closed is skipped; its own read
    /// loop is responsible for cleanup.
    pub async fn broadcast(&self, text: &str, except: Option<u32>) {
        let roster = self.inner.read().await;
        for (&id, client) in &roster.clients {
            if Some(id) == except {
                continue;
            }
            if let Err(e) = client.tx.try_send(text.to_owned()) {
                warn!(user_id = id, error = %e, "dropping frame for slow client");
            }
        }
    }

    pub async fn connected(&self) -> usize {
        self.inner.read().await.clients.len()
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
