//! Client session registry: one entry per connection identity.
//!
//! The registry is the single place sessions are created, reused and removed:
//! - `resolve` is the only creation path; repeated calls for the same
//!   identity return the existing session
//! - removal happens on explicit disconnect or through the scheduler's
//!   idle-timeout sweep
//! - capacity is enforced by the ingress pipeline *before* `resolve` runs
//!
//! Duplicate detection is a linear scan over an insertion-ordered vector.
//! That is deliberate: the configured connection cap bounds the scan, and the
//! order doubles as arrival order for iteration.

use log::info;
use shared::Player;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;

/// Hook for the game layer to construct its own player representation.
pub type PlayerFactory = fn(u32, &str) -> Player;

fn default_player_factory(id: u32, identity: &str) -> Player {
    Player::new(id, identity)
}

/// Write side of one in-flight exchange.
///
/// Valid only for the duration of a single request/response exchange; a new
/// request against the same identity rebinds the session to a fresh handle.
#[derive(Debug)]
pub struct ResponseHandle {
    writer: OwnedWriteHalf,
    sent: Vec<u8>,
}

impl ResponseHandle {
    pub fn new(writer: OwnedWriteHalf) -> Self {
        Self {
            writer,
            sent: Vec::new(),
        }
    }

    pub async fn send(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.sent.extend_from_slice(bytes);
        self.writer.write_all(bytes).await
    }

    /// Everything written on this exchange so far, as recorded for the debug
    /// traffic dump.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Completes the exchange by half-closing the connection.
    pub async fn finish(&mut self) -> std::io::Result<()> {
        self.writer.shutdown().await
    }
}

/// Binds a connection identity to its player and the in-flight response.
#[derive(Debug)]
pub struct Session {
    pub identity: String,
    pub player: Player,
    pub responder: Option<ResponseHandle>,
    pub last_active: Instant,
}

impl Session {
    fn new(identity: String, player: Player) -> Self {
        Self {
            identity,
            player,
            responder: None,
            last_active: Instant::now(),
        }
    }

    /// Rebinds the session to a new exchange, dropping any stale handle left
    /// over from the previous one.
    pub fn bind_responder(&mut self, responder: ResponseHandle) {
        self.responder = Some(responder);
        self.last_active = Instant::now();
        self.player.touch();
    }

    pub fn is_idle(&self, max_idle: Duration) -> bool {
        self.last_active.elapsed() > max_idle
    }
}

/// Insertion-ordered session collection, capacity-bounded and de-duplicated
/// by identity.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
    max_connections: usize,
    next_player_id: u32,
    factory: PlayerFactory,
}

impl SessionRegistry {
    pub fn new(max_connections: usize) -> Self {
        Self::with_factory(max_connections, default_player_factory)
    }

    pub fn with_factory(max_connections: usize, factory: PlayerFactory) -> Self {
        Self {
            sessions: Vec::new(),
            max_connections,
            next_player_id: 1,
            factory,
        }
    }

    /// True iff a session with this identity exists. O(n) over the bounded
    /// connection cap.
    pub fn is_connected(&self, identity: &str) -> bool {
        self.sessions.iter().any(|s| s.identity == identity)
    }

    pub fn at_capacity(&self) -> bool {
        self.sessions.len() >= self.max_connections
    }

    /// Returns the session for `identity`, creating it (and its player) on
    /// first contact. The sole insertion path into the registry; callers
    /// must have passed the admission gate first.
    pub fn resolve(&mut self, identity: &str) -> &mut Session {
        if let Some(pos) = self.sessions.iter().position(|s| s.identity == identity) {
            &mut self.sessions[pos]
        } else {
            let id = self.next_player_id;
            self.next_player_id += 1;

            let player = (self.factory)(id, identity);
            info!("Session created for {} (player {})", identity, id);
            self.sessions.push(Session::new(identity.to_string(), player));

            let last = self.sessions.len() - 1;
            &mut self.sessions[last]
        }
    }

    /// Removes the entry. Player teardown is the caller's responsibility.
    pub fn remove(&mut self, identity: &str) -> bool {
        if let Some(pos) = self.sessions.iter().position(|s| s.identity == identity) {
            let session = self.sessions.remove(pos);
            info!("Session removed for {}", session.identity);
            true
        } else {
            false
        }
    }

    /// Evicts every session idle beyond `max_idle`, returning their
    /// identities for logging.
    pub fn sweep_idle(&mut self, max_idle: Duration) -> Vec<String> {
        let evicted: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.is_idle(max_idle))
            .map(|s| s.identity.clone())
            .collect();

        for identity in &evicted {
            self.remove(identity);
        }

        evicted
    }

    /// Players changed since the last flush.
    pub fn players_to_save(&self) -> Vec<Player> {
        self.sessions
            .iter()
            .filter(|s| s.player.dirty)
            .map(|s| s.player.clone())
            .collect()
    }

    pub fn mark_all_saved(&mut self) {
        for session in &mut self.sessions {
            session.player.mark_saved();
        }
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
