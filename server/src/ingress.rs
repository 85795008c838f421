//! Ingress pipeline: accept, admit, resolve, buffer, dispatch.
//!
//! The acceptor task owns the listener. Each accepted connection goes through
//! a fixed per-exchange state machine:
//!
//! ```text
//! Accepted -> ResolvingSession -> Buffering -> Dispatched
//! ```
//!
//! Admission control is a hard gate, not a queue: when the registry is at
//! capacity a new identity is refused before a single payload byte is read
//! and no session is created. Buffering is complete-or-nothing — the router
//! only ever sees a fully assembled payload. Completed exchanges flow through
//! an unbounded channel into the lifecycle controller's run loop, whose
//! single-consumer FIFO preserves arrival order per identity.

use log::{debug, error, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::console::{Console, Severity};
use crate::registry::{ResponseHandle, Session, SessionRegistry};

/// Events sent from background tasks to the main server loop.
#[derive(Debug)]
pub enum ServerEvent {
    RequestReady {
        identity: String,
        payload: Vec<u8>,
        responder: ResponseHandle,
    },
    /// One line of operator input from stdin.
    Command(String),
    Shutdown,
}

/// Per-exchange state machine. `Dispatched` is terminal; a new exchange on
/// the same identity starts over at `Accepted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Accepted,
    ResolvingSession,
    Buffering,
    Dispatched,
}

impl ExchangeState {
    pub fn next(self) -> Option<ExchangeState> {
        match self {
            ExchangeState::Accepted => Some(ExchangeState::ResolvingSession),
            ExchangeState::ResolvingSession => Some(ExchangeState::Buffering),
            ExchangeState::Buffering => Some(ExchangeState::Dispatched),
            ExchangeState::Dispatched => None,
        }
    }
}

/// Request handling seam. The router receives the fully assembled payload
/// and the resolved session, and drives response emission itself.
#[allow(async_fn_in_trait)]
pub trait Router {
    async fn route(&self, payload: Vec<u8>, session: &mut Session);
}

/// Baseline router: writes the payload straight back and closes the exchange.
/// Stands in for the real request semantics, which live outside this crate.
pub struct EchoRouter;

impl Router for EchoRouter {
    async fn route(&self, payload: Vec<u8>, session: &mut Session) {
        let Some(responder) = session.responder.as_mut() else {
            warn!("No response handle bound for {}", session.identity);
            return;
        };
        if let Err(e) = responder.send(&payload).await {
            warn!("Failed to respond to {}: {}", session.identity, e);
            return;
        }
        if let Err(e) = responder.finish().await {
            debug!("Failed to close exchange for {}: {}", session.identity, e);
        }
    }
}

/// Spawns the task that accepts connections until the handle is aborted at
/// shutdown. Aborting this task is the listener-close cancellation point:
/// nothing new enters the pipeline, while exchanges already admitted keep
/// draining through the event channel.
pub fn spawn_acceptor(
    listener: TcpListener,
    registry: Arc<RwLock<SessionRegistry>>,
    events: mpsc::UnboundedSender<ServerEvent>,
    console: Console,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    // Session identity keys off the transport-level address
                    let identity = peer.ip().to_string();
                    let registry = Arc::clone(&registry);
                    let events = events.clone();
                    let console = console.clone();
                    tokio::spawn(async move {
                        handle_connection(stream, identity, registry, events, console).await;
                    });
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    })
}

/// Drives one exchange from `Accepted` to the `RequestReady` hand-off.
async fn handle_connection(
    stream: TcpStream,
    identity: String,
    registry: Arc<RwLock<SessionRegistry>>,
    events: mpsc::UnboundedSender<ServerEvent>,
    console: Console,
) {
    let mut state = ExchangeState::Accepted;
    debug!("{:?} connection from {}", state, identity);

    // Admission gate and session creation form one critical section, so the
    // registry can never be pushed past its cap by racing connections.
    {
        let mut registry = registry.write().await;
        if !registry.is_connected(&identity) && registry.at_capacity() {
            console.print(
                &format!("Server is full! Refused {}", identity),
                Severity::Error,
            );
            return;
        }
        state = ExchangeState::ResolvingSession;
        debug!("{:?} for {}", state, identity);
        registry.resolve(&identity);
    }

    state = ExchangeState::Buffering;
    debug!("{:?} request from {}", state, identity);

    let (mut reader, writer) = stream.into_split();
    let mut payload = Vec::new();
    if let Err(e) = reader.read_to_end(&mut payload).await {
        // Complete-or-nothing: a broken read never reaches the router
        warn!("Dropped partial request from {}: {}", identity, e);
        return;
    }

    let ready = ServerEvent::RequestReady {
        identity,
        payload,
        responder: ResponseHandle::new(writer),
    };
    if events.send(ready).is_err() {
        debug!("Server loop gone; dropping completed exchange");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_exchange_state_order() {
        let mut state = ExchangeState::Accepted;
        let mut visited = vec![state];
        while let Some(next) = state.next() {
            state = next;
            visited.push(state);
        }

        assert_eq!(
            visited,
            vec![
                ExchangeState::Accepted,
                ExchangeState::ResolvingSession,
                ExchangeState::Buffering,
                ExchangeState::Dispatched,
            ]
        );
    }

    #[test]
    fn test_dispatched_is_terminal() {
        assert_eq!(ExchangeState::Dispatched.next(), None);
    }

    async fn start_acceptor(
        max_connections: usize,
    ) -> (
        std::net::SocketAddr,
        Arc<RwLock<SessionRegistry>>,
        mpsc::UnboundedReceiver<ServerEvent>,
        JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Arc::new(RwLock::new(SessionRegistry::new(max_connections)));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_acceptor(listener, Arc::clone(&registry), tx, Console::new(37));
        (addr, registry, rx, handle)
    }

    #[tokio::test]
    async fn test_complete_payload_reaches_event_channel() {
        let (addr, registry, mut rx, acceptor) = start_acceptor(4).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"hello world").await.unwrap();
        client.shutdown().await.unwrap();

        match rx.recv().await.unwrap() {
            ServerEvent::RequestReady {
                identity, payload, ..
            } => {
                assert_eq!(identity, "127.0.0.1");
                assert_eq!(payload, b"hello world");
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        assert!(registry.read().await.is_connected("127.0.0.1"));
        acceptor.abort();
    }

    #[tokio::test]
    async fn test_full_registry_refuses_before_reading() {
        let (addr, registry, mut rx, acceptor) = start_acceptor(1).await;

        // Occupy the single slot with a different identity
        registry.write().await.resolve("10.9.9.9");

        let mut client = TcpStream::connect(addr).await.unwrap();
        let mut response = Vec::new();
        // The refused connection is dropped without reading or responding
        client.read_to_end(&mut response).await.unwrap();
        assert!(response.is_empty());

        assert_eq!(registry.read().await.len(), 1);
        assert!(rx.try_recv().is_err());
        acceptor.abort();
    }

    #[tokio::test]
    async fn test_known_identity_admitted_at_capacity() {
        let (addr, registry, mut rx, acceptor) = start_acceptor(1).await;

        // The only slot already belongs to this identity
        registry.write().await.resolve("127.0.0.1");

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"again").await.unwrap();
        client.shutdown().await.unwrap();

        match rx.recv().await.unwrap() {
            ServerEvent::RequestReady { identity, .. } => assert_eq!(identity, "127.0.0.1"),
            other => panic!("Unexpected event: {:?}", other),
        }
        assert_eq!(registry.read().await.len(), 1);
        acceptor.abort();
    }
}
