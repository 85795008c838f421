//! Integration tests for the server orchestrator
//!
//! These tests exercise the full stack over real TCP connections: admission
//! control, session reuse, request/response round trips and the two-phase
//! shutdown protocol.

use server::config::Config;
use server::error::ServerError;
use server::ingress::ServerEvent;
use server::lifecycle::GameServer;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};

fn test_config(max_connections: usize) -> Config {
    Config {
        port: 0,
        max_connections,
        connect_retry_limit: 1,
        connect_retry_delay_secs: 0,
        shutdown_drain_ms: 0,
        shutdown_grace_ms: 0,
        ..Config::default()
    }
}

/// Opens a connection whose source address is a specific loopback IP, so a
/// test can present distinct connection identities to the server.
async fn connect_from(source: &str, dest: SocketAddr) -> TcpStream {
    let socket = TcpSocket::new_v4().unwrap();
    socket
        .bind(format!("{}:0", source).parse().unwrap())
        .unwrap();
    socket.connect(dest).await.unwrap()
}

/// One complete request/response exchange: write, half-close, read to EOF.
async fn exchange_on(mut stream: TcpStream, payload: &[u8]) -> Vec<u8> {
    stream.write_all(payload).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}

/// STARTUP TESTS
mod startup_tests {
    use super::*;

    #[tokio::test]
    async fn unknown_backend_aborts_before_any_bind() {
        let config = Config {
            database_backend: "POSTGRES".to_string(),
            ..test_config(4)
        };

        match GameServer::new(config) {
            Err(ServerError::Config(msg)) => assert!(msg.contains("POSTGRES")),
            other => panic!("Expected configuration error, got {:?}", other.is_ok()),
        }
    }

    #[tokio::test]
    async fn backend_connects_before_listener_binds() {
        let mut server = GameServer::new(test_config(4)).unwrap();
        let addr = server.bind().await.unwrap();

        assert!(server.backend().is_connected());
        assert_ne!(addr.port(), 0);

        server.shutdown().await;
    }
}

/// REQUEST/RESPONSE TESTS
mod exchange_tests {
    use super::*;

    #[tokio::test]
    async fn echo_round_trip() {
        let mut server = GameServer::new(test_config(4)).unwrap();
        let control = server.handle();
        let addr = server.bind().await.unwrap();
        let task = tokio::spawn(async move {
            server.run().await.unwrap();
            server
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let response = exchange_on(stream, b"ping").await;
        assert_eq!(response, b"ping");

        control.send(ServerEvent::Shutdown).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn repeated_requests_reuse_the_session() {
        let mut server = GameServer::new(test_config(4)).unwrap();
        let control = server.handle();
        let registry = server.registry();
        let addr = server.bind().await.unwrap();
        let task = tokio::spawn(async move {
            server.run().await.unwrap();
            server
        });

        for n in 0..3u8 {
            let payload = vec![b'a' + n; 4];
            let stream = TcpStream::connect(addr).await.unwrap();
            let response = exchange_on(stream, &payload).await;
            assert_eq!(response, payload);
        }

        // Three exchanges from one identity leave exactly one session behind
        assert_eq!(registry.read().await.len(), 1);
        assert!(registry.read().await.is_connected("127.0.0.1"));

        control.send(ServerEvent::Shutdown).unwrap();
        task.await.unwrap();
    }
}

/// ADMISSION CONTROL TESTS
mod admission_tests {
    use super::*;

    #[tokio::test]
    async fn second_identity_refused_at_cap_of_one() {
        let mut server = GameServer::new(test_config(1)).unwrap();
        let control = server.handle();
        let registry = server.registry();
        let addr = server.bind().await.unwrap();
        let task = tokio::spawn(async move {
            server.run().await.unwrap();
            server
        });

        // Client A completes an exchange and occupies the single slot
        let a = connect_from("127.0.0.2", addr).await;
        let response = exchange_on(a, b"hello from A").await;
        assert_eq!(response, b"hello from A");
        assert_eq!(registry.read().await.len(), 1);

        // Client B arrives before A disconnects: refused, no body read,
        // registry size unchanged
        let mut b = connect_from("127.0.0.3", addr).await;
        let mut refused = Vec::new();
        b.read_to_end(&mut refused).await.unwrap();
        assert!(refused.is_empty());
        assert_eq!(registry.read().await.len(), 1);

        // A's identity is still welcome at capacity
        let a_again = connect_from("127.0.0.2", addr).await;
        let response = exchange_on(a_again, b"back again").await;
        assert_eq!(response, b"back again");
        assert_eq!(registry.read().await.len(), 1);

        control.send(ServerEvent::Shutdown).unwrap();
        task.await.unwrap();
    }
}

/// SHUTDOWN PROTOCOL TESTS
mod shutdown_tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_closes_listener_and_backend() {
        let mut server = GameServer::new(test_config(4)).unwrap();
        let control = server.handle();
        let addr = server.bind().await.unwrap();
        let task = tokio::spawn(async move {
            server.run().await.unwrap();
            server
        });

        // Server is live before the shutdown request
        let stream = TcpStream::connect(addr).await.unwrap();
        assert_eq!(exchange_on(stream, b"pre-shutdown").await, b"pre-shutdown");

        control.send(ServerEvent::Shutdown).unwrap();
        let server = task.await.unwrap();

        // Phase two completed: the backend handle is closed
        assert!(!server.backend().is_connected());
        // Phase one completed: nothing listens on the old address anymore
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn admitted_buffering_exchange_drains_after_listener_close() {
        let config = Config {
            shutdown_drain_ms: 2000,
            ..test_config(4)
        };
        let mut server = GameServer::new(config).unwrap();
        let control = server.handle();
        let registry = server.registry();
        let addr = server.bind().await.unwrap();
        let task = tokio::spawn(async move {
            server.run().await.unwrap();
            server
        });

        // Start an exchange but keep the payload incomplete
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"first half ").await.unwrap();

        // Wait until the connection has passed the admission gate
        for _ in 0..100 {
            if registry.read().await.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.read().await.len(), 1);

        control.send(ServerEvent::Shutdown).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The payload completes inside the drain window and is still answered
        stream.write_all(b"second half").await.unwrap();
        stream.shutdown().await.unwrap();

        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"first half second half");

        let server = task.await.unwrap();
        assert!(!server.backend().is_connected());
    }

    #[tokio::test]
    async fn shutdown_is_clean_with_no_traffic() {
        let mut server = GameServer::new(test_config(4)).unwrap();
        let control = server.handle();
        server.bind().await.unwrap();
        let task = tokio::spawn(async move {
            server.run().await.unwrap();
            server
        });

        control.send(ServerEvent::Shutdown).unwrap();
        let server = task.await.unwrap();

        assert!(!server.backend().is_connected());
        assert!(!server.flags().crashed);
    }
}
