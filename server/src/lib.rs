//! # Game Backend Server Library
//!
//! This library provides the orchestration core of a persistent game-backend
//! server: it maps inbound connections to logical player sessions, drives all
//! of them through a periodic tick loop, and coordinates lifecycle events
//! from the greeting banner to the final shutdown grace period.
//!
//! ## Core Responsibilities
//!
//! ### Session Registry
//! Every physical connection resolves to exactly one logical session, keyed
//! by connection identity. Sessions are created on first contact, reused for
//! every later exchange from the same identity, and removed on disconnect or
//! by the idle sweep.
//!
//! ### Ingress Pipeline
//! Connections pass a hard admission gate before anything else happens: once
//! the configured connection cap is reached, new identities are refused
//! without reading a single payload byte. Admitted exchanges are buffered to
//! completion and handed — payload plus resolved session — to the router.
//!
//! ### Tick Scheduler
//! A fixed-interval tick advances the server's logical clock and fans out
//! periodic work: full per-session update passes, persistence flushes and
//! idle-session eviction, each on its own tick threshold. Ticks are strictly
//! sequential; a tick that runs long defers the next one, never overlaps it.
//!
//! ### Lifecycle Control
//! Startup is strictly ordered (greet, select backend, connect with bounded
//! retry, bind, tick), and shutdown is a two-phase protocol: the listener
//! closes before the backend disconnects, with every phase bounded so the
//! process can never hang on its way out.
//!
//! ## Architecture Design
//!
//! The server uses the single-writer discipline throughout: background tasks
//! (acceptor, per-connection buffering, stdin reader) feed an unbounded
//! channel consumed by one run loop, which also owns the tick interval. All
//! mutations of the registry, the tick counters and the backend handle happen
//! in that loop or under the registry's write lock. There is no lock-free or
//! optimistic concurrent mutation anywhere.
//!
//! The persistence backend is composed in exactly once at startup from a
//! closed set (MongoDB, MySQL) and held as an immutable field; an unknown
//! backend name is a fatal configuration error raised before the listener
//! ever binds.
//!
//! ## Module Organization
//!
//! - [`config`] — read-only startup configuration and validation
//! - [`console`] — severity-colored console output and the retry countdown
//! - [`error`] — the error taxonomy and its propagation policy
//! - [`registry`] — sessions, response handles and the client registry
//! - [`backend`] — persistence backend selection and lifecycle
//! - [`ingress`] — acceptor, admission control, payload buffering, routing seam
//! - [`scheduler`] — tick counters and periodic-job bookkeeping
//! - [`lifecycle`] — the server orchestrator itself
//! - [`assets`] — single-flight wrapper around the asset-download provider
//! - [`dump`] — debug traffic dumps
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::Config;
//! use server::lifecycle::GameServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let mut server = GameServer::new(config)?;
//!
//!     // Connect the backend, bind the listener, then run the tick loop
//!     // until a shutdown signal or operator command arrives.
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod assets;
pub mod backend;
pub mod config;
pub mod console;
pub mod dump;
pub mod error;
pub mod ingress;
pub mod lifecycle;
pub mod registry;
pub mod scheduler;
pub mod utils;
