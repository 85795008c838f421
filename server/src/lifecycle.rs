//! Server lifecycle: startup sequencing, the main run loop, and the
//! two-phase shutdown.
//!
//! Startup order is strict: greeting, backend selection, backend connect
//! (bounded retry with a visible countdown), listener bind, then the tick
//! scheduler starts with the run loop. Shutdown is the mirror image and also
//! strict: close the listener first so nothing new is admitted, let admitted
//! exchanges drain, then disconnect the backend under a bounded timeout, wait
//! the grace period and return.
//!
//! All mutations of the registry, the counters and the backend handle happen
//! either inside the run loop or under the registry's write lock, which keeps
//! the single-writer discipline without any lock-free tricks.

use log::{debug, info, warn};
use shared::Player;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncBufReadExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::assets::{AssetDownloader, AssetProvider};
use crate::backend::Backend;
use crate::config::Config;
use crate::console::{self, Console, Severity, GREETING};
use crate::dump::TrafficDump;
use crate::error::ServerError;
use crate::ingress::{self, EchoRouter, Router, ServerEvent};
use crate::registry::{ResponseHandle, Session, SessionRegistry};
use crate::scheduler::{TickCounters, TickThresholds};
use crate::utils;

/// Per-session game rules, invoked on the full update pass. The real rules
/// live in the game layer; the orchestrator only guarantees that one
/// session's failure never reaches its siblings.
pub trait GameRules: Send + Sync {
    fn update_session(&self, session: &mut Session, tick: u64) -> Result<(), ServerError>;
}

/// Placeholder rules so the scheduler fans out against something.
pub struct IdleRules;

impl GameRules for IdleRules {
    fn update_session(&self, _session: &mut Session, _tick: u64) -> Result<(), ServerError> {
        Ok(())
    }
}

/// Global run-state flags.
#[derive(Debug, Default, Clone, Copy)]
pub struct ServerFlags {
    /// Ticks keep counting while paused, but no per-session work dispatches.
    pub paused: bool,
    /// Enables per-exchange traffic dumps.
    pub debug_mode: bool,
    /// Set when an unrecoverable process-wide fault stops the run loop.
    pub crashed: bool,
}

/// The server orchestrator: owns every other component's start and stop.
pub struct GameServer<R: Router> {
    config: Config,
    console: Console,
    flags: ServerFlags,
    backend: Backend,
    registry: Arc<RwLock<SessionRegistry>>,
    counters: TickCounters,
    thresholds: TickThresholds,
    router: R,
    rules: Box<dyn GameRules>,
    dump: TrafficDump,
    events_tx: mpsc::UnboundedSender<ServerEvent>,
    events_rx: mpsc::UnboundedReceiver<ServerEvent>,
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
    acceptor: Option<JoinHandle<()>>,
    stdin_task: Option<JoinHandle<()>>,
}

impl<R: Router> std::fmt::Debug for GameServer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameServer")
            .field("flags", &self.flags)
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}

impl GameServer<EchoRouter> {
    pub fn new(config: Config) -> Result<Self, ServerError> {
        Self::with_router(config, EchoRouter)
    }
}

impl<R: Router> GameServer<R> {
    /// Validates configuration, greets, and composes the server with its
    /// persistence backend. No I/O happens until [`bind`](Self::bind).
    pub fn with_router(config: Config, router: R) -> Result<Self, ServerError> {
        config.validate()?;

        let console = Console::new(config.default_console_color);
        console.print(GREETING, Severity::Info);

        let backend = Backend::select(&config)?;
        info!("Selected {:?} persistence backend", backend.kind());

        let registry = Arc::new(RwLock::new(SessionRegistry::new(config.max_connections)));
        let thresholds = TickThresholds::from_config(&config);
        let dump = TrafficDump::new(config.debug_dump_path.clone());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            console,
            flags: ServerFlags::default(),
            backend,
            registry,
            counters: TickCounters::new(),
            thresholds,
            router,
            rules: Box::new(IdleRules),
            dump,
            events_tx,
            events_rx,
            listener: None,
            local_addr: None,
            acceptor: None,
            stdin_task: None,
        })
    }

    pub fn with_rules(mut self, rules: Box<dyn GameRules>) -> Self {
        self.rules = rules;
        self
    }

    /// Sender for injecting events (operator commands, shutdown) from
    /// outside the run loop.
    pub fn handle(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.events_tx.clone()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn counters(&self) -> &TickCounters {
        &self.counters
    }

    pub fn flags(&self) -> ServerFlags {
        self.flags
    }

    pub fn registry(&self) -> Arc<RwLock<SessionRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Wraps an external asset-provider client with the configured provider
    /// name and credentials.
    pub fn asset_downloader<P: AssetProvider>(&self, provider: P) -> AssetDownloader<P> {
        AssetDownloader::new(
            provider,
            self.console.clone(),
            &self.config.download_provider,
            &self.config.download_username,
            &self.config.download_password,
        )
    }

    /// Connects the backend, retrying with a countdown up to the configured
    /// ceiling, then binds the listener. Returns the bound address.
    pub async fn bind(&mut self) -> Result<SocketAddr, ServerError> {
        self.connect_backend().await?;

        let listener = TcpListener::bind(self.config.addr()).await?;
        let addr = listener.local_addr()?;
        self.console
            .print(&format!("Listening on {}", addr), Severity::Info);
        if let Some(ip) = utils::local_ipv4() {
            info!("Local IPv4 address: {}", ip);
        }

        self.listener = Some(listener);
        self.local_addr = Some(addr);
        Ok(addr)
    }

    async fn connect_backend(&mut self) -> Result<(), ServerError> {
        let limit = self.config.connect_retry_limit.max(1);
        let mut attempt = 1;
        loop {
            match self.backend.connect().await {
                Ok(()) => {
                    self.console
                        .print("Database connection established", Severity::Info);
                    return Ok(());
                }
                Err(e) if attempt >= limit => {
                    self.console.print(
                        &format!("Could not connect to database: {}", e),
                        Severity::Error,
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "Database connection attempt {}/{} failed: {}",
                        attempt, limit, e
                    );
                    console::retry_with_countdown(
                        &self.console,
                        "Retrying database connection in ",
                        self.config.connect_retry_delay_secs,
                    )
                    .await;
                    attempt += 1;
                }
            }
        }
    }

    /// Runs the server until shutdown is requested or a fatal fault occurs.
    /// Always executes the two-phase shutdown before returning.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        let listener = self
            .listener
            .take()
            .ok_or_else(|| ServerError::Config("listener not bound".into()))?;

        self.acceptor = Some(ingress::spawn_acceptor(
            listener,
            Arc::clone(&self.registry),
            self.events_tx.clone(),
            self.console.clone(),
        ));
        self.stdin_task = Some(spawn_stdin_reader(self.events_tx.clone()));

        let mut tick_interval = interval(self.config.tick_duration());
        // A tick that runs long defers the next firing instead of dropping it
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first firing is immediate; skip it so dt stays honest
        tick_interval.tick().await;
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        let result = loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(ServerEvent::RequestReady { identity, payload, responder }) => {
                            self.dispatch_request(identity, payload, responder).await;
                        }
                        Some(ServerEvent::Command(line)) => {
                            if self.handle_command(line.trim()).await {
                                break Ok(());
                            }
                        }
                        Some(ServerEvent::Shutdown) | None => {
                            break Ok(());
                        }
                    }
                }
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f64();
                    last_tick = now;

                    if let Err(e) = self.on_tick(dt).await {
                        self.flags.crashed = true;
                        self.console.print(
                            &format!("Fatal scheduler error: {}", e),
                            Severity::Error,
                        );
                        break Err(e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    self.console.print("Received shutdown signal", Severity::Notice);
                    break Ok(());
                }
            }
        };

        self.shutdown().await;
        result
    }

    /// One exchange reaching the single mutation point: admission is
    /// re-checked, the session resolved, the fresh responder bound, and the
    /// payload handed to the router.
    async fn dispatch_request(
        &mut self,
        identity: String,
        payload: Vec<u8>,
        responder: ResponseHandle,
    ) {
        let mut registry = self.registry.write().await;
        if !registry.is_connected(&identity) && registry.at_capacity() {
            self.console.print(
                &format!("Server is full! Refused {}", identity),
                Severity::Error,
            );
            return;
        }

        let session = registry.resolve(&identity);
        session.bind_responder(responder);

        // Dumping happens after routing so the artifact carries both
        // directions of the exchange
        let request = self.flags.debug_mode.then(|| payload.clone());
        self.router.route(payload, session).await;
        if let Some(request) = request {
            let response = session.responder.as_ref().map_or(&[][..], |r| r.sent());
            self.dump.dump(&request, response);
        }
        debug!("Dispatched request for {}", identity);
    }

    async fn on_tick(&mut self, dt: f64) -> Result<(), ServerError> {
        let jobs = self.counters.advance(dt, &self.thresholds)?;

        if self.flags.paused {
            debug!("Tick {} (paused)", self.counters.tick);
            return Ok(());
        }

        if jobs.full_update {
            self.full_update_pass().await;
        }
        if jobs.flush {
            self.flush_sessions().await;
        }
        if jobs.sweep {
            self.sweep_idle_sessions().await;
        }
        Ok(())
    }

    async fn full_update_pass(&mut self) {
        let tick = self.counters.tick;
        let mut registry = self.registry.write().await;
        for session in registry.iter_mut() {
            if let Err(e) = self.rules.update_session(session, tick) {
                // Isolated: one session's failure never aborts the pass
                warn!("Session update failed for {}: {}", session.identity, e);
            }
        }
    }

    async fn flush_sessions(&mut self) {
        let players: Vec<Player> = self.registry.read().await.players_to_save();
        if players.is_empty() {
            return;
        }

        match self.backend.save_players(&players).await {
            Ok(count) => {
                debug!("Persisted {} players", count);
                self.registry.write().await.mark_all_saved();
            }
            Err(e) => warn!("Persistence flush failed: {}", e),
        }
    }

    async fn sweep_idle_sessions(&mut self) {
        let evicted = self
            .registry
            .write()
            .await
            .sweep_idle(self.config.idle_timeout());
        for identity in evicted {
            info!("Evicted idle session {}", identity);
        }
    }

    /// Returns true when the command requests shutdown.
    async fn handle_command(&mut self, line: &str) -> bool {
        match line {
            "shutdown" | "exit" => return true,
            "pause" => {
                self.flags.paused = !self.flags.paused;
                let msg = if self.flags.paused {
                    "Paused per-session updates"
                } else {
                    "Resumed per-session updates"
                };
                self.console.print(msg, Severity::Notice);
            }
            "debug" => {
                self.flags.debug_mode = !self.flags.debug_mode;
                let msg = if self.flags.debug_mode {
                    "Debug dumps enabled"
                } else {
                    "Debug dumps disabled"
                };
                self.console.print(msg, Severity::Notice);
            }
            "status" => {
                let sessions = self.registry.read().await.len();
                self.console.print(
                    &format!(
                        "tick={} passed={} sessions={} paused={}",
                        self.counters.tick, self.counters.passed_ticks, sessions, self.flags.paused
                    ),
                    Severity::Info,
                );
            }
            "" => {}
            other => {
                self.console
                    .print(&format!("Unknown command: {}", other), Severity::Notice);
            }
        }
        false
    }

    /// Two-phase shutdown: listener close always precedes backend
    /// disconnect, and neither phase is allowed to hang the process.
    pub async fn shutdown(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
        if let Some(stdin_task) = self.stdin_task.take() {
            stdin_task.abort();
        }
        self.listener = None;
        self.console.print("Closed listener!", Severity::Notice);

        // Exchanges admitted before the listener closed still drain. An
        // admitted connection may still be buffering its payload, so the
        // drain waits out the full window for late arrivals instead of only
        // popping what is already queued.
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.shutdown_drain_ms);
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, self.events_rx.recv()).await {
                Ok(Some(ServerEvent::RequestReady {
                    identity,
                    payload,
                    responder,
                })) => {
                    self.dispatch_request(identity, payload, responder).await;
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }

        match tokio::time::timeout(Duration::from_secs(5), self.backend.disconnect()).await {
            Ok(Ok(())) => self
                .console
                .print("Closed database connection!", Severity::Notice),
            Ok(Err(e)) => warn!("Backend disconnect failed: {}", e),
            Err(_) => warn!("Backend disconnect timed out"),
        }

        self.console.print("Server shutdown!", Severity::Error);
        tokio::time::sleep(Duration::from_millis(self.config.shutdown_grace_ms)).await;
    }
}

fn spawn_stdin_reader(events: mpsc::UnboundedSender<ServerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if events.send(ServerEvent::Command(line)).is_err() {
                break;
            }
        }
    })
}
