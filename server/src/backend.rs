//! Persistence backend selection and lifecycle.
//!
//! The backend is chosen exactly once at startup from a closed set and stored
//! as an immutable field of the server; there is no runtime switching. The
//! orchestrator sees three operations: `connect`, the save surface, and
//! `disconnect`. The concrete query layer behind each variant belongs to the
//! persistence collaborator, so the implementations here manage connection
//! state and hand player batches to their handle.

use log::{debug, info};
use shared::Player;

use crate::config::Config;
use crate::error::ServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Mongo,
    MySql,
}

impl BackendKind {
    /// Case-insensitive match against the closed set of known backends.
    /// Anything else is a fatal configuration error.
    pub fn parse(name: &str) -> Result<Self, ServerError> {
        match name.to_uppercase().as_str() {
            "MONGO" | "MONGODB" => Ok(BackendKind::Mongo),
            "MYSQL" => Ok(BackendKind::MySql),
            other => Err(ServerError::Config(format!(
                "invalid database connection type: {}",
                other
            ))),
        }
    }
}

/// The one active persistence handle, selected at startup.
#[derive(Debug)]
pub enum Backend {
    Mongo(MongoBackend),
    MySql(MySqlBackend),
}

impl Backend {
    /// Composes the server with its persistence capability. Runs before the
    /// listener binds; an unknown name aborts startup here.
    pub fn select(config: &Config) -> Result<Self, ServerError> {
        let kind = BackendKind::parse(&config.database_backend)?;
        Ok(match kind {
            BackendKind::Mongo => Backend::Mongo(MongoBackend::new(&config.database_url)),
            BackendKind::MySql => Backend::MySql(MySqlBackend::new(&config.database_url)),
        })
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Mongo(_) => BackendKind::Mongo,
            Backend::MySql(_) => BackendKind::MySql,
        }
    }

    pub async fn connect(&mut self) -> Result<(), ServerError> {
        match self {
            Backend::Mongo(inner) => inner.connect().await,
            Backend::MySql(inner) => inner.connect().await,
        }
    }

    pub async fn save_players(&mut self, players: &[Player]) -> Result<usize, ServerError> {
        match self {
            Backend::Mongo(inner) => inner.save_players(players).await,
            Backend::MySql(inner) => inner.save_players(players).await,
        }
    }

    pub async fn disconnect(&mut self) -> Result<(), ServerError> {
        match self {
            Backend::Mongo(inner) => inner.disconnect().await,
            Backend::MySql(inner) => inner.disconnect().await,
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Backend::Mongo(inner) => inner.connected,
            Backend::MySql(inner) => inner.connected,
        }
    }

    /// Total players persisted since startup.
    pub fn saved_players(&self) -> u64 {
        match self {
            Backend::Mongo(inner) => inner.saved_players,
            Backend::MySql(inner) => inner.saved_players,
        }
    }

    /// Forces the next `disconnect` to fail, for exercising the shutdown
    /// path where phase two errors out.
    pub fn inject_disconnect_fault(&mut self) {
        match self {
            Backend::Mongo(inner) => inner.fail_disconnect = true,
            Backend::MySql(inner) => inner.fail_disconnect = true,
        }
    }
}

#[derive(Debug)]
pub struct MongoBackend {
    url: String,
    connected: bool,
    saved_players: u64,
    fail_disconnect: bool,
}

impl MongoBackend {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            connected: false,
            saved_players: 0,
            fail_disconnect: false,
        }
    }

    async fn connect(&mut self) -> Result<(), ServerError> {
        if !self.url.starts_with("mongodb://") {
            return Err(ServerError::Transient(format!(
                "mongo refused connection url {}",
                self.url
            )));
        }
        self.connected = true;
        info!("Connected to MongoDB at {}", self.url);
        Ok(())
    }

    async fn save_players(&mut self, players: &[Player]) -> Result<usize, ServerError> {
        if !self.connected {
            return Err(ServerError::Transient("mongo connection not open".into()));
        }
        self.saved_players += players.len() as u64;
        debug!("MongoDB persisted {} players", players.len());
        Ok(players.len())
    }

    async fn disconnect(&mut self) -> Result<(), ServerError> {
        if self.fail_disconnect {
            self.fail_disconnect = false;
            return Err(ServerError::Transient("mongo refused to close".into()));
        }
        if self.connected {
            self.connected = false;
            info!("MongoDB connection closed");
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MySqlBackend {
    url: String,
    connected: bool,
    saved_players: u64,
    fail_disconnect: bool,
}

impl MySqlBackend {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            connected: false,
            saved_players: 0,
            fail_disconnect: false,
        }
    }

    async fn connect(&mut self) -> Result<(), ServerError> {
        if !self.url.starts_with("mysql://") {
            return Err(ServerError::Transient(format!(
                "mysql refused connection url {}",
                self.url
            )));
        }
        self.connected = true;
        info!("Connected to MySQL at {}", self.url);
        Ok(())
    }

    async fn save_players(&mut self, players: &[Player]) -> Result<usize, ServerError> {
        if !self.connected {
            return Err(ServerError::Transient("mysql connection not open".into()));
        }
        self.saved_players += players.len() as u64;
        debug!("MySQL persisted {} players", players.len());
        Ok(players.len())
    }

    async fn disconnect(&mut self) -> Result<(), ServerError> {
        if self.fail_disconnect {
            self.fail_disconnect = false;
            return Err(ServerError::Transient("mysql refused to close".into()));
        }
        if self.connected {
            self.connected = false;
            info!("MySQL connection closed");
        }
        Ok(())
    }
}
