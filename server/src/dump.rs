//! Debug traffic dumps.
//!
//! When debug mode is on, each exchange can be decoded into a structured JSON
//! artifact, one file per dump, named by millisecond timestamp. The decoder
//! itself is an external collaborator; the hex-summary decoder here is the
//! built-in fallback. Dump failures are logged and swallowed — debug tooling
//! must never destabilize the server.

use log::warn;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ServerError;

pub trait TrafficDecoder: Send + Sync {
    fn decode(&self, request: &[u8], response: &[u8]) -> Result<Value, ServerError>;
}

/// Fallback decoder: lengths plus a bounded hex preview of each direction.
pub struct HexSummaryDecoder {
    pub preview_bytes: usize,
}

impl Default for HexSummaryDecoder {
    fn default() -> Self {
        Self { preview_bytes: 64 }
    }
}

fn hex_preview(bytes: &[u8], limit: usize) -> String {
    bytes
        .iter()
        .take(limit)
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

impl TrafficDecoder for HexSummaryDecoder {
    fn decode(&self, request: &[u8], response: &[u8]) -> Result<Value, ServerError> {
        Ok(json!({
            "request": {
                "length": request.len(),
                "preview": hex_preview(request, self.preview_bytes),
            },
            "response": {
                "length": response.len(),
                "preview": hex_preview(response, self.preview_bytes),
            },
        }))
    }
}

pub struct TrafficDump {
    dir: PathBuf,
    decoder: Box<dyn TrafficDecoder>,
}

impl TrafficDump {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_decoder(dir, Box::new(HexSummaryDecoder::default()))
    }

    pub fn with_decoder(dir: impl Into<PathBuf>, decoder: Box<dyn TrafficDecoder>) -> Self {
        Self {
            dir: dir.into(),
            decoder,
        }
    }

    /// Writes one dump artifact. Never propagates failure.
    pub fn dump(&self, request: &[u8], response: &[u8]) {
        if let Err(e) = self.try_dump(request, response) {
            warn!("Dump traffic: {}", e);
        }
    }

    fn try_dump(&self, request: &[u8], response: &[u8]) -> Result<PathBuf, ServerError> {
        let decoded = self.decoder.decode(request, response)?;
        let body = serde_json::to_string_pretty(&decoded)
            .map_err(|e| ServerError::Diagnostic(e.to_string()))?;

        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.json", shared::timestamp_ms()));
        fs::write(&path, body)?;
        Ok(path)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
