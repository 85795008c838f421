//! Asset-download provider wrapper.
//!
//! The provider client itself is an external collaborator; the orchestrator
//! only guarantees single-flight login semantics (at most one login session
//! in flight at a time) and that an empty digest surfaces as a logged failure
//! rather than a value or a crash.

use shared::{Asset, DownloadUrls};
use tokio::sync::Mutex;

use crate::console::{Console, Severity};
use crate::error::ServerError;

/// Seam for the external asset-download client.
#[allow(async_fn_in_trait)]
pub trait AssetProvider {
    async fn login(
        &self,
        provider: &str,
        username: &str,
        password: &str,
    ) -> Result<Option<Asset>, ServerError>;

    async fn get_asset_by_asset_id(&self, ids: &[String]) -> Result<DownloadUrls, ServerError>;
}

pub struct AssetDownloader<P> {
    provider: P,
    console: Console,
    provider_name: String,
    username: String,
    password: String,
    // Single pending-operation slot: holding this across the login call is
    // what enforces single-flight.
    login_gate: Mutex<()>,
}

impl<P: AssetProvider> AssetDownloader<P> {
    pub fn new(
        provider: P,
        console: Console,
        provider_name: &str,
        username: &str,
        password: &str,
    ) -> Self {
        Self {
            provider,
            console,
            provider_name: provider_name.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            login_gate: Mutex::new(()),
        }
    }

    /// Logs into the download provider and returns the asset digest, or
    /// `None` when the provider answered without a usable digest.
    pub async fn create_session(&self) -> Result<Option<Asset>, ServerError> {
        let _inflight = self.login_gate.lock().await;

        let asset = self
            .provider
            .login(
                &self.provider_name.to_lowercase(),
                &self.username,
                &self.password,
            )
            .await?;

        match asset {
            Some(asset) if asset.is_valid() => {
                self.console
                    .print("Created asset download session", Severity::Info);
                Ok(Some(asset))
            }
            _ => {
                self.console
                    .print("Failed to download asset digest!", Severity::Error);
                Ok(None)
            }
        }
    }

    pub async fn generate_download_urls(&self, ids: &[String]) -> Result<DownloadUrls, ServerError> {
        self.provider.get_asset_by_asset_id(ids).await
    }
}
