//! Application state.

use std::sync::Arc;

use lclip_bus::ProgressBus;
use lclip_ml_client::GeminiClient;
use lclip_storage::BlobStore;
use lclip_store::{ArtifactStore, RedisArtifactStore};
use lclip_worker::{
    CredentialVault, JobController, JobScheduler, LogNotifier, Notifier, WorkerConfig,
};

use crate::auth::AuthVerifier;
use crate::config::ApiConfig;
use crate::quota::QuotaGate;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub controller: JobController,
    pub scheduler: JobScheduler,
    pub ml: Arc<GeminiClient>,
    pub bus: Arc<ProgressBus>,
    pub auth: Arc<AuthVerifier>,
    pub quota: Arc<QuotaGate>,
}

impl AppState {
    /// Wire up the full service from environment configuration.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store: Arc<dyn ArtifactStore> = Arc::new(RedisArtifactStore::from_env()?);
        let blobs = Arc::new(BlobStore::from_env()?);
        let ml = Arc::new(GeminiClient::new());
        let bus = Arc::new(ProgressBus::new());
        let worker_config = Arc::new(WorkerConfig::from_env());
        let vault = CredentialVault::from_env(Arc::clone(&store))?;
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

        let scheduler = JobScheduler::new(
            Arc::clone(&store),
            Arc::clone(&blobs),
            Arc::clone(&ml),
            Arc::clone(&bus),
            Arc::clone(&worker_config),
            Arc::clone(&notifier),
        );

        let controller = JobController::new(
            store,
            blobs,
            Arc::clone(&bus),
            vault,
            scheduler.clone(),
            worker_config,
            notifier,
        );

        let auth = Arc::new(AuthVerifier::from_env()?);
        let quota = Arc::new(QuotaGate::new(&config));

        Ok(Self {
            config,
            controller,
            scheduler,
            ml,
            bus,
            auth,
            quota,
        })
    }
}
