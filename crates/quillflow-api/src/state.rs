//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! Services are generic over repository/notifier/policy traits, but AppState
//! pins them to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use quillflow_core::access::CapabilityPolicy;
use quillflow_core::event::EventBus;
use quillflow_core::service::envelope::EnvelopeService;
use quillflow_core::workflow::{EnvelopeLocks, WorkflowCoordinator};
use quillflow_infra::config::{load_global_config, resolve_data_dir};
use quillflow_infra::notify::ConfiguredNotifier;
use quillflow_infra::sqlite::api_key::SqliteApiKeyStore;
use quillflow_infra::sqlite::envelope::SqliteEnvelopeRepository;
use quillflow_infra::sqlite::pool::{DatabasePool, database_url};
use quillflow_types::config::GlobalConfig;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteEnvelopeService = EnvelopeService<SqliteEnvelopeRepository, CapabilityPolicy>;

pub type ConcreteCoordinator =
    WorkflowCoordinator<SqliteEnvelopeRepository, ConfiguredNotifier, CapabilityPolicy>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub envelope_service: Arc<ConcreteEnvelopeService>,
    pub coordinator: Arc<ConcreteCoordinator>,
    pub api_keys: Arc<SqliteApiKeyStore>,
    pub events: EventBus,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: load config, connect to DB, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_global_config(&data_dir).await;
        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;

        Self::from_parts(db_pool, config, data_dir)
    }

    /// Wire services over an already-open pool.
    pub fn from_parts(
        db_pool: DatabasePool,
        config: GlobalConfig,
        data_dir: PathBuf,
    ) -> anyhow::Result<Self> {
        let events = EventBus::default();
        let notifier = ConfiguredNotifier::from_settings(&config.notifier)?;
        // One table for draft edits and workflow transitions.
        let locks = Arc::new(EnvelopeLocks::new(Duration::from_millis(
            config.workflow.lock_timeout_ms,
        )));

        let envelope_service = EnvelopeService::new(
            SqliteEnvelopeRepository::new(db_pool.clone()),
            CapabilityPolicy,
            config.workflow.max_delay_days,
        )
        .with_locks(locks.clone());

        let coordinator = WorkflowCoordinator::new(
            SqliteEnvelopeRepository::new(db_pool.clone()),
            notifier,
            CapabilityPolicy,
            &config.workflow,
            events.clone(),
        )
        .with_locks(locks);

        Ok(Self {
            envelope_service: Arc::new(envelope_service),
            coordinator: Arc::new(coordinator),
            api_keys: Arc::new(SqliteApiKeyStore::new(db_pool)),
            events,
            config: Arc::new(config),
            data_dir,
        })
    }

    /// Log every committed workflow event until the bus closes.
    pub fn spawn_audit_logger(&self) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let payload = serde_json::to_string(&event).unwrap_or_default();
                        tracing::info!(
                            envelope_id = %event.envelope_id(),
                            event = %payload,
                            "Workflow event"
                        );
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Audit logger lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
