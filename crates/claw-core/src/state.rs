//! Shared application state for the CLI and tests.

use std::sync::Arc;

use crate::agent_cli::{AgentCli, CliRunner};
use crate::config::ClawConfig;
use crate::db::Database;
use crate::error::ClawError;
use crate::resource_lock::PathLocks;
use crate::store::{FolderStore, ProviderStore, RunStore, SettingsStore, WorkflowStore};
use crate::vault::Vault;
use crate::workflow::WorkflowExecutor;

/// Stores, vault and agent adapter shared by every operation.
pub struct AppStateInner {
    pub db: Database,
    pub settings_store: SettingsStore,
    pub folder_store: FolderStore,
    pub provider_store: ProviderStore,
    pub workflow_store: WorkflowStore,
    pub run_store: RunStore,
    pub vault: Arc<Vault>,
    pub locks: PathLocks,
    pub cli: Arc<dyn AgentCli>,
    /// Canned CLI and skill results instead of spawned processes.
    pub fake_cli: bool,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// State over `db` using the PTY-backed agent runner.
    pub fn new(db: Database, fake_cli: bool) -> Self {
        Self::with_cli(db, Arc::new(CliRunner::new(fake_cli)), fake_cli)
    }

    /// State over `db` with a custom agent adapter.
    pub fn with_cli(db: Database, cli: Arc<dyn AgentCli>, fake_cli: bool) -> Self {
        let settings_store = SettingsStore::new(db.clone());
        Self {
            vault: Arc::new(Vault::new(settings_store.clone())),
            settings_store,
            folder_store: FolderStore::new(db.clone()),
            provider_store: ProviderStore::new(db.clone()),
            workflow_store: WorkflowStore::new(db.clone()),
            run_store: RunStore::new(db.clone()),
            locks: PathLocks::new(),
            cli,
            fake_cli,
            db,
        }
    }

    /// Open the database named by `config` and build the state over it.
    pub fn open(config: &ClawConfig) -> Result<Self, ClawError> {
        let db = Database::open(&config.db_path)?;
        Ok(Self::new(db, config.fake_cli))
    }

    pub fn executor(&self) -> WorkflowExecutor {
        WorkflowExecutor::new(
            self.workflow_store.clone(),
            self.folder_store.clone(),
            self.provider_store.clone(),
            self.run_store.clone(),
            self.vault.clone(),
            self.locks.clone(),
            self.cli.clone(),
            self.fake_cli,
        )
    }
}
