pub mod folder_store;
pub mod provider_store;
pub mod run_store;
pub mod settings_store;
pub mod workflow_store;

pub use folder_store::FolderStore;
pub use provider_store::ProviderStore;
pub use run_store::RunStore;
pub use settings_store::SettingsStore;
pub use workflow_store::WorkflowStore;
