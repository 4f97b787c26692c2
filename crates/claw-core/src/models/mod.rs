pub mod folder;
pub mod provider;
pub mod run;
pub mod workflow;

pub use folder::*;
pub use provider::*;
pub use run::*;
pub use workflow::*;

/// Current time as an RFC 3339 timestamp, the format every table stores.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
