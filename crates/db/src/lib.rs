pub mod backend;
pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;

pub use backend::{LocalProcurementBackend, DEFAULT_HISTORY_WINDOW};
pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use fixtures::{DemoDataset, SeedResult, VerificationResult};
