pub mod artifacts;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod logging;
pub mod remote;

pub use config::MigrateConfig;
pub use core::{MigrateReport, Migrator};
pub use db::{Node, NodeStore};
pub use error::MigrateError;
pub use remote::{create_remote, LocalRemote, RemoteConfig, RemoteKind, RemoteTree, WebDavRemote};
