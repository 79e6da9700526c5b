pub mod engine;
pub mod indexer;
pub mod path_map;
pub mod reconcile;
pub mod transfer;

pub use engine::{MigrateReport, Migrator};
pub use indexer::{IndexOutcome, Indexer};
pub use path_map::{map_relative_path, normalize_prefix};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use transfer::{TransferDriver, TransferOutcome};
