pub mod client;
pub mod engine;
pub mod error;
pub mod exclusions;
pub mod fingerprint;
pub mod runner;
pub mod schema;
pub mod store;
pub mod vectors;
pub mod watcher;

pub use client::{IndexClient, LocalIndexClient, Metadata};
pub use engine::{ScanReport, SyncEngine, SyncOutcome};
pub use error::{IndexError, SyncError};
pub use exclusions::Exclusions;
pub use fingerprint::{Fingerprint, hash_file};
pub use runner::{RunStats, SyncRunner};
pub use schema::{ChangeRecord, DocumentRecord, SearchHit};
pub use store::RecordStore;
pub use vectors::VectorIndex;
pub use watcher::{FileWatcher, RawEvent};
