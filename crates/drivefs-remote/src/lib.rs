pub mod auth;
pub mod client;
pub mod drive;
mod error;
pub mod memory;
pub mod sync;

pub use auth::{Credentials, TokenStore};
pub use client::{AccountInfo, ChangePage, ChangeRecord, FilePage, RemoteSyncClient};
pub use drive::DriveClient;
pub use error::SyncError;
pub use memory::MemoryRemote;
pub use sync::{compute_backoff, RefreshKind, SyncEngine, SyncSettings, SyncStats};
