//! Common library for the Balanciago application
//!
//! This crate provides the pieces shared by the session and sheets services:
//! the error taxonomy, durable key-value persistence, storage keys, the clock,
//! the observable status board and application configuration.
//!
//! ```rust,no_run
//! use common::{AppConfig, KeyValueStore, StorageKeys, open_store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let store = open_store(&config).await?;
//!     let keys = StorageKeys::new(&config.app_name);
//!     println!("Saved config: {:?}", store.get(&keys.config).await?);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod keys;
pub mod status;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, StorageBackend};
pub use error::{AppError, IdentityError, StorageError, StorageResult};
pub use keys::StorageKeys;
pub use status::{LastError, LoadingGuard, Operation, Status, StatusBoard};
pub use storage::{FileStore, KeyValueStore, MemoryStore, open_store};
