//! Cumulus State Management
//!
//! Persists the resources a provider manages between invocations, with
//! locking so two runs never write the same state at once.
//!
//! # Overview
//!
//! - **StateFile**: every managed resource with its id and last read attributes
//! - **StateBackend**: a trait for state storage backends
//! - **LockInfo**: who holds the state lock and until when
//!
//! # Example
//!
//! ```ignore
//! use cumulus_state::{create_backend, BackendConfig};
//!
//! let backend = create_backend(&BackendConfig::local("cumulus.state.json")).await?;
//!
//! let lock = backend.acquire_lock("apply").await?;
//! let mut state = backend.read_state().await?.unwrap_or_default();
//!
//! // ... create, read, update or delete resources ...
//!
//! state.increment_serial();
//! backend.write_state(&state).await?;
//! backend.release_lock(&lock).await?;
//! ```

pub mod backend;
pub mod backends;
pub mod lock;
pub mod state;

pub use backend::{BackendConfig, BackendError, BackendResult, StateBackend};
pub use backends::{LocalBackend, create_backend};
pub use lock::LockInfo;
pub use state::{ResourceState, StateFile};
