//! Rusty Permit - unified runtime permission engine for mobile hosts
//!
//! Android and iOS report runtime permissions very differently. Android
//! distinguishes soft from permanent denials through a "should show
//! rationale" flag and splits background location into a second prompt;
//! iOS makes the first denial final and never tells you why. This crate
//! folds both into one four-state [`PermissionStatus`](status::PermissionStatus)
//! and drives the rationale and settings dialogs around it.
//!
//! # Overview
//!
//! - A status resolver classifying raw native answers, backed by a durable
//!   request history and an in-memory negative-result cache
//! - A request coordinator that serializes native prompts, correlates their
//!   asynchronous answers and never hangs: timeouts resolve to `Denied`
//! - Single and group flow controllers implementing a rationale then
//!   settings-guide dialog policy, observable through `tokio::sync::watch`
//! - Dialog recovery across process death
//!
//! # Architecture
//!
//! - `identity`: Permission catalog and per-platform capability mapping
//! - `backend`: The [`PermissionBackend`](backend::PermissionBackend) trait a host implements
//! - `resolver`: Status resolution, with Android and iOS branches
//! - `coordinator`: Serialized native request orchestration
//! - `flow` / `group`: Dialog state machines
//! - `manager`: Facade tying it all together
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rusty_permit::prelude::*;
//!
//! # async fn example(backend: Arc<dyn PermissionBackend>) -> Result<(), PermitError> {
//! let options = PermitOptions::builder()
//!     .platform(Platform::ios("17.4")?)
//!     .build();
//! let manager = PermissionManager::new(backend, Arc::new(MemoryStore::new()), options);
//!
//! match manager.check_status(&Permission::Microphone).await {
//!     PermissionStatus::Granted => println!("recording"),
//!     PermissionStatus::NotDetermined => {
//!         let status = manager.request(&Permission::Microphone).await;
//!         println!("microphone: {}", status);
//!     }
//!     PermissionStatus::Denied | PermissionStatus::DeniedForever => manager.open_settings().await,
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Logging
//!
//! The crate logs through [`tracing`](https://docs.rs/tracing) and installs no
//! subscriber; hosts decide where the events go.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Error types
///
/// [`PermitError`](error::PermitError) never crosses the coordinator boundary:
/// every failure is mapped to a status before it reaches a caller.
pub mod error;

/// The four-state permission status
pub mod status;

/// Engine configuration and platform description
pub mod options;

/// Permission catalog and capability mapping
pub mod identity;

/// Native permission layer abstraction
///
/// Hosts implement `PermissionBackend` over the platform APIs and answer
/// prompts through the `NativeReply` handed to `request_native`.
pub mod backend;

/// Durable key-value stores for history and dialog recovery
pub mod store;

/// Request history ledger
pub mod history;

/// Status resolution
pub mod resolver;

/// Serialized native request orchestration
pub mod coordinator;

/// Dialog states and their UI projections
pub mod dialog;

/// Dialog recovery across process death
pub mod recovery;

/// Per-permission dialog flow
pub mod flow;

/// Ordered multi-permission dialog flow
pub mod group;

/// Engine facade
pub mod manager;

#[cfg(test)]
mod testing;

// Prelude module for common imports
pub mod prelude {
    //! Common imports for rusty_permit users
    //!
    //! Use `use rusty_permit::prelude::*;` to import commonly used types.

    pub use crate::backend::{NativeReply, NativeRequest, NativeSignal, PermissionBackend};
    pub use crate::dialog::{DialogState, DialogUiState, GroupUiState};
    pub use crate::error::PermitError;
    pub use crate::flow::PermissionFlowController;
    pub use crate::group::GroupFlowController;
    pub use crate::identity::{
        Capabilities, CapabilitySet, CustomPermission, Permission, RequestStage,
    };
    pub use crate::manager::PermissionManager;
    pub use crate::options::{PermitOptions, Platform, PlatformFamily};
    pub use crate::status::PermissionStatus;
    pub use crate::store::{JsonFileStore, KeyValueStore, MemoryStore, NoopStore};
}
