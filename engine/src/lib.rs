//! # Ferry Engine
//!
//! An offline-first sync engine: records can be created, edited and removed
//! while disconnected, and every change is reconciled against a remote
//! service and a live channel once connectivity allows.
//!
//! ## Design Principles
//!
//! - **Queue per record**: every mutation becomes an operation on its
//!   record's queue; at most one runs at a time per record
//! - **Pluggable IO**: the remote service, local store and live channel are
//!   injected traits returning futures
//! - **Single threaded**: operations interleave at await points, no locks
//! - **Nothing stuck**: every remote outcome maps to a new record state and
//!   a set of follow-ups, never to a stalled queue
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] keeps its working fields plus shadow copies: the last
//! confirmed save, the snapshot currently being saved, and the data waiting
//! for a live broadcast. Its [`Status`] is one of `Synced`, `SavePending`,
//! `RemovePending` or `Deleted`.
//!
//! ### Operations
//!
//! Saving runs `SaveLocal` then `SaveRemote`; removing runs `RemoveLocal`
//! then `RemoveRemote`. Each carries a [`Cascade`] naming the collaborators
//! it may touch. Remote outcomes (success, conflict, not found, offline,
//! other) are classified by [`RemoteStatus`] and reported through
//! [`Notification`]s.
//!
//! ### Network
//!
//! The [`NetworkMonitor`] holds the online flag. Saves that hit an offline
//! network wait and replay once on reconnect.
//!
//! ## Quick Start
//!
//! ```rust
//! use ferry_engine::mock::{MemoryStore, MockRemote, RecordingLive};
//! use ferry_engine::{Collaborators, Engine, ModelSchema, Status, SyncConfig};
//! use serde_json::json;
//! use std::rc::Rc;
//!
//! // 1. Wire up collaborators
//! let remote = MockRemote::new();
//! let collaborators = Collaborators::new(Rc::new(remote.clone()))
//!     .with_local(Rc::new(MemoryStore::new()))
//!     .with_live(Rc::new(RecordingLive::new()));
//!
//! // 2. Create an engine and a store
//! let engine = Engine::default();
//! let users = engine
//!     .store(ModelSchema::new("users"), SyncConfig::default(), collaborators)
//!     .unwrap();
//!
//! // 3. Create a record and let the engine sync it
//! remote.push_ok(json!({"id": 1, "name": "Alice", "rev": 1}));
//! let alice = users.create(json!({"id": 1, "name": "Alice"})).unwrap();
//! futures::executor::block_on(engine.run_until_idle());
//!
//! assert_eq!(alice.status(), Status::Synced);
//! assert_eq!(alice.get("rev"), Some(json!(1)));
//! ```

pub mod cascade;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod mock;
pub mod model;
pub mod network;
pub mod notification;
pub mod operation;
pub mod queue;
mod reconcile;
pub mod record;
pub mod schema;
pub mod snapshot;
pub mod store;

// Re-export main types at crate root
pub use cascade::Cascade;
pub use collaborators::{
    Collaborators, LiveChannel, LocalStore, NullLive, NullStore, RemoteFailure, RemoteResult,
    RemoteService, RemoteStatus,
};
pub use config::{CacheMode, ConfigError, SyncConfig};
pub use engine::{Engine, Scheduler};
pub use error::{Error, StoreError, SyncFailure};
pub use model::Model;
pub use network::{NetworkMonitor, ReachabilityProbe};
pub use notification::{Notification, NotificationKind};
pub use operation::{Completion, Operation, OperationId, OperationKind, OperationState};
pub use queue::OperationQueue;
pub use record::{Record, RecordKey, Status};
pub use schema::{ModelSchema, KEY_SEPARATOR};
pub use snapshot::{StoredRecord, SNAPSHOT_FORMAT_VERSION};
pub use store::Store;

/// Field values of a record.
pub type Fields = serde_json::Map<String, serde_json::Value>;
