//! Exactly-once start/stop of keyed polling sessions.
//!
//! A binder holds the sessions its owner currently wants. Each
//! synchronization pass compares the desired keys with what is open or
//! opening, calls [`SessionService::start`] for new keys and
//! [`SessionService::stop`] for keys that went away, and makes sure every
//! token a service hands out is stopped exactly once, even when it arrives
//! after its key stopped being wanted.
//!
//! Two binders are provided:
//!
//! - [`MultiSessionBinder`]: one session per key in a dynamic, ordered key set.
//! - [`SessionBinder`]: one session for one key, switched by an enabled flag.
//!
//! Binders run on a single thread: their continuations are spawned on the
//! current tokio [`LocalSet`](tokio::task::LocalSet).
//!
//! ```ignore
//! use std::rc::Rc;
//! use pollbind::{BinderConfig, MemoryService, MultiSessionBinder};
//! use serde_json::json;
//!
//! let service = Rc::new(MemoryService::new());
//! let mut binder = MultiSessionBinder::new(BinderConfig::new().label("assets"), Rc::clone(&service));
//! binder.synchronize(&service, [json!({"chainId": "0x1"})], true)?;
//! binder.settle().await;
//! let stats = binder.shutdown().await;
//! ```

pub mod error;
pub mod key;
pub mod ledger;
pub mod memory;
pub mod multi;
pub mod service;
pub mod single;
pub mod stable;
mod tasks;
pub mod testing;

pub use error::{Error, Result, ServiceError};
pub use key::KeyFingerprint;
pub use ledger::{LedgeredService, SharedLedger, TokenLedger};
pub use memory::MemoryService;
pub use multi::MultiSessionBinder;
pub use pollbind_protocol as protocol;
pub use protocol::{BinderConfig, BinderStats, PollingEnvironment, SyncOutcome};
pub use service::{SessionService, StartFuture, StopFuture};
pub use single::SessionBinder;
pub use stable::StableValue;
