//! Data shapes for the pollbind workspace.
//!
//! This crate contains the serde-serializable types shared between the
//! session binders in `pollbind` and the `pollbind` replay tool:
//!
//! - **Options**: binder configuration and polling environments
//! - **Types**: synchronization outcomes, binder statistics, service call records
//! - **Scenario**: replay scenario files and the reports produced from them
//!
//! Types in this crate are pure data. Behavior lives in `pollbind`.

pub mod options;
pub mod scenario;
pub mod types;

pub use options::*;
pub use scenario::*;
pub use types::*;
