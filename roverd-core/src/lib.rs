//! Device orchestration core of the roverd fleet controller.
//!
//! The crate couples four concurrent state machines:
//!
//! - the **routing engine** ([`route`]): per-area cursors over a
//!   geofenced route with a priority queue overlay and per-device
//!   subroutes,
//! - the **walker** ([`walker`]): a per-device FSM stepping through
//!   ordered walker-areas under algorithm predicates,
//! - the **job updater** ([`jobs`]): a pooled executor for per-device
//!   administrative job chains,
//! - the **account lender** ([`account`]): mutually exclusive credential
//!   leases with burn and cooldown semantics.
//!
//! Configuration is aggregated by the [`mapping`] manager into an
//! immutable snapshot that is swapped atomically on reload. Persistence
//! is consumed through the repository ports in [`persistence`]; the
//! HTTP/WebSocket surface lives in `roverd-server`.

pub mod account;
pub mod autoconf;
pub mod blob;
pub mod error;
pub mod geofence;
pub mod jobs;
pub mod link;
pub mod mapping;
pub mod mitm;
pub mod persistence;
pub mod route;
pub mod routecalc;
pub mod walker;

pub use error::{CoreError, Result};
