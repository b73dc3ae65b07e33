//! Shared entity and wire types for the roverd fleet controller.
//!
//! Everything in this crate is plain data: ids, coordinates, the
//! configuration entities loaded into a mapping snapshot, job and APK
//! descriptors, and the telemetry record shapes devices post over HTTP.
//! No I/O happens here.

pub mod apk;
pub mod area;
pub mod auth;
pub mod autoconf;
pub mod device;
pub mod error;
pub mod geofence;
pub mod ids;
pub mod jobs;
pub mod location;
pub mod routecalc;
pub mod telemetry;
pub mod walker;

pub use apk::*;
pub use area::*;
pub use auth::*;
pub use autoconf::*;
pub use device::*;
pub use error::ModelError;
pub use geofence::*;
pub use ids::*;
pub use jobs::*;
pub use location::*;
pub use routecalc::*;
pub use telemetry::*;
pub use walker::*;
