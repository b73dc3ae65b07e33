//! Device-link seams: the registry of connected devices and the
//! command surface one connection exposes.
//!
//! The server crate implements both over its websocket registry; the
//! core only consumes the traits.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Commands the job updater issues against one connected device.
#[async_trait]
pub trait Communicator: Send + Sync {
    async fn install_apk(&self, timeout_s: u64, data: Vec<u8>) -> Result<bool>;
    /// Split-apk bundles (zip).
    async fn install_bundle(&self, timeout_s: u64, data: Vec<u8>) -> Result<bool>;
    async fn reboot(&self) -> Result<bool>;
    async fn restart_app(&self, package: &str) -> Result<bool>;
    async fn stop_app(&self, package: &str) -> Result<bool>;
    async fn start_app(&self, package: &str) -> Result<bool>;
    /// Raw shell command; the reply is returned trimmed. Replies
    /// prefixed `KO:` signal failure to the caller.
    async fn passthrough(&self, command: &str) -> Result<String>;

    /// `versionName` of an installed package, None when absent.
    async fn package_version(&self, package: &str) -> Result<Option<String>>;
    /// `ro.product.cpu.abi`.
    async fn cpu_abi(&self) -> Result<Option<String>>;
}

/// Registry of origin → live connection.
pub trait DeviceLink: Send + Sync {
    fn get_communicator(&self, origin: &str) -> Option<Arc<dyn Communicator>>;

    /// Advisory flag keeping routing handoff and job execution from
    /// interleaving on one device.
    fn set_job_activated(&self, origin: &str);
    fn set_job_deactivated(&self, origin: &str);
    fn is_job_active(&self, origin: &str) -> bool;

    fn force_disconnect(&self, origin: &str);
    fn connected_origins(&self) -> Vec<String>;
}
