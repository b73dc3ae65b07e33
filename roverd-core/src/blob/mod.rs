//! Blob repository: stored device packages, keyed by `(type, arch)`.

mod database;
mod filesystem;

pub use database::DatabaseApkStorage;
pub use filesystem::FilesystemApkStorage;

use crate::error::Result;
use async_trait::async_trait;
use roverd_model::{ApkArch, ApkType, PackageInfo};
use std::collections::HashMap;

/// Largest slice stored per database row.
pub const CHUNK_MAX_SIZE: usize = 1024 * 1024;

/// Interface shared by the filesystem and database variants.
#[async_trait]
pub trait ApkStorage: Send + Sync {
    async fn get_current_version(&self, package: ApkType, arch: ApkArch)
    -> Result<Option<String>>;

    /// Metadata for every arch of one package type; None when nothing
    /// is stored.
    async fn get_current_package_info(
        &self,
        package: ApkType,
    ) -> Result<Option<HashMap<ApkArch, PackageInfo>>>;

    /// Replaces any existing entry for the key.
    async fn save_file(
        &self,
        package: ApkType,
        arch: ApkArch,
        version: &str,
        mimetype: &str,
        data: Vec<u8>,
    ) -> Result<bool>;

    /// Full package bytes plus metadata, for installs and downloads.
    async fn get_file(
        &self,
        package: ApkType,
        arch: ApkArch,
    ) -> Result<Option<(PackageInfo, Vec<u8>)>>;

    async fn delete_file(&self, package: ApkType, arch: ApkArch) -> Result<bool>;

    /// Rebuild the index from the backing store.
    async fn reload(&self) -> Result<()>;
}

pub(crate) fn extension_for(mimetype: &str) -> &'static str {
    if mimetype == "application/zip" { "zip" } else { "apk" }
}

pub(crate) fn mimetype_for_extension(ext: &str) -> &'static str {
    if ext.eq_ignore_ascii_case("zip") {
        "application/zip"
    } else {
        "application/vnd.android.package-archive"
    }
}
