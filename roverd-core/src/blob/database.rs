//! Database-backed package storage: metadata rows plus chunked bytes.

use super::{ApkStorage, CHUNK_MAX_SIZE};
use crate::error::Result;
use crate::persistence::ports::ApkBlobRepository;
use async_trait::async_trait;
use roverd_model::{ApkArch, ApkType, PackageInfo};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub struct DatabaseApkStorage {
    repo: Arc<dyn ApkBlobRepository>,
}

impl DatabaseApkStorage {
    pub fn new(repo: Arc<dyn ApkBlobRepository>) -> Self {
        DatabaseApkStorage { repo }
    }
}

fn chunked(data: Vec<u8>) -> Vec<Vec<u8>> {
    data.chunks(CHUNK_MAX_SIZE).map(|c| c.to_vec()).collect()
}

#[async_trait]
impl ApkStorage for DatabaseApkStorage {
    async fn get_current_version(
        &self,
        package: ApkType,
        arch: ApkArch,
    ) -> Result<Option<String>> {
        Ok(self
            .repo
            .package_meta(package)
            .await?
            .remove(&arch)
            .map(|info| info.version))
    }

    async fn get_current_package_info(
        &self,
        package: ApkType,
    ) -> Result<Option<HashMap<ApkArch, PackageInfo>>> {
        let meta = self.repo.package_meta(package).await?;
        Ok((!meta.is_empty()).then_some(meta))
    }

    async fn save_file(
        &self,
        package: ApkType,
        arch: ApkArch,
        version: &str,
        mimetype: &str,
        data: Vec<u8>,
    ) -> Result<bool> {
        let info = PackageInfo {
            version: version.to_string(),
            file_name: format!(
                "{}__{}__{}",
                package.as_str(),
                version,
                arch.as_str()
            ),
            mimetype: mimetype.to_string(),
            size: data.len() as u64,
            arch,
        };
        let chunks = chunked(data);
        info!(
            package = package.as_str(),
            arch = arch.as_str(),
            version,
            chunks = chunks.len(),
            "storing package in database"
        );
        self.repo.replace_package(package, arch, info, chunks).await?;
        Ok(true)
    }

    async fn get_file(
        &self,
        package: ApkType,
        arch: ApkArch,
    ) -> Result<Option<(PackageInfo, Vec<u8>)>> {
        let Some(info) = self.repo.package_meta(package).await?.remove(&arch) else {
            return Ok(None);
        };
        let data: Vec<u8> = self
            .repo
            .package_chunks(package, arch)
            .await?
            .into_iter()
            .flatten()
            .collect();
        Ok(Some((info, data)))
    }

    async fn delete_file(&self, package: ApkType, arch: ApkArch) -> Result<bool> {
        self.repo.delete_package(package, arch).await
    }

    async fn reload(&self) -> Result<()> {
        // The database is the index; nothing cached here.
        Ok(())
    }
}
