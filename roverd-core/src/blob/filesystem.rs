//! Filesystem-backed package storage.
//!
//! Files are named `<friendlyname>__<version>__<arch>.{apk|zip}`; an
//! index file caches the parsed metadata and is rebuilt from filenames
//! on reload.

use super::{ApkStorage, extension_for, mimetype_for_extension};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use roverd_model::{ApkArch, ApkType, PackageInfo};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

const INDEX_FILE: &str = "apk_index.json";

pub struct FilesystemApkStorage {
    root: PathBuf,
    index: RwLock<HashMap<(ApkType, ApkArch), PackageInfo>>,
}

fn parse_file_name(name: &str) -> Option<(ApkType, ApkArch, String)> {
    let stem = Path::new(name).file_stem()?.to_str()?;
    let mut parts = stem.split("__");
    let package = ApkType::from_str(parts.next()?).ok()?;
    let version = parts.next()?.to_string();
    let arch = ApkArch::from_str(parts.next()?).ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((package, arch, version))
}

fn file_name(package: ApkType, arch: ApkArch, version: &str, mimetype: &str) -> String {
    format!(
        "{}__{}__{}.{}",
        package.as_str(),
        version,
        arch.as_str(),
        extension_for(mimetype)
    )
}

impl FilesystemApkStorage {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        let storage = FilesystemApkStorage {
            root,
            index: RwLock::new(HashMap::new()),
        };
        storage.reload().await?;
        Ok(storage)
    }

    fn path_of(&self, info: &PackageInfo) -> PathBuf {
        self.root.join(&info.file_name)
    }

    async fn persist_index(&self) -> Result<()> {
        let entries: Vec<PackageInfo> = self.index.read().values().cloned().collect();
        let body = serde_json::to_vec_pretty(&entries)?;
        let tmp = self.root.join(format!("{INDEX_FILE}.tmp"));
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, self.root.join(INDEX_FILE)).await?;
        Ok(())
    }
}

#[async_trait]
impl ApkStorage for FilesystemApkStorage {
    async fn get_current_version(
        &self,
        package: ApkType,
        arch: ApkArch,
    ) -> Result<Option<String>> {
        Ok(self
            .index
            .read()
            .get(&(package, arch))
            .map(|info| info.version.clone()))
    }

    async fn get_current_package_info(
        &self,
        package: ApkType,
    ) -> Result<Option<HashMap<ApkArch, PackageInfo>>> {
        let index = self.index.read();
        let per_arch: HashMap<ApkArch, PackageInfo> = index
            .iter()
            .filter(|((ty, _), _)| *ty == package)
            .map(|((_, arch), info)| (*arch, info.clone()))
            .collect();
        Ok((!per_arch.is_empty()).then_some(per_arch))
    }

    async fn save_file(
        &self,
        package: ApkType,
        arch: ApkArch,
        version: &str,
        mimetype: &str,
        data: Vec<u8>,
    ) -> Result<bool> {
        if version.contains("__") || version.contains(std::path::MAIN_SEPARATOR) {
            return Err(CoreError::Internal(format!(
                "unusable version string {version:?}"
            )));
        }
        let name = file_name(package, arch, version, mimetype);
        let info = PackageInfo {
            version: version.to_string(),
            file_name: name.clone(),
            mimetype: mimetype.to_string(),
            size: data.len() as u64,
            arch,
        };

        let previous = self.index.read().get(&(package, arch)).cloned();
        tokio::fs::write(self.root.join(&name), data).await?;
        if let Some(previous) = previous {
            if previous.file_name != name {
                if let Err(err) = tokio::fs::remove_file(self.path_of(&previous)).await {
                    warn!(file = %previous.file_name, %err, "could not remove replaced package file");
                }
            }
        }
        self.index.write().insert((package, arch), info);
        self.persist_index().await?;
        info!(package = package.as_str(), arch = arch.as_str(), version, "stored package");
        Ok(true)
    }

    async fn get_file(
        &self,
        package: ApkType,
        arch: ApkArch,
    ) -> Result<Option<(PackageInfo, Vec<u8>)>> {
        let Some(info) = self.index.read().get(&(package, arch)).cloned() else {
            return Ok(None);
        };
        let data = tokio::fs::read(self.path_of(&info)).await?;
        Ok(Some((info, data)))
    }

    async fn delete_file(&self, package: ApkType, arch: ApkArch) -> Result<bool> {
        let Some(info) = self.index.write().remove(&(package, arch)) else {
            return Ok(false);
        };
        if let Err(err) = tokio::fs::remove_file(self.path_of(&info)).await {
            warn!(file = %info.file_name, %err, "could not remove package file");
        }
        self.persist_index().await?;
        Ok(true)
    }

    async fn reload(&self) -> Result<()> {
        let mut rebuilt: HashMap<(ApkType, ApkArch), PackageInfo> = HashMap::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((package, arch, version)) = parse_file_name(name) else {
                continue;
            };
            let ext = Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("apk");
            if !ext.eq_ignore_ascii_case("apk") && !ext.eq_ignore_ascii_case("zip") {
                continue;
            }
            let size = entry.metadata().await?.len();
            rebuilt.insert(
                (package, arch),
                PackageInfo {
                    version,
                    file_name: name.to_string(),
                    mimetype: mimetype_for_extension(ext).to_string(),
                    size,
                    arch,
                },
            );
        }
        *self.index.write() = rebuilt;
        self.persist_index().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_then_info_round_trips() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemApkStorage::open(dir.path()).await.unwrap();
        storage
            .save_file(
                ApkType::Pogo,
                ApkArch::ArmeabiV7a,
                "0.123.0",
                "application/vnd.android.package-archive",
                b"apk-bytes".to_vec(),
            )
            .await
            .unwrap();

        let info = storage
            .get_current_package_info(ApkType::Pogo)
            .await
            .unwrap()
            .unwrap();
        let stored = &info[&ApkArch::ArmeabiV7a];
        assert_eq!(stored.version, "0.123.0");
        assert_eq!(stored.size, 9);
        assert_eq!(stored.file_name, "pogo__0.123.0__armeabi_v7a.apk");

        let (_, data) = storage
            .get_file(ApkType::Pogo, ApkArch::ArmeabiV7a)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data, b"apk-bytes");
    }

    #[tokio::test]
    async fn save_replaces_previous_version() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemApkStorage::open(dir.path()).await.unwrap();
        let mime = "application/vnd.android.package-archive";
        storage
            .save_file(ApkType::Rgc, ApkArch::Noarch, "0.1", mime, vec![1])
            .await
            .unwrap();
        storage
            .save_file(ApkType::Rgc, ApkArch::Noarch, "0.2", mime, vec![2, 2])
            .await
            .unwrap();

        assert_eq!(
            storage
                .get_current_version(ApkType::Rgc, ApkArch::Noarch)
                .await
                .unwrap(),
            Some("0.2".to_string())
        );
        assert!(!dir.path().join("rgc__0.1__noarch.apk").exists());
    }

    #[tokio::test]
    async fn reload_reconstructs_index_from_file_names() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("pd__1.7__noarch.apk"), b"x").unwrap();
        std::fs::write(dir.path().join("not-a-package.txt"), b"y").unwrap();

        let storage = FilesystemApkStorage::open(dir.path()).await.unwrap();
        assert_eq!(
            storage
                .get_current_version(ApkType::Pd, ApkArch::Noarch)
                .await
                .unwrap(),
            Some("1.7".to_string())
        );
        assert!(
            storage
                .get_current_package_info(ApkType::Pogo)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn delete_removes_file_and_entry() {
        let dir = TempDir::new().unwrap();
        let storage = FilesystemApkStorage::open(dir.path()).await.unwrap();
        storage
            .save_file(ApkType::Pd, ApkArch::Noarch, "1.0", "application/zip", vec![0; 4])
            .await
            .unwrap();
        assert!(storage.delete_file(ApkType::Pd, ApkArch::Noarch).await.unwrap());
        assert!(!storage.delete_file(ApkType::Pd, ApkArch::Noarch).await.unwrap());
        assert!(
            storage
                .get_file(ApkType::Pd, ApkArch::Noarch)
                .await
                .unwrap()
                .is_none()
        );
    }
}
