//! Binary package identities stored by the blob repository.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApkType {
    Pogo,
    Rgc,
    Pd,
}

impl ApkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApkType::Pogo => "pogo",
            ApkType::Rgc => "rgc",
            ApkType::Pd => "pd",
        }
    }

    /// Android package name pushed to devices for this type.
    pub fn package_name(&self) -> &'static str {
        match self {
            ApkType::Pogo => "com.nianticlabs.pokemongo",
            ApkType::Rgc => "de.grennith.rgc.remotegpscontroller",
            ApkType::Pd => "com.mad.pogodroid",
        }
    }
}

impl std::str::FromStr for ApkType {
    type Err = crate::ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pogo" => Ok(ApkType::Pogo),
            "rgc" => Ok(ApkType::Rgc),
            "pd" => Ok(ApkType::Pd),
            other => Err(crate::ModelError::InvalidValue(format!("apk type {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApkArch {
    Noarch,
    ArmeabiV7a,
    Arm64V8a,
}

impl ApkArch {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApkArch::Noarch => "noarch",
            ApkArch::ArmeabiV7a => "armeabi_v7a",
            ApkArch::Arm64V8a => "arm64_v8a",
        }
    }

    /// Map an `ro.product.cpu.abi` value reported by a device.
    pub fn from_abi(abi: &str) -> ApkArch {
        match abi.trim() {
            "armeabi-v7a" => ApkArch::ArmeabiV7a,
            "arm64-v8a" => ApkArch::Arm64V8a,
            _ => ApkArch::Noarch,
        }
    }
}

impl std::str::FromStr for ApkArch {
    type Err = crate::ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "noarch" => Ok(ApkArch::Noarch),
            "armeabi_v7a" => Ok(ApkArch::ArmeabiV7a),
            "arm64_v8a" => Ok(ApkArch::Arm64V8a),
            other => Err(crate::ModelError::InvalidValue(format!("apk arch {other}"))),
        }
    }
}

/// Metadata of one stored package file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub version: String,
    pub file_name: String,
    pub mimetype: String,
    pub size: u64,
    pub arch: ApkArch,
}

/// Numeric-aware comparison of dotted version strings.
///
/// `0.123.1` > `0.123.0` > `0.99.9`; non-numeric fragments compare
/// lexicographically as a fallback.
pub fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parts = |v: &str| -> Vec<String> { v.split('.').map(|s| s.to_string()).collect() };
    let (pa, pb) = (parts(a), parts(b));
    for i in 0..pa.len().max(pb.len()) {
        let (fa, fb) = (
            pa.get(i).map(String::as_str).unwrap_or("0"),
            pb.get(i).map(String::as_str).unwrap_or("0"),
        );
        let ord = match (fa.parse::<u64>(), fb.parse::<u64>()) {
            (Ok(na), Ok(nb)) => na.cmp(&nb),
            _ => fa.cmp(fb),
        };
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}
