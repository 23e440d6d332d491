//! Content-addressed, sharded zone storage on disk: `<root>/<h[0:2]>/<h[2:4]>/<D>.json`
//! where `h = lower_hex(md5(D))`. Writes are atomic: serialize to a
//! `.tmp` sibling, then rename over the target.

use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use zonehub_proto::zone::{validate_zone, Zone, ZoneError};

#[derive(Debug)]
pub enum Error {
    Validation(ZoneError),
    Serde(serde_json::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Validation(e) => write!(f, "zone failed validation: {e}"),
            Error::Serde(e) => write!(f, "zone is not valid JSON: {e}"),
            Error::Io(e) => write!(f, "storage I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ZoneError> for Error {
    fn from(e: ZoneError) -> Self {
        Error::Validation(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serde(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

/// Path for a domain's zone file under `root`, without touching disk.
pub fn path_for(root: &Path, domain: &str) -> PathBuf {
    let mut hasher = Md5::new();
    hasher.update(domain.as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{digest:x}");
    root.join(&hex[0..2]).join(&hex[2..4]).join(format!("{domain}.json"))
}

/// Storage backed by a configured root directory.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Storage { root }
    }

    pub fn path_for(&self, domain: &str) -> PathBuf {
        path_for(&self.root, domain)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `Ok(None)` if the zone doesn't exist, `Ok(Some(zone))` otherwise.
    pub async fn read(&self, domain: &str) -> Result<Option<Zone>, Error> {
        let path = self.path_for(domain);
        match tokio::fs::read_to_string(&path).await {
            Ok(data) => {
                let zone: Zone = serde_json::from_str(&data)?;
                validate_zone(&zone)?;
                Ok(Some(zone))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, domain: &str) -> bool {
        tokio::fs::metadata(self.path_for(domain)).await.is_ok()
    }

    /// Validate and atomically write `zone` to disk, creating parent
    /// directories as needed.
    pub async fn write(&self, domain: &str, zone: &Zone) -> Result<(), Error> {
        validate_zone(zone)?;

        let path = self.path_for(domain);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec_pretty(zone)?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &data).await?;

        match tokio::fs::rename(&tmp_path, &path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tokio::fs::remove_file(&path).await?;
                tokio::fs::rename(&tmp_path, &path).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `true` if a file was actually removed, `false` if it was
    /// already absent (the distinguished `not_found` signal).
    pub async fn delete(&self, domain: &str) -> Result<bool, Error> {
        let path = self.path_for(domain);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
