use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{BlobError, BlobResult, ObjectName, MAX_NAME_LEN};

/// Prefix of in-progress writes; padded past [`MAX_NAME_LEN`] so a temp file
/// never shares a name with an object
const INCOMING_PREFIX: &str = ".incoming.";

/// Local staging area: one file per object, named exactly after the object
#[derive(Debug, Clone)]
pub struct StagingStore {
    root: PathBuf,
}

impl StagingStore {
    /// Open a staging root, creating the directory if needed
    pub async fn open(root: impl Into<PathBuf>) -> BlobResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the staged payload; the file may not exist
    pub fn path(&self, name: &ObjectName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Write the payload and publish it under `name`
    ///
    /// Bytes land in a private temp file first and are linked into place
    /// only if nothing is staged under `name` yet. A concurrent writer that
    /// loses gets `Conflict` and leaves the published file untouched.
    pub async fn save(&self, name: &ObjectName, bytes: &[u8]) -> BlobResult<()> {
        let incoming = self.incoming_path();
        let published = match self.write_incoming(&incoming, bytes).await {
            Ok(()) => self.publish(name, &incoming).await,
            Err(e) => Err(e),
        };

        if let Err(e) = tokio::fs::remove_file(&incoming).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %incoming.display(), error = %e, "Could not remove temp file");
            }
        }
        published?;

        debug!(object = %name, size = bytes.len(), "Staged payload");
        Ok(())
    }

    fn incoming_path(&self) -> PathBuf {
        let id = Uuid::new_v4().simple().to_string();
        self.root.join(format!(
            "{INCOMING_PREFIX}{id:0>width$}",
            width = MAX_NAME_LEN
        ))
    }

    async fn write_incoming(&self, path: &Path, bytes: &[u8]) -> BlobResult<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn publish(&self, name: &ObjectName, incoming: &Path) -> BlobResult<()> {
        match tokio::fs::hard_link(incoming, self.path(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(BlobError::conflict(name.as_str())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read(&self, name: &ObjectName) -> BlobResult<Bytes> {
        match tokio::fs::read(self.path(name)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::not_found(name.as_str())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, name: &ObjectName) -> BlobResult<()> {
        match tokio::fs::remove_file(self.path(name)).await {
            Ok(()) => {
                debug!(object = %name, "Removed staged payload");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::not_found(name.as_str())),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn contains(&self, name: &ObjectName) -> BlobResult<bool> {
        Ok(tokio::fs::try_exists(self.path(name)).await?)
    }
}
