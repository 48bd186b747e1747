//! Durable server identity.
//!
//! Each worker process owns one numeric server id. It is generated at
//! startup, written to a local file so a crashed run can be cleaned up on
//! the next start, and deleted on orderly shutdown.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use rand::Rng;

use crate::types::ServerId;

/// Upper bound (exclusive) of generated server ids.
pub const SERVER_ID_MODULUS: ServerId = 100_000;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("identity file {path} does not hold a server id: {content:?}")]
    Malformed { path: PathBuf, content: String },
}

/// Handle to the identity file.
#[derive(Debug, Clone)]
pub struct ServerIdentity {
    path: PathBuf,
}

impl ServerIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Generate a fresh id and persist it, replacing any previous file.
    pub async fn generate(&self) -> Result<ServerId, IdentityError> {
        let id = rand::rng().random_range(1..SERVER_ID_MODULUS);
        tokio::fs::write(&self.path, id.to_string()).await?;
        Ok(id)
    }

    /// Read the persisted id, or `None` when no file exists.
    pub async fn read(&self) -> Result<Option<ServerId>, IdentityError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        content
            .trim()
            .parse::<ServerId>()
            .map(Some)
            .map_err(|_| IdentityError::Malformed {
                path: self.path.clone(),
                content,
            })
    }

    /// Remove the file. Missing files are not an error.
    pub async fn delete(&self) -> Result<(), IdentityError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn generate_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let identity = ServerIdentity::new(dir.path().join("server_id.txt"));

        let id = identity.generate().await.unwrap();
        assert!((1..SERVER_ID_MODULUS).contains(&id));
        assert_eq!(identity.read().await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn missing_file_reads_none_and_deletes_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let identity = ServerIdentity::new(dir.path().join("absent.txt"));

        assert_eq!(identity.read().await.unwrap(), None);
        identity.delete().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server_id.txt");
        tokio::fs::write(&path, "not-a-number").await.unwrap();

        let err = ServerIdentity::new(&path).read().await.unwrap_err();
        assert_matches!(err, IdentityError::Malformed { .. });
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let identity = ServerIdentity::new(dir.path().join("server_id.txt"));
        identity.generate().await.unwrap();

        identity.delete().await.unwrap();
        assert_eq!(identity.read().await.unwrap(), None);
    }
}
