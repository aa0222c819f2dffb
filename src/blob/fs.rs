use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};

use super::{BlobError, BlobProperties, BlobStore};

/// Filesystem-backed blob store.
///
/// Read access goes through `{base_url}/media/{name}?expires=..&token=..`;
/// the token is a SHA-256 over (secret, name, expiry) so the media route can
/// verify it without any shared state.
pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
    secret: String,
}

impl FsBlobStore {
    pub fn new(root: PathBuf, base_url: String, secret: String) -> std::io::Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            base_url,
            secret,
        })
    }

    /// Blob names are single path components; anything else would escape the
    /// store root.
    fn checked_path(&self, name: &str) -> Result<PathBuf, BlobError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(BlobError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    pub fn local_path(&self, name: &str) -> Result<PathBuf, BlobError> {
        let path = self.checked_path(name)?;
        if !path.exists() {
            return Err(BlobError::NotFound(name.to_string()));
        }
        Ok(path)
    }

    fn token_for(&self, name: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b":");
        hasher.update(name.as_bytes());
        hasher.update(b":");
        hasher.update(expires.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Validate a token produced by `signed_read_url`. Rejects expired and
    /// forged tokens alike.
    pub fn verify_token(&self, name: &str, expires: i64, token: &str) -> bool {
        if Utc::now().timestamp() > expires {
            return false;
        }
        self.token_for(name, expires) == token
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, name: &str, bytes: &[u8]) -> Result<(), BlobError> {
        let path = self.checked_path(name)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn signed_read_url(&self, name: &str, ttl_secs: i64) -> Result<String, BlobError> {
        let path = self.checked_path(name)?;
        if !path.exists() {
            return Err(BlobError::NotFound(name.to_string()));
        }
        let expires = Utc::now().timestamp() + ttl_secs;
        let token = self.token_for(name, expires);
        Ok(format!(
            "{}/media/{}?expires={}&token={}",
            self.base_url, name, expires, token
        ))
    }

    async fn properties(&self, name: &str) -> Result<BlobProperties, BlobError> {
        let path = self.checked_path(name)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| BlobError::NotFound(name.to_string()))?;
        Ok(BlobProperties { size: meta.len() })
    }

    async fn delete(&self, name: &str) -> Result<(), BlobError> {
        let path = self.checked_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, FsBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(
            dir.path().to_path_buf(),
            "http://localhost:8080".to_string(),
            "test-secret".to_string(),
        )
        .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_then_signed_url_verifies() {
        let (_dir, store) = store();
        store.put("a.mp3", b"abc").await.unwrap();

        let url = store.signed_read_url("a.mp3", 60).await.unwrap();
        let query = url.split('?').nth(1).unwrap();
        let mut expires = 0i64;
        let mut token = String::new();
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap();
            match k {
                "expires" => expires = v.parse().unwrap(),
                "token" => token = v.to_string(),
                _ => {}
            }
        }

        assert!(store.verify_token("a.mp3", expires, &token));
        assert!(!store.verify_token("b.mp3", expires, &token));
        assert!(!store.verify_token("a.mp3", expires - 1, &token));
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let (_dir, store) = store();
        store.put("a.mp3", b"abc").await.unwrap();

        let expired = Utc::now().timestamp() - 10;
        let token = store.token_for("a.mp3", expired);
        assert!(!store.verify_token("a.mp3", expired, &token));
    }

    #[tokio::test]
    async fn path_escapes_rejected() {
        let (_dir, store) = store();
        assert!(matches!(
            store.put("../evil", b"x").await,
            Err(BlobError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn properties_and_delete() {
        let (_dir, store) = store();
        store.put("a.mp3", b"abcd").await.unwrap();
        assert_eq!(store.properties("a.mp3").await.unwrap().size, 4);

        store.delete("a.mp3").await.unwrap();
        assert!(matches!(
            store.delete("a.mp3").await,
            Err(BlobError::NotFound(_))
        ));
    }
}
