//! Durable persistence for the current token set
//!
//! One JSON record at a configured path. All writes go through atomic
//! temp-file + rename so a concurrent reader never observes a half-written
//! record, and permissions are 0600 since the file holds OAuth secrets.
//! The store has no business logic: validity and refresh decisions belong
//! to the manager.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::token_set::TokenSet;

/// File-backed storage of exactly one `TokenSet`.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted set, or `None` when no usable record exists.
    ///
    /// A corrupt record is logged and reported as absent rather than
    /// raised, so the manager falls through to "no tokens" instead of
    /// crashing on a damaged file.
    pub async fn load(&self) -> Option<TokenSet> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read token record");
                return None;
            }
        };

        match serde_json::from_str::<TokenSet>(&contents) {
            Ok(set) => {
                debug!(path = %self.path.display(), "loaded token record");
                Some(set)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt token record, treating as absent");
                None
            }
        }
    }

    /// Persist the set atomically (temp file + rename, 0600 permissions).
    pub async fn save(&self, set: &TokenSet) -> Result<()> {
        let json = serde_json::to_string_pretty(set)
            .map_err(|e| Error::Parse(format!("serializing token record: {e}")))?;

        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Io("token path has no parent directory".into()))?;

        let tmp_path = dir.join(format!(".tokens.tmp.{}", std::process::id()));

        tokio::fs::write(&tmp_path, json.as_bytes())
            .await
            .map_err(|e| Error::Io(format!("writing temp token file: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp_path, perms)
                .await
                .map_err(|e| Error::Io(format!("setting token file permissions: {e}")))?;
        }

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| Error::Io(format!("renaming temp token file: {e}")))?;

        debug!(path = %self.path.display(), "persisted token record");
        Ok(())
    }

    /// Remove the persisted record entirely. Missing file is not an error.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "cleared token record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(format!("removing token file: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_set::TokenSource;

    fn test_set() -> TokenSet {
        TokenSet {
            access_token: "at_1".into(),
            refresh_token: Some("rt_1".into()),
            access_expires_at: Some(1_735_500_000_000),
            refresh_expires_at: Some(1_736_000_000_000),
            source: TokenSource::InitialAuth,
        }
    }

    #[tokio::test]
    async fn roundtrip_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));

        store.save(&test_set()).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, test_set());
    }

    #[tokio::test]
    async fn missing_file_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn corrupt_record_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, "{ not valid json").await.unwrap();

        let store = TokenStore::new(path);
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn legacy_record_with_extra_field_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(
            &path,
            r#"{"access_token":"at_old","refresh_token":"rt_old","display_info":"Token (valid)"}"#,
        )
        .await
        .unwrap();

        let store = TokenStore::new(path);
        let set = store.load().await.unwrap();
        assert_eq!(set.access_token, "at_old");
    }

    #[tokio::test]
    async fn clear_removes_record_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));

        store.save(&test_set()).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.is_none());

        // Second clear on a missing file succeeds
        store.clear().await.unwrap();
    }

    #[tokio::test]
    async fn save_into_missing_directory_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("no-such-dir").join("tokens.json"));
        let err = store.save(&test_set()).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)), "got: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let store = TokenStore::new(path.clone());
        store.save(&test_set()).await.unwrap();

        let metadata = tokio::fs::metadata(&path).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "token file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn save_replaces_whole_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));

        store.save(&test_set()).await.unwrap();
        let mut newer = test_set();
        newer.access_token = "at_2".into();
        newer.refresh_token = None;
        store.save(&newer).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.access_token, "at_2");
        assert!(loaded.refresh_token.is_none());
    }
}
