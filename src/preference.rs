use serde_json::Value;

use crate::storage::StorageBackend;

/// Key the dark-mode flag is stored under.
pub const STORAGE_KEY: &str = "jenkins-dark-enabled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Read,
    Write,
}

impl std::fmt::Display for StorageOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StorageOp::Read => "read",
            StorageOp::Write => "write",
        })
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("storage {op} of {key:?} failed: {detail}")]
pub struct StorageError {
    pub op: StorageOp,
    pub key: String,
    pub detail: String,
}

/// The persisted on/off flag.
///
/// Absent key means enabled; only a stored `false` disables. Without a
/// backend (storage API missing) reads resolve to enabled and writes are
/// accepted and dropped.
pub struct PreferenceStore<B> {
    backend: Option<B>,
    key: String,
}

impl<B: StorageBackend> PreferenceStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Some(backend),
            key: STORAGE_KEY.to_string(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            backend: None,
            key: STORAGE_KEY.to_string(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub async fn get_enabled(&self) -> Result<bool, StorageError> {
        let Some(backend) = &self.backend else {
            tracing::debug!(key = %self.key, "storage unavailable; defaulting to enabled");
            return Ok(true);
        };
        let stored = backend
            .get(&self.key)
            .await
            .map_err(|e| self.error(StorageOp::Read, e))?;
        Ok(!matches!(stored, Some(Value::Bool(false))))
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<(), StorageError> {
        let Some(backend) = &self.backend else {
            tracing::debug!(key = %self.key, enabled, "storage unavailable; write dropped");
            return Ok(());
        };
        backend
            .set(&self.key, Value::Bool(enabled))
            .await
            .map_err(|e| self.error(StorageOp::Write, e))?;
        tracing::debug!(key = %self.key, enabled, "stored preference");
        Ok(())
    }

    fn error(&self, op: StorageOp, e: anyhow::Error) -> StorageError {
        StorageError {
            op,
            key: self.key.clone(),
            detail: format!("{:#}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use anyhow::anyhow;
    use serde_json::json;

    struct BrokenBackend;

    impl StorageBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<Value>> {
            Err(anyhow!("quota exceeded"))
        }

        async fn set(&self, _key: &str, _value: Value) -> anyhow::Result<()> {
            Err(anyhow!("quota exceeded"))
        }
    }

    #[tokio::test]
    async fn round_trips_both_values() {
        let store = PreferenceStore::new(MemoryBackend::new());
        for v in [false, true, false] {
            store.set_enabled(v).await.unwrap();
            assert_eq!(store.get_enabled().await.unwrap(), v);
        }
    }

    #[tokio::test]
    async fn absent_key_is_enabled() {
        let store = PreferenceStore::new(MemoryBackend::new());
        assert!(store.get_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn only_boolean_false_disables() {
        let backend = MemoryBackend::new();
        let store = PreferenceStore::new(backend.clone());
        for value in [json!("false"), json!(0), json!(null)] {
            backend.set(STORAGE_KEY, value).await.unwrap();
            assert!(store.get_enabled().await.unwrap());
        }
    }

    #[tokio::test]
    async fn unavailable_backend_fails_open() {
        let store = PreferenceStore::<MemoryBackend>::unavailable();
        store.set_enabled(false).await.unwrap();
        assert!(store.get_enabled().await.unwrap());
        assert!(!store.is_available());
    }

    #[tokio::test]
    async fn backend_errors_carry_detail() {
        let store = PreferenceStore::new(BrokenBackend).with_key("custom");

        let err = store.get_enabled().await.unwrap_err();
        assert_eq!(err.op, StorageOp::Read);
        assert_eq!(err.key, "custom");
        assert!(err.to_string().contains("quota exceeded"));

        let err = store.set_enabled(true).await.unwrap_err();
        assert_eq!(err.op, StorageOp::Write);
    }

    #[tokio::test]
    async fn custom_key_is_used() {
        let backend = MemoryBackend::new();
        let store = PreferenceStore::new(backend.clone()).with_key("other-key");
        store.set_enabled(false).await.unwrap();
        assert_eq!(backend.snapshot("other-key"), Some(json!(false)));
        assert_eq!(backend.snapshot(STORAGE_KEY), None);
    }
}
