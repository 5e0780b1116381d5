use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

pub const MAX_KEY_LENGTH: usize = 512;
pub const MAX_VALUE_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KvKey {
    namespace: KeyNamespace,
    key: String,
}

impl KvKey {
    pub fn new(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        let key = key.into();
        Self::validate_key(&key)?;
        Ok(Self { namespace, key })
    }

    pub fn raw(&self) -> String {
        format!("{}:{}", self.namespace.prefix(), self.key)
    }

    pub fn namespace(&self) -> KeyNamespace {
        self.namespace
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn validate_key(key: &str) -> Result<(), KvError> {
        if key.trim().is_empty() {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot be empty".to_string(),
            });
        }

        if key.len() > MAX_KEY_LENGTH {
            return Err(KvError::InvalidKey {
                key: key.chars().take(50).collect::<String>() + "...",
                reason: format!("key exceeds maximum length of {MAX_KEY_LENGTH} bytes"),
            });
        }

        if key.contains("..") || key.contains('/') || key.contains('\\') {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                reason: "key cannot contain path separators".to_string(),
            });
        }

        if key.chars().any(char::is_control) {
            return Err(KvError::InvalidKey {
                key: key.escape_default().to_string(),
                reason: "key cannot contain control characters".to_string(),
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyNamespace {
    Session,
}

impl KeyNamespace {
    pub fn prefix(&self) -> &'static str {
        match self {
            KeyNamespace::Session => "session",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvValue {
    data: Vec<u8>,
    version: u64,
    updated_at: i64,
}

impl KvValue {
    pub fn new(data: Vec<u8>, version: u64, updated_at: i64) -> Result<Self, KvError> {
        if data.len() > MAX_VALUE_SIZE {
            return Err(KvError::ValueTooLarge {
                size: data.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        Ok(Self {
            data,
            version,
            updated_at,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Milliseconds since the Unix epoch.
    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, KvError> {
        serde_json::from_slice(&self.data).map_err(|e| KvError::Serialization {
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvOperation {
    Get { key: KvKey },
    Set { key: KvKey, value: Vec<u8> },
    Delete { key: KvKey },
}

impl KvOperation {
    pub fn get(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        Ok(KvOperation::Get {
            key: KvKey::new(namespace, key)?,
        })
    }

    pub fn set(
        namespace: KeyNamespace,
        key: impl Into<String>,
        value: Vec<u8>,
    ) -> Result<Self, KvError> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(KvError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        Ok(KvOperation::Set {
            key: KvKey::new(namespace, key)?,
            value,
        })
    }

    pub fn delete(namespace: KeyNamespace, key: impl Into<String>) -> Result<Self, KvError> {
        Ok(KvOperation::Delete {
            key: KvKey::new(namespace, key)?,
        })
    }

    pub fn key(&self) -> &KvKey {
        match self {
            KvOperation::Get { key } | KvOperation::Set { key, .. } | KvOperation::Delete { key } => {
                key
            }
        }
    }
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvError {
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("value too large: {size} bytes exceeds maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },

    #[error("storage error: {message} (code: {code:?}, retryable: {retryable})")]
    Storage {
        code: StorageErrorCode,
        message: String,
        retryable: bool,
    },

    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl KvError {
    pub fn storage(code: StorageErrorCode, message: impl Into<String>) -> Self {
        let retryable = code.is_retryable();
        Self::Storage {
            code,
            message: message.into(),
            retryable,
        }
    }
}

impl From<std::io::Error> for KvError {
    fn from(e: std::io::Error) -> Self {
        let code = match e.kind() {
            IoErrorKind::PermissionDenied => StorageErrorCode::PermissionDenied,
            IoErrorKind::WouldBlock | IoErrorKind::Interrupted => StorageErrorCode::Busy,
            IoErrorKind::InvalidData | IoErrorKind::UnexpectedEof => StorageErrorCode::Corrupted,
            _ => StorageErrorCode::IoError,
        };
        KvError::storage(code, e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageErrorCode {
    Unknown,
    Corrupted,
    PermissionDenied,
    Busy,
    IoError,
}

impl StorageErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageErrorCode::Busy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum KvOutput {
    Value(Option<KvValue>),
    Written { version: u64 },
    Deleted { existed: bool },
}

pub type KvResult = Result<KvOutput, KvError>;

/// JSON-typed view over one namespace.
pub struct TypedKvStore<T> {
    namespace: KeyNamespace,
    _phantom: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> TypedKvStore<T> {
    pub fn new(namespace: KeyNamespace) -> Self {
        Self {
            namespace,
            _phantom: PhantomData,
        }
    }

    pub fn get_op(&self, key: impl Into<String>) -> Result<KvOperation, KvError> {
        KvOperation::get(self.namespace, key)
    }

    pub fn set_op(&self, key: impl Into<String>, value: &T) -> Result<KvOperation, KvError> {
        let data = serde_json::to_vec(value).map_err(|e| KvError::Serialization {
            message: e.to_string(),
        })?;
        KvOperation::set(self.namespace, key, data)
    }

    pub fn delete_op(&self, key: impl Into<String>) -> Result<KvOperation, KvError> {
        KvOperation::delete(self.namespace, key)
    }

    pub fn parse_value(&self, output: KvOutput) -> Result<Option<T>, KvError> {
        match output {
            KvOutput::Value(Some(kv_value)) => kv_value.deserialize().map(Some),
            KvOutput::Value(None) => Ok(None),
            _ => Err(KvError::storage(
                StorageErrorCode::Unknown,
                "unexpected output type",
            )),
        }
    }
}

/// The seam the shell runtime executes KV effects through.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn execute(&self, operation: KvOperation) -> KvResult;
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Process-local store. Values do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, KvValue>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn execute(&self, operation: KvOperation) -> KvResult {
        match operation {
            KvOperation::Get { key } => {
                let entries = self.entries.read().await;
                Ok(KvOutput::Value(entries.get(&key.raw()).cloned()))
            }
            KvOperation::Set { key, value } => {
                let mut entries = self.entries.write().await;
                let version = entries.get(&key.raw()).map_or(1, |v| v.version() + 1);
                entries.insert(key.raw(), KvValue::new(value, version, now_ms())?);
                Ok(KvOutput::Written { version })
            }
            KvOperation::Delete { key } => {
                let existed = self.entries.write().await.remove(&key.raw()).is_some();
                Ok(KvOutput::Deleted { existed })
            }
        }
    }
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileKv {
    root: PathBuf,
}

impl FileKv {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &KvKey) -> PathBuf {
        self.root.join(format!("{}.json", key.raw().replace(':', "_")))
    }

    async fn read(&self, path: &Path) -> Result<Option<KvValue>, KvError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    warn!(path = %path.display(), error = %e, "corrupted kv entry");
                    KvError::storage(StorageErrorCode::Corrupted, e.to_string())
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl KvStore for FileKv {
    #[instrument(skip_all, fields(key = %operation.key().raw()))]
    async fn execute(&self, operation: KvOperation) -> KvResult {
        match operation {
            KvOperation::Get { key } => {
                let value = self.read(&self.path_for(&key)).await?;
                Ok(KvOutput::Value(value))
            }
            KvOperation::Set { key, value } => {
                tokio::fs::create_dir_all(&self.root).await?;
                let path = self.path_for(&key);
                let version = self.read(&path).await.ok().flatten().map_or(1, |v| v.version() + 1);
                let entry = KvValue::new(value, version, now_ms())?;
                let encoded = serde_json::to_vec(&entry).map_err(|e| KvError::Serialization {
                    message: e.to_string(),
                })?;

                let tmp = path.with_extension("json.tmp");
                tokio::fs::write(&tmp, encoded).await?;
                tokio::fs::rename(&tmp, &path).await?;
                debug!(version, "kv entry written");
                Ok(KvOutput::Written { version })
            }
            KvOperation::Delete { key } => match tokio::fs::remove_file(self.path_for(&key)).await {
                Ok(()) => Ok(KvOutput::Deleted { existed: true }),
                Err(e) if e.kind() == IoErrorKind::NotFound => Ok(KvOutput::Deleted { existed: false }),
                Err(e) => Err(e.into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_validation_empty() {
        assert!(KvKey::new(KeyNamespace::Session, "").is_err());
        assert!(KvKey::new(KeyNamespace::Session, "   ").is_err());
    }

    #[test]
    fn test_key_validation_path_traversal() {
        assert!(KvKey::new(KeyNamespace::Session, "../etc/passwd").is_err());
        assert!(KvKey::new(KeyNamespace::Session, "a/b").is_err());
        assert!(KvKey::new(KeyNamespace::Session, "a\\b").is_err());
    }

    #[test]
    fn test_key_validation_control_chars() {
        assert!(KvKey::new(KeyNamespace::Session, "user\0Data").is_err());
        assert!(KvKey::new(KeyNamespace::Session, "user\nData").is_err());
    }

    #[test]
    fn test_key_validation_too_long() {
        let key = "k".repeat(MAX_KEY_LENGTH + 1);
        assert!(KvKey::new(KeyNamespace::Session, key).is_err());
    }

    #[test]
    fn test_key_raw_prefix() {
        let key = KvKey::new(KeyNamespace::Session, "userData").unwrap();
        assert_eq!(key.raw(), "session:userData");
        assert_eq!(key.namespace(), KeyNamespace::Session);
    }

    #[test]
    fn test_value_size_limit() {
        let result = KvOperation::set(KeyNamespace::Session, "big", vec![0; MAX_VALUE_SIZE + 1]);
        assert!(matches!(result, Err(KvError::ValueTooLarge { .. })));
    }

    #[test]
    fn test_storage_error_retryable_flag() {
        assert!(matches!(
            KvError::storage(StorageErrorCode::Busy, "busy"),
            KvError::Storage { retryable: true, .. }
        ));
        assert!(matches!(
            KvError::storage(StorageErrorCode::Corrupted, "bad"),
            KvError::Storage { retryable: false, .. }
        ));
    }

    #[test]
    fn test_typed_store_parse() {
        let store: TypedKvStore<Vec<u32>> = TypedKvStore::new(KeyNamespace::Session);
        let value = KvValue::new(b"[1,2,3]".to_vec(), 1, 0).unwrap();
        assert_eq!(
            store.parse_value(KvOutput::Value(Some(value))).unwrap(),
            Some(vec![1, 2, 3])
        );
        assert_eq!(store.parse_value(KvOutput::Value(None)).unwrap(), None);
        assert!(store.parse_value(KvOutput::Written { version: 1 }).is_err());
    }

    #[tokio::test]
    async fn test_memory_kv_versions_and_delete() {
        let kv = MemoryKv::new();
        let set = KvOperation::set(KeyNamespace::Session, "userData", b"{}".to_vec()).unwrap();

        assert_eq!(kv.execute(set.clone()).await.unwrap(), KvOutput::Written { version: 1 });
        assert_eq!(kv.execute(set).await.unwrap(), KvOutput::Written { version: 2 });
        assert_eq!(kv.len().await, 1);

        let delete = KvOperation::delete(KeyNamespace::Session, "userData").unwrap();
        assert_eq!(
            kv.execute(delete.clone()).await.unwrap(),
            KvOutput::Deleted { existed: true }
        );
        assert_eq!(
            kv.execute(delete).await.unwrap(),
            KvOutput::Deleted { existed: false }
        );
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn test_file_kv_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let set = KvOperation::set(KeyNamespace::Session, "userData", b"{\"a\":1}".to_vec()).unwrap();
        FileKv::new(dir.path()).execute(set).await.unwrap();

        let reopened = FileKv::new(dir.path());
        let get = KvOperation::get(KeyNamespace::Session, "userData").unwrap();
        match reopened.execute(get).await.unwrap() {
            KvOutput::Value(Some(value)) => {
                assert_eq!(value.data(), b"{\"a\":1}");
                assert_eq!(value.version(), 1);
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_file_kv_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::new(dir.path().join("not-yet-created"));
        let get = KvOperation::get(KeyNamespace::Session, "userData").unwrap();
        assert_eq!(kv.execute(get).await.unwrap(), KvOutput::Value(None));

        let delete = KvOperation::delete(KeyNamespace::Session, "userData").unwrap();
        assert_eq!(
            kv.execute(delete).await.unwrap(),
            KvOutput::Deleted { existed: false }
        );
    }

    #[tokio::test]
    async fn test_file_kv_corrupted_entry() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::new(dir.path());
        let key = KvKey::new(KeyNamespace::Session, "userData").unwrap();
        tokio::fs::write(kv.path_for(&key), b"not json").await.unwrap();

        let err = kv.execute(KvOperation::Get { key }).await.unwrap_err();
        assert!(matches!(
            err,
            KvError::Storage {
                code: StorageErrorCode::Corrupted,
                ..
            }
        ));
    }
}
