mod http;
mod kv;

pub use self::http::{
    HttpClient, HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse,
    HttpResult, ReqwestClient, ValidatedUrl,
};
pub use self::kv::{
    FileKv, KeyNamespace, KvError, KvKey, KvOperation, KvOutput, KvResult, KvStore, KvValue,
    MemoryKv, StorageErrorCode, TypedKvStore,
};

use chrono::{DateTime, Local};
use std::sync::Arc;

/// Source of wall-clock time for eligibility evaluation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Everything the shell runtime needs to execute effects.
#[derive(Clone)]
pub struct Capabilities {
    pub http: Arc<dyn HttpClient>,
    pub kv: Arc<dyn KvStore>,
    pub clock: Arc<dyn Clock>,
}

impl Capabilities {
    pub fn new(http: Arc<dyn HttpClient>, kv: Arc<dyn KvStore>, clock: Arc<dyn Clock>) -> Self {
        Self { http, kv, clock }
    }

    /// reqwest over rustls, a file-backed profile cache, and the system clock.
    pub fn production(kv_root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            http: Arc::new(ReqwestClient::default()),
            kv: Arc::new(FileKv::new(kv_root)),
            clock: Arc::new(SystemClock),
        }
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}
