//! Process-scoped model cache.
//!
//! Holds zero or one loaded model for the lifetime of the execution
//! environment. Warm reads go through a `OnceLock` and take no lock; cold
//! loads are serialized by an async mutex so that concurrent callers coalesce
//! onto a single load.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::PredictError;

pub struct ModelCache<T> {
    ready: OnceLock<Arc<T>>,
    /// Load guard; also remembers a fatal load failure.
    load_state: Mutex<Option<PredictError>>,
    loads: AtomicU64,
}

impl<T> ModelCache<T> {
    pub fn new() -> Self {
        Self {
            ready: OnceLock::new(),
            load_state: Mutex::new(None),
            loads: AtomicU64::new(0),
        }
    }

    /// Return the cached handle, invoking `loader` only when nothing is
    /// cached yet.
    ///
    /// - Callers blocked behind an in-flight load observe its result instead
    ///   of loading again.
    /// - Fatal failures are memoized and returned without calling `loader`.
    /// - Transient failures are returned but not remembered.
    pub async fn get_or_load<F, Fut>(&self, loader: F) -> Result<Arc<T>, PredictError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PredictError>>,
    {
        if let Some(handle) = self.ready.get() {
            return Ok(Arc::clone(handle));
        }

        let mut failure = self.load_state.lock().await;

        // Another caller may have finished the load while we waited.
        if let Some(handle) = self.ready.get() {
            return Ok(Arc::clone(handle));
        }
        if let Some(err) = failure.as_ref() {
            return Err(err.clone());
        }

        self.loads.fetch_add(1, Ordering::Relaxed);
        match loader().await {
            Ok(value) => {
                let handle = Arc::new(value);
                // Only this task can be here while the guard is held.
                let _ = self.ready.set(Arc::clone(&handle));
                Ok(handle)
            }
            Err(err) => {
                if err.is_fatal() {
                    warn!(kind = %err.kind(), "model load failed permanently: {}", err);
                    *failure = Some(err.clone());
                } else {
                    warn!(kind = %err.kind(), "model load failed, next call retries: {}", err);
                }
                Err(err)
            }
        }
    }

    /// Cached handle, if loaded
    pub fn get(&self) -> Option<Arc<T>> {
        self.ready.get().cloned()
    }

    pub fn is_warm(&self) -> bool {
        self.ready.get().is_some()
    }

    /// Number of times the loader has been invoked
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Drop the cached handle and any remembered failure
    pub fn teardown(&mut self) {
        let had_model = self.ready.take().is_some();
        *self.load_state.get_mut() = None;
        info!(had_model, loads = self.load_count(), "model cache torn down");
    }
}

impl<T> Default for ModelCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cold_callers_coalesce_onto_one_load() {
        let cache = Arc::new(ModelCache::<String>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_load(|| async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok("model".to_string())
                        })
                        .await
                })
            })
            .collect();

        for handle in futures::future::join_all(tasks).await {
            assert_eq!(handle.unwrap().unwrap().as_str(), "model");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.load_count(), 1);
        assert!(cache.is_warm());
    }

    #[tokio::test]
    async fn fatal_failure_is_memoized() {
        let cache = ModelCache::<String>::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let err = cache
                .get_or_load(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(PredictError::ArtifactNotFound("model.json".to_string()))
                })
                .await
                .unwrap_err();
            assert_eq!(err, PredictError::ArtifactNotFound("model.json".to_string()));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.is_warm());
    }

    #[tokio::test]
    async fn transient_failure_is_retried_on_next_call() {
        let cache = ModelCache::<u32>::new();

        let err = cache
            .get_or_load(|| async {
                Err(PredictError::FetchTimeout {
                    reference: "blob://m".to_string(),
                    elapsed_ms: 10,
                })
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let value = cache.get_or_load(|| async { Ok(7) }).await.unwrap();
        assert_eq!(*value, 7);
        assert_eq!(cache.load_count(), 2);

        // Warm: the loader is not consulted again.
        let value = cache.get_or_load(|| async { Ok(99) }).await.unwrap();
        assert_eq!(*value, 7);
        assert_eq!(cache.load_count(), 2);
    }

    #[tokio::test]
    async fn teardown_resets_state() {
        let mut cache = ModelCache::<u32>::new();
        cache.get_or_load(|| async { Ok(1) }).await.unwrap();
        assert!(cache.is_warm());

        cache.teardown();
        assert!(!cache.is_warm());
        assert!(cache.get().is_none());

        let value = cache.get_or_load(|| async { Ok(2) }).await.unwrap();
        assert_eq!(*value, 2);
    }
}
