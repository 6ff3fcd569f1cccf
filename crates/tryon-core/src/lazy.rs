//! Lazily loaded, process-wide model slots.
//!
//! A [`LazyModel`] lives in a `static`. The first caller triggers the load on
//! the blocking pool; concurrent callers await the same load. A failed load
//! leaves the slot empty so the next call retries, and [`LazyModel::dispose`]
//! drops the model so the next call loads it again.

use crate::provider::ProviderError;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::OnceCell;

type Slot<M> = Arc<OnceCell<Arc<M>>>;

pub struct LazyModel<M> {
    name: &'static str,
    slot: Mutex<Option<Slot<M>>>,
}

impl<M: Send + Sync + 'static> LazyModel<M> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn cell(&self) -> Slot<M> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.get_or_insert_with(|| Arc::new(OnceCell::new())).clone()
    }

    /// Return the loaded model, running `load` on the blocking pool if needed.
    pub async fn get_or_load<F>(&self, load: F) -> Result<Arc<M>, ProviderError>
    where
        F: FnOnce() -> Result<M, ProviderError> + Send + 'static,
    {
        let cell = self.cell();
        let name = self.name;
        let model = cell
            .get_or_try_init(|| async move {
                let start = Instant::now();
                let model = tokio::task::spawn_blocking(load)
                    .await
                    .map_err(|e| ProviderError::Load(format!("{name}: loader task failed: {e}")))??;
                tracing::info!(
                    model = name,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "model ready"
                );
                Ok::<_, ProviderError>(Arc::new(model))
            })
            .await?;
        Ok(Arc::clone(model))
    }

    pub fn is_loaded(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|cell| cell.initialized())
    }

    /// Drop the loaded model. Loads already in flight finish for their callers
    /// but are not kept.
    pub fn dispose(&self) {
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            tracing::debug!(model = self.name, "model disposed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_first_calls_share_one_load() {
        let slot: LazyModel<u32> = LazyModel::new("test");
        let loads = Arc::new(AtomicUsize::new(0));

        let make_loader = |loads: Arc<AtomicUsize>| {
            move || {
                loads.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(20));
                Ok(7)
            }
        };

        let (a, b) = tokio::join!(
            slot.get_or_load(make_loader(loads.clone())),
            slot.get_or_load(make_loader(loads.clone())),
        );
        assert_eq!(*a.unwrap(), 7);
        assert_eq!(*b.unwrap(), 7);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(slot.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_retries() {
        let slot: LazyModel<u32> = LazyModel::new("test");
        let err = slot
            .get_or_load(|| Err(ProviderError::ModelNotFound("missing.onnx".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::ModelNotFound(_)));
        assert!(!slot.is_loaded());

        let model = slot.get_or_load(|| Ok(3)).await.unwrap();
        assert_eq!(*model, 3);
    }

    #[tokio::test]
    async fn test_dispose_forces_reload() {
        let slot: LazyModel<u32> = LazyModel::new("test");
        slot.get_or_load(|| Ok(1)).await.unwrap();
        slot.dispose();
        assert!(!slot.is_loaded());
        let model = slot.get_or_load(|| Ok(2)).await.unwrap();
        assert_eq!(*model, 2);
    }
}
