//! Batched target-rate lookup with a per-item-set cache.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::domain::document::{ItemId, LineItem};
use crate::domain::target_rate::TargetRateMap;
use crate::gateway::{decode_target_rates, TargetRateRequest, TargetRateSource};

/// Sorted, deduplicated ids of the pending items a lookup covers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TargetRateKey(Vec<ItemId>);

impl TargetRateKey {
    pub fn new(item_ids: impl IntoIterator<Item = ItemId>) -> Self {
        let unique: BTreeSet<ItemId> = item_ids.into_iter().collect();
        Self(unique.into_iter().collect())
    }

    /// Key over the pending items only; decided items never need a benchmark.
    pub fn for_pending<'a>(items: impl IntoIterator<Item = &'a LineItem>) -> Self {
        Self::new(items.into_iter().filter(|item| item.is_pending()).map(|item| item.item_id.clone()))
    }

    pub fn item_ids(&self) -> &[ItemId] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetRateResolution {
    pub key: TargetRateKey,
    pub rates: Arc<TargetRateMap>,
    /// Set when the lookup failed; the review stays usable without benchmarks.
    pub warning: Option<String>,
}

impl TargetRateResolution {
    pub fn empty() -> Self {
        Self { key: TargetRateKey::default(), rates: Arc::new(TargetRateMap::default()), warning: None }
    }
}

pub struct TargetRateResolver {
    source: Arc<dyn TargetRateSource>,
    cache: Mutex<HashMap<TargetRateKey, Arc<TargetRateMap>>>,
    fetches: AtomicU64,
}

impl TargetRateResolver {
    pub fn new(source: Arc<dyn TargetRateSource>) -> Self {
        Self { source, cache: Mutex::new(HashMap::new()), fetches: AtomicU64::new(0) }
    }

    /// Number of requests issued to the source so far.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    pub async fn resolve<'a>(
        &self,
        items: impl IntoIterator<Item = &'a LineItem>,
    ) -> TargetRateResolution {
        let key = TargetRateKey::for_pending(items);
        if key.is_empty() {
            return TargetRateResolution { key, ..TargetRateResolution::empty() };
        }

        if let Some(rates) = self.cached(&key) {
            return TargetRateResolution { key, rates, warning: None };
        }

        self.fetches.fetch_add(1, Ordering::Relaxed);
        let request = TargetRateRequest { item_ids: key.item_ids().to_vec() };
        match self.source.fetch_target_rates(&request).await {
            Ok(records) => {
                let rates = Arc::new(decode_target_rates(records, key.item_ids()));
                debug!(
                    event_name = "target_rate.resolved",
                    requested = key.item_ids().len(),
                    with_rate = rates.iter().filter(|detail| detail.rate.is_some()).count(),
                    "target rates resolved"
                );
                self.store(key.clone(), Arc::clone(&rates));
                TargetRateResolution { key, rates, warning: None }
            }
            Err(error) => {
                warn!(
                    event_name = "target_rate.fetch_failed",
                    requested = key.item_ids().len(),
                    error = %error,
                    "target rate lookup failed; continuing without benchmarks"
                );
                TargetRateResolution {
                    key,
                    rates: Arc::new(TargetRateMap::default()),
                    warning: Some(format!("target rates are unavailable: {error}")),
                }
            }
        }
    }

    /// Forgets cached lookups, e.g. after an approval added new history.
    pub fn invalidate(&self) {
        match self.cache.lock() {
            Ok(mut cache) => cache.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    fn cached(&self, key: &TargetRateKey) -> Option<Arc<TargetRateMap>> {
        match self.cache.lock() {
            Ok(cache) => cache.get(key).cloned(),
            Err(poisoned) => poisoned.into_inner().get(key).cloned(),
        }
    }

    fn store(&self, key: TargetRateKey, rates: Arc<TargetRateMap>) {
        match self.cache.lock() {
            Ok(mut cache) => cache.insert(key, rates),
            Err(poisoned) => poisoned.into_inner().insert(key, rates),
        };
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{TargetRateKey, TargetRateResolver};
    use crate::domain::document::{ItemId, ItemStatus, LineItem};
    use crate::gateway::{GatewayError, TargetRateRecord, TargetRateRequest, TargetRateSource};

    #[derive(Default)]
    struct RecordingSource {
        calls: AtomicUsize,
        fail: AtomicBool,
        requests: Mutex<Vec<Vec<ItemId>>>,
    }

    #[async_trait]
    impl TargetRateSource for RecordingSource {
        async fn fetch_target_rates(
            &self,
            request: &TargetRateRequest,
        ) -> Result<Vec<TargetRateRecord>, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().expect("requests lock").push(request.item_ids.clone());
            if self.fail.load(Ordering::SeqCst) {
                return Err(GatewayError::Unavailable("rate service down".to_string()));
            }
            Ok(request
                .item_ids
                .iter()
                .map(|id| TargetRateRecord {
                    item_id: id.0.clone(),
                    rate: json!("100"),
                    selected_quotations_items: Vec::new(),
                })
                .collect())
        }
    }

    fn pending(id: &str) -> LineItem {
        LineItem::pending(id, Decimal::ONE, "nos")
    }

    #[test]
    fn key_is_sorted_and_deduplicated() {
        let a = TargetRateKey::new(["B", "A", "B"].map(|id| ItemId(id.to_string())));
        let b = TargetRateKey::new(["A", "B"].map(|id| ItemId(id.to_string())));
        assert_eq!(a, b);
        assert_eq!(a.item_ids().len(), 2);
    }

    #[tokio::test]
    async fn same_item_set_in_any_order_fetches_once() {
        let source = Arc::new(RecordingSource::default());
        let resolver = TargetRateResolver::new(source.clone());

        let first = resolver.resolve(&[pending("B"), pending("A")]).await;
        let second = resolver.resolve(&[pending("A"), pending("B"), pending("A")]).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.fetch_count(), 1);
        assert_eq!(first.rates, second.rates);
        assert_eq!(
            source.requests.lock().expect("requests lock")[0],
            vec![ItemId("A".to_string()), ItemId("B".to_string())]
        );
    }

    #[tokio::test]
    async fn only_pending_items_are_requested() {
        let source = Arc::new(RecordingSource::default());
        let resolver = TargetRateResolver::new(source.clone());
        let mut approved = pending("DONE");
        approved.status = ItemStatus::Approved;

        let resolution = resolver.resolve(&[approved.clone(), pending("A")]).await;
        assert_eq!(resolution.key.item_ids(), &[ItemId("A".to_string())]);

        let nothing = resolver.resolve(&[approved]).await;
        assert!(nothing.rates.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_degrades_to_empty_map_and_is_not_cached() {
        let source = Arc::new(RecordingSource::default());
        source.fail.store(true, Ordering::SeqCst);
        let resolver = TargetRateResolver::new(source.clone());

        let degraded = resolver.resolve(&[pending("A")]).await;
        assert!(degraded.rates.is_empty());
        assert!(degraded.warning.as_deref().is_some_and(|warning| warning.contains("unavailable")));

        source.fail.store(false, Ordering::SeqCst);
        let recovered = resolver.resolve(&[pending("A")]).await;
        assert_eq!(recovered.warning, None);
        assert_eq!(recovered.rates.rate_for(&ItemId("A".to_string())), Some(Decimal::from(100)));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_fetch() {
        let source = Arc::new(RecordingSource::default());
        let resolver = TargetRateResolver::new(source.clone());

        resolver.resolve(&[pending("A")]).await;
        resolver.invalidate();
        resolver.resolve(&[pending("A")]).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
