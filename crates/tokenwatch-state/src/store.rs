//! Concurrent device record store

use crate::{DriftState, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use prometheus::Registry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokenwatch_core::{ApplyOutcome, DeviceSnapshot, DeviceState, Sample, SkuResolution, SkuTable};
use tokenwatch_metrics::DeviceMetrics;
use tracing::{debug, info, warn};

/// One device: its state and the collectors it publishes to
#[derive(Debug)]
pub struct DeviceRecord {
    state: Mutex<DeviceState>,
    metrics: DeviceMetrics,
}

impl DeviceRecord {
    fn create(
        gpu_uuid: &str,
        sku: &str,
        resolution: SkuResolution<'_>,
        registry: &Registry,
    ) -> Result<Self> {
        let state = DeviceState::new(gpu_uuid, sku, resolution);
        let metrics = DeviceMetrics::new(gpu_uuid)?;
        metrics.register(registry)?;
        metrics.init(&state);
        Ok(Self {
            state: Mutex::new(state),
            metrics,
        })
    }

    /// Lock the device state; hold the guard only briefly
    pub fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock()
    }

    /// Collectors for this device
    pub fn metrics(&self) -> &DeviceMetrics {
        &self.metrics
    }

    /// Copy of the current readings
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.state.lock().snapshot()
    }
}

/// Store statistics
#[derive(Debug, Default)]
pub struct StoreStats {
    pub devices_created: AtomicU64,
    pub samples_applied: AtomicU64,
    pub sku_fallbacks: AtomicU64,
}

/// All known devices, keyed by device id
#[derive(Debug, Clone)]
pub struct DeviceStore {
    /// Device records indexed by gpu_uuid
    devices: Arc<DashMap<String, Arc<DeviceRecord>>>,

    /// Registry every device registers its collectors with
    registry: Registry,

    /// SKU profiles, bound to a device on creation
    skus: Arc<SkuTable>,

    /// Process-wide drift statistics
    drift: Arc<DriftState>,

    /// Statistics
    stats: Arc<StoreStats>,
}

impl DeviceStore {
    /// Create a store with a fresh registry
    pub fn new(skus: SkuTable) -> Result<Self> {
        Self::with_registry(skus, Registry::new())
    }

    /// Create a store that registers into an existing registry
    pub fn with_registry(skus: SkuTable, registry: Registry) -> Result<Self> {
        let drift = DriftState::new(&registry)?;
        info!(
            sku_profiles = skus.len(),
            default_sku = %skus.default_sku,
            "Device store initialized"
        );
        Ok(Self {
            devices: Arc::new(DashMap::new()),
            registry,
            skus: Arc::new(skus),
            drift: Arc::new(drift),
            stats: Arc::new(StoreStats::default()),
        })
    }

    /// Return the record for `gpu_uuid`, creating it on first sight.
    ///
    /// Creation and metric registration happen while the key's shard is held, so
    /// concurrent first sightings produce a single record. `sku` only matters for
    /// the call that creates the record.
    pub fn get_or_create(&self, gpu_uuid: &str, sku: &str) -> Result<Arc<DeviceRecord>> {
        if let Some(record) = self.devices.get(gpu_uuid) {
            return Ok(Arc::clone(record.value()));
        }

        match self.devices.entry(gpu_uuid.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let resolution = self.skus.resolve(sku);
                if let SkuResolution::Fallback { requested, profile } = resolution {
                    self.stats.sku_fallbacks.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        gpu_uuid = %gpu_uuid,
                        requested_sku = %requested,
                        fallback_sku = %profile.sku,
                        "Unknown SKU, using default profile"
                    );
                }

                let record = DeviceRecord::create(gpu_uuid, sku, resolution, &self.registry)?;
                let record = Arc::new(record);
                entry.insert(Arc::clone(&record));
                self.stats.devices_created.fetch_add(1, Ordering::Relaxed);
                info!(gpu_uuid = %gpu_uuid, sku = %sku, "Tracking new device");
                Ok(record)
            }
        }
    }

    /// Apply a sample to its device and publish the result.
    ///
    /// The device lock is held from the state update through metric publication
    /// and drift bookkeeping.
    pub fn apply(&self, sample: &Sample, sku: &str) -> Result<ApplyOutcome> {
        let record = self.get_or_create(&sample.gpu_uuid, sku)?;
        let mut state = record.lock();

        let previous_health = state.health().status;
        let outcome = state.apply(sample, Instant::now());
        record.metrics.publish(sample, &state);
        if outcome.health != previous_health && !state.health().is_healthy() {
            warn!(
                gpu_uuid = %sample.gpu_uuid,
                health = ?outcome.health,
                failing_checks = ?state.health().failing_checks(),
                "Device health degraded"
            );
        }
        if let Some(reading) = &outcome.drift {
            self.drift.observe(&sample.gpu_uuid, reading);
        }
        drop(state);

        self.stats.samples_applied.fetch_add(1, Ordering::Relaxed);
        debug!(
            gpu_uuid = %sample.gpu_uuid,
            origin = %sample.origin,
            tokens = sample.tokens_processed,
            throughput = ?outcome.throughput,
            "Applied sample"
        );
        Ok(outcome)
    }

    /// Look up a device without creating it
    pub fn get(&self, gpu_uuid: &str) -> Option<Arc<DeviceRecord>> {
        self.devices.get(gpu_uuid).map(|r| Arc::clone(r.value()))
    }

    /// Snapshot of one device, if known
    pub fn snapshot(&self, gpu_uuid: &str) -> Option<DeviceSnapshot> {
        self.get(gpu_uuid).map(|record| record.snapshot())
    }

    /// Ids of every tracked device, sorted
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of tracked devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device has been seen yet
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn skus(&self) -> &SkuTable {
        &self.skus
    }

    pub fn drift(&self) -> &DriftState {
        &self.drift
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokenwatch_core::{HealthStatus, Origin};

    fn store() -> DeviceStore {
        DeviceStore::new(SkuTable::builtin()).unwrap()
    }

    fn family_len(store: &DeviceStore, name: &str) -> usize {
        store
            .registry()
            .gather()
            .into_iter()
            .find(|f| f.get_name() == name)
            .map(|f| f.get_metric().len())
            .unwrap_or(0)
    }

    #[test]
    fn test_get_or_create_binds_sku_once() {
        let store = store();
        let first = store.get_or_create("GPU-1", "H100").unwrap();
        let second = store.get_or_create("GPU-1", "V100").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.lock().sku(), "H100");
        assert_eq!(store.len(), 1);
        assert_eq!(family_len(&store, "gpu_tps"), 1);
    }

    #[test]
    fn test_concurrent_first_sightings_create_one_record() {
        let store = store();
        let records: Vec<Arc<DeviceRecord>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| store.get_or_create("abc", "A100").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(store.len(), 1);
        assert!(records.iter().all(|r| Arc::ptr_eq(r, &records[0])));
        assert_eq!(store.stats().devices_created.load(Ordering::Relaxed), 1);
        assert_eq!(family_len(&store, "gpu_tokens_total"), 1);
    }

    #[test]
    fn test_concurrent_samples_are_all_counted() {
        let store = store();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        let sample = Sample::new("abc", 10, Duration::from_secs(1));
                        store.apply(&sample, "A100").unwrap();
                    }
                });
            }
        });

        let record = store.get("abc").unwrap();
        assert_eq!(record.lock().tokens_total(), 4000);
        assert_eq!(record.metrics().tokens_total.get(), 4000.0);
        assert_eq!(store.stats().samples_applied.load(Ordering::Relaxed), 400);
    }

    #[test]
    fn test_three_vendor_samples() {
        let store = store();
        for tokens in [10, 20, 30] {
            let sample =
                Sample::new("abc", tokens, Duration::from_secs(1)).with_origin(Origin::Vendor);
            store.apply(&sample, "A100").unwrap();
        }

        let record = store.get("abc").unwrap();
        assert_eq!(record.metrics().tokens_total.get(), 60.0);
        assert_eq!(record.metrics().tps.get(), 30.0);
        assert_eq!(record.metrics().tps_1m.get(), 20.0);
    }

    #[test]
    fn test_zero_window_sample() {
        let store = store();
        store.apply(&Sample::new("abc", 1000, Duration::from_secs(1)), "A100").unwrap();
        let outcome = store.apply(&Sample::new("abc", 1000, Duration::ZERO), "A100").unwrap();

        assert!(outcome.throughput.is_none());
        let snapshot = store.snapshot("abc").unwrap();
        assert_eq!(snapshot.current_tps, 1000.0);
        assert_eq!(snapshot.avg_tps_1m, Some(1000.0));
        assert_eq!(snapshot.tokens_total, 2000);
    }

    #[test]
    fn test_drift_flows_to_process_state() {
        let store = store();
        let vendor = Sample::new("abc", 1020, Duration::from_secs(1)).with_origin(Origin::Vendor);
        let inference =
            Sample::new("abc", 980, Duration::from_secs(1)).with_origin(Origin::Inference);
        store.apply(&vendor, "A100").unwrap();
        store.apply(&inference, "A100").unwrap();

        assert_eq!(store.drift().events(), 0);
        assert_eq!(store.drift().last_accuracy(), Some(98.0));

        let skewed = Sample::new("abc", 1100, Duration::from_secs(1)).with_origin(Origin::Vendor);
        store.apply(&skewed, "A100").unwrap();
        assert_eq!(store.drift().events(), 1);
    }

    #[test]
    fn test_unknown_sku_falls_back() {
        let store = store();
        let record = store.get_or_create("GPU-9", "MI300X").unwrap();

        assert!(record.lock().is_sku_fallback());
        assert_eq!(record.metrics().sku_fallback.get(), 1.0);
        assert_eq!(store.stats().sku_fallbacks.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_lookup_does_not_create() {
        let store = store();
        assert!(store.get("missing").is_none());
        assert!(store.snapshot("missing").is_none());
        assert!(store.is_empty());

        store.get_or_create("b", "A100").unwrap();
        store.get_or_create("a", "A100").unwrap();
        assert_eq!(store.device_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_overheated_device_is_critical() {
        let store = store();
        let sample = Sample::new("hot", 100, Duration::from_secs(1)).with_temperature(90.0);
        let outcome = store.apply(&sample, "A100").unwrap();

        assert_eq!(outcome.health, HealthStatus::Critical);
        let record = store.get("hot").unwrap();
        assert_eq!(record.metrics().health_status.get(), 0.0);
        assert_eq!(record.lock().health().failing_checks(), vec!["temperature"]);
    }
}
