//! Periodic feed polling and snapshot publication.
//!
//! A single [`FeedPoller`] fetches on a fixed interval and publishes each
//! successful cycle into a [`SnapshotStore`] as one unit. Failed cycles are
//! logged and leave the previous snapshot in place.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::fetch::{FetchError, HttpClient, RealtimeFeedClient};
use crate::vehicle::VehicleRecord;

/// Matches the map's refresh cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything that can produce one cycle's worth of vehicle records.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<VehicleRecord>, FetchError>;
}

#[async_trait]
impl<C: HttpClient> FeedSource for RealtimeFeedClient<C> {
    async fn fetch(&self) -> Result<Vec<VehicleRecord>, FetchError> {
        RealtimeFeedClient::fetch(self).await
    }
}

/// All vehicle records from one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// 0 until the first successful cycle.
    pub cycle: u64,
    pub fetched_at: Option<DateTime<Utc>>,
    pub records: Vec<VehicleRecord>,
}

/// The latest published [`Snapshot`], shared between the poller and readers.
///
/// Publishing swaps one `Arc` under the write lock; readers clone the `Arc`
/// and keep a consistent snapshot for as long as they hold it.
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    current: Arc<RwLock<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn latest(&self) -> Arc<Snapshot> {
        self.current.read().await.clone()
    }

    pub async fn publish(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        *self.current.write().await = snapshot;
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    Published { cycle: u64, vehicles: usize },
    Failed(FetchError),
    /// A previous fetch was still outstanding.
    Skipped,
}

/// Clears the in-flight flag on drop, including when the tick is cancelled.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct FeedPoller<S> {
    source: S,
    store: SnapshotStore,
    interval: Duration,
    fetch_timeout: Duration,
    in_flight: AtomicBool,
    cycle: AtomicU64,
}

impl<S: FeedSource> FeedPoller<S> {
    pub fn new(source: S, store: SnapshotStore) -> Self {
        Self {
            source,
            store,
            interval: DEFAULT_POLL_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            in_flight: AtomicBool::new(false),
            cycle: AtomicU64::new(0),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs one poll cycle: Idle → Fetching → Published | Failed → Idle.
    ///
    /// Returns [`TickOutcome::Skipped`] without fetching if another cycle is
    /// still in flight.
    pub async fn tick(&self) -> TickOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("Fetch still in flight, skipping tick");
            return TickOutcome::Skipped;
        };

        let result = match tokio::time::timeout(self.fetch_timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::NetworkFailure {
                detail: format!("fetch timed out after {:?}", self.fetch_timeout),
            }),
        };

        match result {
            Ok(records) => {
                let cycle = self.cycle.fetch_add(1, Ordering::Relaxed) + 1;
                let vehicles = records.len();
                self.store
                    .publish(Snapshot {
                        cycle,
                        fetched_at: Some(Utc::now()),
                        records,
                    })
                    .await;
                info!(cycle, vehicles, "Snapshot published");
                TickOutcome::Published { cycle, vehicles }
            }
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Poll cycle failed, keeping previous snapshot");
                TickOutcome::Failed(e)
            }
        }
    }

    /// Polls every `interval` until `shutdown` turns true or its sender is
    /// dropped. Shutdown during a fetch abandons that fetch.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            fetch_timeout_ms = self.fetch_timeout.as_millis() as u64,
            "Starting feed poller"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Shutdown requested, abandoning in-flight fetch");
                    break;
                }
                _ = self.tick() => {}
            }
        }

        info!("Feed poller stopped");
    }
}

pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    // A dropped sender also means shutdown
    let _ = rx.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn record(id: &str, lat: f64) -> VehicleRecord {
        VehicleRecord {
            id: id.to_string(),
            lat,
            lon: -lat,
            heading: 0.0,
            route_id: Some("10".to_string()),
            direction_id: None,
        }
    }

    /// Replays scripted results, then keeps returning empty snapshots.
    struct ScriptedSource {
        results: Mutex<Vec<Result<Vec<VehicleRecord>, FetchError>>>,
    }

    impl ScriptedSource {
        fn new(mut results: Vec<Result<Vec<VehicleRecord>, FetchError>>) -> Self {
            results.reverse();
            Self {
                results: Mutex::new(results),
            }
        }
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn fetch(&self) -> Result<Vec<VehicleRecord>, FetchError> {
            self.results.lock().unwrap().pop().unwrap_or(Ok(Vec::new()))
        }
    }

    #[derive(Default)]
    struct Counters {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    /// Takes `delay` per fetch and tracks how many fetches overlap.
    struct SlowSource {
        delay: Duration,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl FeedSource for SlowSource {
        async fn fetch(&self) -> Result<Vec<VehicleRecord>, FetchError> {
            let c = &self.counters;
            c.calls.fetch_add(1, Ordering::SeqCst);
            let now = c.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            c.max_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(self.delay).await;

            c.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![record("slow", 1.0)])
        }
    }

    #[tokio::test]
    async fn test_tick_publishes_snapshot() {
        let store = SnapshotStore::new();
        let poller = FeedPoller::new(
            ScriptedSource::new(vec![Ok(vec![record("a", 1.0), record("b", 2.0)])]),
            store.clone(),
        );

        assert_eq!(store.latest().await.cycle, 0);
        assert!(matches!(
            poller.tick().await,
            TickOutcome::Published { cycle: 1, vehicles: 2 }
        ));

        let snapshot = store.latest().await;
        assert_eq!(snapshot.cycle, 1);
        assert!(snapshot.fetched_at.is_some());
        assert_eq!(snapshot.records.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_snapshot() {
        let store = SnapshotStore::new();
        let poller = FeedPoller::new(
            ScriptedSource::new(vec![
                Ok(vec![record("a", 1.0)]),
                Err(FetchError::UpstreamError {
                    status: 502,
                    detail: "bad gateway".into(),
                }),
                Ok(vec![record("b", 2.0), record("c", 3.0)]),
            ]),
            store.clone(),
        );

        poller.tick().await;
        let outcome = poller.tick().await;
        assert!(matches!(
            outcome,
            TickOutcome::Failed(FetchError::UpstreamError { status: 502, .. })
        ));

        let snapshot = store.latest().await;
        assert_eq!(snapshot.cycle, 1);
        assert_eq!(snapshot.records[0].id, "a");

        // Self-healing on the next cycle
        assert!(matches!(
            poller.tick().await,
            TickOutcome::Published { cycle: 2, vehicles: 2 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_fetch_in_flight() {
        let counters = Arc::new(Counters::default());
        let poller = Arc::new(
            FeedPoller::new(
                SlowSource {
                    delay: Duration::from_secs(8),
                    counters: counters.clone(),
                },
                SnapshotStore::new(),
            )
            .with_fetch_timeout(Duration::from_secs(60)),
        );

        let first = tokio::spawn({
            let poller = poller.clone();
            async move { poller.tick().await }
        });
        while !poller.is_fetching() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(poller.tick().await, TickOutcome::Skipped));
        assert!(matches!(
            first.await.unwrap(),
            TickOutcome::Published { cycle: 1, .. }
        ));

        assert_eq!(counters.calls.load(Ordering::SeqCst), 1);
        assert_eq!(counters.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(!poller.is_fetching());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout_counts_as_network_failure() {
        let poller = FeedPoller::new(
            SlowSource {
                delay: Duration::from_secs(30),
                counters: Arc::default(),
            },
            SnapshotStore::new(),
        )
        .with_fetch_timeout(Duration::from_secs(1));

        assert!(matches!(
            poller.tick().await,
            TickOutcome::Failed(FetchError::NetworkFailure { .. })
        ));
        assert!(!poller.is_fetching());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_polls_on_interval_until_shutdown() {
        let counters = Arc::new(Counters::default());
        let poller = Arc::new(
            FeedPoller::new(
                SlowSource {
                    delay: Duration::ZERO,
                    counters: counters.clone(),
                },
                SnapshotStore::new(),
            )
            .with_interval(Duration::from_secs(5)),
        );
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn({
            let poller = poller.clone();
            async move { poller.run(rx).await }
        });

        // Ticks at 0s, 5s and 10s
        tokio::time::sleep(Duration::from_secs(12)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(counters.calls.load(Ordering::SeqCst), 3);
        assert_eq!(poller.store().latest().await.cycle, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_in_flight_fetch() {
        let counters = Arc::new(Counters::default());
        let poller = Arc::new(
            FeedPoller::new(
                SlowSource {
                    delay: Duration::from_secs(3600),
                    counters: counters.clone(),
                },
                SnapshotStore::new(),
            )
            .with_fetch_timeout(Duration::from_secs(7200)),
        );
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn({
            let poller = poller.clone();
            async move { poller.run(rx).await }
        });
        while !poller.is_fetching() {
            tokio::task::yield_now().await;
        }

        drop(tx);
        handle.await.unwrap();

        assert!(!poller.is_fetching());
        assert_eq!(poller.store().latest().await.cycle, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_readers_never_see_mixed_snapshots() {
        const VEHICLES: usize = 50;
        const CYCLES: u64 = 500;

        let store = SnapshotStore::new();

        let writer = tokio::spawn({
            let store = store.clone();
            async move {
                for cycle in 1..=CYCLES {
                    let records = (0..VEHICLES)
                        .map(|i| record(&format!("{cycle}-{i}"), cycle as f64))
                        .collect();
                    store
                        .publish(Snapshot {
                            cycle,
                            fetched_at: Some(Utc::now()),
                            records,
                        })
                        .await;
                    tokio::task::yield_now().await;
                }
            }
        });

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut observed = 0u64;
                    loop {
                        let snapshot = store.latest().await;
                        if snapshot.cycle > 0 {
                            assert_eq!(snapshot.records.len(), VEHICLES);
                            assert!(
                                snapshot
                                    .records
                                    .iter()
                                    .all(|r| r.lat == snapshot.cycle as f64)
                            );
                        }
                        observed = observed.max(snapshot.cycle);
                        if observed == CYCLES {
                            break;
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
    }
}
