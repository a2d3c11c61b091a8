use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use rayon::ThreadPool;
use tracing::{info, warn};

use crate::data_access::FeatureRecord;
use crate::league::League;

/// Cache entries expire after a day; stale reads get the old table back
/// immediately while a background recompute replaces it.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const REFRESH_THREADS: usize = 2;

/// Produces the current-season feature table for one league, however
/// expensively. The cache is the only caller on the serving path.
pub trait FeatureSource: Send + Sync {
    fn compute(&self, league: League) -> Result<Vec<FeatureRecord>>;
}

#[derive(Clone)]
struct CachedTable {
    records: Arc<Vec<FeatureRecord>>,
    stored_at: Instant,
}

struct LeagueSlot {
    value: Mutex<Option<CachedTable>>,
    refreshing: AtomicBool,
}

/// Process-wide, time-expiring cache of derived feature tables, keyed
/// by league. Owned by the composition root and injected where
/// predictions are served; there is no ambient global state.
///
/// Entries are replaced wholesale: a reader sees the fully-old or
/// fully-new table, never a partial one. Leagues are independent;
/// refreshing one neither blocks nor invalidates another.
pub struct FeatureCache {
    source: Arc<dyn FeatureSource>,
    ttl: Duration,
    slots: Mutex<HashMap<League, Arc<LeagueSlot>>>,
    pool: Option<ThreadPool>,
}

impl FeatureCache {
    pub fn new(source: Arc<dyn FeatureSource>) -> Self {
        Self::with_ttl(source, DEFAULT_TTL)
    }

    pub fn with_ttl(source: Arc<dyn FeatureSource>, ttl: Duration) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(REFRESH_THREADS)
            .build()
            .ok();
        FeatureCache {
            source,
            ttl,
            slots: Mutex::new(HashMap::new()),
            pool,
        }
    }

    /// The only entry point. Returns the current-season feature table
    /// for the league; computes synchronously only when the cache holds
    /// nothing, serves stale data otherwise while refreshing off-thread
    /// at most once per staleness detection.
    pub fn get_or_refresh(&self, league: League) -> Result<Arc<Vec<FeatureRecord>>> {
        let slot = self.slot(league);
        let mut value = slot.value.lock().expect("cache entry lock poisoned");
        if let Some(table) = value.as_ref() {
            let records = table.records.clone();
            if table.stored_at.elapsed() < self.ttl {
                return Ok(records);
            }
            if slot
                .refreshing
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                self.spawn_refresh(league, slot.clone());
            }
            return Ok(records);
        }

        // Cold fill: the triggering reader pays the computation while
        // holding the per-league entry lock, so concurrent readers of
        // the same league wait for the fill instead of recomputing.
        let records = Arc::new(self.source.compute(league)?);
        *value = Some(CachedTable {
            records: records.clone(),
            stored_at: Instant::now(),
        });
        info!(%league, rows = records.len(), "feature cache filled");
        Ok(records)
    }

    /// Eagerly fills the cache for a set of leagues, logging failures
    /// instead of aborting the remaining warm-ups.
    pub fn warm_up(&self, leagues: &[League]) {
        for league in leagues {
            if let Err(err) = self.get_or_refresh(*league) {
                warn!(league = %league, error = %err, "cache warm-up failed");
            }
        }
    }

    fn slot(&self, league: League) -> Arc<LeagueSlot> {
        let mut slots = self.slots.lock().expect("cache slot map lock poisoned");
        slots
            .entry(league)
            .or_insert_with(|| {
                Arc::new(LeagueSlot {
                    value: Mutex::new(None),
                    refreshing: AtomicBool::new(false),
                })
            })
            .clone()
    }

    fn spawn_refresh(&self, league: League, slot: Arc<LeagueSlot>) {
        let source = self.source.clone();
        let job = move || {
            match source.compute(league) {
                Ok(records) => {
                    let mut value = slot.value.lock().expect("cache entry lock poisoned");
                    *value = Some(CachedTable {
                        records: Arc::new(records),
                        stored_at: Instant::now(),
                    });
                    info!(%league, "feature cache refreshed");
                }
                Err(err) => {
                    // The stale table stays in place; the next stale
                    // read triggers another attempt.
                    warn!(%league, error = %err, "background feature refresh failed");
                }
            }
            slot.refreshing.store(false, Ordering::Release);
        };
        match &self.pool {
            Some(pool) => pool.spawn(job),
            None => {
                std::thread::spawn(job);
            }
        }
    }
}
