use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use chrono::Utc;
use matchcast::data_access::FeatureRecord;
use matchcast::feature_cache::{FeatureCache, FeatureSource};
use matchcast::league::{League, Season};

/// Counts compute calls and can be told to start failing, so the tests
/// can observe exactly when the cache goes back to the source.
struct CountingSource {
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl CountingSource {
    fn new() -> Arc<Self> {
        Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeatureSource for CountingSource {
    fn compute(&self, league: League) -> Result<Vec<FeatureRecord>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            bail!("feed unavailable");
        }
        // The call counter doubles as the win percentage so each
        // computed generation is distinguishable.
        Ok(vec![FeatureRecord::new(
            league.code().len() as i64,
            Season::CURRENT.as_int(),
            league,
            call as f64,
            0.5,
            Utc::now(),
        )])
    }
}

fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn cold_read_fills_synchronously_once() {
    let source = CountingSource::new();
    let cache = FeatureCache::new(source.clone());

    let table = cache.get_or_refresh(League::Epl).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(source.calls(), 1);

    // Fresh reads are pure cache hits.
    for _ in 0..5 {
        let again = cache.get_or_refresh(League::Epl).unwrap();
        assert_eq!(again[0].win_percentage, 1.0);
    }
    assert_eq!(source.calls(), 1);
}

#[test]
fn cold_fill_failure_propagates_and_next_read_retries() {
    let source = CountingSource::new();
    source.fail.store(true, Ordering::SeqCst);
    let cache = FeatureCache::new(source.clone());

    assert!(cache.get_or_refresh(League::Epl).is_err());
    assert_eq!(source.calls(), 1);

    source.fail.store(false, Ordering::SeqCst);
    assert!(cache.get_or_refresh(League::Epl).is_ok());
    assert_eq!(source.calls(), 2);
}

#[test]
fn stale_read_serves_old_table_and_refreshes_in_background() {
    let source = CountingSource::new();
    let cache = FeatureCache::with_ttl(source.clone(), Duration::from_millis(200));

    let first = cache.get_or_refresh(League::Epl).unwrap();
    assert_eq!(first[0].win_percentage, 1.0);
    std::thread::sleep(Duration::from_millis(250));

    // Stale reads return immediately with generation 1 while a single
    // refresh recomputes off-thread; repeated stale reads do not stack
    // additional refreshes.
    for _ in 0..3 {
        let stale = cache.get_or_refresh(League::Epl).unwrap();
        assert!(stale[0].win_percentage >= 1.0);
    }

    assert!(wait_for(Duration::from_secs(5), || {
        cache
            .get_or_refresh(League::Epl)
            .map(|t| t[0].win_percentage == 2.0)
            .unwrap_or(false)
    }));
    assert_eq!(source.calls(), 2);
}

#[test]
fn failed_refresh_keeps_serving_stale_and_allows_retry() {
    let source = CountingSource::new();
    let cache = FeatureCache::with_ttl(source.clone(), Duration::from_millis(30));

    cache.get_or_refresh(League::Epl).unwrap();
    source.fail.store(true, Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(50));

    let stale = cache.get_or_refresh(League::Epl).unwrap();
    assert_eq!(stale[0].win_percentage, 1.0);

    // The failed attempt releases the in-flight flag.
    assert!(wait_for(Duration::from_secs(5), || source.calls() >= 2));
    source.fail.store(false, Ordering::SeqCst);

    assert!(wait_for(Duration::from_secs(5), || {
        // Still serving generation 1 until a retry lands.
        cache
            .get_or_refresh(League::Epl)
            .map(|t| t[0].win_percentage > 1.0)
            .unwrap_or(false)
    }));
}

#[test]
fn leagues_are_cached_independently() {
    let source = CountingSource::new();
    let cache = FeatureCache::new(source.clone());

    let epl = cache.get_or_refresh(League::Epl).unwrap();
    let bundesliga = cache.get_or_refresh(League::Bundesliga).unwrap();
    assert_eq!(source.calls(), 2);
    assert_eq!(epl[0].league, League::Epl);
    assert_eq!(bundesliga[0].league, League::Bundesliga);

    // A hit on one league never recomputes the other.
    cache.get_or_refresh(League::Epl).unwrap();
    cache.get_or_refresh(League::Bundesliga).unwrap();
    assert_eq!(source.calls(), 2);
}

#[test]
fn warm_up_fills_every_requested_league() {
    let source = CountingSource::new();
    let cache = FeatureCache::new(source.clone());
    cache.warm_up(&[League::Epl, League::Bundesliga]);
    assert_eq!(source.calls(), 2);
    assert!(cache.get_or_refresh(League::Epl).is_ok());
    assert_eq!(source.calls(), 2);
}
