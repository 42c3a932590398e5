use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

// Storage keys share this prefix so entries are easy to spot in a dump
const STORAGE_PREFIX: &str = "rate_limit_";

// Durations as epoch-millis offsets, clamped instead of wrapping
fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

fn remaining_ms(until: i64, now: i64) -> u64 {
    u64::try_from(until.saturating_sub(now)).unwrap_or(0)
}

// Rate limit record - one per action key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRecord {
    pub count: u32,
    pub reset_time: i64,
    #[serde(default)]
    pub cooldown_until: i64,
}

impl RateLimitRecord {
    // Default for a key nobody has touched: no attempts, no active window
    fn fresh(now: i64) -> Self {
        Self {
            count: 0,
            reset_time: now,
            cooldown_until: 0,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write rate limit store {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode rate limit store: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Key-value storage for rate limit records.
///
/// Values are the raw encoded strings, so a corrupt entry is visible to the
/// limiter and can be treated as missing.
pub trait RateLimitStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

// In-memory store, state is gone on restart
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store persisted as a single JSON object on disk.
///
/// The whole file is loaded once. `set` only updates memory and marks the
/// store dirty; `flush` writes the file. A missing or unreadable file starts
/// empty.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
    dirty: AtomicBool,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();

        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Rate limit store corrupted, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Rate limit store unreadable, starting empty");
                BTreeMap::new()
            }
        };

        debug!(path = %path.display(), entries = entries.len(), "Rate limit store opened");

        Self {
            path,
            entries: Mutex::new(entries),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Write pending changes to disk. Blocking, run it off the async workers.
    /// Returns whether anything was written.
    pub fn flush(&self) -> Result<bool, StoreError> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }

        // snapshot, so the lock is not held during the write
        let content = {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            serde_json::to_string_pretty(&*entries)
        };

        let result = content.map_err(StoreError::from).and_then(|content| {
            std::fs::write(&self.path, content).map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })
        });

        if result.is_err() {
            // keep the changes for the next attempt
            self.dirty.store(true, Ordering::SeqCst);
        }
        result.map(|_| true)
    }
}

impl RateLimitStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// Time source in milliseconds since the unix epoch
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to. Used by tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(millis(by), Ordering::SeqCst);
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

// Cooldown plus rolling window cap for one kind of action
#[derive(Debug, Clone, Copy)]
pub struct ThrottlePolicy {
    pub cooldown: Duration,
    pub max_attempts: u32,
    pub window: Duration,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(30),
            max_attempts: 10,
            window: Duration::from_secs(60 * 60),
        }
    }
}

/// Result of [`RateLimiter::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    CoolingDown { wait_ms: u64 },
    Exhausted { wait_ms: u64 },
}

/// Fixed-window attempt counter with an independent per-key cooldown.
///
/// This is friction against double submits and spam, not a security
/// boundary. Unreadable records are treated as absent (fail open).
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    // Serializes read-modify-write on the store
    guard: Mutex<()>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            guard: Mutex::new(()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    fn storage_key(key: &str) -> String {
        format!("{}{}", STORAGE_PREFIX, key)
    }

    fn load(&self, key: &str) -> Option<RateLimitRecord> {
        let raw = self.store.get(&Self::storage_key(key))?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key, error = %e, "Discarding unreadable rate limit record");
                None
            }
        }
    }

    fn save(&self, key: &str, record: &RateLimitRecord) {
        let result = serde_json::to_string(record)
            .map_err(StoreError::from)
            .and_then(|raw| self.store.set(&Self::storage_key(key), raw));

        if let Err(e) = result {
            warn!(key, error = %e, "Failed to persist rate limit record");
        }
    }

    // Count one attempt against the window. false means the window is used up.
    fn count_attempt(record: &mut RateLimitRecord, now: i64, max_attempts: u32, window: Duration) -> bool {
        // window expired or never started: this attempt opens a new one
        if now > record.reset_time || record.count == 0 {
            record.count = 1;
            record.reset_time = now.saturating_add(millis(window));
            return true;
        }

        if record.count < max_attempts {
            record.count += 1;
            return true;
        }

        false
    }

    /// Check-and-record in one step. Returns `false` once `max_attempts`
    /// have been used in the current window; a denied call writes nothing.
    pub fn check(&self, key: &str, max_attempts: u32, window: Duration) -> bool {
        let _lock = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now_ms();
        let mut record = self.load(key).unwrap_or(RateLimitRecord::fresh(now));

        if Self::count_attempt(&mut record, now, max_attempts, window) {
            self.save(key, &record);
            return true;
        }

        debug!(key, count = record.count, "Rate limit window exhausted");
        false
    }

    /// Cooldown check, window check and a provisional cooldown of `hold`, all
    /// under one lock. A second caller for the same key sees the hold until
    /// the first one either calls `set_cooldown` or `release_cooldown`.
    pub fn admit(&self, key: &str, max_attempts: u32, window: Duration, hold: Duration) -> Admission {
        let _lock = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now_ms();
        let mut record = self.load(key).unwrap_or(RateLimitRecord::fresh(now));

        let cooldown = remaining_ms(record.cooldown_until, now);
        if cooldown > 0 {
            return Admission::CoolingDown { wait_ms: cooldown };
        }

        if !Self::count_attempt(&mut record, now, max_attempts, window) {
            debug!(key, count = record.count, "Rate limit window exhausted");
            return Admission::Exhausted {
                wait_ms: remaining_ms(record.reset_time, now),
            };
        }

        record.cooldown_until = now.saturating_add(millis(hold));
        self.save(key, &record);
        Admission::Allowed
    }

    /// Drop a cooldown early, e.g. the hold from `admit` after a failed attempt.
    /// The window count is kept.
    pub fn release_cooldown(&self, key: &str) {
        let _lock = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut record) = self.load(key) {
            record.cooldown_until = 0;
            self.save(key, &record);
        }
    }

    /// Milliseconds left on the cooldown, 0 if none is active.
    pub fn remaining_cooldown_ms(&self, key: &str) -> u64 {
        let now = self.clock.now_ms();
        self.load(key)
            .map(|r| remaining_ms(r.cooldown_until, now))
            .unwrap_or(0)
    }

    /// Milliseconds until the current window resets, 0 if none is active.
    pub fn remaining_window_ms(&self, key: &str) -> u64 {
        let now = self.clock.now_ms();
        self.load(key)
            .map(|r| remaining_ms(r.reset_time, now))
            .unwrap_or(0)
    }

    pub fn remaining_attempts(&self, key: &str, max_attempts: u32) -> u32 {
        let now = self.clock.now_ms();
        match self.load(key) {
            Some(r) if now <= r.reset_time => max_attempts.saturating_sub(r.count),
            _ => max_attempts,
        }
    }

    // Cooldown is separate from the window, count is left alone
    pub fn set_cooldown(&self, key: &str, duration: Duration) {
        let _lock = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now_ms();
        let mut record = self.load(key).unwrap_or(RateLimitRecord::fresh(now));
        record.cooldown_until = now.saturating_add(millis(duration));
        self.save(key, &record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn limiter_at(start: i64) -> (RateLimiter, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::new(store.clone(), clock.clone());
        (limiter, clock, store)
    }

    fn stored(store: &MemoryStore, key: &str) -> RateLimitRecord {
        let raw = store.get(&format!("rate_limit_{}", key)).unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[test]
    fn allows_exactly_max_attempts_per_window() {
        let (limiter, _, _) = limiter_at(1_000);
        for n in 1..=3 {
            assert!(limiter.check("demo", 3, HOUR), "attempt {} should pass", n);
        }
        assert!(!limiter.check("demo", 3, HOUR));
    }

    #[test]
    fn denied_check_leaves_record_untouched() {
        let (limiter, _, store) = limiter_at(1_000);
        assert!(limiter.check("demo", 1, HOUR));
        let before = stored(&store, "demo");
        assert!(!limiter.check("demo", 1, HOUR));
        assert_eq!(stored(&store, "demo"), before);
    }

    #[test]
    fn expired_window_resets_count_to_one() {
        let (limiter, clock, store) = limiter_at(1_000);
        assert!(limiter.check("demo", 2, HOUR));
        assert!(limiter.check("demo", 2, HOUR));
        assert!(!limiter.check("demo", 2, HOUR));

        clock.advance(HOUR + Duration::from_millis(1));
        assert!(limiter.check("demo", 2, HOUR));

        let record = stored(&store, "demo");
        assert_eq!(record.count, 1);
        assert_eq!(record.reset_time, clock.now_ms() + HOUR.as_millis() as i64);
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let (limiter, clock, _) = limiter_at(0);
        assert!(limiter.check("demo", 1, HOUR));
        // now == reset_time still belongs to the old window
        clock.set(HOUR.as_millis() as i64);
        assert!(!limiter.check("demo", 1, HOUR));
        clock.advance(Duration::from_millis(1));
        assert!(limiter.check("demo", 1, HOUR));
    }

    #[test]
    fn keys_are_independent() {
        let (limiter, _, _) = limiter_at(0);
        assert!(limiter.check("a", 1, HOUR));
        assert!(!limiter.check("a", 1, HOUR));
        assert!(limiter.check("b", 1, HOUR));
    }

    #[test]
    fn cooldown_reports_remaining_time() {
        let (limiter, clock, _) = limiter_at(50_000);
        assert_eq!(limiter.remaining_cooldown_ms("demo"), 0);

        limiter.set_cooldown("demo", Duration::from_secs(30));
        let remaining = limiter.remaining_cooldown_ms("demo");
        assert!(remaining > 29_000 && remaining <= 30_000);

        clock.advance(Duration::from_secs(10));
        assert_eq!(limiter.remaining_cooldown_ms("demo"), 20_000);

        clock.advance(Duration::from_secs(25));
        assert_eq!(limiter.remaining_cooldown_ms("demo"), 0);
    }

    #[test]
    fn cooldown_survives_window_reset() {
        let (limiter, clock, store) = limiter_at(0);
        limiter.set_cooldown("demo", HOUR * 2);
        clock.advance(Duration::from_millis(5));
        assert!(limiter.check("demo", 10, HOUR));
        assert_eq!(stored(&store, "demo").cooldown_until, (HOUR * 2).as_millis() as i64);
    }

    #[test]
    fn set_cooldown_keeps_window_count() {
        let (limiter, clock, store) = limiter_at(100);
        clock.advance(Duration::from_millis(1));
        assert!(limiter.check("demo", 5, HOUR));
        assert!(limiter.check("demo", 5, HOUR));
        limiter.set_cooldown("demo", Duration::from_secs(30));
        assert_eq!(stored(&store, "demo").count, 2);
        assert_eq!(limiter.remaining_attempts("demo", 5), 3);
    }

    #[test]
    fn corrupt_record_fails_open() {
        let (limiter, _, store) = limiter_at(10);
        store.set("rate_limit_demo", "{not json".to_string()).unwrap();
        assert_eq!(limiter.remaining_cooldown_ms("demo"), 0);
        assert!(limiter.check("demo", 1, HOUR));
        assert_eq!(stored(&store, "demo").count, 1);
    }

    #[test]
    fn legacy_record_without_cooldown_decodes() {
        let (limiter, _, store) = limiter_at(10);
        store
            .set("rate_limit_demo", r#"{"count":4,"resetTime":5000}"#.to_string())
            .unwrap();
        assert_eq!(limiter.remaining_attempts("demo", 5), 1);
        assert_eq!(limiter.remaining_window_ms("demo"), 4_990);
        assert_eq!(limiter.remaining_cooldown_ms("demo"), 0);
    }

    #[test]
    fn remaining_attempts_resets_after_window() {
        let (limiter, clock, _) = limiter_at(0);
        clock.advance(Duration::from_millis(1));
        assert!(limiter.check("demo", 3, HOUR));
        assert_eq!(limiter.remaining_attempts("demo", 3), 2);
        clock.advance(HOUR * 2);
        assert_eq!(limiter.remaining_attempts("demo", 3), 3);
        assert_eq!(limiter.remaining_window_ms("demo"), 0);
    }

    #[test]
    fn admit_holds_the_key_until_settled() {
        let (limiter, _, _) = limiter_at(1_000);
        let hold = Duration::from_secs(20);

        assert_eq!(limiter.admit("demo", 10, HOUR, hold), Admission::Allowed);
        assert_eq!(
            limiter.admit("demo", 10, HOUR, hold),
            Admission::CoolingDown { wait_ms: 20_000 }
        );
        // the held second attempt was not counted
        assert_eq!(limiter.remaining_attempts("demo", 10), 9);

        limiter.release_cooldown("demo");
        assert_eq!(limiter.admit("demo", 10, HOUR, hold), Admission::Allowed);
        assert_eq!(limiter.remaining_attempts("demo", 10), 8);
    }

    #[test]
    fn admit_reports_window_wait_when_exhausted() {
        let (limiter, clock, _) = limiter_at(0);
        clock.advance(Duration::from_millis(1));
        assert_eq!(limiter.admit("demo", 1, HOUR, Duration::ZERO), Admission::Allowed);

        clock.advance(Duration::from_secs(60));
        assert_eq!(
            limiter.admit("demo", 1, HOUR, Duration::ZERO),
            Admission::Exhausted { wait_ms: 59 * 60 * 1000 }
        );
    }

    #[test]
    fn release_without_record_is_a_no_op() {
        let (limiter, _, store) = limiter_at(0);
        limiter.release_cooldown("demo");
        assert_eq!(store.get("rate_limit_demo"), None);
    }

    #[test]
    fn extreme_values_clamp_instead_of_overflowing() {
        let (limiter, _, store) = limiter_at(1_000);
        assert!(limiter.check("demo", 1, Duration::MAX));
        assert_eq!(stored(&store, "demo").reset_time, i64::MAX);

        limiter.set_cooldown("demo", Duration::MAX);
        assert_eq!(limiter.remaining_cooldown_ms("demo"), (i64::MAX - 1_000) as u64);

        store
            .set(
                "rate_limit_other",
                format!(r#"{{"count":1,"resetTime":{},"cooldownUntil":{}}}"#, i64::MIN, i64::MIN),
            )
            .unwrap();
        assert_eq!(limiter.remaining_cooldown_ms("other"), 0);
        assert_eq!(limiter.remaining_window_ms("other"), 0);
        assert!(limiter.check("other", 1, HOUR));
    }
}
