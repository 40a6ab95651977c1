use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Time source for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now = *now + by;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Scraped version feed, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCacheEntry {
    pub latest: String,
    pub versions: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

impl VersionCacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.fetched_at
    }
}

/// Single-slot cache that never hands out an entry older than its TTL.
#[derive(Debug)]
pub struct VersionCache {
    ttl: Duration,
    slot: Mutex<Option<VersionCacheEntry>>,
}

impl VersionCache {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(1)),
            slot: Mutex::new(None),
        }
    }

    pub fn get(&self, now: DateTime<Utc>) -> Option<VersionCacheEntry> {
        let slot = self.slot.lock().ok()?;
        let entry = slot.as_ref()?;
        let age = entry.age(now);
        if age < self.ttl {
            log::debug!("Using cached version feed (age: {} minutes)", age.num_minutes());
            Some(entry.clone())
        } else {
            log::info!(
                "Cached version feed is stale (age: {} minutes), refreshing...",
                age.num_minutes()
            );
            None
        }
    }

    pub fn store(&self, entry: VersionCacheEntry) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(entry);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}
