//! Expiry policies and the clock they are evaluated against.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};

/// When a cache entry stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Never expires.
    Never,
    /// Expires at a fixed instant.
    At(DateTime<Utc>),
    /// Expires this long after the entry is written.
    After(Duration),
}

impl Expiry {
    /// Out-of-range lengths saturate to [`Expiry::Never`].
    pub fn seconds(secs: i64) -> Self {
        Duration::try_seconds(secs).map_or(Expiry::Never, Expiry::After)
    }

    pub fn minutes(mins: i64) -> Self {
        Duration::try_minutes(mins).map_or(Expiry::Never, Expiry::After)
    }

    /// Absolute deadline, with `After` measured from `now`.
    pub fn expiration_instant_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Expiry::Never => DateTime::<Utc>::MAX_UTC,
            Expiry::At(at) => *at,
            Expiry::After(d) => now.checked_add_signed(*d).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn expiration_instant(&self) -> DateTime<Utc> {
        self.expiration_instant_from(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_instant_from(now) < now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Pin a relative policy to an absolute deadline.
    ///
    /// The cache calls this at write time so that reads never extend an
    /// entry's lifetime.
    pub fn resolve(&self, now: DateTime<Utc>) -> Expiry {
        match self {
            Expiry::After(_) => Expiry::At(self.expiration_instant_from(now)),
            other => *other,
        }
    }

    /// Rebuild a policy from persisted epoch seconds.
    pub(crate) fn from_epoch_secs(secs: f64) -> Expiry {
        if !secs.is_finite() || secs >= DateTime::<Utc>::MAX_UTC.timestamp() as f64 {
            return Expiry::Never;
        }
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1_000_000_000.0) as u32;
        match Utc.timestamp_opt(whole as i64, nanos) {
            chrono::LocalResult::Single(at) => Expiry::At(at),
            _ => Expiry::Never,
        }
    }
}

pub(crate) fn epoch_secs(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) / 1_000_000_000.0
}

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Cloned handles share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
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
