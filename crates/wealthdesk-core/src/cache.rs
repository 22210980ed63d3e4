//! Process-local cache for provider results.
//!
//! Keys are `(provider, kind, resource, time bucket)`. The bucket width follows the
//! provider's freshness window, so a new bucket begins once cached data would be
//! stale anyway. While the market is closed, quote keys use the last session close
//! as their bucket and live until the next open.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::calendar::MarketSession;
use crate::data_source::Endpoint;
use crate::{BarSeries, EconomicIndicator, FxRate, NewsItem, PriceQuote, ProviderId, UtcDateTime};

/// Cache key. Two lookups within the same bucket hit the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub provider: ProviderId,
    pub kind: Endpoint,
    pub resource: String,
    pub bucket: i64,
}

impl CacheKey {
    pub fn new(provider: ProviderId, kind: Endpoint, resource: impl Into<String>, bucket: i64) -> Self {
        Self {
            provider,
            kind,
            resource: resource.into(),
            bucket,
        }
    }

    /// Builds the key for `now`, given the provider freshness window and the session state.
    pub fn at(
        provider: ProviderId,
        kind: Endpoint,
        resource: impl Into<String>,
        freshness: Duration,
        session: &MarketSession,
        now: UtcDateTime,
    ) -> Self {
        let bucket = if kind == Endpoint::Quote && !session.is_open {
            session.last_close.unix_seconds()
        } else {
            let width = i64::try_from(freshness.as_secs().max(1)).unwrap_or(i64::MAX);
            now.unix_seconds().div_euclid(width)
        };
        Self::new(provider, kind, resource, bucket)
    }
}

/// Typed cached payload.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Quote(PriceQuote),
    Bars(BarSeries),
    News(Vec<NewsItem>),
    Indicator(EconomicIndicator),
    Fx(FxRate),
}

/// Successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    pub value: CachedValue,
    pub stored_at: UtcDateTime,
    pub age: Duration,
}

/// TTL per data kind. Quote TTLs are stretched to the next open while the market is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlByKind {
    pub quote_secs: u64,
    pub bars_secs: u64,
    pub news_secs: u64,
    pub indicator_secs: u64,
    pub fx_secs: u64,
}

impl Default for CacheTtlByKind {
    fn default() -> Self {
        Self {
            quote_secs: 60,
            bars_secs: 3_600,
            news_secs: 900,
            indicator_secs: 86_400,
            fx_secs: 300,
        }
    }
}

impl CacheTtlByKind {
    pub fn ttl_for(&self, kind: Endpoint) -> Duration {
        let seconds = match kind {
            Endpoint::Quote => self.quote_secs,
            Endpoint::Bars => self.bars_secs,
            Endpoint::News => self.news_secs,
            Endpoint::Indicator => self.indicator_secs,
            Endpoint::Fx => self.fx_secs,
        };
        Duration::from_secs(seconds)
    }

    /// Effective TTL for a write made at `now` under `session`.
    pub fn effective_ttl(&self, kind: Endpoint, session: &MarketSession, now: UtcDateTime) -> Duration {
        let base = self.ttl_for(kind);
        if kind != Endpoint::Quote || session.is_open {
            return base;
        }
        let until_open = session.next_open.unix_seconds() - now.unix_seconds();
        base.max(Duration::from_secs(until_open.max(0) as u64))
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    stored_at: UtcDateTime,
    inserted: Instant,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<CacheKey, CacheEntry>,
    enabled: bool,
}

/// Thread-safe cache handle. Clones share storage.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner {
                map: HashMap::new(),
                enabled: true,
            })),
        }
    }

    /// A cache that stores nothing; every lookup misses.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner {
                map: HashMap::new(),
                enabled: false,
            })),
        }
    }

    /// Returns the entry when present and not expired.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheHit> {
        let store = self.inner.read().await;
        let entry = store.map.get(key)?;
        let now = Instant::now();
        if now >= entry.expires_at {
            return None;
        }
        Some(CacheHit {
            value: entry.value.clone(),
            stored_at: entry.stored_at,
            age: now.duration_since(entry.inserted),
        })
    }

    /// Stores `value` under `key` for `ttl`. A zero TTL stores nothing.
    pub async fn put(&self, key: CacheKey, value: CachedValue, ttl: Duration) {
        let mut store = self.inner.write().await;
        if !store.enabled || ttl.is_zero() {
            return;
        }
        let inserted = Instant::now();
        store.map.insert(
            key,
            CacheEntry {
                value,
                stored_at: UtcDateTime::now(),
                inserted,
                expires_at: inserted + ttl,
            },
        );
    }

    pub async fn clear_expired(&self) -> usize {
        let mut store = self.inner.write().await;
        let before = store.map.len();
        let now = Instant::now();
        store.map.retain(|_, entry| entry.expires_at > now);
        before - store.map.len()
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Number of entries, expired ones included until `clear_expired` runs.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_disabled(&self) -> bool {
        !self.inner.read().await.enabled
    }
}
