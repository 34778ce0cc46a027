use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rusqlite::Connection;

use crate::db::queries;
use crate::models::Provider;

type Clock = Box<dyn Fn() -> Instant + Send + Sync>;

/// Read-through cache over the provider roster. Provider data is
/// read-mostly, so reads tolerate a bounded staleness window; booking
/// re-validates against live appointment rows regardless.
pub struct ProviderDirectory {
    db: Arc<Mutex<Connection>>,
    ttl: Duration,
    clock: Clock,
    cache: Mutex<Option<CachedRoster>>,
}

struct CachedRoster {
    fetched_at: Instant,
    roster: Vec<Provider>,
}

impl ProviderDirectory {
    pub fn new(db: Arc<Mutex<Connection>>, ttl: Duration) -> Self {
        Self::with_clock(db, ttl, Box::new(Instant::now))
    }

    pub fn with_clock(db: Arc<Mutex<Connection>>, ttl: Duration, clock: Clock) -> Self {
        Self {
            db,
            ttl,
            clock,
            cache: Mutex::new(None),
        }
    }

    pub fn list(&self) -> anyhow::Result<Vec<Provider>> {
        let now = (self.clock)();

        let mut cache = self
            .cache
            .lock()
            .map_err(|_| anyhow::anyhow!("directory cache poisoned"))?;

        if let Some(cached) = cache.as_ref() {
            if now.duration_since(cached.fetched_at) < self.ttl {
                return Ok(cached.roster.clone());
            }
        }

        let roster = {
            let conn = self
                .db
                .lock()
                .map_err(|_| anyhow::anyhow!("database mutex poisoned"))?;
            queries::list_providers(&conn)?
        };

        tracing::debug!(count = roster.len(), "refreshed provider roster cache");
        *cache = Some(CachedRoster {
            fetched_at: now,
            roster: roster.clone(),
        });
        Ok(roster)
    }

    pub fn get(&self, id: i64) -> anyhow::Result<Option<Provider>> {
        Ok(self.list()?.into_iter().find(|p| p.id == id))
    }

    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = None;
        }
    }
}
