//! Alert profiles (§4.4): per-alertname routing metadata, served from an
//! in-memory cache that is rebuilt from the backing store on every write and
//! on a periodic timer. Grounded on the cache-plus-periodic-reload shape of
//! the original profile manager, adapted to `tokio::sync::RwLock` instead of
//! a background reload library.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time;

use crate::error::Result;

/// Per-alertname routing metadata (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertProfile {
    pub alertname: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub need_oncall: bool,
    #[serde(default)]
    pub notifiers: Vec<String>,
    #[serde(default)]
    pub is_new: bool,
    pub create_at: DateTime<Utc>,
    pub latest_time: DateTime<Utc>,
    pub update_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AlertProfileUpdate {
    pub description: Option<String>,
    pub need_oncall: Option<bool>,
    pub notifiers: Option<Vec<String>>,
}

/// The authoritative store behind the cache. `server`/`store` provide the
/// concrete SQLite-backed implementation.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `Duplicate` if `alertname` already exists.
    async fn create(&self, profile: AlertProfile) -> Result<()>;

    async fn update(&self, alertname: &str, update: &AlertProfileUpdate) -> Result<()>;

    async fn update_latest_time(&self, alertname: &str, at: DateTime<Utc>) -> Result<()>;

    /// Atomically move a profile from `old` to `new`, preserving the rest of
    /// its fields.
    async fn rename(&self, old: &str, new: &str) -> Result<()>;

    async fn append_tags(&self, alertname: &str, tags: &[String]) -> Result<()>;

    async fn delete_tags(&self, alertname: &str, tags: &[String]) -> Result<()>;

    async fn delete(&self, alertname: &str) -> Result<()>;

    async fn get(&self, alertname: &str) -> Result<AlertProfile>;

    async fn list(&self) -> Result<Vec<AlertProfile>>;
}

/// Read-through cache in front of a `ProfileStore`. Every mutating method
/// writes through to the store and then rebuilds the cache before
/// returning, so a caller that reads immediately after a write never sees
/// stale data (§4.4).
pub struct ProfileCache {
    store: Arc<dyn ProfileStore>,
    cache: RwLock<HashMap<String, AlertProfile>>,
}

impl ProfileCache {
    /// Builds the cache empty; call `advance` once before serving traffic to
    /// populate it from the store.
    pub fn new(store: Arc<dyn ProfileStore>) -> Arc<Self> {
        Arc::new(ProfileCache {
            store,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Spawn the periodic full-reload task. Returned handle may be dropped
    /// (detaches) or held and aborted on shutdown.
    pub fn spawn_reloader(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(err) = this.advance().await {
                    tracing::warn!(error = %err, "profile cache periodic reload failed");
                }
            }
        })
    }

    /// Rebuild the cache from the store. Called on startup, after every
    /// write, and on the periodic timer.
    pub async fn advance(&self) -> Result<()> {
        let profiles = self.store.list().await?;
        let mut next = HashMap::with_capacity(profiles.len());
        for profile in profiles {
            next.insert(profile.alertname.clone(), profile);
        }
        *self.cache.write().await = next;
        Ok(())
    }

    /// Serve a single profile from the cache without touching the store.
    pub async fn get_by_cache(&self, alertname: &str) -> Option<AlertProfile> {
        self.cache.read().await.get(alertname).cloned()
    }

    pub async fn list_by_cache(&self) -> Vec<AlertProfile> {
        self.cache.read().await.values().cloned().collect()
    }

    pub async fn create(&self, profile: AlertProfile) -> Result<()> {
        self.store.create(profile).await?;
        self.advance().await
    }

    pub async fn update(&self, alertname: &str, update: &AlertProfileUpdate) -> Result<()> {
        self.store.update(alertname, update).await?;
        self.advance().await
    }

    /// Advance `latest_time`, creating the profile first if it doesn't yet
    /// exist. Called by the history store every time a record is created
    /// for an alertname (§4.3).
    pub async fn touch_latest_time(&self, alertname: &str, at: DateTime<Utc>) -> Result<()> {
        match self.store.get(alertname).await {
            Ok(_) => self.store.update_latest_time(alertname, at).await?,
            Err(_) => {
                self.store
                    .create(AlertProfile {
                        alertname: alertname.to_string(),
                        description: String::new(),
                        tags: Vec::new(),
                        need_oncall: false,
                        notifiers: Vec::new(),
                        is_new: true,
                        create_at: at,
                        latest_time: at,
                        update_at: at,
                    })
                    .await?
            }
        }
        self.advance().await
    }

    pub async fn rename(&self, old: &str, new: &str) -> Result<()> {
        self.store.rename(old, new).await?;
        self.advance().await
    }

    pub async fn append_tags(&self, alertname: &str, tags: &[String]) -> Result<()> {
        self.store.append_tags(alertname, tags).await?;
        self.advance().await
    }

    pub async fn delete_tags(&self, alertname: &str, tags: &[String]) -> Result<()> {
        self.store.delete_tags(alertname, tags).await?;
        self.advance().await
    }

    pub async fn delete(&self, alertname: &str) -> Result<()> {
        self.store.delete(alertname).await?;
        self.advance().await
    }

    pub async fn get(&self, alertname: &str) -> Result<AlertProfile> {
        self.store.get(alertname).await
    }

    pub async fn list(&self) -> Result<Vec<AlertProfile>> {
        self.store.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeStore {
        profiles: StdMutex<HashMap<String, AlertProfile>>,
    }

    #[async_trait]
    impl ProfileStore for FakeStore {
        async fn create(&self, profile: AlertProfile) -> Result<()> {
            self.profiles
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(profile.alertname.clone(), profile);
            Ok(())
        }

        async fn update(&self, alertname: &str, update: &AlertProfileUpdate) -> Result<()> {
            let mut guard = self.profiles.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(p) = guard.get_mut(alertname) {
                if let Some(d) = &update.description {
                    p.description = d.clone();
                }
                if let Some(n) = update.need_oncall {
                    p.need_oncall = n;
                }
                if let Some(ns) = &update.notifiers {
                    p.notifiers = ns.clone();
                }
            }
            Ok(())
        }

        async fn update_latest_time(&self, alertname: &str, at: DateTime<Utc>) -> Result<()> {
            if let Some(p) = self
                .profiles
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get_mut(alertname)
            {
                p.latest_time = at;
            }
            Ok(())
        }

        async fn rename(&self, old: &str, new: &str) -> Result<()> {
            let mut guard = self.profiles.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(mut p) = guard.remove(old) {
                p.alertname = new.to_string();
                guard.insert(new.to_string(), p);
            }
            Ok(())
        }

        async fn append_tags(&self, alertname: &str, tags: &[String]) -> Result<()> {
            if let Some(p) = self
                .profiles
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get_mut(alertname)
            {
                for t in tags {
                    if !p.tags.contains(t) {
                        p.tags.push(t.clone());
                    }
                }
            }
            Ok(())
        }

        async fn delete_tags(&self, alertname: &str, tags: &[String]) -> Result<()> {
            if let Some(p) = self
                .profiles
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get_mut(alertname)
            {
                p.tags.retain(|t| !tags.contains(t));
            }
            Ok(())
        }

        async fn delete(&self, alertname: &str) -> Result<()> {
            self.profiles
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(alertname);
            Ok(())
        }

        async fn get(&self, alertname: &str) -> Result<AlertProfile> {
            self.profiles
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(alertname)
                .cloned()
                .ok_or_else(|| crate::error::AlertError::NotFound(alertname.to_string()))
        }

        async fn list(&self) -> Result<Vec<AlertProfile>> {
            Ok(self
                .profiles
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .values()
                .cloned()
                .collect())
        }
    }

    fn profile(alertname: &str) -> AlertProfile {
        let now = Utc::now();
        AlertProfile {
            alertname: alertname.to_string(),
            description: "desc".to_string(),
            tags: Vec::new(),
            need_oncall: false,
            notifiers: vec!["default".to_string()],
            is_new: true,
            create_at: now,
            latest_time: now,
            update_at: now,
        }
    }

    #[tokio::test]
    async fn create_is_visible_from_cache_without_explicit_advance() {
        let cache = ProfileCache::new(Arc::new(FakeStore::default()));
        assert!(cache.get_by_cache("down").await.is_none());

        cache.create(profile("down")).await.unwrap();
        assert!(cache.get_by_cache("down").await.is_some());
    }

    #[tokio::test]
    async fn touch_latest_time_creates_profile_if_missing() {
        let cache = ProfileCache::new(Arc::new(FakeStore::default()));
        let at = Utc::now();
        cache.touch_latest_time("flapping", at).await.unwrap();

        let got = cache.get_by_cache("flapping").await.unwrap();
        assert_eq!(got.latest_time, at);
        assert!(got.is_new);
    }

    #[tokio::test]
    async fn rename_moves_cache_entry() {
        let cache = ProfileCache::new(Arc::new(FakeStore::default()));
        cache.create(profile("old_name")).await.unwrap();
        cache.rename("old_name", "new_name").await.unwrap();

        assert!(cache.get_by_cache("old_name").await.is_none());
        assert!(cache.get_by_cache("new_name").await.is_some());
    }
}
