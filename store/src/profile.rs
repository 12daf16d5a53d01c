//! SQLite-backed `ProfileStore` (§4.4).

use alertcenter_core::error::{AlertError, Result};
use alertcenter_core::profile::{AlertProfile, AlertProfileUpdate, ProfileStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

pub struct SqliteProfileStore {
    pool: SqlitePool,
}

impl SqliteProfileStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteProfileStore { pool }
    }
}

fn db_err(e: sqlx::Error) -> AlertError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AlertError::Duplicate(db_err.message().to_string());
        }
    }
    AlertError::InternalDb(e.to_string())
}

fn to_json(value: &impl serde::Serialize) -> Result<String> {
    serde_json::to_string(value).map_err(|e| AlertError::InternalDb(e.to_string()))
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AlertError::InternalDb(e.to_string()))
}

fn row_to_profile(row: &SqliteRow) -> Result<AlertProfile> {
    Ok(AlertProfile {
        alertname: row.try_get("alertname").map_err(db_err)?,
        description: row.try_get("description").map_err(db_err)?,
        tags: serde_json::from_str(&row.try_get::<String, _>("tags").map_err(db_err)?)
            .map_err(|e| AlertError::InternalDb(e.to_string()))?,
        need_oncall: row.try_get::<i64, _>("need_oncall").map_err(db_err)? != 0,
        notifiers: serde_json::from_str(&row.try_get::<String, _>("notifiers").map_err(db_err)?)
            .map_err(|e| AlertError::InternalDb(e.to_string()))?,
        is_new: row.try_get::<i64, _>("is_new").map_err(db_err)? != 0,
        create_at: parse_rfc3339(&row.try_get::<String, _>("create_at").map_err(db_err)?)?,
        latest_time: parse_rfc3339(&row.try_get::<String, _>("latest_time").map_err(db_err)?)?,
        update_at: parse_rfc3339(&row.try_get::<String, _>("update_at").map_err(db_err)?)?,
    })
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn create(&self, profile: AlertProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO alert_profiles
                (alertname, description, tags, need_oncall, notifiers, is_new, create_at, latest_time, update_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&profile.alertname)
        .bind(&profile.description)
        .bind(to_json(&profile.tags)?)
        .bind(profile.need_oncall as i64)
        .bind(to_json(&profile.notifiers)?)
        .bind(profile.is_new as i64)
        .bind(profile.create_at.to_rfc3339())
        .bind(profile.latest_time.to_rfc3339())
        .bind(profile.update_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update(&self, alertname: &str, update: &AlertProfileUpdate) -> Result<()> {
        let mut sets = Vec::new();
        if update.description.is_some() {
            sets.push("description = ?");
        }
        if update.need_oncall.is_some() {
            sets.push("need_oncall = ?");
        }
        if update.notifiers.is_some() {
            sets.push("notifiers = ?");
        }
        if sets.is_empty() {
            return Ok(());
        }
        sets.push("update_at = ?");
        let sql = format!("UPDATE alert_profiles SET {} WHERE alertname = ?", sets.join(", "));

        let mut q = sqlx::query(&sql);
        if let Some(d) = &update.description {
            q = q.bind(d);
        }
        if let Some(n) = update.need_oncall {
            q = q.bind(n as i64);
        }
        if let Some(ns) = &update.notifiers {
            q = q.bind(to_json(ns)?);
        }
        q = q.bind(Utc::now().to_rfc3339());
        q = q.bind(alertname);

        let result = q.execute(&self.pool).await.map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AlertError::NotFound(alertname.to_string()));
        }
        Ok(())
    }

    async fn update_latest_time(&self, alertname: &str, at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query("UPDATE alert_profiles SET latest_time = ? WHERE alertname = ?")
            .bind(at.to_rfc3339())
            .bind(alertname)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AlertError::NotFound(alertname.to_string()));
        }
        Ok(())
    }

    async fn rename(&self, old: &str, new: &str) -> Result<()> {
        let result = sqlx::query("UPDATE alert_profiles SET alertname = ? WHERE alertname = ?")
            .bind(new)
            .bind(old)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AlertError::NotFound(old.to_string()));
        }
        Ok(())
    }

    async fn append_tags(&self, alertname: &str, tags: &[String]) -> Result<()> {
        let profile = self.get(alertname).await?;
        let mut merged = profile.tags;
        for tag in tags {
            if !merged.contains(tag) {
                merged.push(tag.clone());
            }
        }
        sqlx::query("UPDATE alert_profiles SET tags = ? WHERE alertname = ?")
            .bind(to_json(&merged)?)
            .bind(alertname)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_tags(&self, alertname: &str, tags: &[String]) -> Result<()> {
        let profile = self.get(alertname).await?;
        let remaining: Vec<String> = profile.tags.into_iter().filter(|t| !tags.contains(t)).collect();
        sqlx::query("UPDATE alert_profiles SET tags = ? WHERE alertname = ?")
            .bind(to_json(&remaining)?)
            .bind(alertname)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete(&self, alertname: &str) -> Result<()> {
        sqlx::query("DELETE FROM alert_profiles WHERE alertname = ?")
            .bind(alertname)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn get(&self, alertname: &str) -> Result<AlertProfile> {
        let row = sqlx::query("SELECT * FROM alert_profiles WHERE alertname = ?")
            .bind(alertname)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| AlertError::NotFound(alertname.to_string()))?;
        row_to_profile(&row)
    }

    async fn list(&self) -> Result<Vec<AlertProfile>> {
        let rows = sqlx::query("SELECT * FROM alert_profiles").fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(row_to_profile).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(alertname: &str) -> AlertProfile {
        let now = Utc::now();
        AlertProfile {
            alertname: alertname.to_string(),
            description: "desc".to_string(),
            tags: vec!["infra".to_string()],
            need_oncall: false,
            notifiers: vec!["default".to_string()],
            is_new: true,
            create_at: now,
            latest_time: now,
            update_at: now,
        }
    }

    async fn store() -> SqliteProfileStore {
        let pool = crate::pool::connect("sqlite::memory:").await.unwrap();
        SqliteProfileStore::new(pool)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store().await;
        store.create(profile("disk_full")).await.unwrap();

        let got = store.get("disk_full").await.unwrap();
        assert_eq!(got.tags, vec!["infra".to_string()]);
    }

    #[tokio::test]
    async fn append_and_delete_tags() {
        let store = store().await;
        store.create(profile("flapping")).await.unwrap();

        store.append_tags("flapping", &["on-call".to_string()]).await.unwrap();
        let got = store.get("flapping").await.unwrap();
        assert_eq!(got.tags.len(), 2);

        store.delete_tags("flapping", &["infra".to_string()]).await.unwrap();
        let got = store.get("flapping").await.unwrap();
        assert_eq!(got.tags, vec!["on-call".to_string()]);
    }

    #[tokio::test]
    async fn rename_moves_the_primary_key() {
        let store = store().await;
        store.create(profile("old_name")).await.unwrap();
        store.rename("old_name", "new_name").await.unwrap();

        assert!(store.get("old_name").await.is_err());
        assert!(store.get("new_name").await.is_ok());
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = store().await;
        store.create(profile("dup")).await.unwrap();
        let err = store.create(profile("dup")).await.unwrap_err();
        assert!(matches!(err, AlertError::Duplicate(_)));
    }
}
