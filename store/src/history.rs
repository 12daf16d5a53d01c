//! SQLite-backed `HistoryStore` (§4.3).

use alertcenter_core::alert::{Ack, Alert, AlertStatus, Severity};
use alertcenter_core::error::{AlertError, Result};
use alertcenter_core::history::{AlertHistoryUpdate, HistoryQuery, HistoryStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteHistoryStore { pool }
    }
}

fn to_json(value: &impl serde::Serialize) -> Result<String> {
    serde_json::to_string(value).map_err(|e| AlertError::InternalDb(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
    serde_json::from_str(s).map_err(|e| AlertError::InternalDb(e.to_string()))
}

fn db_err(e: sqlx::Error) -> AlertError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return AlertError::Duplicate(db_err.message().to_string());
        }
    }
    AlertError::InternalDb(e.to_string())
}

fn row_to_alert(row: &SqliteRow) -> Result<Alert> {
    let ends_at_raw: Option<String> = row.try_get("ends_at").map_err(db_err)?;
    let ends_at = ends_at_raw
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| AlertError::InternalDb(e.to_string()))?;
    let starts_at_raw: String = row.try_get("starts_at").map_err(db_err)?;
    let starts_at = DateTime::parse_from_rfc3339(&starts_at_raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AlertError::InternalDb(e.to_string()))?;

    Ok(Alert {
        id: row.try_get("id").map_err(db_err)?,
        fingerprint: row.try_get("fingerprint").map_err(db_err)?,
        status: from_json::<AlertStatus>(&row.try_get::<String, _>("status").map_err(db_err)?)?,
        description: row.try_get("description").map_err(db_err)?,
        alertname: row.try_get("alertname").map_err(db_err)?,
        severity: from_json::<Severity>(&row.try_get::<String, _>("severity").map_err(db_err)?)?,
        display_severity: from_json::<Severity>(&row.try_get::<String, _>("display_severity").map_err(db_err)?)?,
        starts_at,
        ends_at,
        generator_url: row.try_get("generator_url").map_err(db_err)?,
        labels: from_json(&row.try_get::<String, _>("labels").map_err(db_err)?)?,
        need_handle: row.try_get::<i64, _>("need_handle").map_err(db_err)? != 0,
        is_emergent: row.try_get::<i64, _>("is_emergent").map_err(db_err)? != 0,
        acks: from_json(&row.try_get::<String, _>("acks").map_err(db_err)?)?,
        analyzer_tags: from_json(&row.try_get::<String, _>("analyzer_tags").map_err(db_err)?)?,
    })
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn create(&self, alert: &mut Alert) -> Result<()> {
        if alert.id.is_empty() {
            alert.id = uuid::Uuid::new_v4().to_string();
        }
        sqlx::query(
            "INSERT INTO alert_history
                (id, fingerprint, status, description, alertname, severity, display_severity,
                 starts_at, ends_at, generator_url, labels, need_handle, is_emergent, acks, analyzer_tags)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&alert.id)
        .bind(&alert.fingerprint)
        .bind(to_json(&alert.status)?)
        .bind(&alert.description)
        .bind(&alert.alertname)
        .bind(to_json(&alert.severity)?)
        .bind(to_json(&alert.display_severity)?)
        .bind(alert.starts_at.to_rfc3339())
        .bind(alert.ends_at.map(|t| t.to_rfc3339()))
        .bind(&alert.generator_url)
        .bind(to_json(&alert.labels)?)
        .bind(alert.need_handle as i64)
        .bind(alert.is_emergent as i64)
        .bind(to_json(&alert.acks)?)
        .bind(to_json(&alert.analyzer_tags)?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        touch_profile_latest_time(&self.pool, &alert.alertname, alert.starts_at).await?;
        Ok(())
    }

    async fn update(&self, id: &str, update: &AlertHistoryUpdate) -> Result<()> {
        let result = sqlx::query("UPDATE alert_history SET status = ?, ends_at = ? WHERE id = ?")
            .bind(to_json(&update.status)?)
            .bind(update.ends_at.map(|t| t.to_rfc3339()))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AlertError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn ack(&self, id: &str, ack: &Ack) -> Result<()> {
        let row = sqlx::query("SELECT acks FROM alert_history WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| AlertError::NotFound(id.to_string()))?;
        let mut acks: Vec<Ack> = from_json(&row.try_get::<String, _>("acks").map_err(db_err)?)?;
        acks.push(ack.clone());

        sqlx::query("UPDATE alert_history SET status = ?, acks = ? WHERE id = ?")
            .bind(to_json(&AlertStatus::Acked)?)
            .bind(to_json(&acks)?)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn rename(&self, old: &str, new: &str) -> Result<()> {
        let rows = sqlx::query("SELECT id, labels, severity FROM alert_history WHERE alertname = ?")
            .bind(old)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        for row in rows {
            let id: String = row.try_get("id").map_err(db_err)?;
            let labels: std::collections::HashMap<String, String> = from_json(&row.try_get::<String, _>("labels").map_err(db_err)?)?;
            let severity: Severity = from_json(&row.try_get::<String, _>("severity").map_err(db_err)?)?;
            let fingerprint = alertcenter_core::fingerprint::fingerprint(new, &severity, &labels);
            sqlx::query("UPDATE alert_history SET alertname = ?, fingerprint = ? WHERE id = ?")
                .bind(new)
                .bind(fingerprint)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    async fn list(&self, query: &HistoryQuery) -> Result<(Vec<Alert>, Option<String>)> {
        let limit = query.clamped_limit();
        let mut sql = String::from("SELECT * FROM alert_history WHERE 1 = 1");
        if query.alertname.is_some() {
            sql.push_str(" AND alertname = ?");
        } else if query.fingerprint.is_some() {
            sql.push_str(" AND fingerprint = ?");
        }
        if query.begin.is_some() {
            sql.push_str(" AND starts_at >= ?");
        }
        if query.end.is_some() {
            sql.push_str(" AND starts_at < ?");
        }
        if query.marker.is_some() {
            sql.push_str(" AND id < ?");
        }
        sql.push_str(" ORDER BY id DESC LIMIT ?");

        let mut q = sqlx::query(&sql);
        if let Some(alertname) = &query.alertname {
            q = q.bind(alertname);
        } else if let Some(fingerprint) = &query.fingerprint {
            q = q.bind(fingerprint);
        }
        if let Some(begin) = query.begin {
            q = q.bind(begin.to_rfc3339());
        }
        if let Some(end) = query.end {
            q = q.bind(end.to_rfc3339());
        }
        if let Some(marker) = &query.marker {
            q = q.bind(marker);
        }
        q = q.bind(limit);

        let rows = q.fetch_all(&self.pool).await.map_err(db_err)?;
        let alerts = rows.iter().map(row_to_alert).collect::<Result<Vec<_>>>()?;
        let marker = alerts.last().map(|a| a.id.clone());
        Ok((alerts, marker))
    }
}

/// History records advance the owning profile's `latest_time`, creating the
/// profile on first sight if it doesn't exist yet (§4.3).
async fn touch_profile_latest_time(pool: &SqlitePool, alertname: &str, at: DateTime<Utc>) -> Result<()> {
    let now = at.to_rfc3339();
    let existing = sqlx::query("SELECT 1 FROM alert_profiles WHERE alertname = ?")
        .bind(alertname)
        .fetch_optional(pool)
        .await
        .map_err(db_err)?;
    if existing.is_some() {
        sqlx::query("UPDATE alert_profiles SET latest_time = ? WHERE alertname = ?")
            .bind(&now)
            .bind(alertname)
            .execute(pool)
            .await
            .map_err(db_err)?;
    } else {
        sqlx::query(
            "INSERT INTO alert_profiles
                (alertname, description, tags, need_oncall, notifiers, is_new, create_at, latest_time, update_at)
             VALUES (?, '', '[]', 0, '[]', 1, ?, ?, ?)",
        )
        .bind(alertname)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(pool)
        .await
        .map_err(db_err)?;
    }
    Ok(())
}
