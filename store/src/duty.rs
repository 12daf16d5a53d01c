//! SQLite-backed `DutyStore` (§4.9).

use alertcenter_core::duty::{DutyStore, Roster, Staff};
use alertcenter_core::error::{AlertError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

pub struct SqliteDutyStore {
    pool: SqlitePool,
}

impl SqliteDutyStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteDutyStore { pool }
    }
}

fn db_err(e: sqlx::Error) -> AlertError {
    AlertError::InternalDb(e.to_string())
}

fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AlertError::InternalDb(e.to_string()))
}

fn row_to_staff(row: &SqliteRow) -> Result<Staff> {
    Ok(Staff {
        id: row.try_get("id").map_err(db_err)?,
        name: row.try_get("name").map_err(db_err)?,
        phone: row.try_get("phone").map_err(db_err)?,
    })
}

fn row_to_roster(row: &SqliteRow) -> Result<Roster> {
    Ok(Roster {
        id: row.try_get("id").map_err(db_err)?,
        priority: row.try_get("priority").map_err(db_err)?,
        begin: parse_rfc3339(&row.try_get::<String, _>("begin_at").map_err(db_err)?)?,
        end: parse_rfc3339(&row.try_get::<String, _>("end_at").map_err(db_err)?)?,
        unit_seconds: row.try_get("unit_seconds").map_err(db_err)?,
        start_idx: row.try_get("start_idx").map_err(db_err)?,
        staff_ids: serde_json::from_str(&row.try_get::<String, _>("staff_ids").map_err(db_err)?)
            .map_err(|e| AlertError::InternalDb(e.to_string()))?,
    })
}

#[async_trait]
impl DutyStore for SqliteDutyStore {
    async fn create_staff(&self, staff: Staff) -> Result<()> {
        sqlx::query("INSERT INTO staffs (id, name, phone) VALUES (?, ?, ?)")
            .bind(&staff.id)
            .bind(&staff.name)
            .bind(&staff.phone)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn update_staff(&self, staff: &Staff) -> Result<()> {
        let result = sqlx::query("UPDATE staffs SET name = ?, phone = ? WHERE id = ?")
            .bind(&staff.name)
            .bind(&staff.phone)
            .bind(&staff.id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AlertError::NotFound(staff.id.clone()));
        }
        Ok(())
    }

    async fn remove_staff(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM staffs WHERE id = ?").bind(id).execute(&self.pool).await.map_err(db_err)?;
        Ok(())
    }

    async fn get_staff(&self, id: &str) -> Result<Staff> {
        let row = sqlx::query("SELECT * FROM staffs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| AlertError::NotFound(id.to_string()))?;
        row_to_staff(&row)
    }

    async fn list_staffs(&self) -> Result<Vec<Staff>> {
        let rows = sqlx::query("SELECT * FROM staffs").fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(row_to_staff).collect()
    }

    async fn create_roster(&self, roster: Roster) -> Result<()> {
        sqlx::query(
            "INSERT INTO rosters (id, priority, begin_at, end_at, unit_seconds, start_idx, staff_ids)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&roster.id)
        .bind(roster.priority)
        .bind(roster.begin.to_rfc3339())
        .bind(roster.end.to_rfc3339())
        .bind(roster.unit_seconds)
        .bind(roster.start_idx)
        .bind(serde_json::to_string(&roster.staff_ids).map_err(|e| AlertError::InternalDb(e.to_string()))?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_roster(&self, roster: &Roster) -> Result<()> {
        let result = sqlx::query(
            "UPDATE rosters SET priority = ?, begin_at = ?, end_at = ?, unit_seconds = ?, start_idx = ?, staff_ids = ?
             WHERE id = ?",
        )
        .bind(roster.priority)
        .bind(roster.begin.to_rfc3339())
        .bind(roster.end.to_rfc3339())
        .bind(roster.unit_seconds)
        .bind(roster.start_idx)
        .bind(serde_json::to_string(&roster.staff_ids).map_err(|e| AlertError::InternalDb(e.to_string()))?)
        .bind(&roster.id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(AlertError::NotFound(roster.id.clone()));
        }
        Ok(())
    }

    async fn remove_roster(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM rosters WHERE id = ?").bind(id).execute(&self.pool).await.map_err(db_err)?;
        Ok(())
    }

    async fn get_roster(&self, id: &str) -> Result<Roster> {
        let row = sqlx::query("SELECT * FROM rosters WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| AlertError::NotFound(id.to_string()))?;
        row_to_roster(&row)
    }

    async fn list_rosters(&self) -> Result<Vec<Roster>> {
        let rows = sqlx::query("SELECT * FROM rosters ORDER BY priority ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(row_to_roster).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alertcenter_core::duty::get_current;
    use chrono::Duration;

    async fn store() -> SqliteDutyStore {
        let pool = crate::pool::connect("sqlite::memory:").await.unwrap();
        SqliteDutyStore::new(pool)
    }

    #[tokio::test]
    async fn current_duty_resolves_through_rotation() {
        let store = store().await;
        let now = Utc::now();

        for (id, name) in [("s1", "alice"), ("s2", "bob")] {
            store
                .create_staff(Staff {
                    id: id.to_string(),
                    name: name.to_string(),
                    phone: "000".to_string(),
                })
                .await
                .unwrap();
        }

        store
            .create_roster(Roster {
                id: "r1".to_string(),
                priority: 0,
                begin: now - Duration::days(1),
                end: now + Duration::days(1),
                unit_seconds: 86_400,
                start_idx: 1,
                staff_ids: vec![vec!["s1".to_string()], vec!["s2".to_string()]],
            })
            .await
            .unwrap();

        let staffs = get_current(&store, now).await.unwrap();
        assert_eq!(staffs.len(), 1);
    }

    #[tokio::test]
    async fn no_matching_roster_window_yields_empty() {
        let store = store().await;
        let staffs = get_current(&store, Utc::now()).await.unwrap();
        assert!(staffs.is_empty());
    }
}
