//! SQLite-backed `AnalyzerResultStore` (§4.10). The "top forward targets"
//! query groups by `(url, stream_id, err)` and pulls the bucket sizes into
//! descending order — the SQL equivalent of the original's Mongo
//! aggregation pipeline over a `forward_log` collection.

use alertcenter_core::analyzer::{AnalyzerResult, AnalyzerResultStore, ForwardTarget};
use alertcenter_core::error::{AlertError, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

pub struct SqliteAnalyzerResultStore {
    pool: SqlitePool,
}

impl SqliteAnalyzerResultStore {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteAnalyzerResultStore { pool }
    }
}

fn db_err(e: sqlx::Error) -> AlertError {
    AlertError::InternalDb(e.to_string())
}

fn row_to_result(row: &SqliteRow) -> Result<AnalyzerResult> {
    Ok(AnalyzerResult {
        alert_id: row.try_get("alert_id").map_err(db_err)?,
        analyzer_type: row.try_get("analyzer_type").map_err(db_err)?,
        alertname: row.try_get("alertname").map_err(db_err)?,
        results: serde_json::from_str(&row.try_get::<String, _>("results").map_err(db_err)?)
            .map_err(|e| AlertError::InternalDb(e.to_string()))?,
    })
}

#[async_trait]
impl AnalyzerResultStore for SqliteAnalyzerResultStore {
    async fn top_forward_targets(&self, tag: &str, limit: i64) -> Result<Vec<ForwardTarget>> {
        let rows = sqlx::query(
            "SELECT url, stream_id, err, COUNT(*) AS len
             FROM forward_log
             WHERE tag = ?
             GROUP BY url, stream_id, err
             ORDER BY len DESC
             LIMIT ?",
        )
        .bind(tag)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(ForwardTarget {
                    url: row.try_get("url").map_err(db_err)?,
                    stream_id: row.try_get("stream_id").map_err(db_err)?,
                    err: row.try_get("err").map_err(db_err)?,
                    len: row.try_get("len").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn save_result(&self, result: &AnalyzerResult) -> Result<()> {
        sqlx::query(
            "INSERT INTO analyzer_results (alert_id, analyzer_type, alertname, results)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (alert_id, analyzer_type) DO UPDATE SET results = excluded.results",
        )
        .bind(&result.alert_id)
        .bind(&result.analyzer_type)
        .bind(&result.alertname)
        .bind(serde_json::to_string(&result.results).map_err(|e| AlertError::InternalDb(e.to_string()))?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn get_result(&self, alert_id: &str, analyzer_type: &str) -> Result<AnalyzerResult> {
        let row = sqlx::query("SELECT * FROM analyzer_results WHERE alert_id = ? AND analyzer_type = ?")
            .bind(alert_id)
            .bind(analyzer_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or_else(|| AlertError::NotFound(format!("{alert_id}/{analyzer_type}")))?;
        row_to_result(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteAnalyzerResultStore {
        let pool = crate::pool::connect("sqlite::memory:").await.unwrap();
        SqliteAnalyzerResultStore::new(pool)
    }

    #[tokio::test]
    async fn top_forward_targets_orders_by_frequency() {
        let store = store().await;
        for (url, count) in [("https://a.example.com", 3), ("https://b.example.com", 1)] {
            for _ in 0..count {
                sqlx::query(
                    "INSERT INTO forward_log (tag, url, stream_id, err, logged_at) VALUES (?, ?, '', '', ?)",
                )
                .bind("sg-forward")
                .bind(url)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&store.pool)
                .await
                .unwrap();
            }
        }

        let top = store.top_forward_targets("sg-forward", 5).await.unwrap();
        assert_eq!(top[0].url, "https://a.example.com");
        assert_eq!(top[0].len, 3);
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = store().await;
        let result = AnalyzerResult {
            alert_id: "alert-1".to_string(),
            analyzer_type: "sgForward".to_string(),
            alertname: "sg_forward_failed".to_string(),
            results: vec![ForwardTarget {
                url: "https://a.example.com".to_string(),
                stream_id: "s1".to_string(),
                err: String::new(),
                len: 3,
            }],
        };
        store.save_result(&result).await.unwrap();

        let got = store.get_result("alert-1", "sgForward").await.unwrap();
        assert_eq!(got.results.len(), 1);
    }
}
