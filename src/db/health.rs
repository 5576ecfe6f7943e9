//! Health log repository

use chrono::{Duration, Utc};

use super::DbPool;
use crate::{Error, Result};

/// One logged health data point
#[derive(Debug, Clone)]
pub struct HealthEntry {
    pub metric: String,
    pub value: f64,
    pub notes: String,
    /// `YYYY-MM-DD HH:MM:SS` as stored by `SQLite`
    pub timestamp: String,
}

impl HealthEntry {
    /// Date part of the timestamp
    #[must_use]
    pub fn date(&self) -> &str {
        self.timestamp.get(..10).unwrap_or(&self.timestamp)
    }
}

/// Health log repository
#[derive(Clone)]
pub struct HealthRepo {
    pool: DbPool,
}

impl HealthRepo {
    /// Create a new health repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a health data point
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn log(&self, metric: &str, value: f64, notes: &str) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        conn.execute(
            "INSERT INTO health_logs (metric, value, notes) VALUES (?1, ?2, ?3)",
            rusqlite::params![metric, value, notes],
        )?;
        Ok(())
    }

    /// Entries from the last `days` days, optionally filtered to a metric set
    ///
    /// Newest first when `ascending` is false.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn entries_since(
        &self,
        days: i64,
        metrics: Option<&[String]>,
        ascending: bool,
    ) -> Result<Vec<HealthEntry>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let since = (Utc::now() - Duration::days(days))
            .format("%Y-%m-%d")
            .to_string();
        let order = if ascending { "ASC" } else { "DESC" };

        let mut sql = String::from(
            "SELECT metric, value, notes, timestamp FROM health_logs WHERE timestamp >= ?1",
        );
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(since)];
        if let Some(metrics) = metrics {
            let placeholders: Vec<String> = (0..metrics.len())
                .map(|i| format!("?{}", i + 2))
                .collect();
            sql.push_str(&format!(" AND metric IN ({})", placeholders.join(",")));
            for metric in metrics {
                params.push(Box::new(metric.clone()));
            }
        }
        sql.push_str(&format!(" ORDER BY timestamp {order}"));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(params.iter().map(|p| &**p)),
            |row| {
                Ok(HealthEntry {
                    metric: row.get(0)?,
                    value: row.get(1)?,
                    notes: row.get(2)?,
                    timestamp: row.get(3)?,
                })
            },
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn log_and_query_round_trip() {
        let pool = db::init_memory().unwrap();
        let repo = HealthRepo::new(pool);

        repo.log("sleep_hours", 7.5, "solid night").unwrap();
        repo.log("steps", 9000.0, "").unwrap();

        let all = repo.entries_since(7, None, false).unwrap();
        assert_eq!(all.len(), 2);

        let sleep_only = repo
            .entries_since(7, Some(&["sleep_hours".to_string()]), false)
            .unwrap();
        assert_eq!(sleep_only.len(), 1);
        assert!((sleep_only[0].value - 7.5).abs() < f64::EPSILON);
        assert_eq!(sleep_only[0].notes, "solid night");
    }

    #[test]
    fn date_extracts_day_part() {
        let entry = HealthEntry {
            metric: "mood".to_string(),
            value: 4.0,
            notes: String::new(),
            timestamp: "2026-08-05 09:30:00".to_string(),
        };
        assert_eq!(entry.date(), "2026-08-05");
    }
}
