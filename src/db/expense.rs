//! Expense repository

use chrono::{Duration, Utc};

use super::DbPool;
use crate::{Error, Result};

/// One recorded expense
#[derive(Debug, Clone)]
pub struct Expense {
    pub amount: f64,
    pub category: String,
    pub description: String,
    /// `YYYY-MM-DD HH:MM:SS` as stored by `SQLite`
    pub timestamp: String,
}

impl Expense {
    /// Date part of the timestamp
    #[must_use]
    pub fn date(&self) -> &str {
        self.timestamp.get(..10).unwrap_or(&self.timestamp)
    }
}

/// Expense repository
#[derive(Clone)]
pub struct ExpenseRepo {
    pool: DbPool,
}

impl ExpenseRepo {
    /// Create a new expense repository
    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record an expense
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn track(&self, amount: f64, category: &str, description: &str) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        conn.execute(
            "INSERT INTO expenses (amount, category, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![amount, category, description],
        )?;
        Ok(())
    }

    /// Expenses from the last `days` days, optionally filtered by category,
    /// newest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn entries_since(&self, days: i64, category: Option<&str>) -> Result<Vec<Expense>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let since = since_date(days);

        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(Expense {
                amount: row.get(0)?,
                category: row.get(1)?,
                description: row.get(2)?,
                timestamp: row.get(3)?,
            })
        };

        let rows = if let Some(category) = category {
            let mut stmt = conn.prepare(
                "SELECT amount, category, description, timestamp FROM expenses
                 WHERE category = ?1 AND timestamp >= ?2 ORDER BY timestamp DESC",
            )?;
            let rows = stmt.query_map(rusqlite::params![category, since], map_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            let mut stmt = conn.prepare(
                "SELECT amount, category, description, timestamp FROM expenses
                 WHERE timestamp >= ?1 ORDER BY timestamp DESC",
            )?;
            let rows = stmt.query_map(rusqlite::params![since], map_row)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        };

        Ok(rows)
    }

    /// Total spent in one category over the last `days` days
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn category_total_since(&self, category: &str, days: i64) -> Result<f64> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let total = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM expenses
             WHERE category = ?1 AND timestamp >= ?2",
            rusqlite::params![category, since_date(days)],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Total spent over the last `days` days
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn total_since(&self, days: i64) -> Result<f64> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let total = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM expenses WHERE timestamp >= ?1",
            rusqlite::params![since_date(days)],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Totals per category over the last `days` days, largest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn totals_by_category_since(&self, days: i64) -> Result<Vec<(String, f64)>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;
        let mut stmt = conn.prepare(
            "SELECT category, SUM(amount) FROM expenses
             WHERE timestamp >= ?1 GROUP BY category ORDER BY SUM(amount) DESC",
        )?;
        let rows = stmt.query_map(rusqlite::params![since_date(days)], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }
}

fn since_date(days: i64) -> String {
    (Utc::now() - Duration::days(days))
        .format("%Y-%m-%d")
        .to_string()
}
