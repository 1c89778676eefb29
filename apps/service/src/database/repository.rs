use async_trait::async_trait;
use chrono::DateTime;
use libsql::{Connection, Row, params};
use std::collections::HashMap;

use super::error::StoreError;
use crate::monitoring::types::{Observation, ProbeStatus};
use crate::pool::{LibsqlManager, LibsqlPool};

const OBSERVATION_COLUMNS: &str = "id, target_name, status, latency_ms, message, observed_at";

/// Storage trait for the observation log
#[async_trait]
pub trait ObservationStore: Send + Sync {
    /// Persist one observation, returning its row id
    async fn append(&self, observation: &Observation) -> Result<i64, StoreError>;

    /// Newest observation for each requested target. Targets with no history
    /// are absent from the map.
    async fn latest_by_target(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, Observation>, StoreError>;

    /// Up to `limit` newest observations across all targets, newest first
    async fn recent(&self, limit: usize) -> Result<Vec<Observation>, StoreError>;

    /// Total number of stored observations
    async fn count(&self) -> Result<u64, StoreError>;
}

/// LibSQL observation store
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    /// Create a new store from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, StoreError> {
        Ok(self.pool.get().await?)
    }

    fn row_to_observation(row: &Row) -> Result<Observation, StoreError> {
        let id: i64 = row.get(0)?;
        let status_str: String = row.get(2)?;
        let observed_at: i64 = row.get(5)?;

        let status = status_str
            .parse::<ProbeStatus>()
            .map_err(|reason| StoreError::CorruptRow { id, reason })?;
        let observed_at = DateTime::from_timestamp_micros(observed_at).ok_or_else(|| {
            StoreError::CorruptRow { id, reason: format!("timestamp out of range: {observed_at}") }
        })?;

        Ok(Observation {
            id: Some(id),
            target_name: row.get(1)?,
            status,
            latency_ms: row.get(3)?,
            message: row.get(4)?,
            observed_at,
        })
    }

    async fn latest_for(conn: &Connection, name: &str) -> Result<Option<Observation>, StoreError> {
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {OBSERVATION_COLUMNS} FROM monitoring_logs WHERE target_name = ? ORDER BY observed_at DESC, id DESC LIMIT 1"
                ),
                params![name],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::row_to_observation(&row)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ObservationStore for LibsqlStore {
    async fn append(&self, observation: &Observation) -> Result<i64, StoreError> {
        let conn = self.get_conn().await?;

        // Down observations never carry latency
        let latency_ms = match observation.status {
            ProbeStatus::Up => observation.latency_ms,
            ProbeStatus::Down => 0.0,
        };

        conn.execute(
            "INSERT INTO monitoring_logs (target_name, status, latency_ms, message, observed_at) VALUES (?, ?, ?, ?, ?)",
            params![
                observation.target_name.clone(),
                observation.status.to_string(),
                latency_ms,
                observation.message.clone(),
                observation.observed_at.timestamp_micros()
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn latest_by_target(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, Observation>, StoreError> {
        let conn = self.get_conn().await?;
        let mut latest = HashMap::with_capacity(names.len());

        for name in names {
            if latest.contains_key(name) {
                continue;
            }
            if let Some(observation) = Self::latest_for(&conn, name).await? {
                latest.insert(name.clone(), observation);
            }
        }

        Ok(latest)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<Observation>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.get_conn().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {OBSERVATION_COLUMNS} FROM monitoring_logs ORDER BY observed_at DESC, id DESC LIMIT ?"
                ),
                params![limit],
            )
            .await?;

        let mut observations = Vec::new();
        while let Some(row) = rows.next().await? {
            observations.push(Self::row_to_observation(&row)?);
        }

        Ok(observations)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT COUNT(*) FROM monitoring_logs", ()).await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)?.max(0) as u64),
            None => Ok(0),
        }
    }
}
