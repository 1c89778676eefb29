use std::path::Path;

use anyhow::{Context, Result};
use deadpool::managed::{self, Pool, RecycleResult};
use libsql::{Builder, Connection, Database, Error as LibsqlError};

/// Milliseconds a writer waits on a locked database before giving up
const BUSY_TIMEOUT_MS: u64 = 5_000;

pub struct LibsqlManager {
    database: Database,
}

impl LibsqlManager {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl managed::Manager for LibsqlManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let conn = self.database.connect()?;
        // PRAGMAs answer with a row, so go through query rather than execute
        conn.query(&format!("PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}"), ()).await?.next().await?;
        Ok(conn)
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> RecycleResult<Self::Error> {
        conn.query("SELECT 1", ())
            .await?
            .next()
            .await?
            .ok_or(LibsqlError::QueryReturnedNoRows)?;
        Ok(())
    }
}

pub type LibsqlPool = Pool<LibsqlManager>;

/// Open (or create) the database file and build a connection pool over it
pub async fn open(path: &Path, max_size: usize) -> Result<LibsqlPool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
    }

    let database = Builder::new_local(path)
        .build()
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))?;

    // WAL so reads run alongside appends
    let conn = database.connect()?;
    conn.query("PRAGMA journal_mode = WAL", ()).await?.next().await?;
    drop(conn);

    let pool = Pool::builder(LibsqlManager::new(database))
        .max_size(max_size.max(1))
        .build()
        .context("Failed to build connection pool")?;

    tracing::info!("Opened database {} (pool size {})", path.display(), max_size.max(1));
    Ok(pool)
}
