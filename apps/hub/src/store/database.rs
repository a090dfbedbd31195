use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use guardian_proto::{PublicKey, TickStatus};
use libsql::{Row, params};
use std::time::SystemTime;
use uuid::Uuid;

use super::models::{
    MonitoredTarget, NewTick, Tick, ValidatorRecord, i64_to_timestamp, timestamp_to_i64,
};
use super::pool::{LibsqlManager, LibsqlPool, open_local_pool};
use super::{IdentityStore, ResultSink, TargetAdmin, TargetSource, TickReader};

const TARGET_COLUMNS: &str = "id, url, owner, enabled";
const TICK_COLUMNS: &str = "id, validator_id, target_id, status, latency_ms, status_code, timestamp";
const VALIDATOR_COLUMNS: &str = "id, public_key, ip, location, first_seen, last_seen, payment";

/// libsql-backed store
pub struct LibsqlStore {
    pool: LibsqlPool,
}

impl LibsqlStore {
    /// Create a store from an existing pool; the schema must already exist
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Open a local database file, run migrations and return the store
    pub async fn open(path: &str) -> Result<Self> {
        let pool = open_local_pool(path, 8)
            .await
            .with_context(|| format!("Failed to open database at {path}"))?;

        {
            let conn = pool.get().await?;
            super::migrations::run_migrations(&conn).await?;
        }

        Ok(Self::new_from_pool(pool))
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    async fn target_by(&self, column: &str, value: String) -> Result<Option<MonitoredTarget>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {TARGET_COLUMNS} FROM targets WHERE {column} = ?");
        let mut rows = conn.query(&sql, params![value]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_target(&row)?)),
            None => Ok(None),
        }
    }
}

fn parse_uuid(raw: String) -> Result<Uuid> {
    Uuid::parse_str(&raw).with_context(|| format!("Corrupt uuid in database: {raw}"))
}

fn row_to_target(row: &Row) -> Result<MonitoredTarget> {
    Ok(MonitoredTarget {
        id: parse_uuid(row.get(0)?)?,
        url: row.get(1)?,
        owner: row.get(2)?,
        enabled: row.get::<i64>(3)? != 0,
    })
}

fn row_to_tick(row: &Row) -> Result<Tick> {
    let status: String = row.get(3)?;

    Ok(Tick {
        id: parse_uuid(row.get(0)?)?,
        validator_id: parse_uuid(row.get(1)?)?,
        target_id: parse_uuid(row.get(2)?)?,
        status: status.parse::<TickStatus>().map_err(|e| anyhow!(e))?,
        latency_ms: row.get::<i64>(4)? as u64,
        status_code: row.get::<i64>(5)? as u16,
        timestamp: i64_to_timestamp(row.get(6)?),
    })
}

fn row_to_validator(row: &Row) -> Result<ValidatorRecord> {
    let key: String = row.get(1)?;

    Ok(ValidatorRecord {
        id: parse_uuid(row.get(0)?)?,
        public_key: key.parse::<PublicKey>()?,
        ip: row.get(2)?,
        location: row.get(3)?,
        first_seen: i64_to_timestamp(row.get(4)?),
        last_seen: i64_to_timestamp(row.get(5)?),
        payment: row.get(6)?,
    })
}

#[async_trait]
impl TargetSource for LibsqlStore {
    async fn list_enabled(&self) -> Result<Vec<MonitoredTarget>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {TARGET_COLUMNS} FROM targets WHERE enabled = 1");
        let mut rows = conn.query(&sql, ()).await?;

        let mut targets = Vec::new();
        while let Some(row) = rows.next().await? {
            targets.push(row_to_target(&row)?);
        }

        Ok(targets)
    }
}

#[async_trait]
impl IdentityStore for LibsqlStore {
    async fn upsert(
        &self,
        public_key: &PublicKey,
        ip: &str,
        location: &str,
    ) -> Result<ValidatorRecord> {
        let conn = self.get_conn().await?;
        let now = timestamp_to_i64(SystemTime::now());

        // A fresh id is only used when the key has never been seen
        conn.execute(
            "INSERT INTO validators (id, public_key, ip, location, first_seen, last_seen, payment)
             VALUES (?, ?, ?, ?, ?, ?, 0)
             ON CONFLICT(public_key) DO UPDATE SET
                ip = excluded.ip,
                location = excluded.location,
                last_seen = excluded.last_seen",
            params![
                Uuid::new_v4().to_string(),
                public_key.to_hex(),
                ip.to_string(),
                location.to_string(),
                now,
                now
            ],
        )
        .await?;

        let sql = format!("SELECT {VALIDATOR_COLUMNS} FROM validators WHERE public_key = ?");
        let mut rows = conn.query(&sql, params![public_key.to_hex()]).await?;
        let row = rows.next().await?.ok_or_else(|| anyhow!("Validator vanished after upsert"))?;

        row_to_validator(&row)
    }
}

#[async_trait]
impl ResultSink for LibsqlStore {
    async fn record(&self, tick: NewTick) -> Result<Tick> {
        let conn = self.get_conn().await?;
        let tick = Tick::from_new(Uuid::new_v4(), tick);

        conn.execute(
            "INSERT INTO ticks (id, validator_id, target_id, status, latency_ms, status_code, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                tick.id.to_string(),
                tick.validator_id.to_string(),
                tick.target_id.to_string(),
                tick.status.to_string(),
                tick.latency_ms as i64,
                tick.status_code as i64,
                timestamp_to_i64(tick.timestamp)
            ],
        )
        .await
        .with_context(|| format!("Failed to save tick for target {}", tick.target_id))?;

        Ok(tick)
    }
}

#[async_trait]
impl TickReader for LibsqlStore {
    async fn recent_ticks(&self, target_id: Uuid, limit: usize) -> Result<Vec<Tick>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {TICK_COLUMNS} FROM ticks WHERE target_id = ? ORDER BY timestamp DESC, rowid DESC LIMIT ?"
        );
        let mut rows = conn.query(&sql, params![target_id.to_string(), limit as i64]).await?;

        let mut ticks = Vec::new();
        while let Some(row) = rows.next().await? {
            ticks.push(row_to_tick(&row)?);
        }

        Ok(ticks)
    }
}

#[async_trait]
impl TargetAdmin for LibsqlStore {
    async fn add_target(&self, url: &str, owner: &str) -> Result<MonitoredTarget> {
        super::validate_target_url(url)?;

        let target = MonitoredTarget::new(url, owner);
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO targets (id, url, owner, enabled, created_at) VALUES (?, ?, ?, 1, ?)",
            params![
                target.id.to_string(),
                target.url.clone(),
                target.owner.clone(),
                timestamp_to_i64(SystemTime::now())
            ],
        )
        .await
        .with_context(|| format!("Failed to add target {url}"))?;

        Ok(target)
    }

    async fn find_target_by_url(&self, url: &str) -> Result<Option<MonitoredTarget>> {
        self.target_by("url", url.to_string()).await
    }

    async fn set_enabled(&self, target_id: Uuid, enabled: bool) -> Result<bool> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE targets SET enabled = ? WHERE id = ?",
                params![if enabled { 1 } else { 0 }, target_id.to_string()],
            )
            .await?;

        Ok(changed > 0)
    }
}
