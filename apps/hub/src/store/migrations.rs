use anyhow::{Context, Result};
use libsql::Connection;
use tracing::info;

use super::models::timestamp_to_i64;

/// One forward-only schema step
struct Migration {
    version: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Validators, targets and ticks",
        sql: "CREATE TABLE IF NOT EXISTS validators (
                id TEXT PRIMARY KEY,
                public_key TEXT NOT NULL UNIQUE,
                ip TEXT NOT NULL,
                location TEXT NOT NULL,
                first_seen INTEGER NOT NULL,
                last_seen INTEGER NOT NULL,
                payment INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS targets (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL UNIQUE,
                owner TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ticks (
                id TEXT PRIMARY KEY,
                target_id TEXT NOT NULL REFERENCES targets(id) ON DELETE CASCADE,
                validator_id TEXT NOT NULL REFERENCES validators(id),
                status TEXT NOT NULL,
                latency_ms INTEGER NOT NULL,
                status_code INTEGER NOT NULL,
                timestamp INTEGER NOT NULL
            );",
    },
    Migration {
        version: 2,
        description: "Index tick history by target and time",
        sql: "CREATE INDEX IF NOT EXISTS idx_ticks_target_time ON ticks (target_id, timestamp DESC);",
    },
];

/// Highest version this build knows about
pub fn latest_version() -> i32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Bring the schema up to the latest version, skipping applied steps
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let applied = applied_version(conn).await?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();

    if pending.is_empty() {
        info!("Database schema is current (version {})", applied);
        return Ok(());
    }

    for migration in pending {
        conn.execute_batch(migration.sql)
            .await
            .with_context(|| format!("Migration v{} failed", migration.version))?;

        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
            libsql::params![
                migration.version,
                timestamp_to_i64(std::time::SystemTime::now()),
                migration.description
            ],
        )
        .await?;

        info!("Applied migration v{}: {}", migration.version, migration.description);
    }

    Ok(())
}

async fn applied_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    match rows.next().await? {
        Some(row) => Ok(row.get::<Option<i32>>(0)?.unwrap_or(0)),
        None => Ok(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_migrations_are_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("migrate.db");
        let db = libsql::Builder::new_local(path.to_string_lossy().as_ref()).build().await?;
        let conn = db.connect()?;

        run_migrations(&conn).await?;
        run_migrations(&conn).await?;

        assert_eq!(applied_version(&conn).await?, latest_version());
        assert_eq!(latest_version(), 2);
        Ok(())
    }
}
