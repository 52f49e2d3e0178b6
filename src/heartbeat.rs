use sqlx::SqlitePool;

use crate::create_timestamp;
use crate::database as db;

/// Liveness record of one running daemon instance
///
/// Registered on start, refreshed on every poll, removed on clean shutdown.
/// Each instance owns its own row, so instances sharing a name never touch
/// each other's record.
pub struct Heartbeat {
    pool: SqlitePool,
    id: i64,
    name: String,
    started_time: String,
}

impl Heartbeat {
    pub async fn start(pool: SqlitePool, name: impl Into<String>) -> sqlx::Result<Self> {
        let name = name.into();
        let started_time = create_timestamp();
        let id = db::insert_tester_status(&pool, &name).await?;
        log::debug!("Registered tester {name} as #{id}");
        Ok(Self {
            pool,
            id,
            name,
            started_time,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn beat(&self) -> sqlx::Result<()> {
        db::touch_tester_status(&self.pool, self.id, &self.name, &self.started_time).await
    }

    pub async fn stop(self) -> sqlx::Result<()> {
        db::delete_tester_status(&self.pool, self.id).await?;
        log::debug!("Unregistered tester {} (#{})", self.name, self.id);
        Ok(())
    }
}
