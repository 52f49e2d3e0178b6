use std::time::Duration;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ShutdownPolicy};
use crate::database as db;
use crate::error::RecoverableError;
use crate::heartbeat::Heartbeat;
use crate::judge::{Judge, Processed};
use crate::workdir::Workdir;

/// Claim loop of one daemon instance
pub struct Worker {
    pool: SqlitePool,
    judge: Judge,
    workdir: Workdir,
    tester_name: String,
    poll_interval: Duration,
    on_shutdown: ShutdownPolicy,
}

impl Worker {
    pub fn new(pool: SqlitePool, judge: Judge, workdir: Workdir, config: &Config) -> Self {
        Self {
            pool,
            judge,
            workdir,
            tester_name: config.tester_name.clone(),
            poll_interval: config.poll_interval(),
            on_shutdown: config.on_shutdown,
        }
    }

    /// Polls for submissions until `token` is cancelled
    ///
    /// Failures while judging a submission are logged and never stop the loop.
    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        let heartbeat = Heartbeat::start(self.pool.clone(), self.tester_name.clone()).await?;
        let registry = self.judge.registry();
        let compilers = registry.compiler_names();
        let runners = registry.runner_names();
        let name = heartbeat.name();
        log::info!("Tester {name} started in {}", self.workdir.path().display());

        while !token.is_cancelled() {
            if let Err(e) = heartbeat.beat().await {
                log::warn!("Failed to refresh tester status: {e}");
            }

            let claimed = db::claim_next(&self.pool, name, &compilers, &runners).await;
            match claimed {
                Ok(Some(id)) => {
                    log::info!("Claimed submission {id}");
                    self.handle(id, &token).await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => log::error!("Failed to claim a submission: {e}"),
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        log::info!("Tester {name} received shutdown signal, stopping");
        heartbeat.stop().await?;
        log::info!("Tester {} has shut down gracefully", self.tester_name);
        Ok(())
    }

    async fn handle(&self, id: i64, token: &CancellationToken) {
        let result = async {
            let dir = self.workdir.acquire().await?;
            self.judge.process(id, dir, token).await
        }
        .await;

        match result {
            Ok(Processed::Finished(_)) => {}
            Ok(Processed::Interrupted) => self.interrupted(id).await,
            Err(e) if e.downcast_ref::<RecoverableError>().is_some() => {
                log::warn!("Submission {id} abandoned: {e:#}");
            }
            Err(e) => {
                log::error!("Submission {id} failed: {e:#}");
                if let Err(e) = db::mark_system_error(&self.pool, id, &format!("{e:#}")).await {
                    log::error!("Failed to mark submission {id} as system error: {e}");
                }
            }
        }
    }

    async fn interrupted(&self, id: i64) {
        let stored = match self.on_shutdown {
            ShutdownPolicy::Reclaim => {
                log::info!("Returning submission {id} to the queue");
                db::reclaim(&self.pool, id).await
            }
            ShutdownPolicy::Fail => {
                log::info!("Marking interrupted submission {id} as system error");
                db::mark_system_error(&self.pool, id, "Interrupted by tester shutdown").await
            }
        };
        if let Err(e) = stored {
            log::error!("Failed to store interrupted submission {id}: {e}");
        }
    }
}
