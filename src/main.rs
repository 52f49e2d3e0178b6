use clap::Parser;
use tokio_util::sync::CancellationToken;

use judged::compilers::CompilerRegistry;
use judged::config::{CliArgs, Command};
use judged::database as db;
use judged::judge::Judge;
use judged::workdir::Workdir;
use judged::worker::Worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let config = cli.to_config()?;
    config.validate()?;

    let Command::Run { workdir, force } = &cli.command;
    let workdir = Workdir::prepare(workdir, *force)?;

    let db_path = match &config.database {
        Some(path) => path.clone(),
        None => db::get_db_path()?,
    };
    let db_pool = db::init_db(&db_path).await?;

    let judge = Judge::new(db_pool.clone(), &config, CompilerRegistry::with_defaults());
    let worker = Worker::new(db_pool.clone(), judge, workdir, &config);
    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_token.cancel();
    });

    worker.run(shutdown_token).await?;

    db_pool.close().await;
    log::info!("Shutdown complete");
    Ok(())
}

async fn wait_for_signal() {
    let mut sigterm =
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                log::warn!("Unable to listen for SIGTERM: {e}");
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Ctrl-c received, shutting down...");
                }
                return;
            }
        };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        _ = sigterm.recv() => {
            log::info!("SIGTERM received, shutting down...");
        }
    }
}
