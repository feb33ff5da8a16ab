//! Runs periodic reply ingestion for every configured mail account until
//! interrupted.
//!
//! Usage: `replyroll <config.json>`

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::mpsc;
use std::sync::Arc;

use log::{error, info};
use tokio::sync::broadcast;

use replyroll::db::default_database_path;
use replyroll::{load_config, logging, Database, Engine, IngestScheduler};

fn main() -> ExitCode {
    let Some(config_path) = std::env::args_os().nth(1).map(PathBuf::from) else {
        eprintln!("usage: replyroll <config.json>");
        return ExitCode::from(2);
    };

    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("replyroll: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("replyroll: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting replyroll v{}", env!("CARGO_PKG_VERSION"));

    let database_path = match config.database_path.as_deref() {
        Some(path) => Some(PathBuf::from(replyroll::secrets::expand_home(path))),
        None => default_database_path(),
    };
    let Some(database_path) = database_path else {
        error!("Could not determine database location; set databasePath in the config");
        return ExitCode::FAILURE;
    };

    let db = match Database::open(&database_path) {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = Arc::new(Engine::from_config(db, &config));
    let owner_ids: Vec<i64> = config.accounts.iter().map(|a| a.owner_id).collect();
    if owner_ids.is_empty() {
        log::warn!("No mail accounts configured; nothing will be ingested");
    }

    let scheduler = IngestScheduler::new(Arc::clone(&engine), owner_ids, config.ingest_interval());
    let (trigger_tx, trigger_rx) = broadcast::channel(4);
    let handle = scheduler.start(trigger_rx);

    let (stop_tx, stop_rx) = mpsc::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    }) {
        error!("Failed to install signal handler: {}", e);
        scheduler.stop();
        let _ = trigger_tx.send(());
        let _ = handle.join();
        return ExitCode::FAILURE;
    }

    info!(
        "Ingesting every {}s; press Ctrl-C to stop",
        config.ingest_interval().as_secs()
    );
    let _ = stop_rx.recv();

    info!("Shutting down");
    scheduler.stop();
    let _ = trigger_tx.send(());
    if handle.join().is_err() {
        error!("Ingestion thread panicked");
    }
    engine.shutdown();

    ExitCode::SUCCESS
}
