//! Periodic reply ingestion for a set of mailbox owners.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::engine::Engine;
use crate::ingest::IngestError;

/// Runs `Engine::ingest_replies` for every owner on a fixed interval, or
/// immediately when a trigger is received.
pub struct IngestScheduler {
    engine: Arc<Engine>,
    owner_ids: Vec<i64>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl IngestScheduler {
    pub fn new(engine: Arc<Engine>, owner_ids: Vec<i64>, interval: Duration) -> Self {
        Self {
            engine,
            owner_ids,
            interval,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the ingestion loop in a background thread.
    pub fn start(&self, mut trigger_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let shutdown = Arc::clone(&self.shutdown);
        let owner_ids = self.owner_ids.clone();
        let interval = self.interval;

        std::thread::spawn(move || {
            let rt = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    log::error!("Failed to start ingestion runtime: {}", e);
                    return;
                }
            };

            rt.block_on(async {
                let mut interval_timer = tokio::time::interval(interval);
                interval_timer.tick().await; // skip immediate first tick

                loop {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    tokio::select! {
                        _ = interval_timer.tick() => {},
                        Ok(()) = trigger_rx.recv() => {
                            log::info!("Manual reply ingestion triggered");
                        },
                    }

                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }

                    for &owner_id in &owner_ids {
                        match engine.ingest_replies(owner_id).await {
                            Ok(summary) if summary.fetched > 0 => {
                                log::info!(
                                    "Ingestion for owner {}: {} fetched, {} matched, {} unresolved",
                                    owner_id,
                                    summary.fetched,
                                    summary.matched(),
                                    summary.unresolved + summary.ambiguous
                                );
                            }
                            Ok(_) => {}
                            Err(IngestError::AlreadyRunning { .. }) => {
                                log::debug!("Ingestion for owner {} still running", owner_id);
                            }
                            Err(e) => log::error!("Ingestion for owner {} failed: {}", owner_id, e),
                        }
                    }
                }
            });
        })
    }

    /// Signals the scheduler to stop.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use tempfile::TempDir;

    use crate::db::Database;
    use crate::email::{EmailError, MailSender, MailboxSource, TransportFactory};
    use crate::engine::EngineSettings;

    #[derive(Default)]
    struct CountingTransports {
        mailbox_requests: AtomicUsize,
    }

    impl TransportFactory for CountingTransports {
        fn sender(&self, owner_id: i64) -> crate::email::error::Result<Box<dyn MailSender>> {
            Err(EmailError::ConfigError(format!("no sender for {}", owner_id)))
        }

        fn mailbox(&self, owner_id: i64) -> crate::email::error::Result<Box<dyn MailboxSource>> {
            self.mailbox_requests.fetch_add(1, Ordering::SeqCst);
            Err(EmailError::ConfigError(format!("no mailbox for {}", owner_id)))
        }
    }

    fn engine(dir: &TempDir, transports: Arc<CountingTransports>) -> Arc<Engine> {
        let settings = EngineSettings {
            replies_directory: dir.path().join("replies"),
            aggregated_directory: dir.path().join("aggregated"),
            templates_directory: dir.path().join("templates"),
            worker_count: 1,
            queue_capacity: 4,
        };
        Arc::new(Engine::new(
            Database::open_in_memory().unwrap(),
            transports,
            settings,
        ))
    }

    #[test]
    fn test_scheduler_shutdown() {
        let dir = TempDir::new().unwrap();
        let scheduler = IngestScheduler::new(
            engine(&dir, Arc::new(CountingTransports::default())),
            vec![1],
            Duration::from_millis(50),
        );

        let (trigger_tx, trigger_rx) = broadcast::channel(16);
        let handle = scheduler.start(trigger_rx);

        std::thread::sleep(Duration::from_millis(100));
        scheduler.stop();
        assert!(scheduler.is_stopped());

        // Wake the select loop so it sees the shutdown
        let _ = trigger_tx.send(());

        handle.join().expect("scheduler thread panicked");
    }

    #[test]
    fn test_manual_trigger_runs_every_owner() {
        let dir = TempDir::new().unwrap();
        let transports = Arc::new(CountingTransports::default());
        let scheduler = IngestScheduler::new(
            engine(&dir, Arc::clone(&transports)),
            vec![1, 2],
            Duration::from_secs(3600),
        );

        let (trigger_tx, trigger_rx) = broadcast::channel(16);
        let handle = scheduler.start(trigger_rx);

        std::thread::sleep(Duration::from_millis(50));
        trigger_tx.send(()).unwrap();

        let mut waited = 0;
        while transports.mailbox_requests.load(Ordering::SeqCst) < 2 && waited < 100 {
            std::thread::sleep(Duration::from_millis(20));
            waited += 1;
        }
        assert_eq!(transports.mailbox_requests.load(Ordering::SeqCst), 2);

        scheduler.stop();
        let _ = trigger_tx.send(());
        handle.join().expect("scheduler thread panicked");
    }
}
