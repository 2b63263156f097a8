//! Host adapter: drives an [`Engine`] through its lifecycle and runs its
//! background maintenance.
//!
//! [`Host::start`] installs and activates the engine, posts a single
//! `CLEANUP_CACHE` message (once per host start), and spawns a maintenance
//! actor. The actor owns the message channel and a periodic tick; each tick
//! sweeps the store so stale entries are purged even without request traffic.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::{Engine, EngineError, SweepReport};

/// Default maintenance period (one hour).
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60 * 60);

const CHANNEL_CAPACITY: usize = 32;

/// Errors produced by the host adapter.
#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("maintenance task is not running")]
    Closed,
}

/// How the host drives its engine.
#[derive(Debug, Clone)]
pub struct HostOptions {
    /// Period of the maintenance tick.
    pub maintenance_interval: Duration,
    /// Post one `CLEANUP_CACHE` message right after activation.
    pub cleanup_on_start: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
            cleanup_on_start: true,
        }
    }
}

type Reply = oneshot::Sender<Result<Option<SweepReport>, EngineError>>;

enum Command {
    Message { body: Value, reply: Option<Reply> },
    Shutdown,
}

/// A running engine plus its maintenance actor.
pub struct Host {
    engine: Arc<Engine>,
    tx: mpsc::Sender<Command>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Host {
    /// Installs and activates `engine`, then starts maintenance.
    ///
    /// # Errors
    ///
    /// [`HostError::Engine`] if install or activation fails.
    pub async fn start(engine: Arc<Engine>, options: HostOptions) -> Result<Self, HostError> {
        engine.install()?;
        let report = engine.activate().await?;
        info!(
            store = %engine.config().store_name,
            deleted = ?report.deleted_stores,
            "engine activated"
        );

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let task = tokio::spawn(maintenance_loop(
            Arc::clone(&engine),
            rx,
            options.maintenance_interval,
        ));

        let host = Self {
            engine,
            tx,
            task: Mutex::new(Some(task)),
        };

        if options.cleanup_on_start {
            host.send(Command::Message {
                body: json!({ "type": "CLEANUP_CACHE" }),
                reply: None,
            })
            .await?;
        }

        Ok(host)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Forwards `message` to the engine and waits for it to be handled.
    ///
    /// Returns the sweep report for a cleanup message, `None` for anything
    /// the engine ignores.
    pub async fn post_message(&self, message: Value) -> Result<Option<SweepReport>, HostError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Message {
            body: message,
            reply: Some(reply),
        })
        .await?;
        Ok(rx.await.map_err(|_| HostError::Closed)??)
    }

    /// Stops the maintenance actor and waits for it to finish.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown).await;
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "maintenance task ended abnormally");
            }
        }
    }

    async fn send(&self, command: Command) -> Result<(), HostError> {
        self.tx.send(command).await.map_err(|_| HostError::Closed)
    }
}

async fn maintenance_loop(engine: Arc<Engine>, mut rx: mpsc::Receiver<Command>, period: Duration) {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; startup cleanup is a message.
    ticker.tick().await;

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Message { body, reply }) => {
                    let result = engine.handle_message(&body).await;
                    match reply {
                        Some(reply) => {
                            let _ = reply.send(result);
                        }
                        None => {
                            if let Err(e) = result {
                                warn!(error = %e, "background message failed");
                            }
                        }
                    }
                }
                Some(Command::Shutdown) | None => break,
            },
            _ = ticker.tick() => {
                debug!("maintenance tick");
                if let Err(e) = engine.sweep().await {
                    warn!(error = %e, "periodic sweep failed");
                }
            }
        }
    }

    debug!("maintenance task stopped");
}
