//! Poll scheduler
//!
//! Runs the [`Reconciler`] serially: one cycle immediately, then the normal
//! poll interval after a successful cycle and the shorter retry delay after
//! a failed one. A cycle in progress always completes before shutdown is
//! observed.

use std::future::Future;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{error, info};

use super::{EngineEvent, Reconciler};
use crate::cache::StatusCache;
use crate::config::EngineConfig;
use crate::error::Result;

/// Timer-driven runner for the reconciliation engine
pub struct PollScheduler {
    reconciler: Reconciler,
    poll_interval: Duration,
    retry_delay: Duration,
}

impl PollScheduler {
    /// Create a scheduler with the configured intervals
    pub fn new(reconciler: Reconciler, config: &EngineConfig) -> Self {
        Self {
            reconciler,
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    /// Override the intervals
    pub fn with_intervals(mut self, poll_interval: Duration, retry_delay: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.retry_delay = retry_delay;
        self
    }

    /// Handle to the cache the reconciler publishes into
    pub fn cache(&self) -> StatusCache {
        self.reconciler.cache()
    }

    /// The wrapped reconciler
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Run until SIGINT/ctrl-c
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run with a controlled shutdown signal
    ///
    /// **TESTING ONLY**: production code should use [`PollScheduler::run()`]
    /// or [`PollScheduler::run_until()`]. `None` falls back to ctrl-c.
    pub async fn run_with_shutdown(
        &mut self,
        shutdown_rx: Option<oneshot::Receiver<()>>,
    ) -> Result<()> {
        match shutdown_rx {
            Some(rx) => {
                self.run_until(async {
                    let _ = rx.await;
                })
                .await
            }
            None => self.run().await,
        }
    }

    /// Run until the given future resolves
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let delay = match self.reconciler.run_cycle().await {
                Ok(_) => self.poll_interval,
                Err(e) => {
                    error!(
                        "Cycle failed: {}. Retrying in {}s",
                        e,
                        self.retry_delay.as_secs()
                    );
                    self.retry_delay
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.reconciler.emit_event(EngineEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        info!("Poll scheduler stopped");
        Ok(())
    }
}
