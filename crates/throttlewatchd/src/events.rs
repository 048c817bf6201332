//! Engine event consumer

use throttlewatch_core::EngineEvent;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Drain engine events until the reconciler is dropped
///
/// The reconciler already logs each occurrence; this consumer keeps the
/// channel drained and records a short trail at debug level.
pub async fn log_events(mut events: mpsc::Receiver<EngineEvent>) -> u64 {
    let mut received = 0u64;

    while let Some(event) = events.recv().await {
        received += 1;
        match event {
            EngineEvent::CycleCompleted { report } => debug!(
                observed = report.observed,
                transitions = report.transitions,
                ledger_saved = report.ledger_saved,
                "cycle completed"
            ),
            EngineEvent::Throttled {
                resource_id,
                throttle_count,
            } => debug!(%resource_id, throttle_count, "throttled"),
            EngineEvent::Unthrottled {
                resource_id,
                duration_seconds,
                ..
            } => debug!(%resource_id, duration_seconds, "unthrottled"),
            EngineEvent::AutomationFailed {
                resource_id,
                action,
                error,
            } => warn!(%resource_id, %action, %error, "automation failed"),
            EngineEvent::Stopped { reason } => info!("Engine stopped: {}", reason),
            other => debug!(?other, "engine event"),
        }
    }

    debug!("Event channel closed after {} events", received);
    received
}
