use flume::Sender;
use tokio::signal::unix::{SignalKind, signal};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// SIGINT or SIGTERM: ask the running scan to cancel.
    CancelRequested,
}

/// Wait for termination signals and forward them as cancel requests.
///
/// Returns cleanly when the receiving side goes away.
pub async fn wait_for_signal(tx: Sender<SignalEvent>) -> anyhow::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = interrupt.recv() => debug!("received SIGINT"),
            _ = terminate.recv() => debug!("received SIGTERM"),
        }
        if tx.send_async(SignalEvent::CancelRequested).await.is_err() {
            return Ok(());
        }
    }
}
