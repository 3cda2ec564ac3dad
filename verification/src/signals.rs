//! Run control for the verification orchestrator.
//!
//! The host cancels or restarts an in-flight run through a
//! [`VerificationControl`]. Signals go out on a `tokio::sync::broadcast`
//! channel that the run races against its flow, timeout and restart handling.

use tokio::sync::broadcast;

/// A request from the host to an in-flight run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlSignal {
    /// Stop the run; it ends in `Stopped`.
    Cancel,
    /// Re-send codes: abandon the current pass and re-enter from a state
    /// refresh.
    Restart,
}

/// Cloneable handle for signalling a run.
#[derive(Clone, Debug)]
pub struct VerificationControl {
    tx: broadcast::Sender<ControlSignal>,
}

impl VerificationControl {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(8);
        Self { tx }
    }

    /// Get a receiver that will be notified of every later signal.
    pub fn subscribe(&self) -> broadcast::Receiver<ControlSignal> {
        self.tx.subscribe()
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(ControlSignal::Cancel);
    }

    pub fn restart(&self) {
        let _ = self.tx.send(ControlSignal::Restart);
    }
}

impl Default for VerificationControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for the next signal. A lagged receiver reports the newest signal it
/// can still see; a closed channel never resolves.
pub(crate) async fn next_signal(rx: &mut broadcast::Receiver<ControlSignal>) -> ControlSignal {
    loop {
        match rx.recv().await {
            Ok(signal) => return signal,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_notifies_subscribers() {
        let control = VerificationControl::new();
        let mut rx = control.subscribe();
        control.cancel();
        assert_eq!(next_signal(&mut rx).await, ControlSignal::Cancel);
    }

    #[tokio::test]
    async fn clones_share_the_channel() {
        let control = VerificationControl::new();
        let mut rx1 = control.subscribe();
        let mut rx2 = control.subscribe();
        control.clone().restart();
        assert_eq!(next_signal(&mut rx1).await, ControlSignal::Restart);
        assert_eq!(next_signal(&mut rx2).await, ControlSignal::Restart);
    }

    #[tokio::test]
    async fn signals_before_subscribing_are_not_seen() {
        let control = VerificationControl::new();
        control.cancel();
        let mut rx = control.subscribe();
        assert!(rx.try_recv().is_err());
    }
}
