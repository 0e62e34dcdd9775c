//! Stop signal shared by the relayer's timer loops.
//!
//! The signal is level-triggered: a loop spawned after the relayer was told
//! to stop sees it immediately, and checking it consumes nothing. Starting
//! the relayer again re-arms it.

use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

/// Why the relayer is stopping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// `Relayer::stop` was called.
    Requested,
    Interrupt,
    Terminate,
}

/// Owner side of the stop signal.
#[derive(Debug)]
pub struct StopSignal {
    tx: watch::Sender<Option<StopReason>>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn listener(&self) -> StopListener {
        StopListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Tell every listener to stop. The first reason sticks.
    pub fn trigger(&self, reason: StopReason) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    pub fn reason(&self) -> Option<StopReason> {
        *self.tx.borrow()
    }

    /// Clear a previous stop. Listeners created afterwards start out running.
    pub fn rearm(&self) {
        self.tx.send_replace(None);
    }

    /// Wait for SIGINT or SIGTERM, trigger the stop, and return which
    /// signal arrived.
    pub async fn trigger_on_os_signal(&self) -> StopReason {
        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable, relying on SIGINT");
                    std::future::pending::<()>().await;
                }
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let reason = tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "SIGINT handler failed, stopping");
                }
                StopReason::Interrupt
            }
            _ = terminate => StopReason::Terminate,
        };
        info!(?reason, "stop signal received");
        self.trigger(reason);
        reason
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener side, one per timer loop.
#[derive(Clone, Debug)]
pub struct StopListener {
    rx: watch::Receiver<Option<StopReason>>,
}

impl StopListener {
    /// Resolves once a stop is triggered, at once if it already was. A
    /// dropped [`StopSignal`] counts as a requested stop.
    pub async fn stopped(&mut self) -> StopReason {
        match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(StopReason::Requested),
            Err(_) => StopReason::Requested,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_listener_sees_the_stop() {
        let signal = StopSignal::new();
        let mut first = signal.listener();
        let mut second = signal.listener();
        signal.trigger(StopReason::Requested);
        assert_eq!(first.stopped().await, StopReason::Requested);
        assert_eq!(second.stopped().await, StopReason::Requested);
    }

    #[tokio::test]
    async fn late_listener_stops_at_once_and_first_reason_sticks() {
        let signal = StopSignal::new();
        signal.trigger(StopReason::Terminate);
        signal.trigger(StopReason::Requested);

        let mut late = signal.listener();
        assert!(late.is_stopped());
        assert_eq!(late.stopped().await, StopReason::Terminate);
        assert_eq!(signal.reason(), Some(StopReason::Terminate));
    }

    #[tokio::test]
    async fn rearm_lets_new_listeners_run() {
        let signal = StopSignal::new();
        signal.trigger(StopReason::Requested);
        signal.rearm();
        assert!(!signal.listener().is_stopped());
        assert_eq!(signal.reason(), None);
    }

    #[tokio::test]
    async fn dropped_signal_releases_listeners() {
        let signal = StopSignal::new();
        let mut listener = signal.listener();
        drop(signal);
        assert_eq!(listener.stopped().await, StopReason::Requested);
    }
}
