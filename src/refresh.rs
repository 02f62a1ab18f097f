//! Periodic refresh timer
//!
//! Ticks on a tokio interval and tells the watcher loop when a refetch is
//! due. Manual refreshes go through the same channel.

use std::time::Duration;
use tokio::sync::mpsc;

/// Messages sent from the timer to the watcher loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshMessage {
    /// Time to refetch every subscription
    RefreshDue,
}

/// Configuration for the refresh timer
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Time between refreshes
    pub interval: Duration,
    /// Whether the timer runs at all
    pub enabled: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            enabled: true,
        }
    }
}

/// Handle for controlling the refresh timer
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    sender: mpsc::Sender<RefreshMessage>,
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Creates a RefreshHandle and spawns the timer task
    ///
    /// The first message arrives one full interval after spawning.
    pub fn spawn(config: RefreshConfig) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            let period = config.interval;
            let tx = msg_tx.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                // Skip the first tick (immediate)
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if tx.send(RefreshMessage::RefreshDue).await.is_err() {
                                break;
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
            });
        }

        Self {
            receiver: msg_rx,
            sender: msg_tx,
            shutdown_tx,
        }
    }

    /// Requests an immediate refresh
    pub async fn request_refresh(&self) {
        let _ = self.sender.send(RefreshMessage::RefreshDue).await;
    }

    /// Waits for the next refresh message
    pub async fn recv(&mut self) -> Option<RefreshMessage> {
        self.receiver.recv().await
    }

    /// Shuts down the timer task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Checks for pending refresh messages without blocking
pub fn try_recv(handle: &mut RefreshHandle) -> Option<RefreshMessage> {
    handle.receiver.try_recv().ok()
}
