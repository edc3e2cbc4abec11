//! Shutdown coordination for the front server.
//!
//! A [`Shutdown`] is the one handle that both asks the server to stop and says
//! how long in-flight session work may take to finish. The trigger is
//! level-triggered: a task that starts waiting after the signal still sees it.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::DispatcherConfig;

/// Graceful-shutdown trigger plus the drain deadline that goes with it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    token: CancellationToken,
    deadline: Duration,
}

impl Shutdown {
    pub fn new(deadline: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline,
        }
    }

    /// Use the dispatcher's configured drain deadline.
    pub fn from_config(config: &DispatcherConfig) -> Self {
        Self::new(Duration::from_secs(config.shutdown_deadline_secs))
    }

    /// Ask everything holding a clone of this handle to stop.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!(deadline = ?self.deadline, "Shutdown triggered");
        }
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolve once [`trigger`](Self::trigger) has been called on any clone.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }

    /// How long mailboxes get to drain before they are closed by force.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::from_config(&DispatcherConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_reaches_every_clone() {
        let shutdown = Shutdown::new(Duration::from_secs(3));
        let first = shutdown.clone();
        let second = shutdown.clone();

        let waiter = tokio::spawn(async move { first.triggered().await });
        shutdown.trigger();
        waiter.await.unwrap();
        second.triggered().await;
        assert!(second.is_triggered());
        assert_eq!(second.deadline(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_trigger_before_wait_is_not_lost() {
        let shutdown = Shutdown::default();
        shutdown.trigger();
        shutdown.trigger();

        // A late waiter still sees the earlier trigger.
        tokio::time::timeout(Duration::from_millis(100), shutdown.clone().triggered())
            .await
            .expect("trigger was lost");
    }

    #[test]
    fn test_deadline_comes_from_dispatcher_config() {
        let config = DispatcherConfig {
            shutdown_deadline_secs: 7,
            ..Default::default()
        };
        assert_eq!(Shutdown::from_config(&config).deadline(), Duration::from_secs(7));
        assert!(!Shutdown::from_config(&config).is_triggered());
    }
}
