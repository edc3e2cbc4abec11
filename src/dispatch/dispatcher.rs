//! The session dispatcher.
//!
//! # Responsibilities
//! - Map session ids to mailboxes, creating each one exactly once
//! - Apply the configured backpressure policy when a mailbox is full
//! - Tear down a session's mailbox when the session ends
//! - Coordinate shutdown: stop admitting, drain, force-close past the deadline
//! - Forget mailboxes whose worker exited idle, so abandoned or forged session
//!   ids do not accumulate
//!
//! # Design Decisions
//! - DashMap entry API gives the single create-once point per session
//! - Workers live in one JoinSet so shutdown can await every one of them
//! - The accepting flag is checked under the JoinSet lock, so no worker is
//!   spawned once shutdown has taken the set
//! - Idle removal matches on generation, so a replacement mailbox created under
//!   the same key is never removed by its predecessor's worker

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc::error::{SendError, TrySendError};
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;

use crate::config::{BackpressurePolicy, DispatcherConfig};
use crate::dispatch::error::DispatchError;
use crate::dispatch::handler::AppHandler;
use crate::dispatch::mailbox::{Envelope, Mailbox, MailboxKey, MailboxState, WorkerExit};
use crate::observability::metrics;

/// Acknowledgement that a request was accepted into a mailbox.
///
/// Await [`Receipt::wait`] for the handler's outcome.
#[derive(Debug)]
pub struct Receipt<R> {
    mailbox: MailboxKey,
    rx: oneshot::Receiver<Result<R, DispatchError>>,
}

impl<R> Receipt<R> {
    pub fn mailbox(&self) -> &MailboxKey {
        &self.mailbox
    }

    pub async fn wait(self) -> Result<R, DispatchError> {
        self.rx.await.unwrap_or(Err(DispatchError::Discarded))
    }
}

/// What happened during [`Dispatcher::shutdown`].
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    /// Mailboxes open when shutdown began.
    pub mailboxes: usize,
    /// Mailboxes still running at the deadline and closed by force.
    pub forced: usize,
    pub elapsed: Duration,
}

/// Serializes application work per session.
pub struct Dispatcher<H: AppHandler> {
    handler: Arc<H>,
    mailboxes: Arc<DashMap<MailboxKey, Mailbox<H>>>,
    capacity: usize,
    idle_timeout: Option<Duration>,
    policy: BackpressurePolicy,
    permits: Arc<Semaphore>,
    accepting: AtomicBool,
    workers: Mutex<JoinSet<()>>,
    generation: AtomicU64,
}

impl<H: AppHandler> Dispatcher<H> {
    pub fn new(handler: Arc<H>, config: &DispatcherConfig) -> Self {
        Self {
            handler,
            mailboxes: Arc::new(DashMap::new()),
            capacity: config.mailbox_capacity.max(1),
            idle_timeout: (config.idle_timeout_secs > 0).then(|| Duration::from_secs(config.idle_timeout_secs)),
            policy: config.backpressure,
            permits: Arc::new(Semaphore::new(config.max_concurrent_handlers.max(1))),
            accepting: AtomicBool::new(true),
            workers: Mutex::new(JoinSet::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Admit a request into its session's mailbox.
    ///
    /// Returns once the request is queued, not once it is processed.
    pub async fn submit(
        &self,
        session: Option<&str>,
        request: H::Request,
    ) -> Result<Receipt<H::Response>, DispatchError> {
        if !self.is_accepting() {
            return Err(DispatchError::ShuttingDown);
        }

        let key = MailboxKey::for_session(session);
        let (mut envelope, rx) = Envelope::new(request);

        // A mailbox can close between lookup and send (fatal worker exit,
        // session teardown); one retry picks up its replacement.
        for _ in 0..2 {
            let mailbox = self.mailbox_for(&key)?;
            let sent = match self.policy {
                BackpressurePolicy::Block => mailbox.tx.send(envelope).await.map_err(|SendError(e)| e),
                BackpressurePolicy::Reject => match mailbox.tx.try_send(envelope) {
                    Ok(()) => Ok(()),
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(mailbox = %key, capacity = self.capacity, "Mailbox full, rejecting request");
                        metrics::record_mailbox_rejected();
                        return Err(DispatchError::MailboxFull {
                            mailbox: key.to_string(),
                        });
                    }
                    Err(TrySendError::Closed(e)) => Err(e),
                },
            };

            match sent {
                Ok(()) => {
                    tracing::trace!(mailbox = %key, generation = mailbox.generation, "Request queued");
                    return Ok(Receipt { mailbox: key, rx });
                }
                Err(returned) if self.is_accepting() => envelope = returned,
                Err(_) => return Err(DispatchError::ShuttingDown),
            }
        }

        Err(DispatchError::MailboxClosed)
    }

    /// Submit and wait for the handler's outcome.
    pub async fn dispatch(&self, session: Option<&str>, request: H::Request) -> Result<H::Response, DispatchError> {
        self.submit(session, request).await?.wait().await
    }

    fn mailbox_for(&self, key: &MailboxKey) -> Result<Mailbox<H>, DispatchError> {
        if let Some(mailbox) = self.mailboxes.get(key) {
            if mailbox.is_active() {
                return Ok(mailbox.clone());
            }
        }

        let created = match self.mailboxes.entry(key.clone()) {
            Entry::Occupied(slot) if slot.get().is_active() => return Ok(slot.get().clone()),
            entry => {
                let mailbox = self.spawn_mailbox(key)?;
                entry.insert(mailbox.clone());
                mailbox
            }
        };

        metrics::set_active_mailboxes(self.mailboxes.len());
        Ok(created)
    }

    fn spawn_mailbox(&self, key: &MailboxKey) -> Result<Mailbox<H>, DispatchError> {
        let mut workers = self.lock_workers();
        if !self.is_accepting() {
            return Err(DispatchError::ShuttingDown);
        }
        // Reap workers that already exited.
        while workers.try_join_next().is_some() {}

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let (mailbox, worker) = Mailbox::create(
            key.clone(),
            generation,
            self.capacity,
            self.handler.clone(),
            self.permits.clone(),
            self.idle_timeout,
        );

        let mailboxes = Arc::downgrade(&self.mailboxes);
        let idle_key = key.clone();
        workers.spawn(async move {
            if worker.await != WorkerExit::Idle {
                return;
            }
            let Some(mailboxes) = mailboxes.upgrade() else {
                return;
            };
            if mailboxes
                .remove_if(&idle_key, |_, mailbox| mailbox.generation == generation)
                .is_some()
            {
                tracing::debug!(mailbox = %idle_key, generation, "Idle mailbox released");
                metrics::set_active_mailboxes(mailboxes.len());
            }
        });

        tracing::debug!(mailbox = %key, generation, capacity = self.capacity, "Mailbox created");
        Ok(mailbox)
    }

    /// Session-end notification: remove and close the session's mailbox.
    ///
    /// Returns false if the session had no mailbox.
    pub fn on_session_destroyed(&self, session_id: &str) -> bool {
        let key = MailboxKey::Session(session_id.to_string());
        let Some((_, mailbox)) = self.mailboxes.remove(&key) else {
            return false;
        };
        mailbox.close();
        tracing::info!(mailbox = %key, generation = mailbox.generation, "Session destroyed, mailbox closed");
        metrics::set_active_mailboxes(self.mailboxes.len());
        true
    }

    /// Current state of a session's mailbox.
    pub fn mailbox_state(&self, session: Option<&str>) -> MailboxState {
        self.mailboxes
            .get(&MailboxKey::for_session(session))
            .map(|mailbox| mailbox.state())
            .unwrap_or(MailboxState::Absent)
    }

    /// Number of mailboxes currently in the map (any state).
    pub fn active_mailboxes(&self) -> usize {
        self.mailboxes.len()
    }

    /// A panic while holding the lock cannot leave the `JoinSet` half-updated,
    /// so a poisoned guard is still safe to use.
    fn lock_workers(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Stop immediately: refuse new work, close every mailbox and abort every worker.
    pub fn stop(&self) {
        {
            let mut workers = self.lock_workers();
            self.accepting.store(false, Ordering::Release);
            workers.abort_all();
        }

        for mailbox in self.mailboxes.iter() {
            mailbox.close();
        }
        self.mailboxes.clear();
        metrics::set_active_mailboxes(0);
        tracing::info!("Dispatcher stopped");
    }

    /// Graceful shutdown.
    ///
    /// Stops admitting work, lets every mailbox drain until `deadline`, then
    /// closes whatever is left. Returns only after every worker has exited.
    pub async fn shutdown(&self, deadline: Duration) -> ShutdownReport {
        let start = Instant::now();
        let mut workers = {
            let mut guard = self.lock_workers();
            self.accepting.store(false, Ordering::Release);
            std::mem::take(&mut *guard)
        };

        let mailboxes: Vec<Mailbox<H>> = self.mailboxes.iter().map(|entry| entry.value().clone()).collect();
        tracing::info!(mailboxes = mailboxes.len(), deadline = ?deadline, "Draining mailboxes");
        for mailbox in &mailboxes {
            mailbox.drain();
        }

        let drained = tokio::time::timeout(deadline, async {
            while workers.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        let mut forced = 0;
        if !drained {
            for mailbox in &mailboxes {
                if mailbox.state() != MailboxState::Closed {
                    forced += 1;
                }
                mailbox.close();
            }
            tracing::warn!(forced, "Shutdown deadline passed, closing remaining mailboxes");
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        self.mailboxes.clear();
        metrics::set_active_mailboxes(0);

        let report = ShutdownReport {
            mailboxes: mailboxes.len(),
            forced,
            elapsed: start.elapsed(),
        };
        tracing::info!(
            mailboxes = report.mailboxes,
            forced = report.forced,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Dispatcher shut down"
        );
        report
    }
}

impl<H: AppHandler> std::fmt::Debug for Dispatcher<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("mailboxes", &self.mailboxes.len())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handler::HandlerError;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl AppHandler for Echo {
        type Request = u32;
        type Response = u32;

        async fn handle(&self, request: u32) -> Result<u32, HandlerError> {
            Ok(request * 2)
        }
    }

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            mailbox_capacity: 4,
            ..DispatcherConfig::default()
        }
    }

    #[tokio::test]
    async fn test_dispatch_round_trip() {
        let dispatcher = Dispatcher::new(Arc::new(Echo), &config());
        assert_eq!(dispatcher.dispatch(Some("a"), 21).await.unwrap(), 42);
        assert_eq!(dispatcher.mailbox_state(Some("a")), MailboxState::Active);
        assert_eq!(dispatcher.mailbox_state(Some("b")), MailboxState::Absent);
    }

    #[tokio::test]
    async fn test_sessionless_requests_share_default_mailbox() {
        let dispatcher = Dispatcher::new(Arc::new(Echo), &config());
        let first = dispatcher.submit(None, 1).await.unwrap();
        let second = dispatcher.submit(Some(""), 2).await.unwrap();
        assert_eq!(first.mailbox(), &MailboxKey::Default);
        assert_eq!(second.mailbox(), &MailboxKey::Default);
        assert_eq!(dispatcher.active_mailboxes(), 1);
        assert_eq!(first.wait().await.unwrap(), 2);
        assert_eq!(second.wait().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_session_destroyed_removes_mailbox() {
        let dispatcher = Dispatcher::new(Arc::new(Echo), &config());
        dispatcher.dispatch(Some("a"), 1).await.unwrap();
        assert!(dispatcher.on_session_destroyed("a"));
        assert!(!dispatcher.on_session_destroyed("a"));
        assert_eq!(dispatcher.mailbox_state(Some("a")), MailboxState::Absent);
    }

    async fn wait_until_absent(dispatcher: &Dispatcher<Echo>, session: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while dispatcher.mailbox_state(Some(session)) != MailboxState::Absent {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("idle mailbox was never released");
    }

    #[tokio::test]
    async fn test_idle_mailbox_is_released() {
        let config = DispatcherConfig {
            idle_timeout_secs: 1,
            ..config()
        };
        let dispatcher = Dispatcher::new(Arc::new(Echo), &config);
        dispatcher.dispatch(Some("a"), 1).await.unwrap();
        assert_eq!(dispatcher.mailbox_state(Some("a")), MailboxState::Active);

        wait_until_absent(&dispatcher, "a").await;
        assert_eq!(dispatcher.active_mailboxes(), 0);
        // The session simply starts over with a fresh mailbox.
        assert_eq!(dispatcher.dispatch(Some("a"), 2).await.unwrap(), 4);
        assert_eq!(dispatcher.mailbox_state(Some("a")), MailboxState::Active);
    }

    #[tokio::test]
    async fn test_idle_exit_leaves_replacement_mailbox_alone() {
        let config = DispatcherConfig {
            idle_timeout_secs: 1,
            ..config()
        };
        let dispatcher = Dispatcher::new(Arc::new(Echo), &config);
        let key = MailboxKey::Session("a".into());
        dispatcher.dispatch(Some("a"), 1).await.unwrap();

        tokio::time::sleep(Duration::from_millis(600)).await;
        let replacement = dispatcher.spawn_mailbox(&key).unwrap();
        let generation = replacement.generation;
        // Keep the previous handle alive so its worker exits idle, not drained.
        let _previous = dispatcher.mailboxes.insert(key.clone(), replacement);

        // The previous worker idles out first; that must not remove the replacement.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(dispatcher.mailboxes.get(&key).map(|m| m.generation), Some(generation));
        assert_eq!(dispatcher.mailbox_state(Some("a")), MailboxState::Active);

        wait_until_absent(&dispatcher, "a").await;
    }

    #[tokio::test]
    async fn test_zero_idle_timeout_keeps_mailboxes() {
        let config = DispatcherConfig {
            idle_timeout_secs: 0,
            ..config()
        };
        let dispatcher = Dispatcher::new(Arc::new(Echo), &config);
        assert_eq!(dispatcher.idle_timeout, None);
        dispatcher.dispatch(Some("a"), 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(dispatcher.mailbox_state(Some("a")), MailboxState::Active);
    }

    #[tokio::test]
    async fn test_poisoned_worker_lock_is_recovered() {
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(Echo), &config()));
        let poisoner = dispatcher.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.workers.lock().unwrap();
            panic!("poison the worker set");
        })
        .join();
        assert!(dispatcher.workers.is_poisoned());

        assert_eq!(dispatcher.dispatch(Some("a"), 5).await.unwrap(), 10);
        let report = dispatcher.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report.mailboxes, 1);
        assert_eq!(report.forced, 0);
    }

    #[tokio::test]
    async fn test_submit_after_stop_is_refused() {
        let dispatcher = Dispatcher::new(Arc::new(Echo), &config());
        dispatcher.dispatch(Some("a"), 1).await.unwrap();
        dispatcher.stop();
        assert_eq!(dispatcher.active_mailboxes(), 0);
        assert!(matches!(
            dispatcher.submit(Some("a"), 1).await,
            Err(DispatchError::ShuttingDown)
        ));
    }
}
