//! Per-session mailboxes and their workers.
//!
//! # Responsibilities
//! - Queue requests for one session in arrival order, bounded
//! - Run exactly one worker per mailbox, invoking the handler one request at a time
//! - Contain handler failures; stop visibly on fatal ones
//!
//! # Design Decisions
//! - Bounded `mpsc` channel per mailbox, one receiver owned by the worker
//! - Drain closes the receiver: queued items still run, new ones are refused
//! - Close stops the worker after its current item; queued items are dropped
//!   and their callers observe `Discarded`
//! - Panics in the handler are caught and treated as fatal
//! - A worker that sees no request for the idle timeout closes its mailbox,
//!   finishes whatever was already queued and exits; the dispatcher then
//!   forgets the mailbox

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::dispatch::error::DispatchError;
use crate::dispatch::handler::{AppHandler, HandlerError};
use crate::observability::metrics;

/// Which mailbox a request belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxKey {
    /// Shared fallback for requests without a session.
    Default,
    Session(String),
}

impl MailboxKey {
    /// Requests with no (or an empty) session id share the default mailbox.
    pub fn for_session(session: Option<&str>) -> Self {
        match session {
            Some(id) if !id.is_empty() => MailboxKey::Session(id.to_string()),
            _ => MailboxKey::Default,
        }
    }
}

impl fmt::Display for MailboxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MailboxKey::Default => f.write_str("default"),
            MailboxKey::Session(id) => write!(f, "session:{}", id),
        }
    }
}

/// Lifecycle of a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxState {
    Absent,
    Active,
    Draining,
    Closed,
}

impl MailboxState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => MailboxState::Active,
            2 => MailboxState::Draining,
            3 => MailboxState::Closed,
            _ => MailboxState::Absent,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            MailboxState::Absent => 0,
            MailboxState::Active => 1,
            MailboxState::Draining => 2,
            MailboxState::Closed => 3,
        }
    }
}

/// State shared between a mailbox handle and its worker.
#[derive(Debug)]
pub(crate) struct MailboxShared {
    state: AtomicU8,
    drain: CancellationToken,
    close: CancellationToken,
}

impl MailboxShared {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(MailboxState::Active.as_u8()),
            drain: CancellationToken::new(),
            close: CancellationToken::new(),
        }
    }

    fn state(&self) -> MailboxState {
        MailboxState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: MailboxState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }
}

/// A queued request and where to send its outcome.
pub(crate) struct Envelope<H: AppHandler> {
    request: H::Request,
    reply: oneshot::Sender<Result<H::Response, DispatchError>>,
}

impl<H: AppHandler> Envelope<H> {
    pub(crate) fn new(request: H::Request) -> (Self, oneshot::Receiver<Result<H::Response, DispatchError>>) {
        let (reply, rx) = oneshot::channel();
        (Self { request, reply }, rx)
    }
}

/// Handle to a live mailbox. Cloning shares the same queue and worker.
pub(crate) struct Mailbox<H: AppHandler> {
    pub(crate) tx: mpsc::Sender<Envelope<H>>,
    shared: Arc<MailboxShared>,
    pub(crate) generation: u64,
}

impl<H: AppHandler> Clone for Mailbox<H> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: self.shared.clone(),
            generation: self.generation,
        }
    }
}

impl<H: AppHandler> Mailbox<H> {
    /// Create a mailbox and the worker future that drains it. The caller spawns the worker.
    pub(crate) fn create(
        key: MailboxKey,
        generation: u64,
        capacity: usize,
        handler: Arc<H>,
        permits: Arc<Semaphore>,
        idle_timeout: Option<Duration>,
    ) -> (Self, impl std::future::Future<Output = WorkerExit> + Send + 'static) {
        let (tx, rx) = mpsc::channel(capacity);
        let shared = Arc::new(MailboxShared::new());
        let worker = run_worker(key, generation, handler, rx, shared.clone(), permits, idle_timeout);
        (
            Self {
                tx,
                shared,
                generation,
            },
            worker,
        )
    }

    pub(crate) fn state(&self) -> MailboxState {
        self.shared.state()
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state() == MailboxState::Active
    }

    /// Stop admitting items; the worker finishes what is queued and exits.
    pub(crate) fn drain(&self) {
        if self.state() == MailboxState::Active {
            self.shared.set_state(MailboxState::Draining);
        }
        self.shared.drain.cancel();
    }

    /// Stop the worker after its current item and drop everything queued.
    pub(crate) fn close(&self) {
        self.shared.set_state(MailboxState::Closed);
        self.shared.close.cancel();
    }
}

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerExit {
    /// Shutdown drain finished.
    Drained,
    /// Closed by session teardown or a forced stop.
    Closed,
    /// The handler failed fatally or panicked.
    Fatal,
    /// No request arrived within the idle timeout.
    Idle,
}

async fn run_worker<H: AppHandler>(
    key: MailboxKey,
    generation: u64,
    handler: Arc<H>,
    mut rx: mpsc::Receiver<Envelope<H>>,
    shared: Arc<MailboxShared>,
    permits: Arc<Semaphore>,
    idle_timeout: Option<Duration>,
) -> WorkerExit {
    tracing::debug!(mailbox = %key, generation, "Mailbox worker started");
    let mut draining = false;
    let mut idled = false;
    let mut processed: u64 = 0;

    let exit = loop {
        let envelope = tokio::select! {
            biased;
            _ = shared.close.cancelled() => break WorkerExit::Closed,
            _ = shared.drain.cancelled(), if !draining => {
                draining = true;
                rx.close();
                continue;
            }
            msg = next_envelope(&mut rx, idle_timeout.filter(|_| !draining)) => match msg {
                Some(Some(envelope)) => envelope,
                Some(None) if idled => break WorkerExit::Idle,
                Some(None) => break WorkerExit::Drained,
                None => {
                    // Refuse new items first; anything that slipped in before the close still runs.
                    tracing::debug!(mailbox = %key, generation, "Mailbox idle, closing");
                    idled = true;
                    draining = true;
                    close_channel(&shared, &mut rx);
                    continue;
                }
            }
        };

        // Bound the number of handlers running at once across all sessions.
        let permit = tokio::select! {
            biased;
            _ = shared.close.cancelled() => break WorkerExit::Closed,
            permit = permits.acquire() => permit,
        };
        let Ok(_permit) = permit else {
            break WorkerExit::Closed;
        };

        let Envelope { request, reply } = envelope;
        let outcome = AssertUnwindSafe(handler.handle(request)).catch_unwind().await;
        processed += 1;

        match outcome {
            Ok(Ok(response)) => {
                let _ = reply.send(Ok(response));
            }
            Ok(Err(HandlerError::Failed(message))) => {
                tracing::warn!(mailbox = %key, error = %message, "Handler failed");
                metrics::record_handler_failure("failed");
                let _ = reply.send(Err(DispatchError::Handler(message)));
            }
            Ok(Err(HandlerError::Fatal(message))) => {
                tracing::error!(mailbox = %key, error = %message, "Handler failed fatally, closing mailbox");
                metrics::record_handler_failure("fatal");
                close_channel(&shared, &mut rx);
                let _ = reply.send(Err(DispatchError::Fatal(message)));
                break WorkerExit::Fatal;
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(mailbox = %key, panic = %message, "Handler panicked, closing mailbox");
                metrics::record_handler_failure("panic");
                close_channel(&shared, &mut rx);
                let _ = reply.send(Err(DispatchError::Fatal(message)));
                break WorkerExit::Fatal;
            }
        }
    };

    close_channel(&shared, &mut rx);
    let discarded = std::iter::from_fn(|| rx.try_recv().ok()).count();
    tracing::debug!(
        mailbox = %key,
        generation,
        processed,
        discarded,
        exit = ?exit,
        "Mailbox worker stopped"
    );
    exit
}

/// Next queued envelope, `Some(None)` once the channel is closed and empty,
/// or `None` if nothing arrived within `idle`.
async fn next_envelope<T>(rx: &mut mpsc::Receiver<T>, idle: Option<Duration>) -> Option<Option<T>> {
    match idle {
        Some(idle) => tokio::time::timeout(idle, rx.recv()).await.ok(),
        None => Some(rx.recv().await),
    }
}

/// Mark the mailbox closed before any caller can observe the worker's last reply,
/// so a follow-up submit goes to a fresh mailbox.
fn close_channel<T>(shared: &MailboxShared, rx: &mut mpsc::Receiver<T>) {
    shared.set_state(MailboxState::Closed);
    rx.close();
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_key_for_session() {
        assert_eq!(MailboxKey::for_session(None), MailboxKey::Default);
        assert_eq!(MailboxKey::for_session(Some("")), MailboxKey::Default);
        assert_eq!(
            MailboxKey::for_session(Some("abc")),
            MailboxKey::Session("abc".to_string())
        );
        assert_eq!(MailboxKey::Session("abc".into()).to_string(), "session:abc");
    }

    #[test]
    fn test_state_round_trips_through_atomic() {
        let shared = MailboxShared::new();
        assert_eq!(shared.state(), MailboxState::Active);
        shared.set_state(MailboxState::Draining);
        assert_eq!(shared.state(), MailboxState::Draining);
        shared.set_state(MailboxState::Closed);
        assert_eq!(shared.state(), MailboxState::Closed);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u32);
        assert_eq!(panic_message(payload.as_ref()), "handler panicked");
    }
}
