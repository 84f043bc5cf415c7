//! A single conversation's session: lifecycle state, FIFO trigger queue and
//! idle timer.
//!
//! Each session runs one worker task that drains its mailbox one trigger at a
//! time, so generation is strictly serialized per conversation. Termination
//! cancels the worker's *acceptance* of work; a turn that is already running
//! always completes and posts its reply. Triggers still queued at that point
//! are answered with a single notice instead of a generation. The idle timer
//! is held while a turn runs.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use threadbot_types::error::SessionError;
use threadbot_types::event::SessionEvent;
use threadbot_types::message::{ConversationId, Trigger};
use threadbot_types::session::{SessionSnapshot, SessionState, TerminationReason};

use crate::event::EventBus;
use crate::transport::Transport;

use super::idle::IdleTimer;
use super::turn::TurnRunner;

/// Handle to a live or retired conversation session.
///
/// Shared as `Arc<Session>` between the registry, the dispatcher and the
/// session's own worker task.
pub struct Session {
    conversation_id: ConversationId,
    session_id: Uuid,
    started_at: DateTime<Utc>,
    state: watch::Sender<SessionState>,
    mailbox: mpsc::UnboundedSender<Trigger>,
    in_flight: AtomicBool,
    pending: AtomicUsize,
    last_activity_at: Mutex<DateTime<Utc>>,
    idle: IdleTimer,
    cancel: CancellationToken,
    events: EventBus,
}

impl Session {
    /// Create an Active session and start its worker and idle timer.
    ///
    /// `on_idle` runs once if the session sees no activity for `idle_timeout`.
    pub fn spawn<T, F, Fut>(
        conversation_id: ConversationId,
        runner: Arc<TurnRunner<T>>,
        events: EventBus,
        idle_timeout: Duration,
        on_idle: F,
    ) -> Arc<Self>
    where
        T: Transport + 'static,
        F: FnOnce(ConversationId, Uuid) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let session_id = Uuid::now_v7();
        let cancel = CancellationToken::new();
        let (mailbox, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Active);

        let timer_conversation = conversation_id.clone();
        let idle = IdleTimer::spawn(idle_timeout, cancel.clone(), move || {
            on_idle(timer_conversation, session_id)
        });

        let now = Utc::now();
        let session = Arc::new(Self {
            conversation_id,
            session_id,
            started_at: now,
            state,
            mailbox,
            in_flight: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
            last_activity_at: Mutex::new(now),
            idle,
            cancel,
            events,
        });

        tokio::spawn(run_worker(session.clone(), rx, runner));

        info!(
            conversation_id = %session.conversation_id,
            session_id = %session.session_id,
            idle_timeout_secs = idle_timeout.as_secs(),
            "Session started"
        );
        session.events.publish(SessionEvent::SessionStarted {
            conversation_id: session.conversation_id.clone(),
            session_id,
        });

        session
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Triggers accepted but not yet started.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Accept a trigger into the generation queue.
    ///
    /// Resets the idle timer. Fails once the session is terminated.
    pub fn submit(&self, trigger: Trigger) -> Result<(), SessionError> {
        if !self.is_active() {
            self.reject(&trigger);
            return Err(SessionError::Terminated);
        }

        let message_id = trigger.message_id.clone();
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.mailbox.send(trigger).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!(
                conversation_id = %self.conversation_id,
                session_id = %self.session_id,
                message_id = %message_id,
                "Session worker gone, trigger rejected"
            );
            return Err(SessionError::Terminated);
        }

        self.touch();
        debug!(
            conversation_id = %self.conversation_id,
            session_id = %self.session_id,
            message_id = %message_id,
            pending = self.pending(),
            in_flight = self.in_flight(),
            "Trigger accepted"
        );
        self.events.publish(SessionEvent::TriggerAccepted {
            conversation_id: self.conversation_id.clone(),
            session_id: self.session_id,
            message_id,
        });
        Ok(())
    }

    /// Record activity: resets the idle timer.
    pub fn touch(&self) {
        if let Ok(mut last) = self.last_activity_at.lock() {
            *last = Utc::now();
        }
        self.idle.touch();
    }

    /// Transition to Terminated and stop accepting work.
    ///
    /// Returns `false` if the session was already terminated. An in-flight
    /// turn is not aborted.
    pub fn terminate(&self, reason: TerminationReason) -> bool {
        let transitioned = self.state.send_if_modified(|state| {
            if *state == SessionState::Terminated {
                return false;
            }
            *state = SessionState::Terminated;
            true
        });
        if !transitioned {
            return false;
        }

        self.cancel.cancel();
        info!(
            conversation_id = %self.conversation_id,
            session_id = %self.session_id,
            reason = %reason,
            in_flight = self.in_flight(),
            "Session terminated"
        );
        self.events.publish(SessionEvent::SessionTerminated {
            conversation_id: self.conversation_id.clone(),
            session_id: self.session_id,
            reason,
        });
        true
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let last_activity_at = self
            .last_activity_at
            .lock()
            .map(|last| *last)
            .unwrap_or(self.started_at);
        SessionSnapshot {
            conversation_id: self.conversation_id.clone(),
            session_id: self.session_id,
            state: self.state(),
            started_at: self.started_at,
            last_activity_at,
            in_flight: self.in_flight(),
            pending: self.pending(),
        }
    }

    fn reject(&self, trigger: &Trigger) {
        debug!(
            conversation_id = %self.conversation_id,
            session_id = %self.session_id,
            message_id = %trigger.message_id,
            "Session terminated, trigger rejected"
        );
        self.events.publish(SessionEvent::TriggerRejected {
            conversation_id: self.conversation_id.clone(),
            session_id: self.session_id,
            message_id: trigger.message_id.clone(),
        });
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("conversation_id", &self.conversation_id)
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .field("pending", &self.pending())
            .finish()
    }
}

/// Drain the mailbox one trigger at a time until the session is cancelled.
///
/// The select only guards *taking* the next trigger; a running turn is
/// awaited outside it and is never interrupted.
async fn run_worker<T: Transport + 'static>(
    session: Arc<Session>,
    mut rx: mpsc::UnboundedReceiver<Trigger>,
    runner: Arc<TurnRunner<T>>,
) {
    loop {
        let trigger = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(trigger) => trigger,
                None => break,
            },
        };

        session.pending.fetch_sub(1, Ordering::SeqCst);
        session.in_flight.store(true, Ordering::SeqCst);
        session.idle.hold();
        runner.run(&session, trigger).await;
        session.idle.release();
        session.in_flight.store(false, Ordering::SeqCst);
    }

    rx.close();
    let mut dropped = 0usize;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    session.pending.store(0, Ordering::SeqCst);

    if dropped > 0 {
        warn!(
            conversation_id = %session.conversation_id,
            session_id = %session.session_id,
            dropped,
            "Session retired with queued triggers, dropping them"
        );
        session.events.publish(SessionEvent::TriggersDropped {
            conversation_id: session.conversation_id.clone(),
            session_id: session.session_id,
            count: dropped,
        });
        runner.post_dropped_notice(&session.conversation_id).await;
    }
    debug!(
        conversation_id = %session.conversation_id,
        session_id = %session.session_id,
        "Session worker stopped"
    );
}
