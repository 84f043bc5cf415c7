//! Session registry: conversation id → live session.
//!
//! The map is the only shared mutable structure of the engine. It changes
//! only through `get_or_create`, `restart`, `on_idle_timeout` and
//! `shutdown`, each a single map-entry operation with no await inside.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use threadbot_types::message::ConversationId;
use threadbot_types::session::{SessionSnapshot, TerminationReason};

use crate::event::EventBus;
use crate::transport::Transport;

use super::actor::Session;
use super::turn::TurnRunner;

/// Process-wide registry of conversation sessions.
pub struct SessionRegistry<T> {
    sessions: DashMap<ConversationId, Arc<Session>>,
    runner: Arc<TurnRunner<T>>,
    idle_timeout: Duration,
    idle_notice: String,
    events: EventBus,
}

impl<T: Transport + 'static> SessionRegistry<T> {
    pub fn new(
        runner: Arc<TurnRunner<T>>,
        idle_timeout: Duration,
        idle_notice: impl Into<String>,
        events: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            runner,
            idle_timeout,
            idle_notice: idle_notice.into(),
            events,
        })
    }

    /// The live session for a conversation, if any. Never creates one.
    pub fn get(&self, conversation_id: &ConversationId) -> Option<Arc<Session>> {
        self.sessions
            .get(conversation_id)
            .map(|entry| entry.value().clone())
    }

    /// The live session for a conversation, creating an Active one if none
    /// exists.
    pub fn get_or_create(self: &Arc<Self>, conversation_id: &ConversationId) -> Arc<Session> {
        match self.sessions.entry(conversation_id.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let session = self.spawn_session(conversation_id.clone());
                entry.insert(session.clone());
                session
            }
        }
    }

    /// Retire the current session (if any) without an idle notice and
    /// install a fresh Active session with its own timer.
    ///
    /// Queued triggers of the retired session are dropped. A turn it is
    /// running completes and still posts its reply.
    pub fn restart(self: &Arc<Self>, conversation_id: &ConversationId) -> Arc<Session> {
        let session = match self.sessions.entry(conversation_id.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get().terminate(TerminationReason::Restarted);
                let session = self.spawn_session(conversation_id.clone());
                entry.insert(session.clone());
                session
            }
            Entry::Vacant(entry) => {
                let session = self.spawn_session(conversation_id.clone());
                entry.insert(session.clone());
                session
            }
        };
        info!(
            conversation_id = %conversation_id,
            session_id = %session.session_id(),
            "Conversation restarted"
        );
        session
    }

    /// Handle an idle timer expiry for `session_id`.
    ///
    /// Ignored unless `session_id` is still the live session of the
    /// conversation. Otherwise terminates it, posts the idle notice and
    /// archives the thread. Returns whether the session was terminated.
    pub async fn on_idle_timeout(&self, conversation_id: &ConversationId, session_id: Uuid) -> bool {
        let removed = self
            .sessions
            .remove_if(conversation_id, |_, session| session.session_id() == session_id);
        let Some((_, session)) = removed else {
            debug!(
                conversation_id = %conversation_id,
                session_id = %session_id,
                "Stale idle timer ignored"
            );
            return false;
        };

        session.terminate(TerminationReason::IdleTimeout);

        let transport = self.runner.transport();
        if let Err(e) = transport.post_message(conversation_id, &self.idle_notice).await {
            error!(conversation_id = %conversation_id, error = %e, "Failed to post idle notice");
        }
        if let Err(e) = transport.set_archived(conversation_id, true).await {
            warn!(conversation_id = %conversation_id, error = %e, "Failed to archive conversation");
        }
        true
    }

    /// Snapshots of all live sessions, ordered by conversation id.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        let mut snapshots: Vec<SessionSnapshot> = self
            .sessions
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        snapshots.sort_by(|a, b| a.conversation_id.cmp(&b.conversation_id));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn runner(&self) -> &Arc<TurnRunner<T>> {
        &self.runner
    }

    /// Terminate every session without notices. Used on process exit.
    pub fn shutdown(&self) {
        let ids: Vec<ConversationId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            if let Some((_, session)) = self.sessions.remove(&id) {
                session.terminate(TerminationReason::Shutdown);
            }
        }
        info!("All sessions shut down");
    }

    fn spawn_session(self: &Arc<Self>, conversation_id: ConversationId) -> Arc<Session> {
        let registry: Weak<Self> = Arc::downgrade(self);
        Session::spawn(
            conversation_id,
            self.runner.clone(),
            self.events.clone(),
            self.idle_timeout,
            move |conversation_id, session_id| async move {
                if let Some(registry) = registry.upgrade() {
                    registry.on_idle_timeout(&conversation_id, session_id).await;
                }
            },
        )
    }
}

impl<T> std::fmt::Debug for SessionRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}
