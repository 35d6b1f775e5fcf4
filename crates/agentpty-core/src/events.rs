//! Session lifecycle and liveness events.
//!
//! Consumers call [`SessionManager::subscribe()`](crate::SessionManager::subscribe)
//! to receive these via a `broadcast::Receiver`. A receiver that falls behind
//! loses the oldest events (lagged); state can always be re-queried.

/// Events emitted by the session manager
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A process was spawned (or attached) under this id
    Spawned {
        session_id: String,
        pid: Option<u32>,
    },

    /// The session entered (`true`) or left (`false`) the active set
    ActivityChanged { session_id: String, active: bool },

    /// The question/confirmation flag changed
    QuestionChanged { session_id: String, question: bool },

    /// A trust dialog was confirmed automatically
    AutoResponded { session_id: String },

    /// The registered ready notifier fired
    Ready { session_id: String },

    /// The process exited on its own
    Exited {
        session_id: String,
        exit_code: Option<u32>,
        signal: Option<String>,
    },

    /// The session was killed by a caller
    Killed { session_id: String },
}

impl SessionEvent {
    /// Id of the session this event concerns
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::Spawned { session_id, .. }
            | SessionEvent::ActivityChanged { session_id, .. }
            | SessionEvent::QuestionChanged { session_id, .. }
            | SessionEvent::AutoResponded { session_id }
            | SessionEvent::Ready { session_id }
            | SessionEvent::Exited { session_id, .. }
            | SessionEvent::Killed { session_id } => session_id,
        }
    }
}
