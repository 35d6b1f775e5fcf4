use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::batcher::OutputBatch;
use crate::diagnostics::TailBuffer;

use super::process::ProcessHandle;
use super::types::{OutputFrame, SessionInfo};

/// One live session
pub(crate) struct Session {
    pub(crate) info: SessionInfo,
    pub(crate) process: Box<dyn ProcessHandle>,
    pub(crate) batch: OutputBatch,
    pub(crate) tail: TailBuffer,
    pub(crate) frames: mpsc::UnboundedSender<OutputFrame>,
    /// Distinguishes this process from earlier ones under the same id
    pub(crate) generation: u64,
    /// Pump task feeding PTY events into the manager
    pub(crate) pump: Option<JoinHandle<()>>,
}

impl Session {
    pub(crate) fn new(
        info: SessionInfo,
        process: Box<dyn ProcessHandle>,
        frames: mpsc::UnboundedSender<OutputFrame>,
        generation: u64,
        tail_cap: usize,
    ) -> Self {
        Self {
            info,
            process,
            batch: OutputBatch::new(),
            tail: TailBuffer::new(tail_cap),
            frames,
            generation,
            pump: None,
        }
    }

    /// Send whatever is batched. A dropped receiver is not an error.
    pub(crate) fn flush(&mut self) {
        if let Some(frame) = self.batch.flush() {
            let _ = self.frames.send(frame);
        }
    }

    pub(crate) fn send(&self, frame: OutputFrame) {
        let _ = self.frames.send(frame);
    }
}

/// Live sessions by id
#[derive(Default)]
pub(crate) struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub(crate) fn insert(&mut self, id: String, session: Session) -> Option<Session> {
        self.sessions.insert(id, session)
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    /// Remove every session, returning them with their ids
    pub(crate) fn drain(&mut self) -> Vec<(String, Session)> {
        self.sessions.drain().collect()
    }

    /// Generation of the live session under `id`
    pub(crate) fn generation(&self, id: &str) -> Option<u64> {
        self.sessions.get(id).map(|s| s.generation)
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }

    pub(crate) fn infos(&self) -> impl Iterator<Item = &SessionInfo> {
        self.sessions.values().map(|s| &s.info)
    }
}
