//! Session manager: owns every live session and routes output, exits,
//! control operations and timer fires.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::batcher::BatchAction;
use crate::classifier::Liveness;
use crate::config::EnginePolicy;
use crate::error::{Result, SessionError};
use crate::events::SessionEvent;
use crate::timer::{Scheduler, TimerKind};

use super::env::{build_env, validate_command};
use super::process::{write_input, ProcessHandle, PtyEvent, PtyProcess, SharedWriter, SpawnOptions};
use super::registry::{Session, SessionRegistry};
use super::shell::{default_shell, login_path, resolve_command};
use super::types::{
    ExitReport, ExitStatus, OutputFrame, SessionInfo, SessionState, SpawnRequest, SpawnedSession,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Context object holding all session state.
///
/// Cheap to clone; clones share the same sessions. Every method takes the
/// internal lock for a short synchronous section and never awaits while
/// holding it. Writes to a child and process termination happen after the
/// lock is released, so a child that stops reading its input only stalls
/// its own writers. Spawning and attaching must happen inside a tokio
/// runtime.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Mutex<ManagerInner>>,
}

impl SessionManager {
    /// Create a manager. Inside a tokio runtime, login shell PATH
    /// resolution starts in the background when the policy uses it.
    pub fn new(mut policy: EnginePolicy) -> Self {
        policy.validate();
        if policy.use_login_path {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn_blocking(login_path);
            }
        }
        let inner = Arc::new_cyclic(|weak| Mutex::new(ManagerInner::new(policy, weak.clone())));
        Self { inner }
    }

    /// Start `request.command` on a new PTY.
    ///
    /// Blocks until the login shell PATH is resolved (once per process, a
    /// few seconds at worst) and the child is started. Async callers should
    /// run it through `tokio::task::spawn_blocking`.
    pub fn spawn(&self, request: SpawnRequest) -> Result<SpawnedSession> {
        validate_command(&request.command)?;
        let use_login_path = self.inner.lock().policy.use_login_path;

        let command = if request.command.is_empty() {
            default_shell()
        } else {
            request.command.clone()
        };
        let program = resolve_command(&command, use_login_path);
        let env = build_env(
            std::env::vars(),
            &request.env,
            use_login_path.then(login_path).flatten(),
        );
        let opts = SpawnOptions {
            program,
            args: request.args.clone(),
            cwd: (!request.cwd.is_empty()).then(|| PathBuf::from(&request.cwd)),
            env,
            cols: request.cols,
            rows: request.rows,
        };

        let (process, events) = PtyProcess::spawn(opts)?;
        let (spawned, replaced) = {
            let mut inner = self.inner.lock();
            let (spawned, generation, replaced) =
                inner.register(&request, command, Box::new(process));
            let pump = tokio::spawn(pump(
                Arc::downgrade(&self.inner),
                spawned.session_id.clone(),
                generation,
                events,
            ));
            if let Some(session) = inner.registry.get_mut(&spawned.session_id) {
                session.pump = Some(pump);
            }
            (spawned, replaced)
        };
        if let Some(old) = replaced {
            terminate(&spawned.session_id, old);
        }
        Ok(spawned)
    }

    /// Register a caller-driven process under the request's id.
    ///
    /// Output and exit are then fed with [`push_output`](Self::push_output)
    /// and [`push_exit`](Self::push_exit).
    pub fn attach(
        &self,
        request: SpawnRequest,
        process: Box<dyn ProcessHandle>,
    ) -> Result<SpawnedSession> {
        let command = request.command.clone();
        let (spawned, _, replaced) = self.inner.lock().register(&request, command, process);
        if let Some(old) = replaced {
            terminate(&spawned.session_id, old);
        }
        Ok(spawned)
    }

    /// Feed an output chunk of an attached session
    pub fn push_output(&self, id: &str, data: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let generation = inner
            .registry
            .generation(id)
            .ok_or_else(|| SessionError::not_found(id))?;
        inner.handle_output(id, generation, data);
        Ok(())
    }

    /// Report the exit of an attached session
    pub fn push_exit(&self, id: &str, status: ExitStatus) -> Result<()> {
        let mut inner = self.inner.lock();
        let generation = inner
            .registry
            .generation(id)
            .ok_or_else(|| SessionError::not_found(id))?;
        inner.handle_exit(id, generation, status);
        Ok(())
    }

    /// Write to the child's input. Blocks while the child is not reading,
    /// without holding up any other operation.
    pub fn write(&self, id: &str, data: &[u8]) -> Result<()> {
        let writer = self.inner.lock().session_mut(id)?.process.writer();
        write_input(&writer, data)?;
        Ok(())
    }

    pub fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<()> {
        let mut inner = self.inner.lock();
        let session = inner.session_mut(id)?;
        session.process.resize(cols, rows)?;
        debug!(session_id = %id, cols, rows, "Resized session");
        Ok(())
    }

    /// Suspend the process. No-op when already paused.
    pub fn pause(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let session = inner.session_mut(id)?;
        if session.info.state == SessionState::Paused {
            return Ok(());
        }
        session.process.pause()?;
        session.info.state = SessionState::Paused;
        info!(session_id = %id, "Session paused");
        Ok(())
    }

    /// Continue a paused process. No-op when not paused.
    pub fn resume(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let session = inner.session_mut(id)?;
        if session.info.state != SessionState::Paused {
            return Ok(());
        }
        session.process.resume()?;
        session.info.state = SessionState::Running;
        info!(session_id = %id, "Session resumed");
        Ok(())
    }

    /// Terminate a session. Its frame stream closes without an `Exit` frame.
    pub fn kill(&self, id: &str) -> Result<()> {
        let process = {
            let mut inner = self.inner.lock();
            let session = inner
                .registry
                .remove(id)
                .ok_or_else(|| SessionError::not_found(id))?;
            inner.teardown(id, session)
        };
        terminate(id, process);
        Ok(())
    }

    /// Terminate every session, returning how many were killed
    pub fn kill_all(&self) -> usize {
        let processes = self.inner.lock().kill_all();
        let killed = processes.len();
        for (id, process) in processes {
            terminate(&id, process);
        }
        killed
    }

    /// Number of live sessions
    pub fn count(&self) -> usize {
        self.inner.lock().registry.len()
    }

    /// Snapshots of all live sessions, oldest first
    pub fn list(&self) -> Vec<SessionInfo> {
        let inner = self.inner.lock();
        let mut infos: Vec<SessionInfo> = inner.registry.infos().cloned().collect();
        infos.sort_by_key(|info| info.started_at);
        infos
    }

    pub fn info(&self, id: &str) -> Result<SessionInfo> {
        let inner = self.inner.lock();
        inner
            .registry
            .get(id)
            .map(|s| s.info.clone())
            .ok_or_else(|| SessionError::not_found(id))
    }

    /// Recent non-empty output lines, same shape as an `Exit` frame's `last_output`
    pub fn recent_output(&self, id: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        let session = inner
            .registry
            .get(id)
            .ok_or_else(|| SessionError::not_found(id))?;
        Ok(session.tail.summarize(inner.policy.diagnostics.max_lines))
    }

    /// Whether the session is producing output (not at a prompt, not idle)
    pub fn is_active(&self, id: &str) -> bool {
        self.inner.lock().liveness.is_active(id)
    }

    /// Whether a question or confirmation is on screen
    pub fn has_question(&self, id: &str) -> bool {
        self.inner.lock().liveness.has_question(id)
    }

    /// One-shot notification for when the agent's main prompt shows up.
    ///
    /// Replaces any earlier registration for the same session. Resolves
    /// immediately if the prompt is already visible; the sender is dropped
    /// when the session ends first.
    pub fn wait_ready(&self, id: &str) -> Result<oneshot::Receiver<()>> {
        self.inner.lock().liveness.register_ready(id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.lock().events.subscribe()
    }

    /// Timers currently scheduled for a session (zero for unknown ids)
    pub fn pending_timers(&self, id: &str) -> usize {
        let inner = self.inner.lock();
        let batch = inner
            .registry
            .get(id)
            .map_or(0, |s| usize::from(s.batch.has_timer()));
        batch + inner.liveness.pending_timers(id)
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<Mutex<ManagerInner>> {
        &self.inner
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(EnginePolicy::default())
    }
}

/// Kill a torn-down process; never called with the manager lock held
fn terminate(id: &str, mut process: Box<dyn ProcessHandle>) {
    if let Err(e) = process.kill() {
        error!(session_id = %id, error = %e, "Failed to kill session process");
    }
}

/// Auto-respond keystroke, written once the manager lock is released
pub(crate) struct Keystroke {
    session_id: String,
    writer: SharedWriter,
    keys: String,
    events: broadcast::Sender<SessionEvent>,
}

impl Keystroke {
    /// Write the keys; failures are logged and dropped
    pub(crate) fn deliver(self) {
        match write_input(&self.writer, self.keys.as_bytes()) {
            Ok(()) => {
                info!(session_id = %self.session_id, "Auto-responded to trust dialog");
                let _ = self.events.send(SessionEvent::AutoResponded {
                    session_id: self.session_id,
                });
            }
            Err(e) => {
                debug!(session_id = %self.session_id, error = %e, "Auto-respond write failed");
            }
        }
    }
}

/// Forward PTY events of one process generation into the manager
async fn pump(
    target: Weak<Mutex<ManagerInner>>,
    id: String,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<PtyEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = target.upgrade() else {
            break;
        };
        let mut inner = inner.lock();
        match event {
            PtyEvent::Output(data) => {
                if !inner.handle_output(&id, generation, &data) {
                    break;
                }
            }
            PtyEvent::Exited(status) => {
                inner.handle_exit(&id, generation, status);
                break;
            }
        }
    }
}

pub(crate) struct ManagerInner {
    pub(crate) policy: EnginePolicy,
    pub(crate) registry: SessionRegistry,
    pub(crate) liveness: Liveness,
    scheduler: Scheduler,
    events: broadcast::Sender<SessionEvent>,
    next_generation: u64,
}

impl ManagerInner {
    fn new(policy: EnginePolicy, target: Weak<Mutex<ManagerInner>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let liveness = Liveness::new(
            policy.classifier.clone(),
            policy.auto_respond.clone(),
            events.clone(),
        );
        Self {
            policy,
            registry: SessionRegistry::default(),
            liveness,
            scheduler: Scheduler::new(target),
            events,
            next_generation: 0,
        }
    }

    fn session_mut(&mut self, id: &str) -> Result<&mut Session> {
        self.registry
            .get_mut(id)
            .ok_or_else(|| SessionError::not_found(id))
    }

    fn emit(&self, event: SessionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Create registry and classifier entries, replacing any session under
    /// the same id. The replaced process is returned for the caller to
    /// terminate after unlocking.
    fn register(
        &mut self,
        request: &SpawnRequest,
        command: String,
        process: Box<dyn ProcessHandle>,
    ) -> (SpawnedSession, u64, Option<Box<dyn ProcessHandle>>) {
        let id = if request.agent_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            request.agent_id.clone()
        };

        let replaced = self.registry.remove(&id).map(|old| {
            info!(session_id = %id, "Respawning session");
            self.teardown(&id, old)
        });

        self.next_generation += 1;
        let generation = self.next_generation;
        let pid = process.pid();
        let (tx, rx) = mpsc::unbounded_channel();
        let info = SessionInfo {
            id: id.clone(),
            session_owner_id: request.session_owner_id.clone(),
            agent_kind: request.agent_kind,
            command: command.clone(),
            cwd: request.cwd.clone(),
            output_channel_id: request.output_channel_id.clone(),
            pid,
            state: SessionState::Spawned,
            started_at: Utc::now(),
        };
        let session = Session::new(
            info,
            process,
            tx,
            generation,
            self.policy.diagnostics.tail_cap,
        );
        self.registry.insert(id.clone(), session);

        info!(session_id = %id, pid = ?pid, command = %command, kind = %request.agent_kind, "Session spawned");
        self.emit(SessionEvent::Spawned {
            session_id: id.clone(),
            pid,
        });
        self.liveness
            .insert(&id, request.agent_kind, &mut self.scheduler);

        (
            SpawnedSession {
                session_id: id,
                pid,
                frames: rx,
            },
            generation,
            replaced,
        )
    }

    /// Route one output chunk. Returns false when the session under `id` is
    /// gone or belongs to a newer process.
    pub(crate) fn handle_output(&mut self, id: &str, generation: u64, data: &[u8]) -> bool {
        let Some(session) = self.registry.get_mut(id) else {
            return false;
        };
        if session.generation != generation {
            return false;
        }
        if session.info.state == SessionState::Spawned {
            session.info.state = SessionState::Running;
        }

        session.tail.push(data);
        match session.batch.push(data, &self.policy.batch) {
            BatchAction::FlushNow => session.flush(),
            BatchAction::ScheduleFlush => {
                let task =
                    self.scheduler
                        .schedule(self.policy.batch.flush_delay(), id, TimerKind::Flush);
                session.batch.arm(task);
            }
            BatchAction::AwaitTimer => {}
        }

        self.liveness.on_chunk(id, data, &mut self.scheduler);
        true
    }

    /// Final flush, exit diagnostics and removal
    pub(crate) fn handle_exit(&mut self, id: &str, generation: u64, status: ExitStatus) {
        if self.registry.generation(id) != Some(generation) {
            return;
        }
        let Some(mut session) = self.registry.remove(id) else {
            return;
        };

        session.flush();
        session.info.state = SessionState::Exited;
        let last_output = session.tail.summarize(self.policy.diagnostics.max_lines);
        session.send(OutputFrame::Exit(ExitReport {
            exit_code: status.exit_code,
            signal: status.signal.clone(),
            last_output,
        }));
        self.liveness.remove(id);

        info!(
            session_id = %id,
            exit_code = ?status.exit_code,
            signal = ?status.signal,
            "Session exited"
        );
        self.emit(SessionEvent::Exited {
            session_id: id.to_string(),
            exit_code: status.exit_code,
            signal: status.signal,
        });
    }

    /// Shared teardown for kill, kill_all and respawn.
    ///
    /// Cancels every timer; pending batched output is discarded. Returns the
    /// process, which must be passed to [`terminate`] once unlocked.
    fn teardown(&mut self, id: &str, mut session: Session) -> Box<dyn ProcessHandle> {
        session.batch.cancel();
        self.liveness.remove(id);
        if let Some(pump) = session.pump.take() {
            pump.abort();
        }
        session.info.state = SessionState::Killed;
        info!(session_id = %id, "Session killed");
        self.emit(SessionEvent::Killed {
            session_id: id.to_string(),
        });
        session.process
    }

    fn kill_all(&mut self) -> Vec<(String, Box<dyn ProcessHandle>)> {
        self.registry
            .drain()
            .into_iter()
            .map(|(id, session)| {
                let process = self.teardown(&id, session);
                (id, process)
            })
            .collect()
    }

    /// Dispatch a timer fire. Stale tokens are ignored by each component.
    ///
    /// A due auto-respond keystroke is returned rather than written here.
    pub(crate) fn on_timer(&mut self, id: &str, kind: TimerKind, token: u64) -> Option<Keystroke> {
        match kind {
            TimerKind::Flush => {
                if let Some(session) = self.registry.get_mut(id) {
                    if let Some(frame) = session.batch.on_timer(token) {
                        session.send(frame);
                    }
                }
            }
            TimerKind::Idle => self.liveness.on_idle_timer(id, token),
            TimerKind::Analysis => self.liveness.on_analysis_timer(id, token, &mut self.scheduler),
            TimerKind::RespondDelay => {
                let keys = self
                    .liveness
                    .on_respond_timer(id, token, &mut self.scheduler)?;
                let writer = self.registry.get(id)?.process.writer();
                return Some(Keystroke {
                    session_id: id.to_string(),
                    writer,
                    keys,
                    events: self.events.clone(),
                });
            }
            TimerKind::RespondCooldown => self.liveness.on_cooldown_timer(id, token),
        }
        None
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        let live = self.registry.len();
        if live > 0 {
            warn!(sessions = live, "Session manager dropped with live sessions, killing them");
            for (id, process) in self.kill_all() {
                terminate(&id, process);
            }
        }
    }
}
