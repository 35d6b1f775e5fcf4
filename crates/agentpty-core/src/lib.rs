//! agentpty-core: PTY-backed agent sessions with output batching and
//! stream-based liveness detection.
//!
//! The entry point is [`SessionManager`], a context object that owns every
//! per-session map (registry, classifier state, timers). Construct one per
//! process lifetime and share it by cloning.
//!
//! ```ignore
//! let manager = SessionManager::new(EnginePolicy::default());
//! let mut session = manager.spawn(SpawnRequest::new("claude"))?;
//! while let Some(frame) = session.frames.recv().await {
//!     // forward frame to the UI
//! }
//! ```

pub mod agents;
pub mod batcher;
pub mod classifier;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod session;
mod timer;

pub use agents::{AgentDef, AgentKind};
pub use config::EnginePolicy;
pub use error::{Result, SessionError};
pub use events::SessionEvent;
pub use session::{
    ExitReport, ExitStatus, OutputFrame, ProcessHandle, SessionInfo, SessionManager,
    SessionState, SharedWriter, SpawnRequest, SpawnedSession,
};
