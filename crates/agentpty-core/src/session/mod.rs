//! Session lifecycle: spawning agent CLIs on PTYs, routing their output
//! through the batcher and the liveness classifier, and tearing them down.

pub mod env;
pub(crate) mod manager;
mod process;
mod registry;
pub mod shell;
mod types;


pub use manager::SessionManager;
pub use process::{write_input, ProcessHandle, PtyProcess, SharedWriter};
pub use types::{
    ExitReport, ExitStatus, OutputFrame, SessionInfo, SessionState, SpawnRequest, SpawnedSession,
};
