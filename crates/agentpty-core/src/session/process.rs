//! Process handles: the control seam between the manager and a child.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;

use super::types::ExitStatus;

const READ_BUFFER_SIZE: usize = 16 * 1024;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Input side of a child, shared so it can be written without the manager lock
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Write `data` and flush. Blocks while the child is not reading its input.
pub fn write_input(writer: &SharedWriter, data: &[u8]) -> std::io::Result<()> {
    let mut writer = writer.lock();
    writer.write_all(data)?;
    writer.flush()
}

/// Control surface of a running child process.
///
/// [`PtyProcess`] is the real implementation. Other backends (and tests)
/// implement this and feed output through
/// [`SessionManager::push_output`](super::SessionManager::push_output).
pub trait ProcessHandle: Send {
    fn pid(&self) -> Option<u32>;

    /// Handle to the child's input. Writes through it may block.
    fn writer(&self) -> SharedWriter;

    fn resize(&mut self, cols: u16, rows: u16) -> Result<()>;

    /// Suspend the child (SIGSTOP)
    fn pause(&mut self) -> Result<()>;

    /// Continue a suspended child (SIGCONT)
    fn resume(&mut self) -> Result<()>;

    /// Terminate the child. May wait for it to go away.
    fn kill(&mut self) -> Result<()>;
}

/// What the PTY reader thread reports, in order
#[derive(Debug)]
pub(crate) enum PtyEvent {
    Output(Bytes),
    /// Always the last event
    Exited(ExitStatus),
}

/// Everything needed to start a child on a fresh PTY
#[derive(Debug, Clone)]
pub(crate) struct SpawnOptions {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Complete environment; nothing is inherited beyond this
    pub env: BTreeMap<String, String>,
    pub cols: u16,
    pub rows: u16,
}

type SharedChild = Arc<Mutex<Box<dyn Child + Send + Sync>>>;

/// A child process running on a pseudo-terminal
pub struct PtyProcess {
    master: Box<dyn MasterPty + Send>,
    writer: SharedWriter,
    child: SharedChild,
    pid: Option<u32>,
}

impl PtyProcess {
    /// Open a PTY, spawn the child on it and start the reader thread.
    ///
    /// The returned receiver yields output chunks as they are read and then
    /// exactly one [`PtyEvent::Exited`].
    pub(crate) fn spawn(
        opts: SpawnOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PtyEvent>)> {
        // portable-pty would silently fall back to $HOME
        if let Some(cwd) = &opts.cwd {
            anyhow::ensure!(
                cwd.is_dir(),
                "Working directory {} does not exist",
                cwd.display()
            );
        }

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: opts.rows,
                cols: opts.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to open PTY")?;

        let mut cmd = CommandBuilder::new(&opts.program);
        cmd.args(&opts.args);
        cmd.env_clear();
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }
        match opts.cwd {
            Some(cwd) => cmd.cwd(cwd),
            None => {
                if let Ok(cwd) = std::env::current_dir() {
                    cmd.cwd(cwd);
                }
            }
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .with_context(|| format!("Failed to spawn {}", opts.program))?;
        // the reader only sees EOF once every slave handle is closed
        drop(pair.slave);

        let pid = child.process_id();
        let reader = pair
            .master
            .try_clone_reader()
            .context("Failed to clone PTY reader")?;
        let writer = pair
            .master
            .take_writer()
            .context("Failed to take PTY writer")?;

        let child: SharedChild = Arc::new(Mutex::new(child));
        let (tx, rx) = mpsc::unbounded_channel();
        let thread_child = child.clone();
        thread::Builder::new()
            .name(format!("pty-reader-{}", pid.unwrap_or_default()))
            .spawn(move || read_loop(reader, thread_child, tx))
            .context("Failed to start PTY reader thread")?;

        tracing::debug!(program = %opts.program, pid = ?pid, "Spawned PTY process");

        Ok((
            Self {
                master: pair.master,
                writer: Arc::new(Mutex::new(writer)),
                child,
                pid,
            },
            rx,
        ))
    }

    fn signal(&self, sig: Signal) -> Result<()> {
        let pid = self.pid.context("Process id unavailable")?;
        signal::kill(Pid::from_raw(pid as i32), sig)
            .with_context(|| format!("Failed to send {sig} to {pid}"))
    }
}

impl ProcessHandle for PtyProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn writer(&self) -> SharedWriter {
        self.writer.clone()
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .context("Failed to resize PTY")
    }

    fn pause(&mut self) -> Result<()> {
        self.signal(Signal::SIGSTOP)
    }

    fn resume(&mut self) -> Result<()> {
        self.signal(Signal::SIGCONT)
    }

    fn kill(&mut self) -> Result<()> {
        // a stopped process would not act on SIGHUP
        let _ = self.signal(Signal::SIGCONT);
        self.child.lock().kill().context("Failed to kill child")
    }
}

/// Reader thread body: forward output, then report how the child ended.
fn read_loop(
    mut reader: Box<dyn Read + Send>,
    child: SharedChild,
    tx: mpsc::UnboundedSender<PtyEvent>,
) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx
                    .send(PtyEvent::Output(Bytes::copy_from_slice(&buf[..n])))
                    .is_err()
                {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the child side is gone
            Err(e) => {
                tracing::trace!(error = %e, "PTY read ended");
                break;
            }
        }
    }

    loop {
        let polled = child.lock().try_wait();
        match polled {
            Ok(Some(status)) => {
                let _ = tx.send(PtyEvent::Exited(status.into()));
                return;
            }
            Ok(None) if tx.is_closed() => {
                // nobody owns the session any more
                let _ = child.lock().kill();
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Failed to poll child status");
                let _ = tx.send(PtyEvent::Exited(ExitStatus::default()));
                return;
            }
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}
