use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::server::types::ProgressReporter;

/// Extension trait for installer command execution.
pub trait AnvilCommandExt {
    /// Hides the console window on Windows. No-op on other platforms.
    fn suppress_console(&mut self) -> &mut Self;
}

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x08000000;

impl AnvilCommandExt for Command {
    fn suppress_console(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            self.creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

const STDERR_TAIL_LINES: usize = 20;

/// How a child process ended.
#[derive(Debug)]
pub struct ProcessExit {
    /// None when the process was killed after timing out.
    pub status: Option<ExitStatus>,
    pub stderr_tail: Vec<String>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.status.map(|s| s.success()).unwrap_or(false)
    }

    pub fn code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}

/// A spawned child whose stdout/stderr are drained for its whole lifetime.
///
/// The child is spawned with `kill_on_drop`, so dropping the guard on any error
/// path terminates it and the runtime reaps it.
pub struct ScopedProcess {
    child: Child,
    drains: Vec<JoinHandle<()>>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
}

impl ScopedProcess {
    pub fn spawn(
        mut command: Command,
        cwd: &Path,
        reporter: Arc<dyn ProgressReporter>,
    ) -> std::io::Result<Self> {
        command
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .suppress_console();

        log::debug!("Executing: {:?}", command);
        let mut child = command.spawn()?;
        let stderr_tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));

        let mut drains = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            drains.push(drain_lines(stdout, "stdout", reporter.clone(), None));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(drain_lines(
                stderr,
                "stderr",
                reporter.clone(),
                Some(stderr_tail.clone()),
            ));
        }

        Ok(Self {
            child,
            drains,
            stderr_tail,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for the exit event, then for both streams to finish draining.
    /// With a timeout the child is killed once it elapses.
    pub async fn wait(mut self, timeout: Option<Duration>) -> std::io::Result<ProcessExit> {
        let status = match timeout {
            Some(limit) => match tokio::time::timeout(limit, self.child.wait()).await {
                Ok(status) => Some(status?),
                Err(_) => {
                    log::warn!(
                        "Process {:?} exceeded {}s, killing it",
                        self.child.id(),
                        limit.as_secs()
                    );
                    self.child.kill().await?;
                    None
                }
            },
            None => Some(self.child.wait().await?),
        };

        for drain in self.drains.drain(..) {
            if status.is_none() {
                // grandchildren may still hold the pipes open
                drain.abort();
                continue;
            }
            if let Err(e) = drain.await {
                log::warn!("Output drain task failed: {}", e);
            }
        }

        let stderr_tail = match self.stderr_tail.lock() {
            Ok(tail) => tail.iter().cloned().collect(),
            Err(_) => Vec::new(),
        };

        Ok(ProcessExit {
            status,
            stderr_tail,
        })
    }
}

fn drain_lines<R>(
    stream: R,
    stream_type: &'static str,
    reporter: Arc<dyn ProgressReporter>,
    tail: Option<Arc<Mutex<VecDeque<String>>>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    log::debug!("[installer {}] {}", stream_type, line);
                    reporter.installer_output(&line);
                    if let Some(tail) = &tail {
                        if let Ok(mut tail) = tail.lock() {
                            if tail.len() == STDERR_TAIL_LINES {
                                tail.pop_front();
                            }
                            tail.push_back(line);
                        }
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Failed to read installer {}: {}", stream_type, e);
                    break;
                }
            }
        }
    })
}
