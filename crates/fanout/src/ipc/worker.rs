//! Worker process management and the worker-side serve loop.
//!
//! A [`WorkerHandle`] pairs one spawned worker process with the two channel
//! ends its coordinator owns: the request channel (child stdin, write end)
//! and the response channel (child stdout, read end). Both ends are closed
//! and the child reaped on every exit path.

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde_json::Value;

use crate::error::{Error, ErrorEnvelope, Fault, Result, panic_message};
use crate::options::WorkerCommand;
use crate::task::Task;

use super::protocol::{WorkerReply, WorkerRequest, read_frame, read_frame_opt, write_frame};

/// Worker binary name searched for when none is configured.
const WORKER_BINARY: &str = if cfg!(windows) { "fanout-worker.exe" } else { "fanout-worker" };

/// Environment variable overriding the worker binary location.
pub const WORKER_PATH_ENV: &str = "FANOUT_WORKER_PATH";

/// Handle to one worker process.
pub struct WorkerHandle {
    child: Child,
    /// Write end of the request channel. Dropping it is the end-of-work
    /// signal.
    stdin: Option<BufWriter<ChildStdin>>,
    stdout: BufReader<ChildStdout>,
    reaped: bool,
}

impl WorkerHandle {
    /// Spawn a worker process and verify it is alive with a ping.
    pub fn spawn(command: &WorkerCommand) -> Result<Self> {
        let program = locate_worker_binary(command)?;

        let mut child = Command::new(&program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // worker stderr passes through for diagnostics
            .spawn()
            .map_err(|e| {
                Error::Ipc(format!(
                    "failed to spawn worker process '{}': {e}",
                    program.display()
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("failed to take worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("failed to take worker stdout".to_string()))?;

        let mut handle = Self {
            child,
            stdin: Some(BufWriter::new(stdin)),
            stdout: BufReader::new(stdout),
            reaped: false,
        };

        handle.send(&WorkerRequest::Ping)?;
        match handle.recv()? {
            WorkerReply::Pong => {
                tracing::debug!(pid = handle.pid(), "worker ready");
                Ok(handle)
            }
            other => Err(Error::Ipc(format!(
                "unexpected handshake reply from worker: {other:?}"
            ))),
        }
    }

    /// Send a request on the request channel.
    pub fn send(&mut self, request: &WorkerRequest) -> Result<()> {
        match self.stdin.as_mut() {
            Some(stdin) => write_frame(stdin, request),
            None => Err(Error::DeadWorker),
        }
    }

    /// Block awaiting the next reply on the response channel.
    pub fn recv(&mut self) -> Result<WorkerReply> {
        read_frame(&mut self.stdout)
    }

    /// Process id of the worker.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Close the request channel; the worker exits once it finishes its
    /// in-flight item and sees EOF.
    pub fn close_request_channel(&mut self) {
        self.stdin = None;
    }

    /// Close the request channel and wait for the worker to terminate.
    ///
    /// Runs on every coordinator exit path, including failure, so no
    /// descriptor is leaked and no worker goes zombie. Falls back to killing
    /// the worker if waiting fails.
    pub fn shutdown(&mut self) {
        if self.reaped {
            return;
        }
        self.close_request_channel();
        match self.child.wait() {
            Ok(status) => {
                self.reaped = true;
                if !status.success() {
                    tracing::warn!(pid = self.child.id(), %status, "worker exited abnormally");
                }
            }
            Err(err) => {
                tracing::warn!(pid = self.child.id(), %err, "failed to wait for worker");
                self.kill();
            }
        }
    }

    /// Kill the worker outright and reap it. A worker that is already gone
    /// is not an error.
    pub fn kill(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(err) = self.child.kill()
            && err.kind() != io::ErrorKind::InvalidInput
        {
            tracing::warn!(pid = self.child.id(), %err, "failed to kill worker");
        }
        let _ = self.child.wait();
        self.reaped = true;
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Backstop only; coordinators shut workers down explicitly.
        if !self.reaped {
            self.kill();
        }
    }
}

fn locate_worker_binary(command: &WorkerCommand) -> Result<PathBuf> {
    if let Some(program) = &command.program {
        return Ok(program.clone());
    }

    if let Ok(path) = std::env::var(WORKER_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
    }

    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let candidate = dir.join(WORKER_BINARY);
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    if let Ok(path) = which::which(WORKER_BINARY) {
        return Ok(path);
    }

    Err(Error::Ipc(format!(
        "could not find a worker binary; set {WORKER_PATH_ENV} or configure an explicit WorkerCommand"
    )))
}

/// Run the worker side of the protocol over stdin/stdout.
///
/// This is what a worker binary's `main` calls after constructing its task.
/// Returns when the coordinator closes the request channel.
pub fn serve<Op: Task>(op: &Op) -> Result<()> {
    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    serve_on(stdin, BufWriter::new(stdout), op)
}

/// Worker loop over arbitrary channels; [`serve`] binds it to stdio.
pub fn serve_on<Op: Task>(mut reader: impl Read, mut writer: impl Write, op: &Op) -> Result<()> {
    while let Some(request) = read_frame_opt::<_, WorkerRequest>(&mut reader)? {
        let reply = match request {
            WorkerRequest::Ping => WorkerReply::Pong,
            WorkerRequest::Job { index, item } => answer(op, index, item),
        };
        write_frame(&mut writer, &reply)?;
    }
    Ok(())
}

/// Compute the reply for one job.
///
/// Infallible by construction: whatever goes wrong is marshaled as an
/// envelope so the failure signal always reaches the coordinator.
fn answer<Op: Task>(op: &Op, index: u64, item: Value) -> WorkerReply {
    let item: Op::Item = match serde_json::from_value(item) {
        Ok(item) => item,
        Err(err) => {
            return WorkerReply::Failed {
                index,
                envelope: ErrorEnvelope::undumpable(format!(
                    "failed to decode item {index}: {err}"
                )),
            };
        }
    };

    match catch_unwind(AssertUnwindSafe(|| op.run(&item, index as usize))) {
        Ok(Ok(output)) => match serde_json::to_value(output) {
            Ok(value) => WorkerReply::Output { index, value },
            Err(err) => WorkerReply::Failed {
                index,
                envelope: ErrorEnvelope::undumpable(format!(
                    "failed to encode operation output: {err}"
                )),
            },
        },
        Ok(Err(fault)) => WorkerReply::Failed {
            index,
            envelope: ErrorEnvelope::capture(&fault),
        },
        Err(payload) => WorkerReply::Failed {
            index,
            envelope: ErrorEnvelope::capture(&Fault::failure(anyhow::anyhow!(
                "operation panicked: {}",
                panic_message(payload.as_ref())
            ))),
        },
    }
}
