// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Process resource manager: spawn a child with up to three pipes, drive
//! its pipes non-blocking, wait for or signal it.
//!
//! Pipe I/O never blocks: `WouldBlock` is a normal, expected return when
//! no data or buffer space is available, and callers needing synchronous
//! semantics retry in their own loop. `wait` supports a `no_hang` polling
//! mode for the same reason — there is no timeout parameter in this layer.
//!
//! Nothing is killed or reaped implicitly. The [`Child`] wrapper closes
//! its remaining pipe ends on drop, but the process itself must be waited
//! or terminated explicitly, including on error paths.

use std::path::PathBuf;

use bitflags::bitflags;

use crate::error::ProcessError;
use crate::sys;

/// How one standard stream of the child is wired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipeMode {
    /// Redirect to the platform's null device.
    Null,
    /// Create a pipe; the parent keeps the far end.
    Pipe,
    /// Leave the parent's descriptor in place.
    #[default]
    Inherit,
}

bitflags! {
    /// Process creation flags.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct SpawnFlags: u32 {
        /// `setpgid(0, 0)` in the child.
        const NEW_PROCESS_GROUP = 0x01;
        /// `setsid()` in the child: detach from the controlling terminal.
        const DETACHED          = 0x02;
        /// Search `PATH` for the executable (`execvp`).
        const SEARCH_PATH       = 0x04;
    }
}

/// Plain-data pipe handle. Valid iff `fd >= 0`; ownership lives in the
/// caller (or in [`Child`]), not in the struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeHandle {
    pub fd: i32,
    pub flags: u32,
}

impl PipeHandle {
    pub const fn invalid() -> Self {
        Self { fd: -1, flags: 0 }
    }

    pub const fn new(fd: i32) -> Self {
        Self { fd, flags: 0 }
    }

    pub const fn is_valid(&self) -> bool {
        self.fd >= 0
    }
}

impl Default for PipeHandle {
    fn default() -> Self {
        Self::invalid()
    }
}

pub(crate) const STATE_RUNNING: u32 = 0;
pub(crate) const STATE_WAITED: u32 = 1;

/// Plain-data process handle. `exit_code` is meaningful only after a
/// successful [`wait`], after which it is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: i32,
    /// Creation flags, for reference.
    pub flags: u32,
    pub exit_code: i32,
    pub(crate) state: u32,
}

impl ProcessHandle {
    pub const fn invalid() -> Self {
        Self { pid: -1, flags: 0, exit_code: -1, state: STATE_RUNNING }
    }

    pub const fn new(pid: i32, flags: u32) -> Self {
        Self { pid, flags, exit_code: -1, state: STATE_RUNNING }
    }

    pub const fn is_valid(&self) -> bool {
        self.pid > 0
    }

    /// True once a wait has succeeded and `exit_code` is cached.
    pub const fn has_exited(&self) -> bool {
        self.state == STATE_WAITED
    }
}

impl Default for ProcessHandle {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Declarative spawn request.
///
/// `env: None` inherits the parent environment; `Some(vars)` replaces it
/// entirely (execve semantics). `cwd: None` inherits the working
/// directory.
#[derive(Debug, Clone, Default)]
pub struct SpawnRequest {
    pub program: String,
    /// Arguments after `argv[0]` (the program itself is argv[0]).
    pub args: Vec<String>,
    pub env: Option<Vec<(String, String)>>,
    pub cwd: Option<PathBuf>,
    pub stdin: PipeMode,
    pub stdout: PipeMode,
    pub stderr: PipeMode,
    pub flags: SpawnFlags,
}

impl SpawnRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add one variable to an explicit (non-inherited) environment.
    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(Vec::new)
            .push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin(mut self, mode: PipeMode) -> Self {
        self.stdin = mode;
        self
    }

    pub fn stdout(mut self, mode: PipeMode) -> Self {
        self.stdout = mode;
        self
    }

    pub fn stderr(mut self, mode: PipeMode) -> Self {
        self.stderr = mode;
        self
    }

    pub fn flags(mut self, flags: SpawnFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// What [`spawn`] hands back: the process handle plus the parent ends of
/// whichever pipes were requested. Each pipe is an independent resource;
/// closing one does not close the others or the process handle.
#[derive(Debug, Default)]
pub struct SpawnedProcess {
    pub handle: ProcessHandle,
    pub stdin: Option<PipeHandle>,
    pub stdout: Option<PipeHandle>,
    pub stderr: Option<PipeHandle>,
}

/// Optional features of the process backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessCaps {
    pub supports_pipes: bool,
    pub supports_detach: bool,
    pub supports_process_groups: bool,
    pub supports_search_path: bool,
}

/// Spawn a child process.
///
/// Requested pipes are created first; if a later pipe creation fails,
/// every already-created pipe is closed before the error is returned. Any
/// child-side failure after fork (`chdir`, `dup2`, `exec`) terminates the
/// child with status 127 — the parent only observes that through
/// [`wait`], and cannot distinguish it from a genuine 127 exit. Parent
/// pipe ends come back non-blocking.
pub fn spawn(request: &SpawnRequest) -> Result<SpawnedProcess, ProcessError> {
    sys::process::spawn(request)
}

/// Wait for the child. With `no_hang` the call polls: a still-running
/// child yields a `WouldBlock` error and the caller retries. On success
/// the exit code is decoded (signal death becomes `128 + signo`), cached
/// on the handle, and returned; a later wait on the same handle returns
/// the cached value without touching the OS.
pub fn wait(handle: &mut ProcessHandle, no_hang: bool) -> Result<i32, ProcessError> {
    sys::process::wait(handle, no_hang)
}

/// Deliver a signal to the child.
pub fn kill(handle: &ProcessHandle, signal: i32) -> Result<(), ProcessError> {
    sys::process::kill(handle, signal)
}

/// Sugar for the platform's termination signal (SIGTERM).
pub fn terminate(handle: &ProcessHandle) -> Result<(), ProcessError> {
    sys::process::terminate(handle)
}

/// Non-blocking pipe read. `WouldBlock` when no data is available yet;
/// `Ok(0)` is EOF (all write ends closed).
pub fn read_pipe(pipe: PipeHandle, buf: &mut [u8]) -> Result<usize, ProcessError> {
    sys::process::read_pipe(pipe, buf)
}

/// Non-blocking pipe write. `WouldBlock` when the pipe buffer is full.
pub fn write_pipe(pipe: PipeHandle, buf: &[u8]) -> Result<usize, ProcessError> {
    sys::process::write_pipe(pipe, buf)
}

/// Close a pipe handle. Idempotent: success on an already-invalid handle.
pub fn close_pipe(pipe: &mut PipeHandle) -> Result<(), ProcessError> {
    sys::process::close_pipe(pipe)
}

/// Pure capability query.
pub fn capabilities() -> ProcessCaps {
    sys::process::capabilities()
}

/// Owning wrapper over a spawned process and its pipes.
///
/// Drop closes the remaining pipe ends only. It never kills or reaps the
/// process — that release is always the caller's, matching the layer's
/// explicit-release contract.
#[derive(Debug)]
pub struct Child {
    handle: ProcessHandle,
    stdin: Option<PipeHandle>,
    stdout: Option<PipeHandle>,
    stderr: Option<PipeHandle>,
}

impl Child {
    pub fn spawn(request: &SpawnRequest) -> Result<Self, ProcessError> {
        let spawned = spawn(request)?;
        Ok(Self {
            handle: spawned.handle,
            stdin: spawned.stdin,
            stdout: spawned.stdout,
            stderr: spawned.stderr,
        })
    }

    pub fn pid(&self) -> i32 {
        self.handle.pid
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    /// Blocking wait; decodes and caches the exit code.
    pub fn wait(&mut self) -> Result<i32, ProcessError> {
        wait(&mut self.handle, false)
    }

    /// Polling wait: `Ok(None)` while the child is still running.
    pub fn try_wait(&mut self) -> Result<Option<i32>, ProcessError> {
        match wait(&mut self.handle, true) {
            Ok(code) => Ok(Some(code)),
            Err(err) if err.code == crate::error::ProcessErrorCode::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn kill(&self, signal: i32) -> Result<(), ProcessError> {
        kill(&self.handle, signal)
    }

    pub fn terminate(&self) -> Result<(), ProcessError> {
        terminate(&self.handle)
    }

    pub fn stdin(&self) -> Option<PipeHandle> {
        self.stdin
    }

    pub fn stdout(&self) -> Option<PipeHandle> {
        self.stdout
    }

    pub fn stderr(&self) -> Option<PipeHandle> {
        self.stderr
    }

    /// Write to the child's stdin pipe (non-blocking).
    pub fn write_stdin(&self, buf: &[u8]) -> Result<usize, ProcessError> {
        match self.stdin {
            Some(pipe) => write_pipe(pipe, buf),
            None => Err(ProcessError::code(crate::error::ProcessErrorCode::InvalidArgument)),
        }
    }

    /// Read from the child's stdout pipe (non-blocking).
    pub fn read_stdout(&self, buf: &mut [u8]) -> Result<usize, ProcessError> {
        match self.stdout {
            Some(pipe) => read_pipe(pipe, buf),
            None => Err(ProcessError::code(crate::error::ProcessErrorCode::InvalidArgument)),
        }
    }

    /// Read from the child's stderr pipe (non-blocking).
    pub fn read_stderr(&self, buf: &mut [u8]) -> Result<usize, ProcessError> {
        match self.stderr {
            Some(pipe) => read_pipe(pipe, buf),
            None => Err(ProcessError::code(crate::error::ProcessErrorCode::InvalidArgument)),
        }
    }

    /// Close the stdin pipe, signalling EOF to the child. Idempotent.
    pub fn close_stdin(&mut self) -> Result<(), ProcessError> {
        match self.stdin.as_mut() {
            Some(pipe) => close_pipe(pipe),
            None => Ok(()),
        }
    }

    pub fn close_stdout(&mut self) -> Result<(), ProcessError> {
        match self.stdout.as_mut() {
            Some(pipe) => close_pipe(pipe),
            None => Ok(()),
        }
    }

    pub fn close_stderr(&mut self) -> Result<(), ProcessError> {
        match self.stderr.as_mut() {
            Some(pipe) => close_pipe(pipe),
            None => Ok(()),
        }
    }
}

impl Drop for Child {
    fn drop(&mut self) {
        // Pipes are closed; the process is deliberately left alone.
        for pipe in [self.stdin.as_mut(), self.stdout.as_mut(), self.stderr.as_mut()]
            .into_iter()
            .flatten()
        {
            if pipe.is_valid() {
                let _ = close_pipe(pipe);
            }
        }
        if self.handle.is_valid() && !self.handle.has_exited() {
            tracing::debug!(
                pid = self.handle.pid,
                "child handle dropped without wait; process left running"
            );
        }
    }
}
