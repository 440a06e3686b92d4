// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Linux process backend built on fork/exec. Everything the child needs
//! (argv, envp, cwd as C strings) is prepared before the fork; the child
//! side only makes async-signal-safe calls and exits with 127 on any
//! failure before exec.

use std::ffi::CString;

use crate::error::{ProcessError, ProcessErrorCode};
use crate::process::{
    PipeHandle, PipeMode, ProcessCaps, ProcessHandle, SpawnFlags, SpawnRequest, SpawnedProcess,
    STATE_WAITED,
};

use super::errno;

/// Exit status the child reports when any step between fork and exec
/// fails. Indistinguishable from a genuine 127 exit by design of the
/// shell convention this mirrors.
const CHILD_SETUP_FAILED: i32 = 127;

fn invalid_argument() -> ProcessError {
    ProcessError::code(ProcessErrorCode::InvalidArgument)
}

fn to_cstring(s: &str) -> Result<CString, ProcessError> {
    CString::new(s).map_err(|_| invalid_argument())
}

/// A pipe pair as returned by `pipe(2)`: `[read_end, write_end]`.
type PipePair = [i32; 2];

fn make_pipe() -> Result<PipePair, ProcessError> {
    let mut fds: PipePair = [-1, -1];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
        return Err(ProcessError::from_errno(errno()));
    }
    Ok(fds)
}

fn close_fd(fd: i32) {
    if fd >= 0 {
        unsafe { libc::close(fd) };
    }
}

fn close_pair(pair: Option<PipePair>) {
    if let Some([rd, wr]) = pair {
        close_fd(rd);
        close_fd(wr);
    }
}

/// Take over the parent side of a pipe pair: close the child's end and
/// make the kept end non-blocking. On failure the kept end is closed too.
fn adopt_parent_end(
    pair: Option<PipePair>,
    parent_is_read: bool,
) -> Result<Option<PipeHandle>, ProcessError> {
    let Some([rd, wr]) = pair else { return Ok(None) };
    let (keep, discard) = if parent_is_read { (rd, wr) } else { (wr, rd) };
    close_fd(discard);
    if let Err(err) = configure_parent_end(keep) {
        close_fd(keep);
        return Err(err);
    }
    Ok(Some(PipeHandle::new(keep)))
}

/// Mark a parent-side pipe end non-blocking and close-on-exec.
fn configure_parent_end(fd: i32) -> Result<(), ProcessError> {
    let status = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if status < 0 {
        return Err(ProcessError::from_errno(errno()));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, status | libc::O_NONBLOCK) } < 0 {
        return Err(ProcessError::from_errno(errno()));
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } < 0 {
        return Err(ProcessError::from_errno(errno()));
    }
    Ok(())
}

/// Child-side stdio wiring. Runs after fork: only dup2/open/close.
/// Returns false on failure so the caller can `_exit(127)`.
fn wire_child_stream(mode: PipeMode, pair: Option<PipePair>, target_fd: i32) -> bool {
    match mode {
        PipeMode::Inherit => true,
        PipeMode::Pipe => {
            let Some([rd, wr]) = pair else { return false };
            let source = if target_fd == libc::STDIN_FILENO { rd } else { wr };
            unsafe { libc::dup2(source, target_fd) >= 0 }
        }
        PipeMode::Null => {
            let oflag = if target_fd == libc::STDIN_FILENO {
                libc::O_RDONLY
            } else {
                libc::O_WRONLY
            };
            let null_fd = unsafe { libc::open(c"/dev/null".as_ptr(), oflag) };
            if null_fd < 0 {
                return false;
            }
            let ok = unsafe { libc::dup2(null_fd, target_fd) >= 0 };
            unsafe { libc::close(null_fd) };
            ok
        }
    }
}

pub(crate) fn spawn(request: &SpawnRequest) -> Result<SpawnedProcess, ProcessError> {
    if request.program.is_empty() {
        return Err(invalid_argument());
    }

    // All heap work happens before the fork. An interior NUL anywhere in
    // the request is an invalid argument, not a child-side 127.
    let program = to_cstring(&request.program)?;
    let mut argv_storage: Vec<CString> = Vec::with_capacity(request.args.len() + 1);
    argv_storage.push(program.clone());
    for arg in &request.args {
        argv_storage.push(to_cstring(arg)?);
    }
    let mut argv: Vec<*const libc::c_char> =
        argv_storage.iter().map(|s| s.as_ptr()).collect();
    argv.push(std::ptr::null());

    let envp_storage: Option<Vec<CString>> = match &request.env {
        None => None,
        Some(vars) => {
            let mut storage = Vec::with_capacity(vars.len());
            for (key, value) in vars {
                if key.is_empty() || key.contains('=') {
                    return Err(invalid_argument());
                }
                storage.push(to_cstring(&format!("{key}={value}"))?);
            }
            Some(storage)
        }
    };
    let envp: Option<Vec<*const libc::c_char>> = envp_storage.as_ref().map(|storage| {
        let mut ptrs: Vec<*const libc::c_char> = storage.iter().map(|s| s.as_ptr()).collect();
        ptrs.push(std::ptr::null());
        ptrs
    });

    let cwd = match &request.cwd {
        Some(dir) => Some(to_cstring(dir.to_str().ok_or_else(invalid_argument)?)?),
        None => None,
    };

    // Pipes next, with cleanup of every already-created pair when a later
    // one fails.
    let mut stdin_pair: Option<PipePair> = None;
    let mut stdout_pair: Option<PipePair> = None;
    let mut stderr_pair: Option<PipePair> = None;
    let cleanup = |a: Option<PipePair>, b: Option<PipePair>, c: Option<PipePair>| {
        close_pair(a);
        close_pair(b);
        close_pair(c);
    };

    if request.stdin == PipeMode::Pipe {
        stdin_pair = Some(make_pipe()?);
    }
    if request.stdout == PipeMode::Pipe {
        match make_pipe() {
            Ok(pair) => stdout_pair = Some(pair),
            Err(err) => {
                cleanup(stdin_pair, None, None);
                return Err(err);
            }
        }
    }
    if request.stderr == PipeMode::Pipe {
        match make_pipe() {
            Ok(pair) => stderr_pair = Some(pair),
            Err(err) => {
                cleanup(stdin_pair, stdout_pair, None);
                return Err(err);
            }
        }
    }

    let pid = unsafe { libc::fork() };
    if pid < 0 {
        let err = ProcessError::from_errno(errno());
        cleanup(stdin_pair, stdout_pair, stderr_pair);
        return Err(err);
    }

    if pid == 0 {
        // Child. Nothing below may allocate or return.
        if request.flags.contains(SpawnFlags::DETACHED) {
            unsafe { libc::setsid() };
        } else if request.flags.contains(SpawnFlags::NEW_PROCESS_GROUP) {
            unsafe { libc::setpgid(0, 0) };
        }

        let wired = wire_child_stream(request.stdin, stdin_pair, libc::STDIN_FILENO)
            && wire_child_stream(request.stdout, stdout_pair, libc::STDOUT_FILENO)
            && wire_child_stream(request.stderr, stderr_pair, libc::STDERR_FILENO);
        if !wired {
            unsafe { libc::_exit(CHILD_SETUP_FAILED) };
        }

        // Both ends of every pipe were duplicated or are parent-owned.
        close_pair(stdin_pair);
        close_pair(stdout_pair);
        close_pair(stderr_pair);

        if let Some(dir) = &cwd {
            if unsafe { libc::chdir(dir.as_ptr()) } != 0 {
                unsafe { libc::_exit(CHILD_SETUP_FAILED) };
            }
        }

        let search_path = request.flags.contains(SpawnFlags::SEARCH_PATH);
        unsafe {
            match (search_path, &envp) {
                (true, Some(env)) => {
                    libc::execvpe(program.as_ptr(), argv.as_ptr(), env.as_ptr());
                }
                (true, None) => {
                    libc::execvp(program.as_ptr(), argv.as_ptr());
                }
                (false, Some(env)) => {
                    libc::execve(program.as_ptr(), argv.as_ptr(), env.as_ptr());
                }
                (false, None) => {
                    libc::execv(program.as_ptr(), argv.as_ptr());
                }
            }
            libc::_exit(CHILD_SETUP_FAILED);
        }
    }

    // Parent: close the child-side ends, keep the far ends non-blocking.
    // An adopt failure closes everything already adopted plus the pairs
    // not reached yet; the child is left running for the caller to reap.
    let stdin_handle = match adopt_parent_end(stdin_pair, false) {
        Ok(handle) => handle,
        Err(err) => {
            close_pair(stdout_pair);
            close_pair(stderr_pair);
            return Err(err);
        }
    };
    let stdout_handle = match adopt_parent_end(stdout_pair, true) {
        Ok(handle) => handle,
        Err(err) => {
            if let Some(h) = stdin_handle {
                close_fd(h.fd);
            }
            close_pair(stderr_pair);
            return Err(err);
        }
    };
    let stderr_handle = match adopt_parent_end(stderr_pair, true) {
        Ok(handle) => handle,
        Err(err) => {
            if let Some(h) = stdin_handle {
                close_fd(h.fd);
            }
            if let Some(h) = stdout_handle {
                close_fd(h.fd);
            }
            return Err(err);
        }
    };

    let spawned = SpawnedProcess {
        handle: ProcessHandle::new(pid, request.flags.bits()),
        stdin: stdin_handle,
        stdout: stdout_handle,
        stderr: stderr_handle,
    };

    tracing::debug!(
        pid,
        program = %request.program,
        stdin = ?request.stdin,
        stdout = ?request.stdout,
        stderr = ?request.stderr,
        "spawned child process"
    );
    Ok(spawned)
}

pub(crate) fn wait(handle: &mut ProcessHandle, no_hang: bool) -> Result<i32, ProcessError> {
    if handle.state == STATE_WAITED {
        return Ok(handle.exit_code);
    }
    if !handle.is_valid() {
        return Err(invalid_argument());
    }

    let mut status: libc::c_int = 0;
    let options = if no_hang { libc::WNOHANG } else { 0 };
    let waited = unsafe { libc::waitpid(handle.pid, &mut status, options) };
    if waited < 0 {
        return Err(ProcessError::from_errno(errno()));
    }
    if waited == 0 {
        // WNOHANG and the child has not changed state yet.
        return Err(ProcessError::code(ProcessErrorCode::WouldBlock));
    }

    let exit_code = if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else if libc::WIFSIGNALED(status) {
        128 + libc::WTERMSIG(status)
    } else {
        -1
    };

    handle.exit_code = exit_code;
    handle.state = STATE_WAITED;
    tracing::debug!(pid = handle.pid, exit_code, "child process reaped");
    Ok(exit_code)
}

pub(crate) fn kill(handle: &ProcessHandle, signal: i32) -> Result<(), ProcessError> {
    if !handle.is_valid() {
        return Err(invalid_argument());
    }
    if unsafe { libc::kill(handle.pid, signal) } != 0 {
        return Err(ProcessError::from_errno(errno()));
    }
    Ok(())
}

pub(crate) fn terminate(handle: &ProcessHandle) -> Result<(), ProcessError> {
    kill(handle, libc::SIGTERM)
}

pub(crate) fn read_pipe(pipe: PipeHandle, buf: &mut [u8]) -> Result<usize, ProcessError> {
    if !pipe.is_valid() || buf.is_empty() {
        return Err(invalid_argument());
    }
    let n = unsafe { libc::read(pipe.fd, buf.as_mut_ptr().cast(), buf.len()) };
    if n < 0 {
        // EAGAIN maps to WouldBlock: normal for a non-blocking pipe.
        return Err(ProcessError::from_errno(errno()));
    }
    Ok(n as usize)
}

pub(crate) fn write_pipe(pipe: PipeHandle, buf: &[u8]) -> Result<usize, ProcessError> {
    if !pipe.is_valid() || buf.is_empty() {
        return Err(invalid_argument());
    }
    let n = unsafe { libc::write(pipe.fd, buf.as_ptr().cast(), buf.len()) };
    if n < 0 {
        return Err(ProcessError::from_errno(errno()));
    }
    Ok(n as usize)
}

pub(crate) fn close_pipe(pipe: &mut PipeHandle) -> Result<(), ProcessError> {
    if !pipe.is_valid() {
        return Ok(());
    }
    let result = unsafe { libc::close(pipe.fd) };
    // The descriptor is gone either way; never retry a failed close.
    *pipe = PipeHandle::invalid();
    if result != 0 {
        return Err(ProcessError::from_errno(errno()));
    }
    Ok(())
}

pub(crate) fn capabilities() -> ProcessCaps {
    ProcessCaps {
        supports_pipes: true,
        supports_detach: true,
        supports_process_groups: true,
        supports_search_path: true,
    }
}
