// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Linux reference backend. Translates the OS-agnostic request types into
//! syscalls via `libc`; errno is captured immediately after each syscall,
//! before any other call can overwrite it.

pub(crate) mod file;
pub(crate) mod mmap;
pub(crate) mod process;

/// Snapshot errno right after a failed syscall.
pub(crate) fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}
