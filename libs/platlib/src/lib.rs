// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Platform I/O abstraction layer.
//!
//! Three resource managers with a shared design: declarative request
//! structs in, plain-data handles out, flattened `Copy` errors, and
//! explicit resource release (owning wrappers are provided on top for
//! RAII callers).
//!
//! - [`file`] — file descriptors and the synchronous operations over
//!   them: positioned and vectored I/O, sync variants, preallocation,
//!   byte-range locks, zero-copy transfer.
//! - [`mmap`] — memory mappings described as independent policy axes,
//!   with huge-page fallback reported in the granted region.
//! - [`process`] — child processes with non-blocking pipes; nothing is
//!   killed or reaped implicitly.
//!
//! Capability queries ([`file::capabilities`], [`mmap::capabilities`],
//! [`process::capabilities`]) are pure and let callers probe optional
//! features before relying on them. On platforms without a backend every
//! operation fails `NotSupported` instead of failing to compile.

pub mod error;
pub mod file;
pub mod mmap;
pub mod process;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub(crate) use linux as sys;

#[cfg(not(target_os = "linux"))]
mod fallback;
#[cfg(not(target_os = "linux"))]
pub(crate) use fallback as sys;

pub use error::{
    ErrorDomain, FileError, FileErrorCode, MemoryError, MemoryErrorCode, ProcessError,
    ProcessErrorCode,
};
pub use file::{AccessMode, File, FileHandle, FileRequest, IoResult};
pub use mmap::{Mapping, MemAccess, MemoryRegion, MemoryRequest};
pub use process::{Child, PipeMode, SpawnFlags, SpawnRequest};
