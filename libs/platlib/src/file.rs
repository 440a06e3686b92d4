// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! File resource manager: a single file descriptor and the synchronous
//! operations over it.
//!
//! The module has two layers. The free functions operate on a plain
//! [`FileHandle`] and map 1:1 onto the backend syscalls; they never close
//! anything implicitly. The [`File`] wrapper owns a handle and closes it
//! on drop. Both layers return [`FileError`] values, never panic.
//!
//! Positioned I/O (`offset: Some(n)`) uses `pread`/`pwrite` and does not
//! move the shared file position; stream I/O (`offset: None`) advances it.
//! Short reads and writes are success values, not errors.

use std::io::{IoSlice, IoSliceMut};
use std::path::Path;

use bitflags::bitflags;

use crate::error::{FileError, FileErrorCode};
use crate::sys;

bitflags! {
    /// File access mode flags. `READ`/`WRITE` select the basic open mode;
    /// the rest map onto `O_APPEND`, `O_TRUNC`, `O_CREAT`, `O_EXCL`,
    /// `O_DIRECT` and `O_SYNC`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessMode: u8 {
        const READ      = 0x01;
        const WRITE     = 0x02;
        const READ_WRITE = 0x03;
        const APPEND    = 0x04;
        const TRUNCATE  = 0x08;
        const CREATE    = 0x10;
        /// Fail if the file already exists (with CREATE).
        const EXCLUSIVE = 0x20;
        /// Bypass the page cache. May be unsupported by the filesystem;
        /// check [`capabilities`] first.
        const DIRECT    = 0x40;
        /// Synchronous I/O (`O_SYNC`).
        const SYNC      = 0x80;
    }
}

/// Declarative open request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRequest {
    pub access: AccessMode,
    /// Permission bits applied on creation (e.g. `0o644`).
    pub permissions: u32,
    /// Escape hatch: extra platform open flags OR-ed into the translated
    /// set verbatim.
    pub native_flags: u32,
}

impl Default for FileRequest {
    fn default() -> Self {
        Self {
            access: AccessMode::READ,
            permissions: 0o644,
            native_flags: 0,
        }
    }
}

/// Plain-data file handle. Valid iff `fd >= 0`. Exactly one logical owner;
/// the struct itself does not close on drop — ownership lives in [`File`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    pub fd: i32,
    /// Open flags recorded for reference.
    pub flags: u32,
}

impl FileHandle {
    pub const fn invalid() -> Self {
        Self { fd: -1, flags: 0 }
    }

    pub const fn new(fd: i32, flags: u32) -> Self {
        Self { fd, flags }
    }

    pub const fn is_valid(&self) -> bool {
        self.fd >= 0
    }
}

impl Default for FileHandle {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Outcome of a read or write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IoResult {
    /// Bytes actually transferred; may be less than requested at EOF or on
    /// a partial transfer.
    pub bytes_transferred: usize,
    /// File position after the operation (0 when the descriptor is not
    /// seekable).
    pub new_offset: u64,
}

/// Seek origin. `Data` and `Hole` are the Linux sparse-file extensions;
/// check `FileCaps::supports_extended_seek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Begin,
    Current,
    End,
    Data,
    Hole,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileType {
    #[default]
    Unknown,
    Regular,
    Directory,
    Symlink,
    Block,
    Character,
    Fifo,
    Socket,
}

/// Flattened stat result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub size: u64,
    /// Number of 512-byte blocks allocated.
    pub blocks: u64,
    pub inode: u64,
    pub device: u64,
    pub atime_sec: i64,
    pub mtime_sec: i64,
    pub ctime_sec: i64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub file_type: FileType,
}

/// Access-pattern hints for `posix_fadvise`. Hint-only: never changes
/// observable read/write results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAdvice {
    Normal,
    Sequential,
    Random,
    NoReuse,
    WillNeed,
    DontNeed,
}

/// What a [`sync`] call must flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFlags {
    /// File contents without metadata guarantees (`fdatasync`).
    DataOnly,
    /// Contents and metadata (`fsync`).
    FullSync,
    /// Contents, metadata, and best-effort the containing directory entry.
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Shared,
    Exclusive,
    Unlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockCommand {
    /// Blocking acquire (`F_SETLKW`).
    SetWait,
    /// Non-blocking acquire (`F_SETLK`).
    Set,
    /// Test only (`F_GETLK`).
    Get,
}

/// POSIX byte-range lock description. `length == 0` means "to EOF".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileLock {
    pub kind: LockKind,
    pub command: LockCommand,
    pub start: u64,
    pub length: u64,
    /// Owning pid, filled in by [`test_lock`] for a conflicting lock.
    pub pid: i32,
}

impl Default for FileLock {
    fn default() -> Self {
        Self {
            kind: LockKind::Shared,
            command: LockCommand::Set,
            start: 0,
            length: 0,
            pid: 0,
        }
    }
}

/// Optional features of the running platform's file backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCaps {
    pub supports_direct_io: bool,
    pub supports_async_io: bool,
    pub supports_splice: bool,
    pub supports_fallocate: bool,
    pub supports_fadvise: bool,
    pub supports_mmap: bool,
    pub supports_lock: bool,
    /// `SEEK_DATA` / `SEEK_HOLE`.
    pub supports_extended_seek: bool,
    pub max_file_size: u64,
    pub max_open_files: u32,
    pub pipe_buffer_size: u32,
}

/// Open a file. An empty path is rejected with `InvalidArgument` before
/// the OS is consulted.
pub fn open(path: &Path, request: &FileRequest) -> Result<FileHandle, FileError> {
    if path.as_os_str().is_empty() {
        return Err(FileError::code(FileErrorCode::InvalidArgument));
    }
    sys::file::open(path, request)
}

/// Create a uniquely-named temporary file in `dir` (or the system temp
/// directory) and immediately unlink it, leaving the returned descriptor
/// as the only reference. Safe to call concurrently.
pub fn create_temp(dir: Option<&Path>, request: &FileRequest) -> Result<FileHandle, FileError> {
    sys::file::create_temp(dir, request)
}

/// Close a handle and invalidate it. Idempotent on an invalid handle.
pub fn close(handle: &mut FileHandle) {
    sys::file::close(handle);
}

/// Read into `buf`. `offset: None` reads at the shared file position and
/// advances it; `Some(n)` is a positioned read that leaves the position
/// untouched.
pub fn read(handle: FileHandle, buf: &mut [u8], offset: Option<u64>) -> Result<IoResult, FileError> {
    sys::file::read(handle, buf, offset)
}

/// Write from `buf`; offset semantics as in [`read`].
pub fn write(handle: FileHandle, buf: &[u8], offset: Option<u64>) -> Result<IoResult, FileError> {
    sys::file::write(handle, buf, offset)
}

/// Scatter read at the current position. Fails `InvalidArgument` when the
/// buffer count exceeds the platform's vector-I/O limit.
pub fn read_vectored(handle: FileHandle, bufs: &mut [IoSliceMut<'_>]) -> Result<IoResult, FileError> {
    sys::file::read_vectored(handle, bufs)
}

/// Gather write at the current position.
pub fn write_vectored(handle: FileHandle, bufs: &[IoSlice<'_>]) -> Result<IoResult, FileError> {
    sys::file::write_vectored(handle, bufs)
}

pub fn seek(handle: FileHandle, offset: i64, origin: SeekOrigin) -> Result<u64, FileError> {
    sys::file::seek(handle, offset, origin)
}

pub fn tell(handle: FileHandle) -> Result<u64, FileError> {
    sys::file::tell(handle)
}

/// Flush the file per `flags`. The `Directory` variant additionally
/// persists the containing directory entry best-effort and reports a
/// `Feature`-domain error when that step is unavailable; callers may
/// ignore it.
pub fn sync(handle: FileHandle, flags: SyncFlags) -> Result<(), FileError> {
    sys::file::sync(handle, flags)
}

/// Flush a byte range (`sync_file_range`). `NotSupported` where the OS
/// lacks the call.
pub fn sync_range(handle: FileHandle, offset: u64, length: u64, flags: SyncFlags) -> Result<(), FileError> {
    sys::file::sync_range(handle, offset, length, flags)
}

/// Grow (zero-filling) or shrink the file to exactly `size`.
pub fn truncate(handle: FileHandle, size: u64) -> Result<(), FileError> {
    sys::file::truncate(handle, size)
}

/// Reserve storage for a byte range without changing the logical size.
/// `NotSupported` is non-fatal: fall back to ordinary writes.
pub fn allocate(handle: FileHandle, offset: u64, length: u64) -> Result<(), FileError> {
    sys::file::allocate(handle, offset, length)
}

/// Punch a hole in a byte range, keeping the logical size.
pub fn deallocate(handle: FileHandle, offset: u64, length: u64) -> Result<(), FileError> {
    sys::file::deallocate(handle, offset, length)
}

/// Acquire, release, or test a POSIX byte-range lock per `lock.command`.
pub fn lock(handle: FileHandle, lock: &FileLock) -> Result<(), FileError> {
    sys::file::lock(handle, lock)
}

/// Never blocks. Returns a lock whose `kind` is [`LockKind::Unlock`] when
/// the range is free, otherwise the conflicting lock's kind, range and
/// owning pid (POSIX `F_GETLK` semantics).
pub fn test_lock(handle: FileHandle, lock: &FileLock) -> Result<FileLock, FileError> {
    sys::file::test_lock(handle, lock)
}

/// Hint the kernel about an access pattern for a byte range.
pub fn advise(handle: FileHandle, offset: u64, length: u64, advice: FileAdvice) -> Result<(), FileError> {
    sys::file::advise(handle, offset, length, advice)
}

/// Zero-copy transfer between two open handles (`splice`). On Linux one
/// side must be a pipe. Caller-supplied offsets are updated in place.
/// There is no silent read+write fallback; `NotSupported` platforms leave
/// that to the caller.
pub fn splice(
    input: FileHandle,
    in_offset: Option<&mut u64>,
    output: FileHandle,
    out_offset: Option<&mut u64>,
    length: usize,
    flags: u32,
) -> Result<usize, FileError> {
    sys::file::splice(input, in_offset, output, out_offset, length, flags)
}

/// Zero-copy `sendfile` from `input` into `output`. `offset` is updated in
/// place when given; when absent the input's file position is used and
/// advanced.
pub fn sendfile(
    output: FileHandle,
    input: FileHandle,
    offset: Option<&mut u64>,
    count: usize,
) -> Result<usize, FileError> {
    sys::file::sendfile(output, input, offset, count)
}

pub fn stat(handle: FileHandle) -> Result<FileInfo, FileError> {
    sys::file::stat(handle)
}

pub fn stat_path(path: &Path, follow_symlinks: bool) -> Result<FileInfo, FileError> {
    if path.as_os_str().is_empty() {
        return Err(FileError::code(FileErrorCode::InvalidArgument));
    }
    sys::file::stat_path(path, follow_symlinks)
}

pub fn size(handle: FileHandle) -> Result<u64, FileError> {
    sys::file::size(handle)
}

/// Pure capability query; no handle required.
pub fn capabilities() -> FileCaps {
    sys::file::capabilities()
}

/// Owning file wrapper. Move-only; the descriptor is closed on drop.
#[derive(Debug)]
pub struct File {
    handle: FileHandle,
}

impl File {
    /// Open a file, taking ownership of the descriptor.
    pub fn open(path: &Path, request: &FileRequest) -> Result<Self, FileError> {
        open(path, request).map(|handle| Self { handle })
    }

    /// Open with just an access mode and default permissions.
    pub fn open_with_mode(path: &Path, access: AccessMode) -> Result<Self, FileError> {
        Self::open(path, &FileRequest { access, ..Default::default() })
    }

    /// Anonymous temporary file (created and immediately unlinked).
    pub fn create_temp(dir: Option<&Path>) -> Result<Self, FileError> {
        create_temp(dir, &FileRequest::default()).map(|handle| Self { handle })
    }

    /// Adopt a raw handle. The wrapper becomes the handle's single owner.
    pub fn from_handle(handle: FileHandle) -> Self {
        Self { handle }
    }

    /// Release ownership without closing.
    pub fn into_handle(self) -> FileHandle {
        let handle = self.handle;
        std::mem::forget(self);
        handle
    }

    pub fn handle(&self) -> FileHandle {
        self.handle
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_valid()
    }

    pub fn read(&self, buf: &mut [u8], offset: Option<u64>) -> Result<IoResult, FileError> {
        read(self.handle, buf, offset)
    }

    pub fn write(&self, buf: &[u8], offset: Option<u64>) -> Result<IoResult, FileError> {
        write(self.handle, buf, offset)
    }

    pub fn read_vectored(&self, bufs: &mut [IoSliceMut<'_>]) -> Result<IoResult, FileError> {
        read_vectored(self.handle, bufs)
    }

    pub fn write_vectored(&self, bufs: &[IoSlice<'_>]) -> Result<IoResult, FileError> {
        write_vectored(self.handle, bufs)
    }

    pub fn seek(&self, offset: i64, origin: SeekOrigin) -> Result<u64, FileError> {
        seek(self.handle, offset, origin)
    }

    pub fn tell(&self) -> Result<u64, FileError> {
        tell(self.handle)
    }

    pub fn sync(&self, flags: SyncFlags) -> Result<(), FileError> {
        sync(self.handle, flags)
    }

    pub fn sync_range(&self, offset: u64, length: u64, flags: SyncFlags) -> Result<(), FileError> {
        sync_range(self.handle, offset, length, flags)
    }

    pub fn truncate(&self, size: u64) -> Result<(), FileError> {
        truncate(self.handle, size)
    }

    pub fn allocate(&self, offset: u64, length: u64) -> Result<(), FileError> {
        allocate(self.handle, offset, length)
    }

    pub fn deallocate(&self, offset: u64, length: u64) -> Result<(), FileError> {
        deallocate(self.handle, offset, length)
    }

    pub fn lock(&self, lock_desc: &FileLock) -> Result<(), FileError> {
        lock(self.handle, lock_desc)
    }

    pub fn test_lock(&self, lock_desc: &FileLock) -> Result<FileLock, FileError> {
        test_lock(self.handle, lock_desc)
    }

    pub fn advise(&self, offset: u64, length: u64, advice: FileAdvice) -> Result<(), FileError> {
        advise(self.handle, offset, length, advice)
    }

    pub fn stat(&self) -> Result<FileInfo, FileError> {
        stat(self.handle)
    }

    pub fn size(&self) -> Result<u64, FileError> {
        size(self.handle)
    }

    /// Close eagerly. Also happens on drop.
    pub fn close(&mut self) {
        close(&mut self.handle);
    }
}

impl Drop for File {
    fn drop(&mut self) {
        if self.handle.is_valid() {
            tracing::debug!(fd = self.handle.fd, "closing file on drop");
            close(&mut self.handle);
        }
    }
}
