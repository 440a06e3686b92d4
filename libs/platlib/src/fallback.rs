// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Stub backend for platforms without a real implementation. Every
//! operation fails with a `Feature`-domain `NotSupported` error and every
//! capability query reports nothing supported, so callers can probe
//! portably instead of failing at compile time.

pub(crate) mod file {
    use std::io::{IoSlice, IoSliceMut};
    use std::path::Path;

    use crate::error::FileError;
    use crate::file::{
        FileAdvice, FileCaps, FileHandle, FileInfo, FileLock, FileRequest, IoResult, SeekOrigin,
        SyncFlags,
    };

    pub(crate) fn open(_path: &Path, _request: &FileRequest) -> Result<FileHandle, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn create_temp(
        _dir: Option<&Path>,
        _request: &FileRequest,
    ) -> Result<FileHandle, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn close(handle: &mut FileHandle) {
        *handle = FileHandle::invalid();
    }

    pub(crate) fn read(
        _handle: FileHandle,
        _buf: &mut [u8],
        _offset: Option<u64>,
    ) -> Result<IoResult, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn write(
        _handle: FileHandle,
        _buf: &[u8],
        _offset: Option<u64>,
    ) -> Result<IoResult, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn read_vectored(
        _handle: FileHandle,
        _bufs: &mut [IoSliceMut<'_>],
    ) -> Result<IoResult, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn write_vectored(
        _handle: FileHandle,
        _bufs: &[IoSlice<'_>],
    ) -> Result<IoResult, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn seek(
        _handle: FileHandle,
        _offset: i64,
        _origin: SeekOrigin,
    ) -> Result<u64, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn tell(_handle: FileHandle) -> Result<u64, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn sync(_handle: FileHandle, _flags: SyncFlags) -> Result<(), FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn sync_range(
        _handle: FileHandle,
        _offset: u64,
        _length: u64,
        _flags: SyncFlags,
    ) -> Result<(), FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn truncate(_handle: FileHandle, _size: u64) -> Result<(), FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn allocate(_handle: FileHandle, _offset: u64, _length: u64) -> Result<(), FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn deallocate(
        _handle: FileHandle,
        _offset: u64,
        _length: u64,
    ) -> Result<(), FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn lock(_handle: FileHandle, _lock: &FileLock) -> Result<(), FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn test_lock(_handle: FileHandle, _lock: &FileLock) -> Result<FileLock, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn advise(
        _handle: FileHandle,
        _offset: u64,
        _length: u64,
        _advice: FileAdvice,
    ) -> Result<(), FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn splice(
        _input: FileHandle,
        _in_offset: Option<&mut u64>,
        _output: FileHandle,
        _out_offset: Option<&mut u64>,
        _length: usize,
        _flags: u32,
    ) -> Result<usize, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn sendfile(
        _output: FileHandle,
        _input: FileHandle,
        _offset: Option<&mut u64>,
        _count: usize,
    ) -> Result<usize, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn stat(_handle: FileHandle) -> Result<FileInfo, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn stat_path(_path: &Path, _follow_symlinks: bool) -> Result<FileInfo, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn size(_handle: FileHandle) -> Result<u64, FileError> {
        Err(FileError::not_supported())
    }

    pub(crate) fn capabilities() -> FileCaps {
        FileCaps::default()
    }
}

pub(crate) mod mmap {
    use crate::error::MemoryError;
    use crate::mmap::{
        AccessPattern, LockingStrategy, MemoryCaps, MemoryRegion, MemoryRequest,
    };

    pub(crate) fn map(_fd: i32, _request: &MemoryRequest) -> Result<MemoryRegion, MemoryError> {
        Err(MemoryError::not_supported())
    }

    pub(crate) fn sync(_region: &MemoryRegion, _invalidate_caches: bool) -> Result<(), MemoryError> {
        Err(MemoryError::not_supported())
    }

    pub(crate) fn unmap(region: &mut MemoryRegion) {
        *region = MemoryRegion::default();
    }

    pub(crate) fn advise(
        _region: &MemoryRegion,
        _pattern: AccessPattern,
    ) -> Result<(), MemoryError> {
        Err(MemoryError::not_supported())
    }

    pub(crate) fn lock(
        _region: &mut MemoryRegion,
        _strategy: LockingStrategy,
    ) -> Result<(), MemoryError> {
        Err(MemoryError::not_supported())
    }

    pub(crate) fn unlock(_region: &mut MemoryRegion) -> Result<(), MemoryError> {
        Err(MemoryError::not_supported())
    }

    pub(crate) fn prefetch(
        _region: &MemoryRegion,
        _offset: usize,
        _length: usize,
    ) -> Result<(), MemoryError> {
        Err(MemoryError::not_supported())
    }

    pub(crate) fn capabilities() -> MemoryCaps {
        MemoryCaps::default()
    }
}

pub(crate) mod process {
    use crate::error::ProcessError;
    use crate::process::{
        PipeHandle, ProcessCaps, ProcessHandle, SpawnRequest, SpawnedProcess,
    };

    pub(crate) fn spawn(_request: &SpawnRequest) -> Result<SpawnedProcess, ProcessError> {
        Err(ProcessError::not_supported())
    }

    pub(crate) fn wait(_handle: &mut ProcessHandle, _no_hang: bool) -> Result<i32, ProcessError> {
        Err(ProcessError::not_supported())
    }

    pub(crate) fn kill(_handle: &ProcessHandle, _signal: i32) -> Result<(), ProcessError> {
        Err(ProcessError::not_supported())
    }

    pub(crate) fn terminate(_handle: &ProcessHandle) -> Result<(), ProcessError> {
        Err(ProcessError::not_supported())
    }

    pub(crate) fn read_pipe(_pipe: PipeHandle, _buf: &mut [u8]) -> Result<usize, ProcessError> {
        Err(ProcessError::not_supported())
    }

    pub(crate) fn write_pipe(_pipe: PipeHandle, _buf: &[u8]) -> Result<usize, ProcessError> {
        Err(ProcessError::not_supported())
    }

    pub(crate) fn close_pipe(pipe: &mut PipeHandle) -> Result<(), ProcessError> {
        *pipe = PipeHandle::invalid();
        Ok(())
    }

    pub(crate) fn capabilities() -> ProcessCaps {
        ProcessCaps::default()
    }
}
