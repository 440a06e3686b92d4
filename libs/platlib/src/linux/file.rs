// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Linux file backend: open/pread/pwrite/readv/writev/lseek, fsync
//! family, ftruncate/fallocate, fcntl range locks, posix_fadvise, and the
//! zero-copy splice/sendfile pair.

use std::ffi::CString;
use std::io::{IoSlice, IoSliceMut};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::error::{ErrorDomain, FileError, FileErrorCode};
use crate::file::{
    AccessMode, FileAdvice, FileCaps, FileHandle, FileInfo, FileLock, FileRequest, FileType,
    IoResult, LockCommand, LockKind, SeekOrigin, SyncFlags,
};

use super::errno;

/// Linux caps readv/writev at UIO_MAXIOV entries.
const IOV_MAX: usize = 1024;

fn path_to_cstring(path: &Path) -> Result<CString, FileError> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| FileError::code(FileErrorCode::InvalidArgument))
}

/// Translate the access-mode bitflags into O_* open flags.
pub(crate) fn to_open_flags(access: AccessMode) -> i32 {
    let mut flags = if access.contains(AccessMode::READ_WRITE) {
        libc::O_RDWR
    } else if access.contains(AccessMode::WRITE) {
        libc::O_WRONLY
    } else {
        libc::O_RDONLY
    };

    if access.contains(AccessMode::APPEND) {
        flags |= libc::O_APPEND;
    }
    if access.contains(AccessMode::TRUNCATE) {
        flags |= libc::O_TRUNC;
    }
    if access.contains(AccessMode::CREATE) {
        flags |= libc::O_CREAT;
    }
    if access.contains(AccessMode::EXCLUSIVE) {
        flags |= libc::O_EXCL;
    }
    if access.contains(AccessMode::DIRECT) {
        flags |= libc::O_DIRECT;
    }
    if access.contains(AccessMode::SYNC) {
        flags |= libc::O_SYNC;
    }

    flags
}

fn to_seek_whence(origin: SeekOrigin) -> i32 {
    match origin {
        SeekOrigin::Begin => libc::SEEK_SET,
        SeekOrigin::Current => libc::SEEK_CUR,
        SeekOrigin::End => libc::SEEK_END,
        SeekOrigin::Data => libc::SEEK_DATA,
        SeekOrigin::Hole => libc::SEEK_HOLE,
    }
}

fn to_lock_type(kind: LockKind) -> libc::c_short {
    (match kind {
        LockKind::Shared => libc::F_RDLCK,
        LockKind::Exclusive => libc::F_WRLCK,
        LockKind::Unlock => libc::F_UNLCK,
    }) as libc::c_short
}

fn to_lock_cmd(command: LockCommand) -> i32 {
    match command {
        LockCommand::SetWait => libc::F_SETLKW,
        LockCommand::Set => libc::F_SETLK,
        LockCommand::Get => libc::F_GETLK,
    }
}

fn to_fadvise_advice(advice: FileAdvice) -> i32 {
    match advice {
        FileAdvice::Normal => libc::POSIX_FADV_NORMAL,
        FileAdvice::Sequential => libc::POSIX_FADV_SEQUENTIAL,
        FileAdvice::Random => libc::POSIX_FADV_RANDOM,
        FileAdvice::NoReuse => libc::POSIX_FADV_NOREUSE,
        FileAdvice::WillNeed => libc::POSIX_FADV_WILLNEED,
        FileAdvice::DontNeed => libc::POSIX_FADV_DONTNEED,
    }
}

fn stat_to_info(st: &libc::stat) -> FileInfo {
    let file_type = match st.st_mode & libc::S_IFMT {
        libc::S_IFREG => FileType::Regular,
        libc::S_IFDIR => FileType::Directory,
        libc::S_IFLNK => FileType::Symlink,
        libc::S_IFBLK => FileType::Block,
        libc::S_IFCHR => FileType::Character,
        libc::S_IFIFO => FileType::Fifo,
        libc::S_IFSOCK => FileType::Socket,
        _ => FileType::Unknown,
    };

    FileInfo {
        size: st.st_size as u64,
        blocks: st.st_blocks as u64,
        inode: st.st_ino as u64,
        device: st.st_dev as u64,
        atime_sec: st.st_atime as i64,
        mtime_sec: st.st_mtime as i64,
        ctime_sec: st.st_ctime as i64,
        mode: st.st_mode,
        uid: st.st_uid,
        gid: st.st_gid,
        nlink: st.st_nlink as u32,
        file_type,
    }
}

/// Current file position, or 0 for non-seekable descriptors.
fn current_position(fd: i32) -> u64 {
    let pos = unsafe { libc::lseek(fd, 0, libc::SEEK_CUR) };
    if pos < 0 { 0 } else { pos as u64 }
}

pub(crate) fn open(path: &Path, request: &FileRequest) -> Result<FileHandle, FileError> {
    let c_path = path_to_cstring(path)?;
    let flags = to_open_flags(request.access) | request.native_flags as i32;

    let fd = unsafe { libc::open(c_path.as_ptr(), flags, request.permissions as libc::c_uint) };
    if fd < 0 {
        return Err(FileError::from_errno(errno()));
    }

    tracing::debug!(fd, path = %path.display(), "opened file");
    Ok(FileHandle::new(fd, flags as u32))
}

pub(crate) fn create_temp(dir: Option<&Path>, _request: &FileRequest) -> Result<FileHandle, FileError> {
    let dir = dir.map_or_else(|| PathBuf::from("/tmp"), Path::to_path_buf);
    let template = dir.join("platlib.XXXXXX");

    // mkstemp rewrites the template in place, so it needs a mutable,
    // NUL-terminated byte buffer.
    let mut buf = template.as_os_str().as_bytes().to_vec();
    buf.push(0);

    let fd = unsafe { libc::mkstemp(buf.as_mut_ptr().cast::<libc::c_char>()) };
    if fd < 0 {
        return Err(FileError::from_errno(errno()));
    }

    // Unlink immediately: the descriptor stays the only reference, so the
    // file disappears on close and no name can collide.
    unsafe { libc::unlink(buf.as_ptr().cast::<libc::c_char>()) };

    tracing::debug!(fd, dir = %dir.display(), "created anonymous temp file");
    Ok(FileHandle::new(fd, libc::O_RDWR as u32))
}

pub(crate) fn close(handle: &mut FileHandle) {
    if handle.is_valid() {
        unsafe { libc::close(handle.fd) };
        handle.fd = -1;
    }
}

pub(crate) fn read(handle: FileHandle, buf: &mut [u8], offset: Option<u64>) -> Result<IoResult, FileError> {
    let result = match offset {
        Some(off) => unsafe {
            libc::pread(handle.fd, buf.as_mut_ptr().cast(), buf.len(), off as libc::off_t)
        },
        None => unsafe { libc::read(handle.fd, buf.as_mut_ptr().cast(), buf.len()) },
    };
    if result < 0 {
        return Err(FileError::from_errno(errno()));
    }

    Ok(IoResult {
        bytes_transferred: result as usize,
        new_offset: current_position(handle.fd),
    })
}

pub(crate) fn write(handle: FileHandle, buf: &[u8], offset: Option<u64>) -> Result<IoResult, FileError> {
    let result = match offset {
        Some(off) => unsafe {
            libc::pwrite(handle.fd, buf.as_ptr().cast(), buf.len(), off as libc::off_t)
        },
        None => unsafe { libc::write(handle.fd, buf.as_ptr().cast(), buf.len()) },
    };
    if result < 0 {
        return Err(FileError::from_errno(errno()));
    }

    Ok(IoResult {
        bytes_transferred: result as usize,
        new_offset: current_position(handle.fd),
    })
}

pub(crate) fn read_vectored(handle: FileHandle, bufs: &mut [IoSliceMut<'_>]) -> Result<IoResult, FileError> {
    if bufs.len() > IOV_MAX {
        return Err(FileError::code(FileErrorCode::InvalidArgument));
    }

    // IoSliceMut is guaranteed ABI-compatible with iovec on Unix.
    let result = unsafe {
        libc::readv(
            handle.fd,
            bufs.as_mut_ptr().cast::<libc::iovec>(),
            bufs.len() as libc::c_int,
        )
    };
    if result < 0 {
        return Err(FileError::from_errno(errno()));
    }

    Ok(IoResult {
        bytes_transferred: result as usize,
        new_offset: current_position(handle.fd),
    })
}

pub(crate) fn write_vectored(handle: FileHandle, bufs: &[IoSlice<'_>]) -> Result<IoResult, FileError> {
    if bufs.len() > IOV_MAX {
        return Err(FileError::code(FileErrorCode::InvalidArgument));
    }

    let result = unsafe {
        libc::writev(
            handle.fd,
            bufs.as_ptr().cast::<libc::iovec>(),
            bufs.len() as libc::c_int,
        )
    };
    if result < 0 {
        return Err(FileError::from_errno(errno()));
    }

    Ok(IoResult {
        bytes_transferred: result as usize,
        new_offset: current_position(handle.fd),
    })
}

pub(crate) fn seek(handle: FileHandle, offset: i64, origin: SeekOrigin) -> Result<u64, FileError> {
    let result = unsafe { libc::lseek(handle.fd, offset as libc::off_t, to_seek_whence(origin)) };
    if result < 0 {
        return Err(FileError::from_errno(errno()));
    }
    Ok(result as u64)
}

pub(crate) fn tell(handle: FileHandle) -> Result<u64, FileError> {
    let result = unsafe { libc::lseek(handle.fd, 0, libc::SEEK_CUR) };
    if result < 0 {
        return Err(FileError::from_errno(errno()));
    }
    Ok(result as u64)
}

/// Best-effort fsync of the directory containing `fd`'s file. The path is
/// recovered through /proc/self/fd; an unlinked file (e.g. a temp handle)
/// cannot be resolved and reports the feature as unsupported.
fn sync_parent_dir(fd: i32) -> Result<(), FileError> {
    let link = PathBuf::from(format!("/proc/self/fd/{fd}"));
    let target = std::fs::read_link(&link)
        .map_err(|_| FileError::new(ErrorDomain::Feature, FileErrorCode::NotSupported, 0))?;
    let parent = target
        .parent()
        .ok_or(FileError::new(ErrorDomain::Feature, FileErrorCode::NotSupported, 0))?;

    let c_dir = path_to_cstring(parent)?;
    let dir_fd = unsafe { libc::open(c_dir.as_ptr(), libc::O_RDONLY | libc::O_DIRECTORY) };
    if dir_fd < 0 {
        return Err(FileError::from_errno(errno()));
    }

    let rc = unsafe { libc::fsync(dir_fd) };
    let sync_errno = errno();
    unsafe { libc::close(dir_fd) };

    if rc < 0 {
        return Err(FileError::from_errno(sync_errno));
    }
    Ok(())
}

pub(crate) fn sync(handle: FileHandle, flags: SyncFlags) -> Result<(), FileError> {
    let result = match flags {
        SyncFlags::DataOnly => unsafe { libc::fdatasync(handle.fd) },
        SyncFlags::FullSync | SyncFlags::Directory => unsafe { libc::fsync(handle.fd) },
    };
    if result < 0 {
        return Err(FileError::from_errno(errno()));
    }

    if flags == SyncFlags::Directory {
        sync_parent_dir(handle.fd)?;
    }
    Ok(())
}

pub(crate) fn sync_range(handle: FileHandle, offset: u64, length: u64, flags: SyncFlags) -> Result<(), FileError> {
    let mut range_flags = libc::SYNC_FILE_RANGE_WRITE;
    if !matches!(flags, SyncFlags::DataOnly) {
        range_flags |= libc::SYNC_FILE_RANGE_WAIT_BEFORE | libc::SYNC_FILE_RANGE_WAIT_AFTER;
    }

    let result = unsafe {
        libc::sync_file_range(handle.fd, offset as libc::off64_t, length as libc::off64_t, range_flags)
    };
    if result < 0 {
        return Err(FileError::from_errno(errno()));
    }
    Ok(())
}

pub(crate) fn truncate(handle: FileHandle, size: u64) -> Result<(), FileError> {
    if unsafe { libc::ftruncate(handle.fd, size as libc::off_t) } < 0 {
        return Err(FileError::from_errno(errno()));
    }
    Ok(())
}

pub(crate) fn allocate(handle: FileHandle, offset: u64, length: u64) -> Result<(), FileError> {
    let result = unsafe {
        libc::fallocate(handle.fd, 0, offset as libc::off_t, length as libc::off_t)
    };
    if result < 0 {
        return Err(FileError::from_errno(errno()));
    }
    Ok(())
}

pub(crate) fn deallocate(handle: FileHandle, offset: u64, length: u64) -> Result<(), FileError> {
    let result = unsafe {
        libc::fallocate(
            handle.fd,
            libc::FALLOC_FL_PUNCH_HOLE | libc::FALLOC_FL_KEEP_SIZE,
            offset as libc::off_t,
            length as libc::off_t,
        )
    };
    if result < 0 {
        return Err(FileError::from_errno(errno()));
    }
    Ok(())
}

fn to_flock(lock: &FileLock) -> libc::flock {
    let mut fl: libc::flock = unsafe { std::mem::zeroed() };
    fl.l_type = to_lock_type(lock.kind);
    fl.l_whence = libc::SEEK_SET as libc::c_short;
    fl.l_start = lock.start as libc::off_t;
    fl.l_len = lock.length as libc::off_t;
    fl.l_pid = 0;
    fl
}

pub(crate) fn lock(handle: FileHandle, lock: &FileLock) -> Result<(), FileError> {
    let mut fl = to_flock(lock);
    if unsafe { libc::fcntl(handle.fd, to_lock_cmd(lock.command), &mut fl) } < 0 {
        return Err(FileError::from_errno(errno()));
    }
    Ok(())
}

pub(crate) fn test_lock(handle: FileHandle, lock: &FileLock) -> Result<FileLock, FileError> {
    let mut fl = to_flock(lock);
    if unsafe { libc::fcntl(handle.fd, libc::F_GETLK, &mut fl) } < 0 {
        return Err(FileError::from_errno(errno()));
    }

    let mut result = *lock;
    if fl.l_type == libc::F_UNLCK as libc::c_short {
        result.kind = LockKind::Unlock;
    } else {
        result.kind = if fl.l_type == libc::F_RDLCK as libc::c_short {
            LockKind::Shared
        } else {
            LockKind::Exclusive
        };
        result.start = fl.l_start as u64;
        result.length = fl.l_len as u64;
        result.pid = fl.l_pid;
    }
    Ok(result)
}

pub(crate) fn advise(handle: FileHandle, offset: u64, length: u64, advice: FileAdvice) -> Result<(), FileError> {
    // posix_fadvise returns the error number directly instead of errno.
    let rc = unsafe {
        libc::posix_fadvise(
            handle.fd,
            offset as libc::off_t,
            length as libc::off_t,
            to_fadvise_advice(advice),
        )
    };
    if rc != 0 {
        return Err(FileError::from_errno(rc));
    }
    Ok(())
}

pub(crate) fn splice(
    input: FileHandle,
    in_offset: Option<&mut u64>,
    output: FileHandle,
    out_offset: Option<&mut u64>,
    length: usize,
    flags: u32,
) -> Result<usize, FileError> {
    let mut in_off = in_offset.as_ref().map(|o| **o as libc::loff_t);
    let mut out_off = out_offset.as_ref().map(|o| **o as libc::loff_t);

    let in_ptr = in_off.as_mut().map_or(std::ptr::null_mut(), |v| v as *mut libc::loff_t);
    let out_ptr = out_off.as_mut().map_or(std::ptr::null_mut(), |v| v as *mut libc::loff_t);

    let result = unsafe { libc::splice(input.fd, in_ptr, output.fd, out_ptr, length, flags) };
    if result < 0 {
        return Err(FileError::from_errno(errno()));
    }

    if let (Some(slot), Some(updated)) = (in_offset, in_off) {
        *slot = updated as u64;
    }
    if let (Some(slot), Some(updated)) = (out_offset, out_off) {
        *slot = updated as u64;
    }
    Ok(result as usize)
}

pub(crate) fn sendfile(
    output: FileHandle,
    input: FileHandle,
    offset: Option<&mut u64>,
    count: usize,
) -> Result<usize, FileError> {
    let mut off = offset.as_ref().map(|o| **o as libc::off_t);
    let off_ptr = off.as_mut().map_or(std::ptr::null_mut(), |v| v as *mut libc::off_t);

    let result = unsafe { libc::sendfile(output.fd, input.fd, off_ptr, count) };
    if result < 0 {
        return Err(FileError::from_errno(errno()));
    }

    if let (Some(slot), Some(updated)) = (offset, off) {
        *slot = updated as u64;
    }
    Ok(result as usize)
}

pub(crate) fn stat(handle: FileHandle) -> Result<FileInfo, FileError> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(handle.fd, &mut st) } < 0 {
        return Err(FileError::from_errno(errno()));
    }
    Ok(stat_to_info(&st))
}

pub(crate) fn stat_path(path: &Path, follow_symlinks: bool) -> Result<FileInfo, FileError> {
    let c_path = path_to_cstring(path)?;
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let result = if follow_symlinks {
        unsafe { libc::stat(c_path.as_ptr(), &mut st) }
    } else {
        unsafe { libc::lstat(c_path.as_ptr(), &mut st) }
    };
    if result < 0 {
        return Err(FileError::from_errno(errno()));
    }
    Ok(stat_to_info(&st))
}

pub(crate) fn size(handle: FileHandle) -> Result<u64, FileError> {
    stat(handle).map(|info| info.size)
}

pub(crate) fn capabilities() -> FileCaps {
    let max_open_files = {
        let limit = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
        if limit > 0 { limit as u32 } else { 0 }
    };

    FileCaps {
        supports_direct_io: true,
        supports_async_io: true,
        supports_splice: true,
        supports_fallocate: true,
        supports_fadvise: true,
        supports_mmap: true,
        supports_lock: true,
        supports_extended_seek: true,
        max_file_size: i64::MAX as u64,
        max_open_files,
        // Default Linux pipe buffer.
        pipe_buffer_size: 65536,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_flag_translation() {
        assert_eq!(to_open_flags(AccessMode::READ) & libc::O_ACCMODE, libc::O_RDONLY);
        assert_eq!(to_open_flags(AccessMode::WRITE) & libc::O_ACCMODE, libc::O_WRONLY);
        assert_eq!(to_open_flags(AccessMode::READ_WRITE) & libc::O_ACCMODE, libc::O_RDWR);

        let flags = to_open_flags(AccessMode::READ_WRITE | AccessMode::CREATE | AccessMode::EXCLUSIVE);
        assert_ne!(flags & libc::O_CREAT, 0);
        assert_ne!(flags & libc::O_EXCL, 0);
        assert_eq!(flags & libc::O_TRUNC, 0);

        let flags = to_open_flags(AccessMode::WRITE | AccessMode::APPEND | AccessMode::TRUNCATE);
        assert_ne!(flags & libc::O_APPEND, 0);
        assert_ne!(flags & libc::O_TRUNC, 0);

        assert_ne!(to_open_flags(AccessMode::READ | AccessMode::DIRECT) & libc::O_DIRECT, 0);
        assert_ne!(to_open_flags(AccessMode::READ | AccessMode::SYNC) & libc::O_SYNC, 0);
    }

    #[test]
    fn seek_whence_translation() {
        assert_eq!(to_seek_whence(SeekOrigin::Begin), libc::SEEK_SET);
        assert_eq!(to_seek_whence(SeekOrigin::Current), libc::SEEK_CUR);
        assert_eq!(to_seek_whence(SeekOrigin::End), libc::SEEK_END);
        assert_eq!(to_seek_whence(SeekOrigin::Data), libc::SEEK_DATA);
        assert_eq!(to_seek_whence(SeekOrigin::Hole), libc::SEEK_HOLE);
    }

    #[test]
    fn lock_translation() {
        assert_eq!(to_lock_type(LockKind::Shared), libc::F_RDLCK as libc::c_short);
        assert_eq!(to_lock_type(LockKind::Exclusive), libc::F_WRLCK as libc::c_short);
        assert_eq!(to_lock_type(LockKind::Unlock), libc::F_UNLCK as libc::c_short);
        assert_eq!(to_lock_cmd(LockCommand::SetWait), libc::F_SETLKW);
        assert_eq!(to_lock_cmd(LockCommand::Set), libc::F_SETLK);
        assert_eq!(to_lock_cmd(LockCommand::Get), libc::F_GETLK);
    }

    #[test]
    fn fadvise_translation() {
        assert_eq!(to_fadvise_advice(FileAdvice::Normal), libc::POSIX_FADV_NORMAL);
        assert_eq!(to_fadvise_advice(FileAdvice::Sequential), libc::POSIX_FADV_SEQUENTIAL);
        assert_eq!(to_fadvise_advice(FileAdvice::Random), libc::POSIX_FADV_RANDOM);
        assert_eq!(to_fadvise_advice(FileAdvice::WillNeed), libc::POSIX_FADV_WILLNEED);
        assert_eq!(to_fadvise_advice(FileAdvice::DontNeed), libc::POSIX_FADV_DONTNEED);
    }
}
