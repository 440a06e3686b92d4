// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Flattened error values shared by all three resource managers.
//!
//! Every fallible operation returns `Result<T, XxxError>` where the error
//! is a small `Copy` value: a domain, a manager-specific code, and the raw
//! OS error number the code was derived from. Nothing here allocates, so
//! errors can cross FFI-ish boundaries and be matched on without string
//! inspection.
//!
//! The errno-to-code mapping is table-driven per manager (one `match` per
//! manager) and is part of the contract — see the unit tests at the bottom
//! of this file.

use thiserror::Error;

/// Which layer produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDomain {
    /// Derived from an OS error number (errno on POSIX).
    System,
    /// Backend-specific condition with no errno equivalent.
    Platform,
    /// The operation is not implemented by the current platform, OS
    /// version, or filesystem.
    Feature,
}

/// Error codes for the file resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorCode {
    IoError,
    InvalidArgument,
    NoMemory,
    PermissionDenied,
    FileNotFound,
    FileExists,
    IsDirectory,
    NotDirectory,
    TooManyFiles,
    FileTooLarge,
    NoSpace,
    InvalidSeek,
    ReadOnlyFilesystem,
    BrokenPipe,
    WouldBlock,
    Interrupted,
    NotSupported,
    PlatformSpecific,
}

/// Error codes for the memory mapping manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryErrorCode {
    InvalidArgument,
    NoMemory,
    PermissionDenied,
    FileNotFound,
    DeviceBusy,
    IoError,
    NoSuchDevice,
    AddressInUse,
    BadAddress,
    NotSupported,
    LargePagesUnavailable,
    SyncNotSupported,
    LockOnFaultUnavailable,
    FixedAddressUnavailable,
}

/// Error codes for the process resource manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessErrorCode {
    IoError,
    InvalidArgument,
    NoMemory,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    TooManyProcesses,
    WouldBlock,
    Interrupted,
    BrokenPipe,
    ProcessNotFound,
    ProcessTerminated,
    NotSupported,
    PlatformSpecific,
}

/// File manager error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("file error {code:?} ({domain:?}, errno {native_errno})")]
pub struct FileError {
    pub domain: ErrorDomain,
    pub code: FileErrorCode,
    /// Original OS error number, 0 when the error did not come from errno.
    pub native_errno: u8,
}

/// Memory mapping manager error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("memory error {code:?} ({domain:?}, errno {native_errno})")]
pub struct MemoryError {
    pub domain: ErrorDomain,
    pub code: MemoryErrorCode,
    pub native_errno: u8,
}

/// Process manager error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("process error {code:?} ({domain:?}, errno {native_errno})")]
pub struct ProcessError {
    pub domain: ErrorDomain,
    pub code: ProcessErrorCode,
    pub native_errno: u8,
}

impl FileError {
    pub const fn new(domain: ErrorDomain, code: FileErrorCode, native_errno: u8) -> Self {
        Self { domain, code, native_errno }
    }

    /// System-domain error with no errno attached.
    pub const fn code(code: FileErrorCode) -> Self {
        Self::new(ErrorDomain::System, code, 0)
    }

    pub const fn not_supported() -> Self {
        Self::new(ErrorDomain::Feature, FileErrorCode::NotSupported, 0)
    }
}

impl MemoryError {
    pub const fn new(domain: ErrorDomain, code: MemoryErrorCode, native_errno: u8) -> Self {
        Self { domain, code, native_errno }
    }

    pub const fn code(code: MemoryErrorCode) -> Self {
        Self::new(ErrorDomain::System, code, 0)
    }

    pub const fn not_supported() -> Self {
        Self::new(ErrorDomain::Feature, MemoryErrorCode::NotSupported, 0)
    }
}

impl ProcessError {
    pub const fn new(domain: ErrorDomain, code: ProcessErrorCode, native_errno: u8) -> Self {
        Self { domain, code, native_errno }
    }

    pub const fn code(code: ProcessErrorCode) -> Self {
        Self::new(ErrorDomain::System, code, 0)
    }

    pub const fn not_supported() -> Self {
        Self::new(ErrorDomain::Feature, ProcessErrorCode::NotSupported, 0)
    }
}

#[cfg(unix)]
impl FileError {
    /// Map a raw errno into the file error taxonomy. Unmapped values land
    /// in the generic `IoError` bucket.
    pub fn from_errno(errno: i32) -> Self {
        use FileErrorCode::*;
        let code = match errno {
            libc::EINVAL => InvalidArgument,
            libc::ENOMEM => NoMemory,
            libc::EACCES | libc::EPERM => PermissionDenied,
            libc::ENOENT => FileNotFound,
            libc::EEXIST => FileExists,
            libc::EISDIR => IsDirectory,
            libc::ENOTDIR => NotDirectory,
            libc::EMFILE | libc::ENFILE => TooManyFiles,
            libc::EFBIG => FileTooLarge,
            libc::ENOSPC => NoSpace,
            libc::ESPIPE => InvalidSeek,
            libc::EROFS => ReadOnlyFilesystem,
            libc::EPIPE => BrokenPipe,
            libc::EAGAIN => WouldBlock,
            libc::EINTR => Interrupted,
            libc::ENOSYS | libc::EOPNOTSUPP => NotSupported,
            _ => IoError,
        };
        Self::new(ErrorDomain::System, code, errno as u8)
    }
}

#[cfg(unix)]
impl MemoryError {
    /// Map a raw errno into the memory error taxonomy.
    pub fn from_errno(errno: i32) -> Self {
        use MemoryErrorCode::*;
        let code = match errno {
            libc::EINVAL => InvalidArgument,
            libc::ENOMEM => NoMemory,
            libc::EACCES | libc::EPERM => PermissionDenied,
            libc::ENOENT => FileNotFound,
            libc::EBUSY => DeviceBusy,
            libc::ENODEV => NoSuchDevice,
            libc::EADDRINUSE => AddressInUse,
            libc::EFAULT => BadAddress,
            libc::ENOSYS | libc::EOPNOTSUPP => NotSupported,
            _ => IoError,
        };
        Self::new(ErrorDomain::System, code, errno as u8)
    }
}

#[cfg(unix)]
impl ProcessError {
    /// Map a raw errno into the process error taxonomy.
    pub fn from_errno(errno: i32) -> Self {
        use ProcessErrorCode::*;
        let code = match errno {
            libc::EINVAL | libc::E2BIG => InvalidArgument,
            libc::ENOMEM => NoMemory,
            libc::EACCES | libc::EPERM => PermissionDenied,
            libc::ENOENT => NotFound,
            libc::EEXIST => AlreadyExists,
            libc::EMFILE | libc::ENFILE => TooManyProcesses,
            libc::EAGAIN => WouldBlock,
            libc::EINTR => Interrupted,
            libc::EPIPE => BrokenPipe,
            libc::ESRCH | libc::ECHILD => ProcessNotFound,
            libc::ENOSYS => NotSupported,
            _ => IoError,
        };
        Self::new(ErrorDomain::System, code, errno as u8)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn file_errno_buckets() {
        let cases = [
            (libc::EINVAL, FileErrorCode::InvalidArgument),
            (libc::ENOMEM, FileErrorCode::NoMemory),
            (libc::EACCES, FileErrorCode::PermissionDenied),
            (libc::EPERM, FileErrorCode::PermissionDenied),
            (libc::ENOENT, FileErrorCode::FileNotFound),
            (libc::EEXIST, FileErrorCode::FileExists),
            (libc::EISDIR, FileErrorCode::IsDirectory),
            (libc::ENOTDIR, FileErrorCode::NotDirectory),
            (libc::EMFILE, FileErrorCode::TooManyFiles),
            (libc::ENFILE, FileErrorCode::TooManyFiles),
            (libc::EFBIG, FileErrorCode::FileTooLarge),
            (libc::ENOSPC, FileErrorCode::NoSpace),
            (libc::ESPIPE, FileErrorCode::InvalidSeek),
            (libc::EROFS, FileErrorCode::ReadOnlyFilesystem),
            (libc::EPIPE, FileErrorCode::BrokenPipe),
            (libc::EAGAIN, FileErrorCode::WouldBlock),
            (libc::EINTR, FileErrorCode::Interrupted),
            (libc::ENOSYS, FileErrorCode::NotSupported),
        ];
        for (errno, expected) in cases {
            let err = FileError::from_errno(errno);
            assert_eq!(err.code, expected, "errno {errno}");
            assert_eq!(err.domain, ErrorDomain::System);
            assert_eq!(err.native_errno, errno as u8);
        }
    }

    #[test]
    fn file_errno_fallback_is_io_error() {
        assert_eq!(FileError::from_errno(libc::EXDEV).code, FileErrorCode::IoError);
    }

    #[test]
    fn memory_errno_buckets() {
        let cases = [
            (libc::EINVAL, MemoryErrorCode::InvalidArgument),
            (libc::ENOMEM, MemoryErrorCode::NoMemory),
            (libc::EACCES, MemoryErrorCode::PermissionDenied),
            (libc::EPERM, MemoryErrorCode::PermissionDenied),
            (libc::ENOENT, MemoryErrorCode::FileNotFound),
            (libc::EBUSY, MemoryErrorCode::DeviceBusy),
            (libc::ENODEV, MemoryErrorCode::NoSuchDevice),
            (libc::EADDRINUSE, MemoryErrorCode::AddressInUse),
            (libc::EFAULT, MemoryErrorCode::BadAddress),
            (libc::ENOSYS, MemoryErrorCode::NotSupported),
        ];
        for (errno, expected) in cases {
            let err = MemoryError::from_errno(errno);
            assert_eq!(err.code, expected, "errno {errno}");
            assert_eq!(err.domain, ErrorDomain::System);
        }
    }

    #[test]
    fn process_errno_buckets() {
        let cases = [
            (libc::EINVAL, ProcessErrorCode::InvalidArgument),
            (libc::ENOMEM, ProcessErrorCode::NoMemory),
            (libc::EACCES, ProcessErrorCode::PermissionDenied),
            (libc::EPERM, ProcessErrorCode::PermissionDenied),
            (libc::ENOENT, ProcessErrorCode::NotFound),
            (libc::EEXIST, ProcessErrorCode::AlreadyExists),
            (libc::EMFILE, ProcessErrorCode::TooManyProcesses),
            (libc::EAGAIN, ProcessErrorCode::WouldBlock),
            (libc::EINTR, ProcessErrorCode::Interrupted),
            (libc::EPIPE, ProcessErrorCode::BrokenPipe),
            (libc::ESRCH, ProcessErrorCode::ProcessNotFound),
            (libc::ECHILD, ProcessErrorCode::ProcessNotFound),
        ];
        for (errno, expected) in cases {
            let err = ProcessError::from_errno(errno);
            assert_eq!(err.code, expected, "errno {errno}");
            assert_eq!(err.domain, ErrorDomain::System);
        }
    }

    #[test]
    fn errors_are_small_and_copyable() {
        let a = FileError::not_supported();
        let b = a;
        assert_eq!(a, b);
        assert_eq!(a.domain, ErrorDomain::Feature);
    }
}
