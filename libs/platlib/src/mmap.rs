// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Memory mapping manager.
//!
//! A [`MemoryRequest`] is a Cartesian combination of independent policy
//! axes (sharing, backing, placement, page preference, commit, populate,
//! locking, sync semantics, access pattern). The axes never conflict by
//! construction, which keeps the backend translation a set of independent
//! table lookups rather than nested conditionals.
//!
//! [`map`] returns a [`MemoryRegion`] describing what was actually
//! granted — huge pages silently falling back to normal pages show up in
//! `actual_pages`, not as an error. The only post-mapping step whose
//! failure is fatal is memory locking: a failed lock unwinds the fresh
//! mapping and surfaces the lock error.

use bitflags::bitflags;

use crate::error::{MemoryError, MemoryErrorCode};
use crate::file::File;
use crate::sys;

bitflags! {
    /// Mapping access permissions (`PROT_*`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MemAccess: u8 {
        const READ    = 0x01;
        const WRITE   = 0x02;
        const EXECUTE = 0x04;
        const READ_WRITE = 0x03;
    }
}

/// Whether stores are visible to other mappings of the same file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SharingMode {
    #[default]
    Shared,
    /// Copy-on-write private mapping.
    PrivateCow,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackingType {
    #[default]
    FileBacked,
    Anonymous,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlacementStrategy {
    /// Let the system choose.
    #[default]
    AnyAddress,
    /// Non-binding address hint.
    HintAddress,
    /// `MAP_FIXED`: force the address, replacing existing mappings.
    FixedAddress,
    /// `MAP_FIXED_NOREPLACE`: fixed, but fail instead of clobbering.
    FixedNoReplace,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PagePreference {
    #[default]
    SystemDefault,
    /// Try huge pages, fall back to normal pages.
    PreferLarge,
    /// Huge pages or fail.
    RequireLarge,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommitStrategy {
    /// Commit pages on first access.
    #[default]
    LazyCommit,
    /// Commit all pages immediately.
    PreCommit,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PopulateStrategy {
    #[default]
    None,
    /// Prefault pages at map time.
    Prefault,
    /// Hint that pages will be needed soon.
    HintNeeded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockingStrategy {
    #[default]
    NoLock,
    /// Lock pages resident (`mlock`).
    LockResident,
    /// Lock pages as they fault in (`mlock2(MLOCK_ONFAULT)`).
    LockOnFault,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncSemantics {
    #[default]
    NormalSync,
    /// Durable sync where the filesystem supports it.
    DurableSync,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccessPattern {
    #[default]
    Normal,
    Sequential,
    Random,
}

/// Declarative mapping request. File offsets must be page-aligned.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRequest {
    pub length: usize,
    /// Offset in the backing file; must be a multiple of the page size.
    pub offset: usize,
    /// Placement hint for `HintAddress` / address for the fixed modes.
    pub address_hint: *mut u8,
    /// Alignment requirement (0 = system page size).
    pub alignment: usize,
    /// Specific huge page size in bytes (0 = any).
    pub large_page_size: usize,

    pub access: MemAccess,
    pub sharing: SharingMode,
    pub backing: BackingType,
    pub placement: PlacementStrategy,
    pub page_pref: PagePreference,
    pub commit: CommitStrategy,
    pub populate: PopulateStrategy,
    pub locking: LockingStrategy,
    pub sync: SyncSemantics,
    pub pattern: AccessPattern,

    /// Platform-specific escape hatch, OR-ed in when `enable_native`.
    pub native_flags: u64,
    pub native_protection: u64,
    pub enable_native: bool,
}

impl Default for MemoryRequest {
    fn default() -> Self {
        Self {
            length: 0,
            offset: 0,
            address_hint: std::ptr::null_mut(),
            alignment: 0,
            large_page_size: 0,
            access: MemAccess::READ,
            sharing: SharingMode::Shared,
            backing: BackingType::FileBacked,
            placement: PlacementStrategy::AnyAddress,
            page_pref: PagePreference::SystemDefault,
            commit: CommitStrategy::LazyCommit,
            populate: PopulateStrategy::None,
            locking: LockingStrategy::NoLock,
            sync: SyncSemantics::NormalSync,
            pattern: AccessPattern::Normal,
            native_flags: 0,
            native_protection: 0,
            enable_native: false,
        }
    }
}

/// The granted outcome of a mapping request.
///
/// Invariants: `address` is null iff the region is unmapped; `length` is a
/// multiple of `actual_page_size` and `address` is aligned to it. Once
/// unmapped a region value must not be passed to further operations.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion {
    pub address: *mut u8,
    pub length: usize,
    pub actual_page_size: usize,
    /// Backing descriptor, -1 for anonymous mappings.
    pub file_descriptor: i32,
    pub file_offset: usize,

    pub actual_access: MemAccess,
    pub actual_sharing: SharingMode,
    /// Reports huge-page fallback: what page class was actually granted.
    pub actual_pages: PagePreference,
    pub is_locked: bool,
    /// Whether [`sync`] is meaningful for this region (file-backed only).
    pub supports_sync: bool,
}

impl Default for MemoryRegion {
    fn default() -> Self {
        Self {
            address: std::ptr::null_mut(),
            length: 0,
            actual_page_size: 0,
            file_descriptor: -1,
            file_offset: 0,
            actual_access: MemAccess::READ,
            actual_sharing: SharingMode::Shared,
            actual_pages: PagePreference::SystemDefault,
            is_locked: false,
            supports_sync: false,
        }
    }
}

impl MemoryRegion {
    pub fn is_mapped(&self) -> bool {
        !self.address.is_null()
    }
}

// A mapped region is an address range owned by the process; the raw
// pointer is not thread-affine. Concurrent access still requires external
// synchronization, as with any handle in this layer.
unsafe impl Send for MemoryRegion {}

/// Platform memory-mapping capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryCaps {
    pub system_page_size: usize,
    /// Supported huge page sizes in bytes, ascending.
    pub large_page_sizes: Vec<usize>,
    pub allocation_granularity: usize,
    pub supports_fixed_no_replace: bool,
    pub supports_large_pages: bool,
    pub supports_lock_on_fault: bool,
    pub supports_durable_sync: bool,
    pub supports_prefetch: bool,
    pub supports_memory_lock: bool,
    pub supports_anonymous: bool,
    pub supports_execute: bool,
}

/// Resolve a request into a mapping. `fd` is the backing descriptor, -1
/// for anonymous mappings. On failure no partial region is ever returned.
pub fn map(fd: i32, request: &MemoryRequest) -> Result<MemoryRegion, MemoryError> {
    sys::mmap::map(fd, request)
}

/// Flush a file-backed region to storage (`msync`). Fails with
/// `NoSuchDevice` for regions that are not file-backed.
pub fn sync(region: &MemoryRegion, invalidate_caches: bool) -> Result<(), MemoryError> {
    sys::mmap::sync(region, invalidate_caches)
}

/// Unmap a region. Never fails; a no-op on an already-unmapped region.
/// The region value is reset so reuse is detectable.
pub fn unmap(region: &mut MemoryRegion) {
    sys::mmap::unmap(region);
}

/// Apply an access-pattern hint to the whole region.
pub fn advise(region: &MemoryRegion, pattern: AccessPattern) -> Result<(), MemoryError> {
    sys::mmap::advise(region, pattern)
}

/// Lock the region's pages per `strategy`.
pub fn lock(region: &mut MemoryRegion, strategy: LockingStrategy) -> Result<(), MemoryError> {
    sys::mmap::lock(region, strategy)
}

pub fn unlock(region: &mut MemoryRegion) -> Result<(), MemoryError> {
    sys::mmap::unlock(region)
}

/// Ask the kernel to fault in `[offset, offset + length)` ahead of use.
/// `length == 0` means the rest of the region. Out-of-range requests fail
/// `InvalidArgument`.
pub fn prefetch(region: &MemoryRegion, offset: usize, length: usize) -> Result<(), MemoryError> {
    sys::mmap::prefetch(region, offset, length)
}

/// Pure capability query.
pub fn capabilities() -> MemoryCaps {
    sys::mmap::capabilities()
}

/// Owning mapping wrapper. Move-only; unmaps on drop.
#[derive(Debug)]
pub struct Mapping {
    region: MemoryRegion,
}

// Same reasoning as MemoryRegion.
unsafe impl Send for Mapping {}

impl Mapping {
    pub fn map(fd: i32, request: &MemoryRequest) -> Result<Self, MemoryError> {
        map(fd, request).map(|region| Self { region })
    }

    /// Private anonymous memory with the given access.
    pub fn anonymous(length: usize, access: MemAccess) -> Result<Self, MemoryError> {
        let request = MemoryRequest {
            length,
            backing: BackingType::Anonymous,
            sharing: SharingMode::PrivateCow,
            access,
            ..Default::default()
        };
        Self::map(-1, &request)
    }

    /// Shared file-backed mapping over an open file.
    pub fn of_file(file: &File, length: usize, offset: usize, access: MemAccess) -> Result<Self, MemoryError> {
        if !file.is_open() {
            return Err(MemoryError::code(MemoryErrorCode::InvalidArgument));
        }
        let request = MemoryRequest {
            length,
            offset,
            backing: BackingType::FileBacked,
            sharing: SharingMode::Shared,
            access,
            ..Default::default()
        };
        Self::map(file.handle().fd, &request)
    }

    pub fn from_region(region: MemoryRegion) -> Self {
        Self { region }
    }

    pub fn region(&self) -> &MemoryRegion {
        &self.region
    }

    pub fn len(&self) -> usize {
        self.region.length
    }

    pub fn is_empty(&self) -> bool {
        self.region.length == 0
    }

    pub fn is_mapped(&self) -> bool {
        self.region.is_mapped()
    }

    /// View the mapping as bytes. The region must be mapped with read
    /// access; this is a caller contract, asserted here.
    pub fn as_slice(&self) -> &[u8] {
        assert!(self.region.is_mapped(), "mapping is unmapped");
        assert!(
            self.region.actual_access.contains(MemAccess::READ),
            "mapping is not readable"
        );
        // Mapped and readable for self's lifetime; length matches the
        // kernel-granted range.
        unsafe { std::slice::from_raw_parts(self.region.address, self.region.length) }
    }

    /// Mutable byte view; requires write access.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        assert!(self.region.is_mapped(), "mapping is unmapped");
        assert!(
            self.region.actual_access.contains(MemAccess::WRITE),
            "mapping is not writable"
        );
        unsafe { std::slice::from_raw_parts_mut(self.region.address, self.region.length) }
    }

    pub fn sync(&self, invalidate_caches: bool) -> Result<(), MemoryError> {
        sync(&self.region, invalidate_caches)
    }

    pub fn advise(&self, pattern: AccessPattern) -> Result<(), MemoryError> {
        advise(&self.region, pattern)
    }

    pub fn lock(&mut self, strategy: LockingStrategy) -> Result<(), MemoryError> {
        lock(&mut self.region, strategy)
    }

    pub fn unlock(&mut self) -> Result<(), MemoryError> {
        unlock(&mut self.region)
    }

    pub fn prefetch(&self, offset: usize, length: usize) -> Result<(), MemoryError> {
        prefetch(&self.region, offset, length)
    }

    /// Unmap eagerly. Also happens on drop.
    pub fn unmap(&mut self) {
        unmap(&mut self.region);
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        if self.region.is_mapped() {
            tracing::debug!(
                len = self.region.length,
                fd = self.region.file_descriptor,
                "unmapping region on drop"
            );
            unmap(&mut self.region);
        }
    }
}
