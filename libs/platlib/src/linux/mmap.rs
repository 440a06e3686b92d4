// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Linux mmap backend. Each policy axis translates independently into
//! PROT_*/MAP_* bits; the post-mapping steps run in a fixed order
//! (advice, lock, populate) with only the lock step fatal on failure.

use crate::error::{MemoryError, MemoryErrorCode};
use crate::mmap::{
    AccessPattern, BackingType, CommitStrategy, LockingStrategy, MemAccess, MemoryCaps,
    MemoryRegion, MemoryRequest, PagePreference, PlacementStrategy, PopulateStrategy,
    SharingMode,
};

use super::errno;

const DEFAULT_HUGE_PAGE: usize = 2 * 1024 * 1024;
const GIGANTIC_PAGE: usize = 1024 * 1024 * 1024;

pub(crate) fn page_size() -> usize {
    let ps = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if ps > 0 { ps as usize } else { 4096 }
}

/// Access axis → PROT_* bits.
pub(crate) fn to_prot_flags(access: MemAccess) -> i32 {
    let mut prot = libc::PROT_NONE;
    if access.contains(MemAccess::READ) {
        prot |= libc::PROT_READ;
    }
    if access.contains(MemAccess::WRITE) {
        prot |= libc::PROT_WRITE;
    }
    if access.contains(MemAccess::EXECUTE) {
        prot |= libc::PROT_EXEC;
    }
    prot
}

/// Huge-page bits contributed by the page-preference axis; kept separate
/// so the PreferLarge retry can drop exactly these.
pub(crate) fn huge_page_flags(page_pref: PagePreference, large_page_size: usize) -> i32 {
    if !matches!(page_pref, PagePreference::PreferLarge | PagePreference::RequireLarge) {
        return 0;
    }
    let mut flags = libc::MAP_HUGETLB;
    match large_page_size {
        DEFAULT_HUGE_PAGE => flags |= libc::MAP_HUGE_2MB,
        GIGANTIC_PAGE => flags |= libc::MAP_HUGE_1GB,
        _ => {}
    }
    flags
}

/// Remaining axes → MAP_* bits (excluding the huge-page bits).
pub(crate) fn to_map_flags(request: &MemoryRequest) -> i32 {
    let mut flags = match request.sharing {
        SharingMode::Shared => libc::MAP_SHARED,
        SharingMode::PrivateCow => libc::MAP_PRIVATE,
    };

    if request.backing == BackingType::Anonymous {
        flags |= libc::MAP_ANONYMOUS;
    }

    match request.placement {
        PlacementStrategy::FixedAddress => flags |= libc::MAP_FIXED,
        PlacementStrategy::FixedNoReplace => flags |= libc::MAP_FIXED_NOREPLACE,
        PlacementStrategy::AnyAddress | PlacementStrategy::HintAddress => {}
    }

    if request.populate == PopulateStrategy::Prefault || request.commit == CommitStrategy::PreCommit {
        flags |= libc::MAP_POPULATE;
    }

    if request.enable_native {
        flags |= request.native_flags as i32;
    }

    flags
}

fn pattern_advice(pattern: AccessPattern) -> i32 {
    match pattern {
        AccessPattern::Normal => libc::MADV_NORMAL,
        AccessPattern::Sequential => libc::MADV_SEQUENTIAL,
        AccessPattern::Random => libc::MADV_RANDOM,
    }
}

fn apply_madvise(addr: *mut u8, length: usize, advice: i32) -> Result<(), MemoryError> {
    if unsafe { libc::madvise(addr.cast(), length, advice) } == 0 {
        Ok(())
    } else {
        Err(MemoryError::from_errno(errno()))
    }
}

fn apply_mlock(addr: *mut u8, length: usize, strategy: LockingStrategy) -> Result<(), MemoryError> {
    let result = match strategy {
        LockingStrategy::NoLock => return Ok(()),
        LockingStrategy::LockResident => unsafe { libc::mlock(addr.cast(), length) },
        LockingStrategy::LockOnFault => unsafe {
            libc::mlock2(addr.cast(), length, libc::MLOCK_ONFAULT)
        },
    };
    if result == 0 {
        Ok(())
    } else {
        Err(MemoryError::from_errno(errno()))
    }
}

pub(crate) fn map(fd: i32, request: &MemoryRequest) -> Result<MemoryRegion, MemoryError> {
    let system_page = page_size();

    if request.length == 0 {
        return Err(MemoryError::code(MemoryErrorCode::InvalidArgument));
    }
    if request.offset % system_page != 0 {
        return Err(MemoryError::code(MemoryErrorCode::InvalidArgument));
    }
    if request.backing == BackingType::FileBacked && fd < 0 {
        return Err(MemoryError::code(MemoryErrorCode::InvalidArgument));
    }

    let mut prot = to_prot_flags(request.access);
    if request.enable_native {
        prot |= request.native_protection as i32;
    }
    let base_flags = to_map_flags(request);
    let huge_flags = huge_page_flags(request.page_pref, request.large_page_size);

    let hint = if request.placement == PlacementStrategy::AnyAddress {
        std::ptr::null_mut()
    } else {
        request.address_hint.cast::<libc::c_void>()
    };
    let map_fd = if request.backing == BackingType::Anonymous { -1 } else { fd };

    let mut granted_huge = huge_flags != 0;
    let mut addr = unsafe {
        libc::mmap(
            hint,
            request.length,
            prot,
            base_flags | huge_flags,
            map_fd,
            request.offset as libc::off_t,
        )
    };

    // PreferLarge falls back to normal pages; RequireLarge surfaces the
    // failure. The fallback is reported through actual_pages, not an error.
    if addr == libc::MAP_FAILED && granted_huge && request.page_pref == PagePreference::PreferLarge {
        let huge_errno = errno();
        tracing::warn!(
            errno = huge_errno,
            length = request.length,
            "huge-page mapping failed, retrying with system pages"
        );
        granted_huge = false;
        addr = unsafe {
            libc::mmap(hint, request.length, prot, base_flags, map_fd, request.offset as libc::off_t)
        };
    }

    if addr == libc::MAP_FAILED {
        return Err(MemoryError::from_errno(errno()));
    }
    let addr = addr.cast::<u8>();

    let actual_page_size = if granted_huge {
        if request.large_page_size != 0 { request.large_page_size } else { DEFAULT_HUGE_PAGE }
    } else {
        system_page
    };

    // The kernel grants whole pages, so the region records the granted
    // extent: the request rounded up to the next page boundary. Every
    // later per-region call (mlock, msync, munmap) covers that extent.
    let granted_length = request.length.div_ceil(actual_page_size) * actual_page_size;

    let mut region = MemoryRegion {
        address: addr,
        length: granted_length,
        actual_page_size,
        file_descriptor: map_fd,
        file_offset: request.offset,
        actual_access: request.access,
        actual_sharing: request.sharing,
        actual_pages: if granted_huge { request.page_pref } else { PagePreference::SystemDefault },
        is_locked: false,
        supports_sync: request.backing == BackingType::FileBacked,
    };

    // Post-mapping steps, fixed order: advice, lock, populate hint.
    if request.pattern != AccessPattern::Normal {
        if let Err(err) = apply_madvise(addr, granted_length, pattern_advice(request.pattern)) {
            tracing::warn!(%err, "access-pattern advice failed, continuing");
        }
    }

    if request.locking != LockingStrategy::NoLock {
        match apply_mlock(addr, granted_length, request.locking) {
            Ok(()) => region.is_locked = true,
            Err(lock_err) => {
                // Locking is the one post step whose failure is fatal:
                // unwind the fresh mapping and surface the lock error.
                unsafe { libc::munmap(addr.cast(), granted_length) };
                return Err(lock_err);
            }
        }
    }

    if request.populate == PopulateStrategy::HintNeeded && base_flags & libc::MAP_POPULATE == 0 {
        if let Err(err) = apply_madvise(addr, granted_length, libc::MADV_WILLNEED) {
            tracing::warn!(%err, "population hint failed, continuing");
        }
    }

    tracing::debug!(
        addr = ?region.address,
        length = region.length,
        fd = region.file_descriptor,
        page_size = region.actual_page_size,
        locked = region.is_locked,
        "mapped memory region"
    );
    Ok(region)
}

pub(crate) fn sync(region: &MemoryRegion, invalidate_caches: bool) -> Result<(), MemoryError> {
    if !region.supports_sync || region.file_descriptor < 0 {
        return Err(MemoryError::code(MemoryErrorCode::NoSuchDevice));
    }

    let mut flags = libc::MS_SYNC;
    if invalidate_caches {
        flags |= libc::MS_INVALIDATE;
    }

    if unsafe { libc::msync(region.address.cast(), region.length, flags) } == 0 {
        Ok(())
    } else {
        Err(MemoryError::from_errno(errno()))
    }
}

pub(crate) fn unmap(region: &mut MemoryRegion) {
    if !region.address.is_null() && region.length > 0 {
        unsafe { libc::munmap(region.address.cast(), region.length) };
    }
    *region = MemoryRegion::default();
}

pub(crate) fn advise(region: &MemoryRegion, pattern: AccessPattern) -> Result<(), MemoryError> {
    apply_madvise(region.address, region.length, pattern_advice(pattern))
}

pub(crate) fn lock(region: &mut MemoryRegion, strategy: LockingStrategy) -> Result<(), MemoryError> {
    apply_mlock(region.address, region.length, strategy)?;
    if strategy != LockingStrategy::NoLock {
        region.is_locked = true;
    }
    Ok(())
}

pub(crate) fn unlock(region: &mut MemoryRegion) -> Result<(), MemoryError> {
    if unsafe { libc::munlock(region.address.cast(), region.length) } != 0 {
        return Err(MemoryError::from_errno(errno()));
    }
    region.is_locked = false;
    Ok(())
}

pub(crate) fn prefetch(region: &MemoryRegion, offset: usize, length: usize) -> Result<(), MemoryError> {
    let size = if length == 0 { region.length.saturating_sub(offset) } else { length };
    let end = offset
        .checked_add(size)
        .ok_or(MemoryError::code(MemoryErrorCode::InvalidArgument))?;
    if offset >= region.length || end > region.length {
        return Err(MemoryError::code(MemoryErrorCode::InvalidArgument));
    }

    let addr = unsafe { region.address.add(offset) };
    apply_madvise(addr, size, libc::MADV_WILLNEED)
}

/// Huge page sizes advertised by the kernel, ascending. Falls back to the
/// conventional 2 MiB / 1 GiB pair when sysfs is unreadable.
fn large_page_sizes() -> Vec<usize> {
    let mut sizes: Vec<usize> = Vec::new();
    if let Ok(entries) = std::fs::read_dir("/sys/kernel/mm/hugepages") {
        for entry in entries.flatten() {
            // Entries are named "hugepages-<n>kB".
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(kb) = name
                .strip_prefix("hugepages-")
                .and_then(|rest| rest.strip_suffix("kB"))
                .and_then(|num| num.parse::<usize>().ok())
            {
                sizes.push(kb * 1024);
            }
        }
    }
    if sizes.is_empty() {
        sizes = vec![DEFAULT_HUGE_PAGE, GIGANTIC_PAGE];
    }
    sizes.sort_unstable();
    sizes
}

pub(crate) fn capabilities() -> MemoryCaps {
    let system_page_size = page_size();
    MemoryCaps {
        system_page_size,
        large_page_sizes: large_page_sizes(),
        allocation_granularity: system_page_size,
        supports_fixed_no_replace: true,
        supports_large_pages: true,
        supports_lock_on_fault: true,
        // MAP_SYNC exists; actual durability depends on a DAX filesystem.
        supports_durable_sync: true,
        supports_prefetch: true,
        supports_memory_lock: true,
        supports_anonymous: true,
        supports_execute: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prot_translation_is_per_bit() {
        assert_eq!(to_prot_flags(MemAccess::empty()), libc::PROT_NONE);
        assert_eq!(to_prot_flags(MemAccess::READ), libc::PROT_READ);
        assert_eq!(
            to_prot_flags(MemAccess::READ | MemAccess::WRITE),
            libc::PROT_READ | libc::PROT_WRITE
        );
        assert_eq!(
            to_prot_flags(MemAccess::READ | MemAccess::WRITE | MemAccess::EXECUTE),
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC
        );
    }

    #[test]
    fn sharing_axis() {
        let shared = MemoryRequest { sharing: SharingMode::Shared, ..Default::default() };
        assert_ne!(to_map_flags(&shared) & libc::MAP_SHARED, 0);

        let cow = MemoryRequest { sharing: SharingMode::PrivateCow, ..Default::default() };
        assert_ne!(to_map_flags(&cow) & libc::MAP_PRIVATE, 0);
    }

    #[test]
    fn backing_axis() {
        let anon = MemoryRequest { backing: BackingType::Anonymous, ..Default::default() };
        assert_ne!(to_map_flags(&anon) & libc::MAP_ANONYMOUS, 0);

        let file = MemoryRequest { backing: BackingType::FileBacked, ..Default::default() };
        assert_eq!(to_map_flags(&file) & libc::MAP_ANONYMOUS, 0);
    }

    #[test]
    fn placement_axis() {
        let fixed = MemoryRequest { placement: PlacementStrategy::FixedAddress, ..Default::default() };
        assert_ne!(to_map_flags(&fixed) & libc::MAP_FIXED, 0);

        let noreplace =
            MemoryRequest { placement: PlacementStrategy::FixedNoReplace, ..Default::default() };
        assert_ne!(to_map_flags(&noreplace) & libc::MAP_FIXED_NOREPLACE, 0);

        let hint = MemoryRequest { placement: PlacementStrategy::HintAddress, ..Default::default() };
        assert_eq!(to_map_flags(&hint) & (libc::MAP_FIXED | libc::MAP_FIXED_NOREPLACE), 0);
    }

    #[test]
    fn populate_and_commit_axes() {
        let prefault = MemoryRequest { populate: PopulateStrategy::Prefault, ..Default::default() };
        assert_ne!(to_map_flags(&prefault) & libc::MAP_POPULATE, 0);

        let precommit = MemoryRequest { commit: CommitStrategy::PreCommit, ..Default::default() };
        assert_ne!(to_map_flags(&precommit) & libc::MAP_POPULATE, 0);

        let lazy = MemoryRequest::default();
        assert_eq!(to_map_flags(&lazy) & libc::MAP_POPULATE, 0);
    }

    #[test]
    fn huge_page_axis() {
        assert_eq!(huge_page_flags(PagePreference::SystemDefault, 0), 0);
        assert_ne!(huge_page_flags(PagePreference::PreferLarge, 0) & libc::MAP_HUGETLB, 0);
        assert_ne!(
            huge_page_flags(PagePreference::RequireLarge, DEFAULT_HUGE_PAGE) & libc::MAP_HUGE_2MB,
            0
        );
        assert_ne!(
            huge_page_flags(PagePreference::RequireLarge, GIGANTIC_PAGE) & libc::MAP_HUGE_1GB,
            0
        );
    }

    #[test]
    fn native_escape_hatch() {
        let req = MemoryRequest {
            enable_native: true,
            native_flags: libc::MAP_NORESERVE as u64,
            ..Default::default()
        };
        assert_ne!(to_map_flags(&req) & libc::MAP_NORESERVE, 0);

        let disabled = MemoryRequest {
            enable_native: false,
            native_flags: libc::MAP_NORESERVE as u64,
            ..Default::default()
        };
        assert_eq!(to_map_flags(&disabled) & libc::MAP_NORESERVE, 0);
    }

    #[test]
    fn page_size_is_sane() {
        let ps = page_size();
        assert!(ps >= 4096);
        assert!(ps.is_power_of_two());
    }
}
