//! Secure memory for key material and password-derived intermediates.
//!
//! This module is the secure buffer provider of the engine:
//! - [`SecretBuffer::zeroed`] / [`SecretBuffer::new`] allocate
//! - [`SecretBuffer::resize`] reallocates without leaving stale copies
//! - dropping a [`SecretBuffer`] zeroes and frees it
//! - [`is_secure`] tells whether a pointer belongs to a live secure buffer
//!
//! Pages are `mlock`ed where the platform allows it, and `Debug`/`Display`
//! output is masked.

use crate::error::CryptoError;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, ExposeSecretMut, SecretSlice};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use zeroize::Zeroize;

// ---------------------------------------------------------------------------
// Live region table
// ---------------------------------------------------------------------------

/// Start address -> length of every live secure allocation.
static REGIONS: Mutex<BTreeMap<usize, usize>> = Mutex::new(BTreeMap::new());

fn register_region(start: usize, len: usize) {
    if len == 0 {
        return;
    }
    REGIONS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(start, len);
}

fn unregister_region(start: usize, len: usize) {
    if len == 0 {
        return;
    }
    REGIONS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&start);
}

#[cfg(test)]
thread_local! {
    static ALLOCATIONS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Secure buffers allocated by the calling thread so far.
#[cfg(test)]
pub(crate) fn allocations_on_this_thread() -> usize {
    ALLOCATIONS.with(std::cell::Cell::get)
}

/// Returns `true` if `ptr` points into a live [`SecretBuffer`].
///
/// Used at boundaries that receive raw pointers and must decide whether
/// the memory behind them is zeroed on release.
#[must_use]
pub fn is_secure(ptr: *const u8) -> bool {
    let addr = ptr as usize;
    let regions = REGIONS.lock().unwrap_or_else(PoisonError::into_inner);
    regions
        .range(..=addr)
        .next_back()
        .is_some_and(|(&start, &len)| addr.wrapping_sub(start) < len)
}

// ---------------------------------------------------------------------------
// Platform-specific memory locking
// ---------------------------------------------------------------------------

/// RAII guard over a secure allocation.
///
/// When created, records the region in the live table and locks it via
/// `mlock` to keep it out of swap. On drop, unlocks and forgets it.
pub struct LockedRegion {
    ptr: *const u8,
    len: usize,
    locked: bool,
}

// SAFETY: The pointer is only used for mlock/munlock system calls and as a
// table key. The pointed-to data is owned by SecretBuffer and is not
// accessed through LockedRegion.
unsafe impl Send for LockedRegion {}
unsafe impl Sync for LockedRegion {}

impl LockedRegion {
    /// Attempt to lock a memory region. Returns a guard that unlocks on drop.
    ///
    /// If `mlock` fails (insufficient privileges or quota), the region is
    /// **not** locked but no error is returned. Zero-on-free still holds.
    #[must_use]
    pub(crate) fn try_lock(ptr: *const u8, len: usize) -> Self {
        let locked = platform::try_mlock(ptr, len);
        if !locked && len > 0 {
            static WARNED: std::sync::Once = std::sync::Once::new();
            WARNED.call_once(|| {
                tracing::warn!(
                    "mlock failed, secret data may be swapped to disk; \
                     consider increasing RLIMIT_MEMLOCK"
                );
            });
        }
        register_region(ptr as usize, len);
        Self { ptr, len, locked }
    }

    /// Returns `true` if the memory region is currently locked.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }
}

impl Drop for LockedRegion {
    fn drop(&mut self) {
        unregister_region(self.ptr as usize, self.len);
        if self.locked {
            platform::try_munlock(self.ptr, self.len);
        }
    }
}

// ---------------------------------------------------------------------------
// SecretBuffer
// ---------------------------------------------------------------------------

/// Variable-length buffer for sensitive data.
///
/// Wraps [`SecretSlice<u8>`] from the `secrecy` crate and adds:
/// - `mlock` on allocation (soft fallback if unavailable)
/// - registration in the live table consulted by [`is_secure`]
/// - Masked `Debug` output (`SecretBuffer(***)`)
/// - Zeroization on drop
pub struct SecretBuffer {
    // Field order matters: the region is forgotten before the heap block
    // is released so a recycled address is never shadowed in the table.
    lock: LockedRegion,
    inner: SecretSlice<u8>,
}

impl SecretBuffer {
    /// Allocate `len` zero bytes of secure memory.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if memory allocation fails.
    pub fn zeroed(len: usize) -> Result<Self, CryptoError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|e| CryptoError::SecureMemory(format!("cannot allocate {len} bytes: {e}")))?;
        bytes.resize(len, 0u8);
        #[cfg(test)]
        ALLOCATIONS.with(|n| n.set(n.get().wrapping_add(1)));
        let inner: SecretSlice<u8> = bytes.into();
        let exposed = inner.expose_secret();
        let lock = LockedRegion::try_lock(exposed.as_ptr(), exposed.len());
        Ok(Self { lock, inner })
    }

    /// Create a new `SecretBuffer` holding a copy of `data`.
    ///
    /// The caller should zeroize the source data after calling this.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if memory allocation fails.
    pub fn new(data: &[u8]) -> Result<Self, CryptoError> {
        let mut buf = Self::zeroed(data.len())?;
        buf.expose_mut().copy_from_slice(data);
        Ok(buf)
    }

    /// Create a `SecretBuffer` filled with cryptographically random bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the CSPRNG fails.
    pub fn random(len: usize) -> Result<Self, CryptoError> {
        let mut buf = Self::zeroed(len)?;
        OsRng
            .try_fill_bytes(buf.expose_mut())
            .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
        Ok(buf)
    }

    /// Grow or shrink the buffer to `len` bytes.
    ///
    /// The first `min(old, len)` bytes are preserved, new bytes are zero.
    /// The previous allocation is zeroized before it is released.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SecureMemory` if the new allocation fails.
    pub fn resize(&mut self, len: usize) -> Result<(), CryptoError> {
        let mut grown = Self::zeroed(len)?;
        let keep = core::cmp::min(len, self.len());
        grown.expose_mut()[..keep].copy_from_slice(&self.expose()[..keep]);
        *self = grown;
        Ok(())
    }

    /// Expose the underlying bytes. Use sparingly, only when the raw
    /// bytes are needed for a cryptographic operation.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.inner.expose_secret()
    }

    /// Mutable access for filling the buffer in place.
    #[must_use]
    pub fn expose_mut(&mut self) -> &mut [u8] {
        self.inner.expose_secret_mut()
    }

    /// Returns the number of bytes in the buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.expose_secret().len()
    }

    /// Returns `true` if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the underlying memory is `mlock`'d.
    #[must_use]
    pub const fn is_mlocked(&self) -> bool {
        self.lock.is_locked()
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        // Wipe while the pages are still locked; secrecy wipes again on free.
        self.inner.expose_secret_mut().zeroize();
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

impl fmt::Display for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretBuffer(***)")
    }
}

// ---------------------------------------------------------------------------
// Core dump disabling
// ---------------------------------------------------------------------------

/// Disable core dumps for the current process.
///
/// On Unix: sets `RLIMIT_CORE` to 0 (both soft and hard limits).
/// On non-Unix: no-op (returns `Ok`).
///
/// # Errors
///
/// Returns `CryptoError::SecureMemory` if the `setrlimit` call fails.
pub fn disable_core_dumps() -> Result<(), CryptoError> {
    platform::disable_core_dumps_impl()
}

// ---------------------------------------------------------------------------
// Platform-specific implementations
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod platform {
    use crate::error::CryptoError;

    pub(super) fn try_mlock(ptr: *const u8, len: usize) -> bool {
        if len == 0 {
            return true;
        }
        // SAFETY: mlock is safe to call with any valid pointer/length pair.
        // If the pointer is invalid, the kernel returns ENOMEM which we handle.
        unsafe { libc::mlock(ptr.cast(), len) == 0 }
    }

    pub(super) fn try_munlock(ptr: *const u8, len: usize) {
        if len == 0 {
            return;
        }
        // SAFETY: munlock is safe to call. Failure is non-critical.
        unsafe {
            libc::munlock(ptr.cast(), len);
        }
    }

    pub(super) fn disable_core_dumps_impl() -> Result<(), CryptoError> {
        let limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: setrlimit with RLIMIT_CORE is a standard POSIX call.
        let ret = unsafe { libc::setrlimit(libc::RLIMIT_CORE, &raw const limit) };
        if ret != 0 {
            return Err(CryptoError::SecureMemory(
                "failed to disable core dumps via RLIMIT_CORE".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(not(unix))]
mod platform {
    use crate::error::CryptoError;

    pub(super) fn try_mlock(_ptr: *const u8, _len: usize) -> bool {
        false
    }

    pub(super) fn try_munlock(_ptr: *const u8, _len: usize) {}

    pub(super) fn disable_core_dumps_impl() -> Result<(), CryptoError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
