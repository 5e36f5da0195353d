/*!
 * Tracked Allocations
 * Heap value whose lifetime is mirrored in a MemoryTracker
 */

use super::MemoryTracker;
use crate::core::types::Address;
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Box that records itself on creation and releases itself on drop
///
/// Zero-sized values own no heap memory and are never recorded.
pub struct TrackedBox<T> {
    // Declared first: the release is recorded before the heap block is freed
    release: ReleaseGuard,
    value: Box<T>,
}

/// Records the deallocation when dropped
struct ReleaseGuard {
    tracker: Arc<MemoryTracker>,
    address: Option<Address>,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if let Some(address) = self.address {
            self.tracker.track_deallocation(address);
        }
    }
}

impl<T> TrackedBox<T> {
    /// Tag defaults to the type name
    pub fn new(value: T, tracker: Arc<MemoryTracker>) -> Self {
        Self::tagged(value, tracker, std::any::type_name::<T>())
    }

    pub fn tagged(value: T, tracker: Arc<MemoryTracker>, tag: &str) -> Self {
        let value = Box::new(value);
        let size = mem::size_of::<T>();
        let address = (size > 0).then(|| &*value as *const T as Address);
        if let Some(address) = address {
            tracker.track_allocation(address, size, Some(tag));
        }
        Self {
            release: ReleaseGuard { tracker, address },
            value,
        }
    }

    #[inline]
    pub fn address(&self) -> Address {
        &*self.value as *const T as Address
    }

    /// Release tracking and hand back the value
    pub fn into_inner(self) -> T {
        let Self { value, release } = self;
        drop(release);
        *value
    }
}

impl<T> Deref for TrackedBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for TrackedBox<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for TrackedBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TrackedBox").field(&self.value).finish()
    }
}
