//! Small shared helpers.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shortcut to replace the `RwLock` `write()/read().unwrap()` pattern.
///
/// Originally lifted from tikv_util, kept verbatim because every
/// singleton accessor in this crate (`Database::*`) leans on it.
pub trait HandyRwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T>;
    fn rl(&self) -> RwLockReadGuard<'_, T>;
}

impl<T> HandyRwLock<T> for RwLock<T> {
    fn wl(&self) -> RwLockWriteGuard<'_, T> {
        self.write().unwrap()
    }

    fn rl(&self) -> RwLockReadGuard<'_, T> {
        self.read().unwrap()
    }
}

/// Smallest `n` such that `2^n >= count`, used by bitpacked compression to
/// choose a bit width and by the clock buffer pool to size its frame table.
pub fn bits_needed(count: u64) -> u32 {
    if count <= 1 {
        0
    } else {
        64 - (count - 1).leading_zeros()
    }
}
