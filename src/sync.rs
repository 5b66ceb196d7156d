//! Lock helper shared by every `std::sync::Mutex` in the crate.

use std::sync::{Mutex, MutexGuard};

/// Locks `mutex`, recovering the guard if a panicking holder poisoned it.
///
/// The guarded values are plain data that stay consistent between statements, and
/// listener panics are already isolated, so poisoning carries no information here.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
