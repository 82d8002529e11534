//! Bookkeeping for objects whose addresses are handed to Envoy.
//!
//! Every object Envoy refers to (filters and per-stream contexts) is moved to the heap and
//! recorded here under an integer handle. Envoy stores the handle and passes it back on every
//! event; the object stays alive until the matching destroy event unregisters it.

use dashmap::DashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An opaque, integer-sized token identifying an entry of a [`HandleRegistry`].
///
/// Handles are never reused within a registry, so a stale handle can be detected instead of
/// aliasing a newer entry. Zero is never a valid handle and is what the ABI treats as null.
pub struct Handle<T> {
  raw: usize,
  _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
  /// Rebuilds a handle from the integer Envoy passed back.
  pub fn from_raw(raw: usize) -> Self {
    Self {
      raw,
      _marker: PhantomData,
    }
  }

  /// The integer to hand over to Envoy.
  pub fn into_raw(self) -> usize {
    self.raw
  }
}

impl<T> Clone for Handle<T> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
  fn eq(&self, other: &Self) -> bool {
    self.raw == other.raw
  }
}

impl<T> Eq for Handle<T> {}

impl<T> fmt::Debug for Handle<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Handle({})", self.raw)
  }
}

/// A registry of heap-allocated objects addressed by [`Handle`]s.
///
/// Registration and removal may happen concurrently from any number of threads. The entries are
/// kept in a sharded map so that concurrent stream creation on different worker threads rarely
/// contends on the same lock, and no lock is held while the object itself is used.
///
/// Resolving an unknown handle or unregistering twice is a violation of the host contract and
/// panics. The event hooks are `extern "C"`, so that panic aborts the process instead of
/// unwinding into Envoy.
pub struct HandleRegistry<T> {
  /// Maps a live handle to the address of its boxed object.
  entries: DashMap<usize, usize>,
  next_id: AtomicUsize,
  _marker: PhantomData<fn() -> T>,
}

impl<T> Default for HandleRegistry<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> HandleRegistry<T> {
  pub fn new() -> Self {
    Self {
      entries: DashMap::new(),
      next_id: AtomicUsize::new(1),
      _marker: PhantomData,
    }
  }

  /// Takes ownership of `value` and returns the handle under which it is reachable until
  /// [`HandleRegistry::unregister`] is called.
  pub fn register(&self, value: T) -> Handle<T> {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let address = Box::into_raw(Box::new(value)) as usize;
    self.entries.insert(id, address);
    Handle::from_raw(id)
  }

  /// Resolves a live handle to a shared reference.
  ///
  /// # Safety
  ///
  /// The returned reference must not outlive the entry, i.e. the caller must guarantee that
  /// [`HandleRegistry::unregister`] is not called for this handle while the reference is in use.
  pub unsafe fn get<'a>(&self, handle: Handle<T>) -> &'a T
  where
    T: Sync,
  {
    &*(self.address_of(handle) as *const T)
  }

  /// Resolves a live handle to an exclusive reference.
  ///
  /// # Safety
  ///
  /// Same as [`HandleRegistry::get`], and in addition no other reference to the same entry may
  /// exist at the same time. Envoy guarantees this for per-stream objects by delivering all the
  /// events of a stream on a single worker thread, one at a time.
  pub unsafe fn get_mut<'a>(&self, handle: Handle<T>) -> &'a mut T {
    &mut *(self.address_of(handle) as *mut T)
  }

  /// Removes the entry and gives the ownership of the object back to the caller.
  pub fn unregister(&self, handle: Handle<T>) -> T {
    let Some((_, address)) = self.entries.remove(&handle.raw) else {
      panic!(
        "{:?} is not registered: it was never issued or has already been unregistered",
        handle
      );
    };
    // SAFETY: the address came from Box::into_raw in register and the entry is removed exactly
    // once, so this is the only owner.
    *unsafe { Box::from_raw(address as *mut T) }
  }

  /// Returns true if the handle is currently registered.
  pub fn contains(&self, handle: Handle<T>) -> bool {
    self.entries.contains_key(&handle.raw)
  }

  /// Returns the number of live entries.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  fn address_of(&self, handle: Handle<T>) -> usize {
    match self.entries.get(&handle.raw) {
      Some(entry) => *entry.value(),
      None => panic!(
        "{:?} is not registered: it was never issued or has already been unregistered",
        handle
      ),
    }
  }
}

impl<T> Drop for HandleRegistry<T> {
  fn drop(&mut self) {
    for (_, address) in std::mem::take(&mut self.entries) {
      // SAFETY: every remaining entry still owns its box.
      drop(unsafe { Box::from_raw(address as *mut T) });
    }
  }
}
