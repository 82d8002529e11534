use std::borrow::Cow;
use std::fmt;

/// A read-only view of bytes Envoy owns, such as one value returned by [`crate::HeaderMap::get`].
///
/// Copying the view does not copy the bytes. Use [`EnvoyBuffer::to_vec`] to keep them past the
/// borrow.
//
// `'a` ties the view to the header map it came from: a mutation of that map or the end of the
// event may free the bytes.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EnvoyBuffer<'a> {
  raw_ptr: *const u8,
  length: usize,
  _marker: std::marker::PhantomData<&'a ()>,
}

impl Default for EnvoyBuffer<'_> {
  fn default() -> Self {
    Self {
      raw_ptr: std::ptr::null(),
      length: 0,
      _marker: std::marker::PhantomData,
    }
  }
}

impl EnvoyBuffer<'_> {
  /// Wraps a string literal, e.g. as the value a [`crate::MockHeaderMap`] expectation returns.
  pub fn new(static_str: &'static str) -> Self {
    Self {
      raw_ptr: static_str.as_ptr(),
      length: static_str.len(),
      _marker: std::marker::PhantomData,
    }
  }

  /// Wraps a header value slice written back by Envoy. A null pointer yields an empty view.
  ///
  /// # Safety
  ///
  /// A non-null `raw_ptr` must point to `length` readable bytes that stay unmodified for `'a`.
  pub unsafe fn new_from_raw(raw_ptr: *const u8, length: usize) -> Self {
    Self {
      raw_ptr,
      length,
      _marker: std::marker::PhantomData,
    }
  }

  pub fn as_slice(&self) -> &[u8] {
    if self.raw_ptr.is_null() {
      return &[];
    }
    unsafe { std::slice::from_raw_parts(self.raw_ptr, self.length) }
  }

  pub fn len(&self) -> usize {
    self.as_slice().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Copies the bytes into module-owned memory so they can outlive the event.
  pub fn to_vec(&self) -> Vec<u8> {
    self.as_slice().to_vec()
  }

  /// Interprets the bytes as UTF-8, replacing invalid sequences. This only copies when the bytes
  /// are not valid UTF-8.
  pub fn to_string_lossy(&self) -> Cow<'_, str> {
    String::from_utf8_lossy(self.as_slice())
  }
}

impl fmt::Debug for EnvoyBuffer<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("EnvoyBuffer")
      .field(&self.to_string_lossy())
      .finish()
  }
}

impl PartialEq for EnvoyBuffer<'_> {
  fn eq(&self, other: &Self) -> bool {
    self.as_slice() == other.as_slice()
  }
}

impl PartialEq<[u8]> for EnvoyBuffer<'_> {
  fn eq(&self, other: &[u8]) -> bool {
    self.as_slice() == other
  }
}

impl PartialEq<&[u8]> for EnvoyBuffer<'_> {
  fn eq(&self, other: &&[u8]) -> bool {
    self.as_slice() == *other
  }
}

impl PartialEq<str> for EnvoyBuffer<'_> {
  fn eq(&self, other: &str) -> bool {
    self.as_slice() == other.as_bytes()
  }
}

impl PartialEq<&str> for EnvoyBuffer<'_> {
  fn eq(&self, other: &&str) -> bool {
    self.as_slice() == other.as_bytes()
  }
}

/// One slice of a body buffer, handed out by [`crate::BodyBuffer::segments`]. Writes through
/// [`EnvoyMutBuffer::as_mut_slice`] land directly in Envoy's body.
#[repr(C)]
#[derive(Debug)]
pub struct EnvoyMutBuffer<'a> {
  raw_ptr: *mut u8,
  length: usize,
  _marker: std::marker::PhantomData<&'a mut ()>,
}

impl EnvoyMutBuffer<'_> {
  /// Wraps leaked storage, e.g. as a segment a [`crate::MockBodyBuffer`] expectation returns.
  ///
  /// ```ignore
  /// let storage: &'static mut [u8] = Box::leak(Box::new(*b"hello"));
  /// let mut buffer = envoy_dynamic_modules_v1_sdk::EnvoyMutBuffer::new(storage);
  /// buffer.as_mut_slice()[0] = b'j';
  /// assert_eq!(buffer.as_slice(), b"jello");
  /// ```
  pub fn new(static_buf: &'static mut [u8]) -> Self {
    Self {
      raw_ptr: static_buf.as_mut_ptr(),
      length: static_buf.len(),
      _marker: std::marker::PhantomData,
    }
  }

  /// Wraps a body slice reported by Envoy. A null pointer yields an empty segment.
  ///
  /// # Safety
  ///
  /// A non-null `raw_ptr` must point to `length` writable bytes that no one else accesses for
  /// `'a`.
  pub unsafe fn new_from_raw(raw_ptr: *mut u8, length: usize) -> Self {
    Self {
      raw_ptr,
      length,
      _marker: std::marker::PhantomData,
    }
  }

  pub fn as_slice(&self) -> &[u8] {
    if self.raw_ptr.is_null() {
      return &[];
    }
    unsafe { std::slice::from_raw_parts(self.raw_ptr, self.length) }
  }

  /// The segment bytes, writable in place.
  pub fn as_mut_slice(&mut self) -> &mut [u8] {
    if self.raw_ptr.is_null() {
      return &mut [];
    }
    unsafe { std::slice::from_raw_parts_mut(self.raw_ptr, self.length) }
  }

  pub fn len(&self) -> usize {
    self.as_slice().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl Default for EnvoyMutBuffer<'_> {
  fn default() -> Self {
    Self {
      raw_ptr: std::ptr::null_mut(),
      length: 0,
      _marker: std::marker::PhantomData,
    }
  }
}
