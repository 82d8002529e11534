use crate::abi;
use crate::buffer::EnvoyMutBuffer;
use mockall::automock;

/// A view of a request or response body buffer owned by Envoy.
///
/// A buffer consists of multiple slices of data, not a single contiguous buffer. The view itself
/// is zero-copy: [`BodyBuffer::segments`] hands out the slices in place, and only
/// [`BodyBuffer::copy`] and [`BodyBuffer::read_at`] copy bytes into module memory.
///
/// The data handed to [`BodyBuffer::append`], [`BodyBuffer::prepend`] and
/// [`BodyBuffer::replace`] is copied by Envoy; the buffer never takes ownership of module memory.
#[automock]
#[allow(clippy::needless_lifetimes)] // Explicit lifetime specifiers are needed for mockall.
pub trait BodyBuffer {
  /// Returns the total number of bytes in the buffer.
  fn length(&self) -> usize;

  /// Copies bytes starting at `offset` into `dest` across slice boundaries and returns how many
  /// bytes were copied. Returns `None` once `offset` reaches [`BodyBuffer::length`].
  fn read_at(&self, offset: usize, dest: &mut [u8]) -> Option<usize>;

  /// Returns the slices of the buffer. Writes through them modify the body in place. The slices
  /// must not be kept beyond the borrow; use [`BodyBuffer::copy`] to take a copy.
  fn segments<'a>(&'a mut self) -> Vec<EnvoyMutBuffer<'a>>;

  /// Returns a copy of the bytes in the buffer as a single contiguous buffer.
  fn copy(&self) -> Vec<u8>;

  /// Appends the data to the buffer.
  fn append(&mut self, data: &[u8]);

  /// Prepends the data to the buffer.
  fn prepend(&mut self, data: &[u8]);

  /// Removes the given number of bytes from the front of the buffer.
  fn drain(&mut self, length: usize);

  /// Replaces the contents of the buffer with the given data.
  fn replace(&mut self, data: &[u8]);
}

/// The Envoy callbacks backing one kind of body buffer.
struct BodyBufferCallbacks {
  length: unsafe extern "C" fn(usize) -> usize,
  slices_count: unsafe extern "C" fn(usize) -> usize,
  slice: unsafe extern "C" fn(
    usize,
    usize,
    abi::__envoy_dynamic_module_v1_type_DataSlicePtrResult,
    abi::__envoy_dynamic_module_v1_type_DataSliceLengthResult,
  ),
  append: unsafe extern "C" fn(
    usize,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferPtr,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferLength,
  ),
  prepend: unsafe extern "C" fn(
    usize,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferPtr,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferLength,
  ),
  drain: unsafe extern "C" fn(usize, usize),
  replace: unsafe extern "C" fn(
    usize,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferPtr,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferLength,
  ),
}

static REQUEST_BODY: BodyBufferCallbacks = BodyBufferCallbacks {
  length: abi::__envoy_dynamic_module_v1_http_get_request_body_buffer_length,
  slices_count: abi::__envoy_dynamic_module_v1_http_get_request_body_buffer_slices_count,
  slice: abi::__envoy_dynamic_module_v1_http_get_request_body_buffer_slice,
  append: abi::__envoy_dynamic_module_v1_http_append_request_body_buffer,
  prepend: abi::__envoy_dynamic_module_v1_http_prepend_request_body_buffer,
  drain: abi::__envoy_dynamic_module_v1_http_drain_request_body_buffer,
  replace: abi::__envoy_dynamic_module_v1_http_replace_request_body_buffer,
};

static RESPONSE_BODY: BodyBufferCallbacks = BodyBufferCallbacks {
  length: abi::__envoy_dynamic_module_v1_http_get_response_body_buffer_length,
  slices_count: abi::__envoy_dynamic_module_v1_http_get_response_body_buffer_slices_count,
  slice: abi::__envoy_dynamic_module_v1_http_get_response_body_buffer_slice,
  append: abi::__envoy_dynamic_module_v1_http_append_response_body_buffer,
  prepend: abi::__envoy_dynamic_module_v1_http_prepend_response_body_buffer,
  drain: abi::__envoy_dynamic_module_v1_http_drain_response_body_buffer,
  replace: abi::__envoy_dynamic_module_v1_http_replace_response_body_buffer,
};

/// The [`BodyBuffer`] implementation that talks to Envoy.
///
/// Handed to the body events for the newly arrived frame, and returned by
/// [`crate::EnvoyFilter::request_body_buffer`] / [`crate::EnvoyFilter::response_body_buffer`] for
/// the entire buffered body.
pub struct EnvoyBodyBuffer<'a> {
  raw: usize,
  callbacks: &'static BodyBufferCallbacks,
  _marker: std::marker::PhantomData<&'a mut ()>,
}

impl EnvoyBodyBuffer<'_> {
  /// # Safety
  ///
  /// `raw` must be a request body buffer pointer obtained from Envoy that stays valid for the
  /// lifetime of the view.
  pub(crate) unsafe fn request(
    raw: abi::__envoy_dynamic_module_v1_type_HttpRequestBodyBufferPtr,
  ) -> Self {
    Self {
      raw,
      callbacks: &REQUEST_BODY,
      _marker: std::marker::PhantomData,
    }
  }

  /// # Safety
  ///
  /// `raw` must be a response body buffer pointer obtained from Envoy that stays valid for the
  /// lifetime of the view.
  pub(crate) unsafe fn response(
    raw: abi::__envoy_dynamic_module_v1_type_HttpResponseBodyBufferPtr,
  ) -> Self {
    Self {
      raw,
      callbacks: &RESPONSE_BODY,
      _marker: std::marker::PhantomData,
    }
  }

  fn slices_count(&self) -> usize {
    unsafe { (self.callbacks.slices_count)(self.raw) }
  }

  fn slice(&self, nth: usize) -> (*mut u8, usize) {
    let mut ptr: *mut u8 = std::ptr::null_mut();
    let mut length: usize = 0;
    unsafe { (self.callbacks.slice)(self.raw, nth, &mut ptr, &mut length) };
    (ptr, length)
  }

  fn slice_bytes(&self, nth: usize) -> &[u8] {
    let (ptr, length) = self.slice(nth);
    if ptr.is_null() {
      return &[];
    }
    unsafe { std::slice::from_raw_parts(ptr, length) }
  }
}

impl BodyBuffer for EnvoyBodyBuffer<'_> {
  fn length(&self) -> usize {
    unsafe { (self.callbacks.length)(self.raw) }
  }

  fn read_at(&self, offset: usize, dest: &mut [u8]) -> Option<usize> {
    if offset >= self.length() {
      return None;
    }

    let mut copied = 0;
    // Position of the first byte of the current slice within the whole buffer.
    let mut slice_start = 0;
    for nth in 0..self.slices_count() {
      if copied == dest.len() {
        break;
      }
      let slice = self.slice_bytes(nth);
      let slice_end = slice_start + slice.len();
      let read_from = offset + copied;
      if read_from < slice_end {
        let within = &slice[read_from - slice_start..];
        let n = within.len().min(dest.len() - copied);
        dest[copied..copied + n].copy_from_slice(&within[..n]);
        copied += n;
      }
      slice_start = slice_end;
    }
    Some(copied)
  }

  fn segments<'a>(&'a mut self) -> Vec<EnvoyMutBuffer<'a>> {
    (0..self.slices_count())
      .map(|nth| {
        let (ptr, length) = self.slice(nth);
        unsafe { EnvoyMutBuffer::new_from_raw(ptr, length) }
      })
      .collect()
  }

  fn copy(&self) -> Vec<u8> {
    let mut data = Vec::with_capacity(self.length());
    for nth in 0..self.slices_count() {
      data.extend_from_slice(self.slice_bytes(nth));
    }
    data
  }

  fn append(&mut self, data: &[u8]) {
    unsafe { (self.callbacks.append)(self.raw, data.as_ptr(), data.len()) }
  }

  fn prepend(&mut self, data: &[u8]) {
    unsafe { (self.callbacks.prepend)(self.raw, data.as_ptr(), data.len()) }
  }

  fn drain(&mut self, length: usize) {
    unsafe { (self.callbacks.drain)(self.raw, length) }
  }

  fn replace(&mut self, data: &[u8]) {
    unsafe { (self.callbacks.replace)(self.raw, data.as_ptr(), data.len()) }
  }
}
