use crate::abi;
use crate::buffer::EnvoyBuffer;
use mockall::automock;

/// A view of a request or response header map owned by Envoy.
///
/// Every method is forwarded to Envoy synchronously and nothing is cached on the module side, so
/// a read right after a write observes the write. The values returned by the getters borrow the
/// map, which means they are invalidated by the next mutation as well as when the event that
/// handed out the map returns.
#[automock]
#[allow(clippy::needless_lifetimes)] // Explicit lifetime specifiers are needed for mockall.
pub trait HeaderMap {
  /// Returns the first value for the given key, or `None` if the key does not exist.
  /// To handle multiple values, use [`HeaderMap::values`].
  fn get<'a>(&'a self, key: &str) -> Option<EnvoyBuffer<'a>>;

  /// Returns all the values for the given key in the order Envoy holds them. The result is
  /// empty if the key does not exist.
  fn values<'a>(&'a self, key: &str) -> Vec<EnvoyBuffer<'a>>;

  /// Sets the value for the given key. If multiple values are set for the same key, this
  /// removes all the previous values and sets the new single value.
  fn set(&mut self, key: &str, value: &[u8]);

  /// Removes all the values for the given key. Removing a key that does not exist is a no-op.
  fn remove(&mut self, key: &str);
}

/// The Envoy callbacks backing one kind of header map.
struct HeaderMapCallbacks {
  get_value: unsafe extern "C" fn(
    usize,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferPtr,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferLength,
    abi::__envoy_dynamic_module_v1_type_DataSlicePtrResult,
    abi::__envoy_dynamic_module_v1_type_DataSliceLengthResult,
  ) -> usize,
  get_value_nth: unsafe extern "C" fn(
    usize,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferPtr,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferLength,
    abi::__envoy_dynamic_module_v1_type_DataSlicePtrResult,
    abi::__envoy_dynamic_module_v1_type_DataSliceLengthResult,
    usize,
  ),
  set: unsafe extern "C" fn(
    usize,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferPtr,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferLength,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferPtr,
    abi::__envoy_dynamic_module_v1_type_InModuleBufferLength,
  ),
}

static REQUEST_HEADERS: HeaderMapCallbacks = HeaderMapCallbacks {
  get_value: abi::__envoy_dynamic_module_v1_http_get_request_header_value,
  get_value_nth: abi::__envoy_dynamic_module_v1_http_get_request_header_value_nth,
  set: abi::__envoy_dynamic_module_v1_http_set_request_header,
};

static RESPONSE_HEADERS: HeaderMapCallbacks = HeaderMapCallbacks {
  get_value: abi::__envoy_dynamic_module_v1_http_get_response_header_value,
  get_value_nth: abi::__envoy_dynamic_module_v1_http_get_response_header_value_nth,
  set: abi::__envoy_dynamic_module_v1_http_set_response_header,
};

/// The [`HeaderMap`] implementation that talks to Envoy. This is what the event hooks hand to
/// [`crate::HttpFilterInstance`].
pub struct EnvoyHeaderMap<'a> {
  raw: usize,
  callbacks: &'static HeaderMapCallbacks,
  _marker: std::marker::PhantomData<&'a mut ()>,
}

impl EnvoyHeaderMap<'_> {
  /// # Safety
  ///
  /// `raw` must be the request header map pointer Envoy passed to the current event.
  pub(crate) unsafe fn request(
    raw: abi::__envoy_dynamic_module_v1_type_HttpRequestHeadersMapPtr,
  ) -> Self {
    Self {
      raw,
      callbacks: &REQUEST_HEADERS,
      _marker: std::marker::PhantomData,
    }
  }

  /// # Safety
  ///
  /// `raw` must be the response header map pointer Envoy passed to the current event.
  pub(crate) unsafe fn response(
    raw: abi::__envoy_dynamic_module_v1_type_HttpResponseHeaderMapPtr,
  ) -> Self {
    Self {
      raw,
      callbacks: &RESPONSE_HEADERS,
      _marker: std::marker::PhantomData,
    }
  }
}

impl HeaderMap for EnvoyHeaderMap<'_> {
  fn get<'a>(&'a self, key: &str) -> Option<EnvoyBuffer<'a>> {
    let mut result_ptr: *mut u8 = std::ptr::null_mut();
    let mut result_size: usize = 0;
    let total = unsafe {
      (self.callbacks.get_value)(
        self.raw,
        key.as_ptr(),
        key.len(),
        &mut result_ptr,
        &mut result_size,
      )
    };
    if total == 0 {
      return None;
    }
    Some(unsafe { EnvoyBuffer::new_from_raw(result_ptr, result_size) })
  }

  fn values<'a>(&'a self, key: &str) -> Vec<EnvoyBuffer<'a>> {
    let mut result_ptr: *mut u8 = std::ptr::null_mut();
    let mut result_size: usize = 0;
    let total = unsafe {
      (self.callbacks.get_value)(
        self.raw,
        key.as_ptr(),
        key.len(),
        &mut result_ptr,
        &mut result_size,
      )
    };
    let mut values = Vec::with_capacity(total);
    if total == 0 {
      return values;
    }
    values.push(unsafe { EnvoyBuffer::new_from_raw(result_ptr, result_size) });

    for nth in 1..total {
      unsafe {
        (self.callbacks.get_value_nth)(
          self.raw,
          key.as_ptr(),
          key.len(),
          &mut result_ptr,
          &mut result_size,
          nth,
        );
        values.push(EnvoyBuffer::new_from_raw(result_ptr, result_size));
      }
    }
    values
  }

  fn set(&mut self, key: &str, value: &[u8]) {
    unsafe {
      (self.callbacks.set)(
        self.raw,
        key.as_ptr(),
        key.len(),
        value.as_ptr(),
        value.len(),
      )
    }
  }

  fn remove(&mut self, key: &str) {
    unsafe { (self.callbacks.set)(self.raw, key.as_ptr(), key.len(), std::ptr::null(), 0) }
  }
}
