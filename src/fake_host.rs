//! An in-process stand-in for Envoy's side of the ABI.
//!
//! Every callback the SDK imports is defined here over in-memory header maps, segmented body
//! buffers and streams, so that the unit tests can drive the exported event hooks end to end
//! without Envoy. The raw pointers handed to the SDK are the addresses of these objects.

use crate::*;
use std::os::raw::c_int;
use std::sync::mpsc::Receiver;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// How long [`FakeStream::run`] waits for an asynchronous continue before failing the test.
const CONTINUE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Default)]
pub(crate) struct FakeHeaderMap {
  entries: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeHeaderMap {
  pub(crate) fn new(entries: &[(&str, &str)]) -> Self {
    Self {
      entries: Mutex::new(
        entries
          .iter()
          .map(|(key, value)| (key.to_string(), value.as_bytes().to_vec()))
          .collect(),
      ),
    }
  }

  pub(crate) fn as_raw(&self) -> usize {
    self as *const Self as usize
  }

  /// All the values of `key` in order, as strings.
  pub(crate) fn values(&self, key: &str) -> Vec<String> {
    self
      .entries
      .lock()
      .unwrap()
      .iter()
      .filter(|(k, _)| k == key)
      .map(|(_, v)| String::from_utf8(v.clone()).unwrap())
      .collect()
  }

  /// Appends a value without touching the existing ones, like a header repeated on the wire.
  pub(crate) fn add(&self, key: &str, value: &str) {
    self
      .entries
      .lock()
      .unwrap()
      .push((key.to_string(), value.as_bytes().to_vec()));
  }

  fn nth(&self, key: &[u8], nth: usize) -> (usize, *mut u8, usize) {
    let entries = self.entries.lock().unwrap();
    let mut matching = entries.iter().filter(|(k, _)| k.as_bytes() == key);
    let count = matching.clone().count();
    match matching.nth(nth) {
      Some((_, value)) => (count, value.as_ptr() as *mut u8, value.len()),
      None => (count, std::ptr::null_mut(), 0),
    }
  }

  fn set(&self, key: &[u8], value: Option<&[u8]>) {
    let mut entries = self.entries.lock().unwrap();
    let first = entries.iter().position(|(k, _)| k.as_bytes() == key);
    let key = String::from_utf8(key.to_vec()).unwrap();
    match (first, value) {
      (_, None) => entries.retain(|(k, _)| *k != key),
      (Some(first), Some(value)) => {
        entries[first].1 = value.to_vec();
        let mut index = 0;
        entries.retain(|(k, _)| {
          let keep = *k != key || index == first;
          index += 1;
          keep
        });
      },
      (None, Some(value)) => entries.push((key, value.to_vec())),
    }
  }
}

#[derive(Default)]
pub(crate) struct FakeBody {
  slices: Mutex<Vec<Vec<u8>>>,
}

impl FakeBody {
  pub(crate) fn new(slices: &[&[u8]]) -> Self {
    Self {
      slices: Mutex::new(slices.iter().map(|slice| slice.to_vec()).collect()),
    }
  }

  pub(crate) fn as_raw(&self) -> usize {
    self as *const Self as usize
  }

  pub(crate) fn contents(&self) -> Vec<u8> {
    self.slices.lock().unwrap().concat()
  }

  pub(crate) fn slice_count(&self) -> usize {
    self.slices.lock().unwrap().len()
  }

  fn take(&self) -> Vec<u8> {
    std::mem::take(&mut *self.slices.lock().unwrap()).concat()
  }

  fn length(&self) -> usize {
    self.slices.lock().unwrap().iter().map(Vec::len).sum()
  }

  fn slice(&self, nth: usize) -> (*mut u8, usize) {
    let mut slices = self.slices.lock().unwrap();
    match slices.get_mut(nth) {
      Some(slice) => (slice.as_mut_ptr(), slice.len()),
      None => (std::ptr::null_mut(), 0),
    }
  }

  pub(crate) fn append(&self, data: &[u8]) {
    if !data.is_empty() {
      self.slices.lock().unwrap().push(data.to_vec());
    }
  }

  fn prepend(&self, data: &[u8]) {
    if !data.is_empty() {
      self.slices.lock().unwrap().insert(0, data.to_vec());
    }
  }

  fn drain(&self, mut length: usize) {
    let mut slices = self.slices.lock().unwrap();
    while length > 0 && !slices.is_empty() {
      if slices[0].len() <= length {
        length -= slices.remove(0).len();
      } else {
        slices[0].drain(..length);
        length = 0;
      }
    }
  }

  fn replace(&self, data: &[u8]) {
    let mut slices = self.slices.lock().unwrap();
    slices.clear();
    if !data.is_empty() {
      slices.push(data.to_vec());
    }
  }
}

/// The Envoy side of a single HTTP stream.
///
/// [`FakeStream::run`] plays the role of the connection manager: it delivers the events in order,
/// honors the stop statuses by waiting for the corresponding continue call, and records what
/// happened in [`FakeStream::events`].
#[derive(Default)]
pub(crate) struct FakeStream {
  pub(crate) request_headers: FakeHeaderMap,
  pub(crate) response_headers: FakeHeaderMap,
  /// The request body buffered by the filter so far.
  pub(crate) request_body: FakeBody,
  pub(crate) response_body: FakeBody,
  /// The request body released to the next filter.
  pub(crate) forwarded_request_body: Mutex<Vec<u8>>,
  pub(crate) forwarded_response_body: Mutex<Vec<u8>>,
  /// When set, the next continue_request delivers the final request body event to this stream
  /// handle before returning, like a host resuming synchronously on the calling thread.
  pub(crate) dispatch_on_continue: Mutex<Option<usize>>,
  /// When set, the next continue_request blocks until a value is sent or the sender is dropped.
  pub(crate) continue_gate: Mutex<Option<Receiver<()>>>,
  events: Mutex<Vec<&'static str>>,
  continued: Condvar,
}

impl FakeStream {
  pub(crate) fn new(request_headers: &[(&str, &str)], response_headers: &[(&str, &str)]) -> Self {
    Self {
      request_headers: FakeHeaderMap::new(request_headers),
      response_headers: FakeHeaderMap::new(response_headers),
      ..Default::default()
    }
  }

  pub(crate) fn as_raw(&self) -> usize {
    self as *const Self as usize
  }

  pub(crate) fn events(&self) -> Vec<&'static str> {
    self.events.lock().unwrap().clone()
  }

  pub(crate) fn record(&self, event: &'static str) {
    self.events.lock().unwrap().push(event);
    self.continued.notify_all();
  }

  /// Blocks until `event` is recorded at or after the index `from`.
  pub(crate) fn wait_for(&self, event: &str, from: usize) {
    let events = self.events.lock().unwrap();
    let (events, timeout) = self
      .continued
      .wait_timeout_while(events, CONTINUE_TIMEOUT, |events| {
        !events.iter().skip(from).any(|recorded| *recorded == event)
      })
      .unwrap();
    assert!(
      !timeout.timed_out(),
      "timed out waiting for {}: {:?}",
      event,
      *events
    );
  }

  /// Runs the whole stream through the filter and destroys it. Each body is given as the frames
  /// in which it arrives.
  pub(crate) fn run(
    &self,
    http_filter_ptr: usize,
    request_body: &[&[u8]],
    response_body: &[&[u8]],
  ) {
    let instance = unsafe {
      __envoy_dynamic_module_v1_event_http_filter_instance_init(self.as_raw(), http_filter_ptr)
    };
    assert_ne!(instance, 0, "the filter declined the stream");

    let mark = self.events.lock().unwrap().len();
    self.record("request_headers");
    let status = unsafe {
      __envoy_dynamic_module_v1_event_http_filter_instance_request_headers(
        instance,
        self.request_headers.as_raw(),
        request_body.is_empty() as c_int,
      )
    };
    if status
      == abi::__envoy_dynamic_module_v1_type_EventHttpRequestHeadersStatusStopAllIterationAndBuffer
    {
      self.wait_for("continue_request", mark);
    }
    for (i, &frame) in request_body.iter().enumerate() {
      let end_of_stream = i + 1 == request_body.len();
      let frame_buffer = FakeBody::new(&[frame]);
      self.request_body.append(frame);
      let mark = self.events.lock().unwrap().len();
      self.record("request_body");
      let status = unsafe {
        __envoy_dynamic_module_v1_event_http_filter_instance_request_body(
          instance,
          frame_buffer.as_raw(),
          end_of_stream as c_int,
        )
      };
      if status == abi::__envoy_dynamic_module_v1_type_EventHttpRequestBodyStatusContinue {
        self.forward_request_body();
      } else if end_of_stream {
        self.wait_for("continue_request", mark);
        self.forward_request_body();
      }
    }

    let mark = self.events.lock().unwrap().len();
    self.record("response_headers");
    let status = unsafe {
      __envoy_dynamic_module_v1_event_http_filter_instance_response_headers(
        instance,
        self.response_headers.as_raw(),
        response_body.is_empty() as c_int,
      )
    };
    if status
      == abi::__envoy_dynamic_module_v1_type_EventHttpResponseHeadersStatusStopAllIterationAndBuffer
    {
      self.wait_for("continue_response", mark);
    }
    for (i, &frame) in response_body.iter().enumerate() {
      let end_of_stream = i + 1 == response_body.len();
      let frame_buffer = FakeBody::new(&[frame]);
      self.response_body.append(frame);
      let mark = self.events.lock().unwrap().len();
      self.record("response_body");
      let status = unsafe {
        __envoy_dynamic_module_v1_event_http_filter_instance_response_body(
          instance,
          frame_buffer.as_raw(),
          end_of_stream as c_int,
        )
      };
      if status == abi::__envoy_dynamic_module_v1_type_EventHttpResponseBodyStatusContinue {
        self.forward_response_body();
      } else if end_of_stream {
        self.wait_for("continue_response", mark);
        self.forward_response_body();
      }
    }

    unsafe { __envoy_dynamic_module_v1_event_http_filter_instance_destroy(instance) };
    self.record("destroy");
  }

  fn forward_request_body(&self) {
    let data = self.request_body.take();
    self.forwarded_request_body.lock().unwrap().extend(data);
  }

  fn forward_response_body(&self) {
    let data = self.response_body.take();
    self.forwarded_response_body.lock().unwrap().extend(data);
  }
}

unsafe fn header_map<'a>(raw: usize) -> &'a FakeHeaderMap {
  &*(raw as *const FakeHeaderMap)
}

unsafe fn body<'a>(raw: usize) -> &'a FakeBody {
  &*(raw as *const FakeBody)
}

unsafe fn fake_stream<'a>(raw: usize) -> &'a FakeStream {
  &*(raw as *const FakeStream)
}

unsafe fn bytes<'a>(ptr: *const u8, length: usize) -> &'a [u8] {
  if ptr.is_null() {
    return &[];
  }
  std::slice::from_raw_parts(ptr, length)
}

unsafe fn get_header_value(
  headers: usize,
  key: *const u8,
  key_length: usize,
  result_buffer_ptr: *mut *mut u8,
  result_buffer_length: *mut usize,
  nth: usize,
) -> usize {
  let (count, ptr, length) = header_map(headers).nth(bytes(key, key_length), nth);
  *result_buffer_ptr = ptr;
  *result_buffer_length = length;
  count
}

unsafe fn set_header(
  headers: usize,
  key: *const u8,
  key_length: usize,
  value: *const u8,
  value_length: usize,
) {
  let value = if value.is_null() {
    None
  } else {
    Some(bytes(value, value_length))
  };
  header_map(headers).set(bytes(key, key_length), value);
}

unsafe fn slice(buffer: usize, nth: usize, result_ptr: *mut *mut u8, result_length: *mut usize) {
  let (ptr, length) = body(buffer).slice(nth);
  *result_ptr = ptr;
  *result_length = length;
}

#[no_mangle]
extern "C" fn __envoy_dynamic_module_v1_http_continue_request(envoy_filter_instance_ptr: usize) {
  let stream = unsafe { fake_stream(envoy_filter_instance_ptr) };
  stream.record("continue_request");
  let gate = stream.continue_gate.lock().unwrap().take();
  if let Some(gate) = gate {
    let _ = gate.recv();
  }
  let instance = stream.dispatch_on_continue.lock().unwrap().take();
  if let Some(instance) = instance {
    stream.record("request_body");
    unsafe {
      __envoy_dynamic_module_v1_event_http_filter_instance_request_body(
        instance,
        stream.request_body.as_raw(),
        1,
      );
    }
  }
}

#[no_mangle]
extern "C" fn __envoy_dynamic_module_v1_http_continue_response(envoy_filter_instance_ptr: usize) {
  unsafe { fake_stream(envoy_filter_instance_ptr) }.record("continue_response");
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_get_request_header_value(
  headers: usize,
  key: *const u8,
  key_length: usize,
  result_buffer_ptr: *mut *mut u8,
  result_buffer_length: *mut usize,
) -> usize {
  get_header_value(headers, key, key_length, result_buffer_ptr, result_buffer_length, 0)
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_get_request_header_value_nth(
  headers: usize,
  key: *const u8,
  key_length: usize,
  result_buffer_ptr: *mut *mut u8,
  result_buffer_length: *mut usize,
  nth: usize,
) {
  get_header_value(headers, key, key_length, result_buffer_ptr, result_buffer_length, nth);
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_set_request_header(
  headers: usize,
  key: *const u8,
  key_length: usize,
  value: *const u8,
  value_length: usize,
) {
  set_header(headers, key, key_length, value, value_length);
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_get_response_header_value(
  headers: usize,
  key: *const u8,
  key_length: usize,
  result_buffer_ptr: *mut *mut u8,
  result_buffer_length: *mut usize,
) -> usize {
  get_header_value(headers, key, key_length, result_buffer_ptr, result_buffer_length, 0)
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_get_response_header_value_nth(
  headers: usize,
  key: *const u8,
  key_length: usize,
  result_buffer_ptr: *mut *mut u8,
  result_buffer_length: *mut usize,
  nth: usize,
) {
  get_header_value(headers, key, key_length, result_buffer_ptr, result_buffer_length, nth);
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_set_response_header(
  headers: usize,
  key: *const u8,
  key_length: usize,
  value: *const u8,
  value_length: usize,
) {
  set_header(headers, key, key_length, value, value_length);
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_get_request_body_buffer(
  envoy_filter_instance_ptr: usize,
) -> usize {
  fake_stream(envoy_filter_instance_ptr).request_body.as_raw()
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_get_request_body_buffer_length(
  buffer: usize,
) -> usize {
  body(buffer).length()
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_get_request_body_buffer_slices_count(
  buffer: usize,
) -> usize {
  body(buffer).slice_count()
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_get_request_body_buffer_slice(
  buffer: usize,
  nth: usize,
  result_buffer_ptr: *mut *mut u8,
  result_buffer_length: *mut usize,
) {
  slice(buffer, nth, result_buffer_ptr, result_buffer_length);
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_append_request_body_buffer(
  buffer: usize,
  data: *const u8,
  data_length: usize,
) {
  body(buffer).append(bytes(data, data_length));
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_prepend_request_body_buffer(
  buffer: usize,
  data: *const u8,
  data_length: usize,
) {
  body(buffer).prepend(bytes(data, data_length));
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_drain_request_body_buffer(
  buffer: usize,
  length: usize,
) {
  body(buffer).drain(length);
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_replace_request_body_buffer(
  buffer: usize,
  data: *const u8,
  data_length: usize,
) {
  body(buffer).replace(bytes(data, data_length));
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_get_response_body_buffer(
  envoy_filter_instance_ptr: usize,
) -> usize {
  fake_stream(envoy_filter_instance_ptr).response_body.as_raw()
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_get_response_body_buffer_length(
  buffer: usize,
) -> usize {
  body(buffer).length()
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_get_response_body_buffer_slices_count(
  buffer: usize,
) -> usize {
  body(buffer).slice_count()
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_get_response_body_buffer_slice(
  buffer: usize,
  nth: usize,
  result_buffer_ptr: *mut *mut u8,
  result_buffer_length: *mut usize,
) {
  slice(buffer, nth, result_buffer_ptr, result_buffer_length);
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_append_response_body_buffer(
  buffer: usize,
  data: *const u8,
  data_length: usize,
) {
  body(buffer).append(bytes(data, data_length));
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_prepend_response_body_buffer(
  buffer: usize,
  data: *const u8,
  data_length: usize,
) {
  body(buffer).prepend(bytes(data, data_length));
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_drain_response_body_buffer(
  buffer: usize,
  length: usize,
) {
  body(buffer).drain(length);
}

#[no_mangle]
unsafe extern "C" fn __envoy_dynamic_module_v1_http_replace_response_body_buffer(
  buffer: usize,
  data: *const u8,
  data_length: usize,
) {
  body(buffer).replace(bytes(data, data_length));
}
