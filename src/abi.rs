//! Declarations of the Envoy dynamic module ABI, version 1.
//!
//! The names and shapes mirror the C header Envoy is built against. Pointers that Envoy treats
//! as opaque are carried as `usize` so they can round-trip through the module unmodified.
//!
//! This is not meant to be used directly by filter code.

#![allow(non_camel_case_types)]
#![allow(non_upper_case_globals)]

use std::os::raw::c_int;

/// Pointer to the module configuration passed to the module init event. Envoy owns the memory
/// and the module must not retain it past the call.
pub type __envoy_dynamic_module_v1_type_ModuleConfigPtr = *const u8;
/// Size of the module configuration.
pub type __envoy_dynamic_module_v1_type_ModuleConfigSize = usize;
/// Opaque in-module singleton context returned from the module init event.
pub type __envoy_dynamic_module_v1_type_ModuleContextPtr = usize;

/// Pointer to the per-filter configuration passed to the http filter init event.
pub type __envoy_dynamic_module_v1_type_HttpFilterConfigPtr = *const u8;
/// Size of the per-filter configuration.
pub type __envoy_dynamic_module_v1_type_HttpFilterConfigSize = usize;
/// Opaque in-module object corresponding to one filter in a filter chain.
pub type __envoy_dynamic_module_v1_type_HttpFilterPtr = usize;

/// Pointer to the Envoy-side filter instance of a single stream. Modules must not manipulate
/// it other than passing it back to Envoy.
pub type __envoy_dynamic_module_v1_type_EnvoyFilterInstancePtr = usize;
/// Opaque in-module object corresponding to a single stream.
pub type __envoy_dynamic_module_v1_type_HttpFilterInstancePtr = usize;

pub type __envoy_dynamic_module_v1_type_HttpRequestHeadersMapPtr = usize;
pub type __envoy_dynamic_module_v1_type_HttpResponseHeaderMapPtr = usize;
pub type __envoy_dynamic_module_v1_type_HttpRequestBodyBufferPtr = usize;
pub type __envoy_dynamic_module_v1_type_HttpResponseBodyBufferPtr = usize;

/// 1 if the stream has reached the end, 0 otherwise.
pub type __envoy_dynamic_module_v1_type_EndOfStream = c_int;

pub type __envoy_dynamic_module_v1_type_EventHttpRequestHeadersStatus = c_int;
pub type __envoy_dynamic_module_v1_type_EventHttpRequestBodyStatus = c_int;
pub type __envoy_dynamic_module_v1_type_EventHttpResponseHeadersStatus = c_int;
pub type __envoy_dynamic_module_v1_type_EventHttpResponseBodyStatus = c_int;

/// Buffer owned by the module, only borrowed by Envoy for the duration of a call.
pub type __envoy_dynamic_module_v1_type_InModuleBufferPtr = *const u8;
pub type __envoy_dynamic_module_v1_type_InModuleBufferLength = usize;

/// Buffer slice owned by Envoy.
pub type __envoy_dynamic_module_v1_type_DataSlicePtr = *mut u8;
pub type __envoy_dynamic_module_v1_type_DataSliceLength = usize;
/// Out parameters through which Envoy writes a slice back to the module.
pub type __envoy_dynamic_module_v1_type_DataSlicePtrResult =
  *mut __envoy_dynamic_module_v1_type_DataSlicePtr;
pub type __envoy_dynamic_module_v1_type_DataSliceLengthResult =
  *mut __envoy_dynamic_module_v1_type_DataSliceLength;

// Status encodings. These follow Envoy's FilterHeadersStatus and FilterDataStatus for the v1
// ABI and are not stable across ABI versions.
pub const __envoy_dynamic_module_v1_type_EventHttpRequestHeadersStatusContinue: c_int = 0;
pub const __envoy_dynamic_module_v1_type_EventHttpRequestHeadersStatusStopIteration: c_int = 1;
pub const __envoy_dynamic_module_v1_type_EventHttpRequestHeadersStatusStopAllIterationAndBuffer:
  c_int = 3;
pub const __envoy_dynamic_module_v1_type_EventHttpRequestBodyStatusContinue: c_int = 0;
pub const __envoy_dynamic_module_v1_type_EventHttpRequestBodyStatusStopIterationAndBuffer: c_int =
  1;
pub const __envoy_dynamic_module_v1_type_EventHttpResponseHeadersStatusContinue: c_int = 0;
pub const __envoy_dynamic_module_v1_type_EventHttpResponseHeadersStatusStopIteration: c_int = 1;
pub const __envoy_dynamic_module_v1_type_EventHttpResponseHeadersStatusStopAllIterationAndBuffer:
  c_int = 3;
pub const __envoy_dynamic_module_v1_type_EventHttpResponseBodyStatusContinue: c_int = 0;
pub const __envoy_dynamic_module_v1_type_EventHttpResponseBodyStatusStopIterationAndBuffer:
  c_int = 1;

// Callbacks implemented by Envoy. They are resolved when Envoy loads the module.
extern "C" {
  pub fn __envoy_dynamic_module_v1_http_continue_request(
    envoy_filter_instance_ptr: __envoy_dynamic_module_v1_type_EnvoyFilterInstancePtr,
  );

  pub fn __envoy_dynamic_module_v1_http_continue_response(
    envoy_filter_instance_ptr: __envoy_dynamic_module_v1_type_EnvoyFilterInstancePtr,
  );

  /// Returns the number of values for the key, and writes the first one to the result slice.
  pub fn __envoy_dynamic_module_v1_http_get_request_header_value(
    headers: __envoy_dynamic_module_v1_type_HttpRequestHeadersMapPtr,
    key: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    key_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
    result_buffer_ptr: __envoy_dynamic_module_v1_type_DataSlicePtrResult,
    result_buffer_length: __envoy_dynamic_module_v1_type_DataSliceLengthResult,
  ) -> usize;

  pub fn __envoy_dynamic_module_v1_http_get_request_header_value_nth(
    headers: __envoy_dynamic_module_v1_type_HttpRequestHeadersMapPtr,
    key: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    key_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
    result_buffer_ptr: __envoy_dynamic_module_v1_type_DataSlicePtrResult,
    result_buffer_length: __envoy_dynamic_module_v1_type_DataSliceLengthResult,
    nth: usize,
  );

  /// Replaces every value of the key with the given one. A null value removes the key.
  pub fn __envoy_dynamic_module_v1_http_set_request_header(
    headers: __envoy_dynamic_module_v1_type_HttpRequestHeadersMapPtr,
    key: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    key_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
    value: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    value_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
  );

  pub fn __envoy_dynamic_module_v1_http_get_response_header_value(
    headers: __envoy_dynamic_module_v1_type_HttpResponseHeaderMapPtr,
    key: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    key_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
    result_buffer_ptr: __envoy_dynamic_module_v1_type_DataSlicePtrResult,
    result_buffer_length: __envoy_dynamic_module_v1_type_DataSliceLengthResult,
  ) -> usize;

  pub fn __envoy_dynamic_module_v1_http_get_response_header_value_nth(
    headers: __envoy_dynamic_module_v1_type_HttpResponseHeaderMapPtr,
    key: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    key_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
    result_buffer_ptr: __envoy_dynamic_module_v1_type_DataSlicePtrResult,
    result_buffer_length: __envoy_dynamic_module_v1_type_DataSliceLengthResult,
    nth: usize,
  );

  pub fn __envoy_dynamic_module_v1_http_set_response_header(
    headers: __envoy_dynamic_module_v1_type_HttpResponseHeaderMapPtr,
    key: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    key_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
    value: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    value_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
  );

  /// Returns the entire request body buffered so far for the stream.
  pub fn __envoy_dynamic_module_v1_http_get_request_body_buffer(
    envoy_filter_instance_ptr: __envoy_dynamic_module_v1_type_EnvoyFilterInstancePtr,
  ) -> __envoy_dynamic_module_v1_type_HttpRequestBodyBufferPtr;

  pub fn __envoy_dynamic_module_v1_http_get_request_body_buffer_length(
    buffer: __envoy_dynamic_module_v1_type_HttpRequestBodyBufferPtr,
  ) -> usize;

  pub fn __envoy_dynamic_module_v1_http_get_request_body_buffer_slices_count(
    buffer: __envoy_dynamic_module_v1_type_HttpRequestBodyBufferPtr,
  ) -> usize;

  pub fn __envoy_dynamic_module_v1_http_get_request_body_buffer_slice(
    buffer: __envoy_dynamic_module_v1_type_HttpRequestBodyBufferPtr,
    nth: usize,
    result_buffer_ptr: __envoy_dynamic_module_v1_type_DataSlicePtrResult,
    result_buffer_length: __envoy_dynamic_module_v1_type_DataSliceLengthResult,
  );

  pub fn __envoy_dynamic_module_v1_http_append_request_body_buffer(
    buffer: __envoy_dynamic_module_v1_type_HttpRequestBodyBufferPtr,
    data: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    data_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
  );

  pub fn __envoy_dynamic_module_v1_http_prepend_request_body_buffer(
    buffer: __envoy_dynamic_module_v1_type_HttpRequestBodyBufferPtr,
    data: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    data_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
  );

  pub fn __envoy_dynamic_module_v1_http_drain_request_body_buffer(
    buffer: __envoy_dynamic_module_v1_type_HttpRequestBodyBufferPtr,
    length: usize,
  );

  pub fn __envoy_dynamic_module_v1_http_replace_request_body_buffer(
    buffer: __envoy_dynamic_module_v1_type_HttpRequestBodyBufferPtr,
    data: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    data_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
  );

  /// Returns the entire response body buffered so far for the stream.
  pub fn __envoy_dynamic_module_v1_http_get_response_body_buffer(
    envoy_filter_instance_ptr: __envoy_dynamic_module_v1_type_EnvoyFilterInstancePtr,
  ) -> __envoy_dynamic_module_v1_type_HttpResponseBodyBufferPtr;

  pub fn __envoy_dynamic_module_v1_http_get_response_body_buffer_length(
    buffer: __envoy_dynamic_module_v1_type_HttpResponseBodyBufferPtr,
  ) -> usize;

  pub fn __envoy_dynamic_module_v1_http_get_response_body_buffer_slices_count(
    buffer: __envoy_dynamic_module_v1_type_HttpResponseBodyBufferPtr,
  ) -> usize;

  pub fn __envoy_dynamic_module_v1_http_get_response_body_buffer_slice(
    buffer: __envoy_dynamic_module_v1_type_HttpResponseBodyBufferPtr,
    nth: usize,
    result_buffer_ptr: __envoy_dynamic_module_v1_type_DataSlicePtrResult,
    result_buffer_length: __envoy_dynamic_module_v1_type_DataSliceLengthResult,
  );

  pub fn __envoy_dynamic_module_v1_http_append_response_body_buffer(
    buffer: __envoy_dynamic_module_v1_type_HttpResponseBodyBufferPtr,
    data: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    data_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
  );

  pub fn __envoy_dynamic_module_v1_http_prepend_response_body_buffer(
    buffer: __envoy_dynamic_module_v1_type_HttpResponseBodyBufferPtr,
    data: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    data_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
  );

  pub fn __envoy_dynamic_module_v1_http_drain_response_body_buffer(
    buffer: __envoy_dynamic_module_v1_type_HttpResponseBodyBufferPtr,
    length: usize,
  );

  pub fn __envoy_dynamic_module_v1_http_replace_response_body_buffer(
    buffer: __envoy_dynamic_module_v1_type_HttpResponseBodyBufferPtr,
    data: __envoy_dynamic_module_v1_type_InModuleBufferPtr,
    data_length: __envoy_dynamic_module_v1_type_InModuleBufferLength,
  );
}
