use crate::abi;
use crate::body_buffer::BodyBuffer;
use crate::config::{ConfigError, FilterConfig};
use crate::envoy_filter::EnvoyFilter;
use crate::header_map::HeaderMap;

/// The module-wide singleton created when Envoy loads the module.
///
/// It is created once on the main thread and then read concurrently by every worker thread,
/// hence `Send + Sync`. It lives until the process exits.
pub trait ModuleContext: Send + Sync {
  /// Creates a filter for one filter-chain entry from its configuration.
  ///
  /// Returning an error rejects the configuration; Envoy reports the failure.
  fn new_http_filter(&self, config: &FilterConfig) -> Result<Box<dyn HttpFilter>, ConfigError>;

  /// Called when Envoy unloads the module. The context itself stays alive.
  fn on_destroy(&self) {}
}

/// A filter configured in a filter chain.
///
/// [`HttpFilter::new_http_filter_instance`] is called for every new HTTP stream, possibly
/// concurrently from multiple worker threads, hence `Send + Sync`.
pub trait HttpFilter: Send + Sync {
  /// Creates the per-stream instance. Returning `None` rejects the stream.
  fn new_http_filter_instance(
    &self,
    envoy_filter: &mut EnvoyFilter,
  ) -> Option<Box<dyn HttpFilterInstance>>;

  /// Called when Envoy destroys the filter, e.g. on a configuration reload.
  fn on_destroy(&mut self) {}
}

/// The per-stream part of a filter.
///
/// All the events of a stream are delivered on the same worker thread, one at a time, in the
/// order: request headers, zero or more request body frames, response headers, zero or more
/// response body frames. The destroy event may arrive at any point.
///
/// The default implementations continue the processing.
pub trait HttpFilterInstance {
  /// Called when the request headers arrive. `end_of_stream` is true if the request has no body.
  fn on_request_headers(
    &mut self,
    _envoy_filter: &mut EnvoyFilter,
    _request_headers: &mut dyn HeaderMap,
    _end_of_stream: bool,
  ) -> RequestHeadersStatus {
    RequestHeadersStatus::Continue
  }

  /// Called for each request body frame. `request_body` only holds the new frame; the entire
  /// buffered body is available via [`EnvoyFilter::request_body_buffer`].
  fn on_request_body(
    &mut self,
    _envoy_filter: &mut EnvoyFilter,
    _request_body: &mut dyn BodyBuffer,
    _end_of_stream: bool,
  ) -> RequestBodyStatus {
    RequestBodyStatus::Continue
  }

  /// Called when the response headers arrive. `end_of_stream` is true if the response has no
  /// body.
  fn on_response_headers(
    &mut self,
    _envoy_filter: &mut EnvoyFilter,
    _response_headers: &mut dyn HeaderMap,
    _end_of_stream: bool,
  ) -> ResponseHeadersStatus {
    ResponseHeadersStatus::Continue
  }

  /// Called for each response body frame. `response_body` only holds the new frame; the entire
  /// buffered body is available via [`EnvoyFilter::response_body_buffer`].
  fn on_response_body(
    &mut self,
    _envoy_filter: &mut EnvoyFilter,
    _response_body: &mut dyn BodyBuffer,
    _end_of_stream: bool,
  ) -> ResponseBodyStatus {
    ResponseBodyStatus::Continue
  }

  /// Called when the stream is destroyed. By this point every [`crate::ResumeHandle`] of the
  /// stream is already inert.
  fn on_destroy(&mut self, _envoy_filter: &mut EnvoyFilter) {}
}

/// The status returned from [`HttpFilterInstance::on_request_headers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestHeadersStatus {
  /// Continue the processing.
  Continue,
  /// Hold the headers back from the next filters. The body events still fire. The processing
  /// resumes on [`crate::ResumeHandle::continue_request`] or when a later body event returns
  /// [`RequestBodyStatus::Continue`].
  StopIteration,
  /// Buffer the headers and the whole body, up to the buffer limit of the connection manager,
  /// without calling the body events until [`crate::ResumeHandle::continue_request`] is called.
  StopAllIterationAndBuffer,
}

impl From<RequestHeadersStatus>
  for abi::__envoy_dynamic_module_v1_type_EventHttpRequestHeadersStatus
{
  fn from(status: RequestHeadersStatus) -> Self {
    match status {
      RequestHeadersStatus::Continue => {
        abi::__envoy_dynamic_module_v1_type_EventHttpRequestHeadersStatusContinue
      },
      RequestHeadersStatus::StopIteration => {
        abi::__envoy_dynamic_module_v1_type_EventHttpRequestHeadersStatusStopIteration
      },
      RequestHeadersStatus::StopAllIterationAndBuffer => {
        abi::__envoy_dynamic_module_v1_type_EventHttpRequestHeadersStatusStopAllIterationAndBuffer
      },
    }
  }
}

/// The status returned from [`HttpFilterInstance::on_request_body`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestBodyStatus {
  /// Continue the processing.
  Continue,
  /// Stop forwarding the body and keep buffering it until
  /// [`crate::ResumeHandle::continue_request`] is called or a later body event returns
  /// [`RequestBodyStatus::Continue`].
  StopIterationAndBuffer,
}

impl From<RequestBodyStatus> for abi::__envoy_dynamic_module_v1_type_EventHttpRequestBodyStatus {
  fn from(status: RequestBodyStatus) -> Self {
    match status {
      RequestBodyStatus::Continue => {
        abi::__envoy_dynamic_module_v1_type_EventHttpRequestBodyStatusContinue
      },
      RequestBodyStatus::StopIterationAndBuffer => {
        abi::__envoy_dynamic_module_v1_type_EventHttpRequestBodyStatusStopIterationAndBuffer
      },
    }
  }
}

/// The status returned from [`HttpFilterInstance::on_response_headers`].
/// See [`RequestHeadersStatus`] for the meaning of each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseHeadersStatus {
  Continue,
  StopIteration,
  StopAllIterationAndBuffer,
}

impl From<ResponseHeadersStatus>
  for abi::__envoy_dynamic_module_v1_type_EventHttpResponseHeadersStatus
{
  fn from(status: ResponseHeadersStatus) -> Self {
    match status {
      ResponseHeadersStatus::Continue => {
        abi::__envoy_dynamic_module_v1_type_EventHttpResponseHeadersStatusContinue
      },
      ResponseHeadersStatus::StopIteration => {
        abi::__envoy_dynamic_module_v1_type_EventHttpResponseHeadersStatusStopIteration
      },
      ResponseHeadersStatus::StopAllIterationAndBuffer => {
        abi::__envoy_dynamic_module_v1_type_EventHttpResponseHeadersStatusStopAllIterationAndBuffer
      },
    }
  }
}

/// The status returned from [`HttpFilterInstance::on_response_body`].
/// See [`RequestBodyStatus`] for the meaning of each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseBodyStatus {
  Continue,
  StopIterationAndBuffer,
}

impl From<ResponseBodyStatus> for abi::__envoy_dynamic_module_v1_type_EventHttpResponseBodyStatus {
  fn from(status: ResponseBodyStatus) -> Self {
    match status {
      ResponseBodyStatus::Continue => {
        abi::__envoy_dynamic_module_v1_type_EventHttpResponseBodyStatusContinue
      },
      ResponseBodyStatus::StopIterationAndBuffer => {
        abi::__envoy_dynamic_module_v1_type_EventHttpResponseBodyStatusStopIterationAndBuffer
      },
    }
  }
}
