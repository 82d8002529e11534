//! Rust SDK for writing HTTP filters that Envoy loads as dynamic modules through the v1 ABI.
//!
//! A module implements [`ModuleContext`], [`HttpFilter`] and [`HttpFilterInstance`], and exports
//! its module constructor with [`declare_module!`]. This crate exports every other event hook
//! Envoy calls, keeps the objects whose handles are given to Envoy alive until the matching
//! destroy event, and hands views of Envoy-owned headers and bodies to the filter.
//!
//! ```ignore
//! use envoy_dynamic_modules_v1_sdk::*;
//!
//! declare_module!(new_module);
//!
//! fn new_module(_config: &[u8]) -> Result<Box<dyn ModuleContext>, ConfigError> {
//!   Ok(Box::new(FilterKinds::new().with("helloworld", HelloWorldFilter::new)))
//! }
//! ```

pub mod abi;
mod body_buffer;
mod buffer;
mod config;
mod envoy_filter;
mod filter;
mod header_map;
pub mod logging;
mod registry;

pub use body_buffer::{BodyBuffer, EnvoyBodyBuffer, MockBodyBuffer};
pub use buffer::{EnvoyBuffer, EnvoyMutBuffer};
pub use config::{ConfigError, FilterConfig, FilterKinds, NewHttpFilterFunction};
pub use envoy_filter::{EnvoyFilter, ResumeHandle};
pub use filter::{
  HttpFilter,
  HttpFilterInstance,
  ModuleContext,
  RequestBodyStatus,
  RequestHeadersStatus,
  ResponseBodyStatus,
  ResponseHeadersStatus,
};
pub use header_map::{EnvoyHeaderMap, HeaderMap, MockHeaderMap};
pub use registry::{Handle, HandleRegistry};

#[cfg(test)]
mod fake_host;
#[cfg(test)]
#[path = "./lib_test.rs"]
mod mod_test;

use once_cell::sync::{Lazy, OnceCell};

/// The function that creates the module context from the module configuration.
pub type NewModuleFunction = fn(&[u8]) -> Result<Box<dyn ModuleContext>, ConfigError>;

/// Declares the function that creates the [`ModuleContext`] when Envoy loads the module.
///
/// The function receives the module configuration bytes, which are only valid during the call.
/// Returning an error makes Envoy fail to load the module.
///
/// # Example
///
/// ```ignore
/// use envoy_dynamic_modules_v1_sdk::*;
///
/// declare_module!(new_module);
///
/// fn new_module(_config: &[u8]) -> Result<Box<dyn ModuleContext>, ConfigError> {
///   Ok(Box::new(FilterKinds::new()))
/// }
/// ```
#[macro_export]
macro_rules! declare_module {
  ($new_module:expr) => {
    #[no_mangle]
    pub unsafe extern "C" fn __envoy_dynamic_module_v1_event_module_init(
      config_ptr: $crate::abi::__envoy_dynamic_module_v1_type_ModuleConfigPtr,
      config_size: $crate::abi::__envoy_dynamic_module_v1_type_ModuleConfigSize,
    ) -> $crate::abi::__envoy_dynamic_module_v1_type_ModuleContextPtr {
      $crate::module_init(config_ptr, config_size, $new_module)
    }
  };
}

/// The module context. Envoy completes the module init event on the main thread before any
/// filter or stream is created, so every reader observes the initialized value.
static MODULE_CONTEXT: OnceCell<Box<dyn ModuleContext>> = OnceCell::new();

/// Filters created by the filter init event, keyed by the handle given to Envoy.
static FILTERS: Lazy<HandleRegistry<Box<dyn HttpFilter>>> = Lazy::new(HandleRegistry::new);

/// Streams created by the filter instance init event, keyed by the handle given to Envoy.
static STREAMS: Lazy<HandleRegistry<StreamContext>> = Lazy::new(HandleRegistry::new);

/// Everything the module holds for a single HTTP stream.
struct StreamContext {
  envoy_filter: EnvoyFilter,
  instance: Box<dyn HttpFilterInstance>,
}

/// Returns the bytes Envoy passed as a configuration. The slice must not outlive the event.
unsafe fn config_bytes<'a>(ptr: *const u8, size: usize) -> &'a [u8] {
  if ptr.is_null() || size == 0 {
    return &[];
  }
  std::slice::from_raw_parts(ptr, size)
}

#[no_mangle]
pub extern "C" fn __envoy_dynamic_module_v1_event_program_init() -> usize {
  logging::init();
  0
}

/// The implementation of the module init event generated by [`declare_module!`].
///
/// # Safety
///
/// `config_ptr` must point to `config_size` readable bytes for the duration of the call.
#[doc(hidden)]
pub unsafe fn module_init(
  config_ptr: abi::__envoy_dynamic_module_v1_type_ModuleConfigPtr,
  config_size: abi::__envoy_dynamic_module_v1_type_ModuleConfigSize,
  new_module: NewModuleFunction,
) -> abi::__envoy_dynamic_module_v1_type_ModuleContextPtr {
  module_init_impl(
    &MODULE_CONTEXT,
    config_bytes(config_ptr, config_size),
    new_module,
  )
}

fn module_init_impl(
  slot: &OnceCell<Box<dyn ModuleContext>>,
  config: &[u8],
  new_module: NewModuleFunction,
) -> abi::__envoy_dynamic_module_v1_type_ModuleContextPtr {
  match init_module_context(slot, config, new_module) {
    Ok(context) => {
      let ptr = context as *const dyn ModuleContext as *const () as usize;
      tracing::debug!(module_context = ptr, "module initialized");
      ptr
    },
    Err(err) => {
      tracing::error!(%err, "failed to initialize the module");
      0
    },
  }
}

fn init_module_context<'a>(
  slot: &'a OnceCell<Box<dyn ModuleContext>>,
  config: &[u8],
  new_module: NewModuleFunction,
) -> Result<&'a dyn ModuleContext, ConfigError> {
  if slot.get().is_some() {
    return Err(ConfigError::AlreadyInitialized);
  }
  let context = new_module(config)?;
  slot
    .set(context)
    .map_err(|_| ConfigError::AlreadyInitialized)?;
  slot
    .get()
    .map(|context| context.as_ref())
    .ok_or(ConfigError::NotInitialized)
}

/// Envoy is unloading the module. The context is notified but not released: it may still be
/// reachable from objects Envoy has not destroyed yet, and the process reclaims it on exit.
#[no_mangle]
pub extern "C" fn __envoy_dynamic_module_v1_event_module_destroy(
  module_context_ptr: abi::__envoy_dynamic_module_v1_type_ModuleContextPtr,
) {
  module_destroy_impl(&MODULE_CONTEXT, module_context_ptr)
}

fn module_destroy_impl(
  slot: &OnceCell<Box<dyn ModuleContext>>,
  module_context_ptr: abi::__envoy_dynamic_module_v1_type_ModuleContextPtr,
) {
  match slot.get() {
    Some(context) => {
      tracing::debug!(module_context = module_context_ptr, "module destroyed");
      context.on_destroy();
    },
    None => tracing::debug!("module destroyed before being initialized"),
  }
}

/// # Safety
///
/// `config_ptr` must point to `config_size` readable bytes for the duration of the call.
#[no_mangle]
pub unsafe extern "C" fn __envoy_dynamic_module_v1_event_http_filter_init(
  config_ptr: abi::__envoy_dynamic_module_v1_type_HttpFilterConfigPtr,
  config_size: abi::__envoy_dynamic_module_v1_type_HttpFilterConfigSize,
) -> abi::__envoy_dynamic_module_v1_type_HttpFilterPtr {
  http_filter_init_impl(
    MODULE_CONTEXT.get().map(|context| context.as_ref()),
    config_bytes(config_ptr, config_size),
  )
}

fn http_filter_init_impl(
  module_context: Option<&dyn ModuleContext>,
  config: &[u8],
) -> abi::__envoy_dynamic_module_v1_type_HttpFilterPtr {
  let result = module_context
    .ok_or(ConfigError::NotInitialized)
    .and_then(|context| {
      let config = FilterConfig::parse(config)?;
      let filter = context.new_http_filter(&config)?;
      Ok((config, filter))
    });
  match result {
    Ok((config, filter)) => {
      let handle = FILTERS.register(filter);
      tracing::debug!(http_filter = ?handle, kind = config.kind(), "http filter created");
      handle.into_raw()
    },
    Err(err) => {
      tracing::error!(%err, "failed to create the http filter");
      0
    },
  }
}

/// # Safety
///
/// `http_filter_ptr` must be a handle returned by the filter init event and not destroyed yet.
#[no_mangle]
pub unsafe extern "C" fn __envoy_dynamic_module_v1_event_http_filter_destroy(
  http_filter_ptr: abi::__envoy_dynamic_module_v1_type_HttpFilterPtr,
) {
  let handle = Handle::from_raw(http_filter_ptr);
  let mut filter = FILTERS.unregister(handle);
  filter.on_destroy();
  tracing::debug!(http_filter = ?handle, "http filter destroyed");
}

/// # Safety
///
/// `http_filter_ptr` must be a handle returned by the filter init event and not destroyed yet.
#[no_mangle]
pub unsafe extern "C" fn __envoy_dynamic_module_v1_event_http_filter_instance_init(
  envoy_filter_instance_ptr: abi::__envoy_dynamic_module_v1_type_EnvoyFilterInstancePtr,
  http_filter_ptr: abi::__envoy_dynamic_module_v1_type_HttpFilterPtr,
) -> abi::__envoy_dynamic_module_v1_type_HttpFilterInstancePtr {
  // Envoy destroys a filter only after all of its streams are destroyed.
  let filter = FILTERS.get(Handle::from_raw(http_filter_ptr));
  http_filter_instance_init_impl(envoy_filter_instance_ptr, filter.as_ref())
}

fn http_filter_instance_init_impl(
  envoy_filter_instance_ptr: abi::__envoy_dynamic_module_v1_type_EnvoyFilterInstancePtr,
  filter: &dyn HttpFilter,
) -> abi::__envoy_dynamic_module_v1_type_HttpFilterInstancePtr {
  let mut envoy_filter = EnvoyFilter::new(envoy_filter_instance_ptr);
  match filter.new_http_filter_instance(&mut envoy_filter) {
    Some(instance) => {
      let handle = STREAMS.register(StreamContext {
        envoy_filter,
        instance,
      });
      tracing::debug!(stream = ?handle, "stream created");
      handle.into_raw()
    },
    None => {
      // Handles cloned during the rejected creation must not reach Envoy.
      envoy_filter.mark_destroyed();
      tracing::debug!("http filter declined the stream");
      0
    },
  }
}

/// Resolves the stream of an event.
///
/// # Safety
///
/// Envoy delivers the events of a stream one at a time on a single thread, and never after the
/// stream destroy event.
unsafe fn stream<'a>(
  http_filter_instance_ptr: abi::__envoy_dynamic_module_v1_type_HttpFilterInstancePtr,
) -> &'a mut StreamContext {
  STREAMS.get_mut(Handle::from_raw(http_filter_instance_ptr))
}

/// # Safety
///
/// The pointers must be the ones Envoy passes to the event.
#[no_mangle]
pub unsafe extern "C" fn __envoy_dynamic_module_v1_event_http_filter_instance_request_headers(
  http_filter_instance_ptr: abi::__envoy_dynamic_module_v1_type_HttpFilterInstancePtr,
  request_headers_ptr: abi::__envoy_dynamic_module_v1_type_HttpRequestHeadersMapPtr,
  end_of_stream: abi::__envoy_dynamic_module_v1_type_EndOfStream,
) -> abi::__envoy_dynamic_module_v1_type_EventHttpRequestHeadersStatus {
  let stream = stream(http_filter_instance_ptr);
  let mut headers = EnvoyHeaderMap::request(request_headers_ptr);
  let end_of_stream = end_of_stream != 0;
  let status =
    stream
      .instance
      .on_request_headers(&mut stream.envoy_filter, &mut headers, end_of_stream);
  tracing::trace!(
    stream = http_filter_instance_ptr,
    end_of_stream,
    ?status,
    "request headers"
  );
  status.into()
}

/// # Safety
///
/// The pointers must be the ones Envoy passes to the event.
#[no_mangle]
pub unsafe extern "C" fn __envoy_dynamic_module_v1_event_http_filter_instance_request_body(
  http_filter_instance_ptr: abi::__envoy_dynamic_module_v1_type_HttpFilterInstancePtr,
  buffer: abi::__envoy_dynamic_module_v1_type_HttpRequestBodyBufferPtr,
  end_of_stream: abi::__envoy_dynamic_module_v1_type_EndOfStream,
) -> abi::__envoy_dynamic_module_v1_type_EventHttpRequestBodyStatus {
  let stream = stream(http_filter_instance_ptr);
  let mut body = EnvoyBodyBuffer::request(buffer);
  let end_of_stream = end_of_stream != 0;
  let status = stream
    .instance
    .on_request_body(&mut stream.envoy_filter, &mut body, end_of_stream);
  tracing::trace!(
    stream = http_filter_instance_ptr,
    end_of_stream,
    ?status,
    "request body"
  );
  status.into()
}

/// # Safety
///
/// The pointers must be the ones Envoy passes to the event.
#[no_mangle]
pub unsafe extern "C" fn __envoy_dynamic_module_v1_event_http_filter_instance_response_headers(
  http_filter_instance_ptr: abi::__envoy_dynamic_module_v1_type_HttpFilterInstancePtr,
  response_headers_map_ptr: abi::__envoy_dynamic_module_v1_type_HttpResponseHeaderMapPtr,
  end_of_stream: abi::__envoy_dynamic_module_v1_type_EndOfStream,
) -> abi::__envoy_dynamic_module_v1_type_EventHttpResponseHeadersStatus {
  let stream = stream(http_filter_instance_ptr);
  let mut headers = EnvoyHeaderMap::response(response_headers_map_ptr);
  let end_of_stream = end_of_stream != 0;
  let status =
    stream
      .instance
      .on_response_headers(&mut stream.envoy_filter, &mut headers, end_of_stream);
  tracing::trace!(
    stream = http_filter_instance_ptr,
    end_of_stream,
    ?status,
    "response headers"
  );
  status.into()
}

/// # Safety
///
/// The pointers must be the ones Envoy passes to the event.
#[no_mangle]
pub unsafe extern "C" fn __envoy_dynamic_module_v1_event_http_filter_instance_response_body(
  http_filter_instance_ptr: abi::__envoy_dynamic_module_v1_type_HttpFilterInstancePtr,
  buffer: abi::__envoy_dynamic_module_v1_type_HttpResponseBodyBufferPtr,
  end_of_stream: abi::__envoy_dynamic_module_v1_type_EndOfStream,
) -> abi::__envoy_dynamic_module_v1_type_EventHttpResponseBodyStatus {
  let stream = stream(http_filter_instance_ptr);
  let mut body = EnvoyBodyBuffer::response(buffer);
  let end_of_stream = end_of_stream != 0;
  let status = stream
    .instance
    .on_response_body(&mut stream.envoy_filter, &mut body, end_of_stream);
  tracing::trace!(
    stream = http_filter_instance_ptr,
    end_of_stream,
    ?status,
    "response body"
  );
  status.into()
}

/// # Safety
///
/// `http_filter_instance_ptr` must be a handle returned by the filter instance init event and not
/// destroyed yet.
#[no_mangle]
pub unsafe extern "C" fn __envoy_dynamic_module_v1_event_http_filter_instance_destroy(
  http_filter_instance_ptr: abi::__envoy_dynamic_module_v1_type_HttpFilterInstancePtr,
) {
  let handle = Handle::from_raw(http_filter_instance_ptr);
  let StreamContext {
    mut envoy_filter,
    mut instance,
  } = STREAMS.unregister(handle);
  // From here on, the Envoy-side object may be gone at any moment.
  envoy_filter.mark_destroyed();
  instance.on_destroy(&mut envoy_filter);
  tracing::debug!(stream = ?handle, "stream destroyed");
}
