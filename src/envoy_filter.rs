use crate::abi;
use crate::body_buffer::EnvoyBodyBuffer;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// The Envoy-side counterpart of a single HTTP stream.
///
/// This is handed to every [`crate::HttpFilterInstance`] event and is only usable on the worker
/// thread that runs the stream. To resume the stream from another thread, obtain a
/// [`ResumeHandle`] with [`EnvoyFilter::resume_handle`].
pub struct EnvoyFilter {
  raw: abi::__envoy_dynamic_module_v1_type_EnvoyFilterInstancePtr,
  resume: ResumeHandle,
}

impl EnvoyFilter {
  pub(crate) fn new(raw: abi::__envoy_dynamic_module_v1_type_EnvoyFilterInstancePtr) -> Self {
    Self {
      raw,
      resume: ResumeHandle::new(raw),
    }
  }

  /// Returns a handle that can resume this stream from any thread, e.g. from a timer after a
  /// stop status was returned from an event.
  pub fn resume_handle(&self) -> ResumeHandle {
    self.resume.clone()
  }

  /// Resumes the request processing that was stopped by a previous event.
  /// This is a no-op once the stream has been destroyed.
  pub fn continue_request(&self) {
    self.resume.continue_request();
  }

  /// Resumes the response processing that was stopped by a previous event.
  /// This is a no-op once the stream has been destroyed.
  pub fn continue_response(&self) {
    self.resume.continue_response();
  }

  /// Returns true once the stream destroy event has been received.
  pub fn is_destroyed(&self) -> bool {
    self.resume.is_destroyed()
  }

  /// Returns the entire request body buffered so far by Envoy. This differs from the buffer passed
  /// to [`crate::HttpFilterInstance::on_request_body`], which only holds the newly arrived frame.
  ///
  /// Returns `None` once the stream has been destroyed, e.g. inside
  /// [`crate::HttpFilterInstance::on_destroy`]. The returned buffer borrows this filter, so it
  /// cannot outlive the current event.
  pub fn request_body_buffer(&mut self) -> Option<EnvoyBodyBuffer<'_>> {
    if self.is_destroyed() {
      return None;
    }
    unsafe {
      let raw = abi::__envoy_dynamic_module_v1_http_get_request_body_buffer(self.raw);
      Some(EnvoyBodyBuffer::request(raw))
    }
  }

  /// Returns the entire response body buffered so far by Envoy.
  /// See [`EnvoyFilter::request_body_buffer`] for details.
  pub fn response_body_buffer(&mut self) -> Option<EnvoyBodyBuffer<'_>> {
    if self.is_destroyed() {
      return None;
    }
    unsafe {
      let raw = abi::__envoy_dynamic_module_v1_http_get_response_body_buffer(self.raw);
      Some(EnvoyBodyBuffer::response(raw))
    }
  }

  pub(crate) fn mark_destroyed(&self) {
    self.resume.mark_destroyed();
  }
}

/// A cloneable, thread-safe handle to resume a stream.
///
/// Every clone observes the destroy event of the stream: once Envoy destroys the stream, the
/// continue methods return without calling into Envoy, since the Envoy-side object no longer
/// exists. No lock is held while calling into Envoy, so a continue call may re-enter from an
/// event Envoy delivers synchronously inside another continue call, and the destroy event never
/// waits for a resuming thread.
#[derive(Clone, Debug)]
pub struct ResumeHandle {
  state: Arc<ResumeState>,
}

#[derive(Debug)]
struct ResumeState {
  raw: abi::__envoy_dynamic_module_v1_type_EnvoyFilterInstancePtr,
  destroyed: AtomicBool,
  /// Continue calls that passed the destroyed check and have not returned from Envoy yet.
  in_flight: AtomicUsize,
}

/// Counts a continue call as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
  fn enter(counter: &'a AtomicUsize) -> Self {
    counter.fetch_add(1, Ordering::SeqCst);
    Self(counter)
  }
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.0.fetch_sub(1, Ordering::SeqCst);
  }
}

impl ResumeHandle {
  fn new(raw: abi::__envoy_dynamic_module_v1_type_EnvoyFilterInstancePtr) -> Self {
    Self {
      state: Arc::new(ResumeState {
        raw,
        destroyed: AtomicBool::new(false),
        in_flight: AtomicUsize::new(0),
      }),
    }
  }

  /// Resumes the request processing. This is a no-op once the stream has been destroyed.
  pub fn continue_request(&self) {
    self.call_if_alive("continue_request", |raw| unsafe {
      abi::__envoy_dynamic_module_v1_http_continue_request(raw)
    });
  }

  /// Resumes the response processing. This is a no-op once the stream has been destroyed.
  pub fn continue_response(&self) {
    self.call_if_alive("continue_response", |raw| unsafe {
      abi::__envoy_dynamic_module_v1_http_continue_response(raw)
    });
  }

  /// Returns true once the stream destroy event has been received.
  pub fn is_destroyed(&self) -> bool {
    self.state.destroyed.load(Ordering::SeqCst)
  }

  fn call_if_alive(
    &self,
    name: &str,
    f: impl FnOnce(abi::__envoy_dynamic_module_v1_type_EnvoyFilterInstancePtr),
  ) {
    // Entering before the check lets mark_destroyed see every call that may still reach Envoy.
    let _in_flight = InFlight::enter(&self.state.in_flight);
    if self.is_destroyed() {
      tracing::debug!(
        envoy_filter = self.state.raw,
        "{} dropped: the stream is already destroyed",
        name
      );
      return;
    }
    f(self.state.raw);
  }

  fn mark_destroyed(&self) {
    self.state.destroyed.store(true, Ordering::SeqCst);
    let in_flight = self.state.in_flight.load(Ordering::SeqCst);
    if in_flight > 0 {
      tracing::debug!(
        envoy_filter = self.state.raw,
        in_flight,
        "stream destroyed while continue calls were in flight"
      );
    }
  }
}
