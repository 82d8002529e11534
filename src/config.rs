//! Filter configuration and selection of filter kinds.
//!
//! The configuration Envoy passes for each filter-chain entry is a UTF-8 string of the form
//! `kind[:args]`, e.g. `delay` or `headers:x-foo`. The kind selects the filter implementation and
//! the arguments are left to that implementation to interpret.

use crate::filter::{HttpFilter, ModuleContext};
use std::collections::HashMap;
use std::str::{FromStr, Utf8Error};
use thiserror::Error;

/// Errors raised while creating the module context or a filter.
///
/// These never cross the ABI boundary: the event hooks log them and return the null handle,
/// which makes Envoy reject the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("configuration is not valid UTF-8: {0}")]
  InvalidUtf8(#[from] Utf8Error),

  #[error("configuration is empty")]
  Empty,

  #[error("unknown filter kind: {0}")]
  UnknownFilter(String),

  #[error("invalid configuration for filter {kind}: {reason}")]
  Invalid { kind: String, reason: String },

  #[error("module is already initialized")]
  AlreadyInitialized,

  #[error("module is not initialized")]
  NotInitialized,
}

/// The parsed configuration of a single filter-chain entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterConfig {
  kind: String,
  args: String,
}

impl FilterConfig {
  /// Parses the raw configuration bytes handed over by Envoy. The bytes are copied, so the
  /// result does not borrow Envoy's memory.
  pub fn parse(raw: &[u8]) -> Result<Self, ConfigError> {
    std::str::from_utf8(raw)?.parse()
  }

  /// The filter kind, i.e. the part before the first `:`.
  pub fn kind(&self) -> &str {
    &self.kind
  }

  /// The filter-specific arguments, i.e. the part after the first `:`. Empty if there is none.
  pub fn args(&self) -> &str {
    &self.args
  }

  /// Builds a [`ConfigError::Invalid`] for this filter kind.
  pub fn invalid(&self, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
      kind: self.kind.clone(),
      reason: reason.into(),
    }
  }
}

impl FromStr for FilterConfig {
  type Err = ConfigError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (kind, args) = s.split_once(':').unwrap_or((s, ""));
    let kind = kind.trim();
    if kind.is_empty() {
      return Err(ConfigError::Empty);
    }
    Ok(Self {
      kind: kind.to_string(),
      args: args.trim().to_string(),
    })
  }
}

/// The function that creates a filter of one kind from its configuration.
pub type NewHttpFilterFunction = fn(&FilterConfig) -> Result<Box<dyn HttpFilter>, ConfigError>;

/// A [`ModuleContext`] that dispatches filter creation on [`FilterConfig::kind`].
///
/// ```ignore
/// fn new_module(_config: &[u8]) -> Result<Box<dyn ModuleContext>, ConfigError> {
///   Ok(Box::new(
///     FilterKinds::new()
///       .with("helloworld", HelloWorldFilter::new)
///       .with("delay", DelayFilter::new),
///   ))
/// }
/// ```
#[derive(Default)]
pub struct FilterKinds {
  kinds: HashMap<&'static str, NewHttpFilterFunction>,
}

impl FilterKinds {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registers the constructor for `kind`, replacing any previous one.
  pub fn with(mut self, kind: &'static str, new_fn: NewHttpFilterFunction) -> Self {
    self.kinds.insert(kind, new_fn);
    self
  }

  pub fn contains(&self, kind: &str) -> bool {
    self.kinds.contains_key(kind)
  }
}

impl ModuleContext for FilterKinds {
  fn new_http_filter(&self, config: &FilterConfig) -> Result<Box<dyn HttpFilter>, ConfigError> {
    let new_fn = self
      .kinds
      .get(config.kind())
      .ok_or_else(|| ConfigError::UnknownFilter(config.kind().to_string()))?;
    new_fn(config)
  }
}
