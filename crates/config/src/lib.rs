//! Configuration system for the hexite host.
//!
//! Configuration is written in TOML. Every section and key is optional and
//! falls back to the built-in default; unknown keys are rejected so typos do
//! not go unnoticed.
//!
//! ```toml
//! [broker]
//! idle_close_ms = 1000      # release idle file handles after this long
//!
//! [rpc]
//! request_timeout_ms = 5000 # omit to wait for replies indefinitely
//! max_frame_len = 16777216  # largest accepted frame, in bytes
//!
//! [view]
//! max_read_len = 1048576    # larger range requests are clamped
//! ```

pub mod error;

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

pub use error::{ConfigError, Result};

/// Parsed host configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
	/// File handle brokering.
	pub broker: BrokerConfig,
	/// Message channel and stream framing.
	pub rpc: RpcConfig,
	/// Presentation-layer limits.
	pub view: ViewConfig,
}

/// `[broker]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
	/// Milliseconds without work before an open handle is closed.
	pub idle_close_ms: u64,
}

impl Default for BrokerConfig {
	fn default() -> Self {
		Self { idle_close_ms: 1000 }
	}
}

impl BrokerConfig {
	/// Idle-close period as a [`Duration`].
	pub fn idle_close(&self) -> Duration {
		Duration::from_millis(self.idle_close_ms)
	}
}

/// `[rpc]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RpcConfig {
	/// Reply deadline for outbound requests; `None` waits forever.
	pub request_timeout_ms: Option<u64>,
	/// Largest frame accepted or sent on a stream transport.
	pub max_frame_len: usize,
}

impl Default for RpcConfig {
	fn default() -> Self {
		Self {
			request_timeout_ms: None,
			max_frame_len: 16 * 1024 * 1024,
		}
	}
}

impl RpcConfig {
	/// Request deadline as a [`Duration`], if one is set.
	pub fn request_timeout(&self) -> Option<Duration> {
		self.request_timeout_ms.map(Duration::from_millis)
	}
}

/// `[view]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewConfig {
	/// Largest byte range served for a single request.
	pub max_read_len: usize,
}

impl Default for ViewConfig {
	fn default() -> Self {
		Self {
			max_read_len: 1024 * 1024,
		}
	}
}

impl HostConfig {
	/// Parse a TOML string into a [`HostConfig`].
	pub fn parse(input: &str) -> Result<Self> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Load configuration from a file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
			path: path.to_path_buf(),
			error: e,
		})?;
		Self::parse(&content)
	}

	/// Loads `path` when given, otherwise returns the defaults.
	pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
		match path {
			Some(path) => Self::load(path),
			None => Ok(Self::default()),
		}
	}

	fn validate(&self) -> Result<()> {
		if self.rpc.max_frame_len == 0 {
			return Err(ConfigError::Invalid {
				key: "rpc.max_frame_len",
				reason: "must be greater than zero",
			});
		}
		if self.view.max_read_len == 0 {
			return Err(ConfigError::Invalid {
				key: "view.max_read_len",
				reason: "must be greater than zero",
			});
		}
		Ok(())
	}
}
