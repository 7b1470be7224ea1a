//! Error types for configuration parsing.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML syntax or an unknown/mistyped key.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {}: {error}", path.display())]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A value parsed but is outside its allowed range.
	#[error("invalid value for {key}: {reason}")]
	Invalid {
		/// Dotted key of the offending value.
		key: &'static str,
		/// What is wrong with it.
		reason: &'static str,
	},
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
