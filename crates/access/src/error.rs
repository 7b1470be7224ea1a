//! Error types for resource access.

use std::io;
use std::path::PathBuf;

use hexite_broker::BrokerError;
use thiserror::Error;

/// Errors raised by accessors and the accessor factory.
#[derive(Debug, Error)]
pub enum AccessError {
	/// Brokered handle access failed (open failure, read failure, disposal).
	#[error(transparent)]
	Broker(#[from] BrokerError),

	/// Direct I/O against the resource failed.
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	/// No accessor can serve the locator's scheme.
	#[error("unsupported resource scheme: {0}")]
	UnsupportedScheme(String),

	/// The locator does not name a usable local path.
	#[error("invalid resource path: {0}")]
	InvalidPath(String),

	/// The file watcher could not be installed.
	#[error("failed to watch {}: {error}", path.display())]
	Watch {
		/// Watched file.
		path: PathBuf,
		/// The underlying watcher error.
		error: notify::Error,
	},

	/// The accessor was disposed.
	#[error("accessor was disposed")]
	Disposed,
}

impl AccessError {
	/// Returns the kind of the underlying I/O error, if any.
	pub fn io_kind(&self) -> Option<io::ErrorKind> {
		match self {
			Self::Broker(e) => e.io_kind(),
			Self::Io(e) => Some(e.kind()),
			_ => None,
		}
	}

	/// Returns true when the failure is due to disposal.
	pub fn is_disposed(&self) -> bool {
		match self {
			Self::Broker(e) => e.is_disposed(),
			Self::Disposed => true,
			_ => false,
		}
	}
}

/// Result type for accessor operations.
pub type Result<T> = std::result::Result<T, AccessError>;
