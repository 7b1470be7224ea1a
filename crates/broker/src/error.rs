//! Error types for brokered handle access.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced to borrowers.
///
/// Cloneable so a single open failure can be delivered to every operation
/// that was queued behind it.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
	/// The handle could not be opened. Every operation queued at the time of
	/// the attempt receives this error; the broker stays usable.
	#[error("failed to open {}: {source}", path.display())]
	Open {
		/// Path the broker tried to open.
		path: PathBuf,
		/// The underlying I/O error.
		#[source]
		source: Arc<io::Error>,
	},

	/// A single borrowed operation failed.
	#[error("handle operation failed: {0}")]
	Operation(#[source] Arc<io::Error>),

	/// The broker was disposed before or while the operation was queued.
	#[error("handle broker was disposed")]
	Disposed,
}

impl BrokerError {
	pub(crate) fn open(path: impl Into<PathBuf>, error: io::Error) -> Self {
		Self::Open {
			path: path.into(),
			source: Arc::new(error),
		}
	}

	pub(crate) fn operation(error: io::Error) -> Self {
		Self::Operation(Arc::new(error))
	}

	/// Returns the kind of the underlying I/O error, if any.
	pub fn io_kind(&self) -> Option<io::ErrorKind> {
		match self {
			Self::Open { source, .. } | Self::Operation(source) => Some(source.kind()),
			Self::Disposed => None,
		}
	}

	/// Returns true for [`BrokerError::Disposed`].
	pub fn is_disposed(&self) -> bool {
		matches!(self, Self::Disposed)
	}
}

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;
