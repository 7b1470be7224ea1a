//! Error types for channels and framing.

use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by [`RpcChannel`](crate::RpcChannel) and the stream codec.
#[derive(Debug, Error)]
pub enum RpcError {
	/// The channel was closed; no further messages are sent or resolved.
	#[error("channel is closed")]
	Closed,
	/// No reply arrived within the allotted time.
	#[error("request timed out after {0:?}")]
	Timeout(Duration),
	/// A frame could not be encoded or decoded.
	#[error("frame codec error: {0}")]
	Codec(#[from] postcard::Error),
	/// The underlying stream failed.
	#[error("I/O error: {0}")]
	Io(#[from] io::Error),
	/// A frame exceeded the configured length limit.
	#[error("frame of {len} bytes exceeds the {max} byte limit")]
	FrameTooLarge {
		/// Announced or encoded frame length.
		len: usize,
		/// Configured limit.
		max: usize,
	},
}

/// Failure reported by an [`InboundHandler`](crate::InboundHandler).
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, RpcError>;
