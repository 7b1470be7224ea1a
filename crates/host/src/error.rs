use hexite_access::AccessError;
use hexite_rpc::RpcError;
use thiserror::Error;

/// Errors raised while hosting a document.
#[derive(Debug, Error)]
pub enum HostError {
	/// Reading or opening the resource failed.
	#[error(transparent)]
	Access(#[from] AccessError),

	/// Talking to a view failed.
	#[error(transparent)]
	Rpc(#[from] RpcError),

	/// The `baseAddress` query parameter is not a hex or decimal integer.
	#[error("invalid base address: {0:?}")]
	InvalidBaseAddress(String),

	/// The document was disposed.
	#[error("document was disposed")]
	Disposed,
}

/// Result type for host operations.
pub type Result<T> = std::result::Result<T, HostError>;
