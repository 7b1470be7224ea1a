//! Messages exchanged between the host and presentation views.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Sent by a view to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewMessage {
	/// Asks for document metadata; answered with [`HostMessage::ReadyResponse`].
	ReadyRequest,
	/// Asks for `bytes` bytes starting at `offset`; answered with
	/// [`HostMessage::ReadRangeResponse`].
	ReadRangeRequest { offset: u64, bytes: u64 },
}

/// Sent by the host to a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostMessage {
	/// Document metadata.
	ReadyResponse {
		/// Address shown for offset 0.
		initial_offset: u64,
		/// Resource length, absent for unbounded resources.
		file_size: Option<u64>,
	},
	/// Requested bytes. May be shorter than asked, down to empty, at the end
	/// of the resource.
	ReadRangeResponse { data: Bytes },
	/// The resource changed; cached data must be discarded.
	ReloadFromDisk,
}
