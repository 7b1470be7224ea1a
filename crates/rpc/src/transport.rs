//! One-way envelope transport.

use tokio::sync::mpsc;

use crate::{Envelope, Result, RpcError};

/// Delivers envelopes to the peer, once each and in send order.
pub trait Transport<T>: Send + Sync + 'static {
	/// Hands `envelope` to the peer. Fails with [`RpcError::Closed`] once the
	/// peer is gone.
	fn send(&self, envelope: Envelope<T>) -> Result<()>;
}

impl<T: Send + 'static> Transport<T> for mpsc::UnboundedSender<Envelope<T>> {
	fn send(&self, envelope: Envelope<T>) -> Result<()> {
		mpsc::UnboundedSender::send(self, envelope).map_err(|_| RpcError::Closed)
	}
}
