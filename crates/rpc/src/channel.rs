//! Request/reply correlation over a one-way transport.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use hexite_worker::TaskClass;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::{
	CounterIdGen, Envelope, HandlerError, Inbound, InboundHandler, MessageId, Result, RpcError, Transport,
};

struct Inner<Out: Send + 'static, In: Send + 'static> {
	transport: Box<dyn Transport<Out>>,
	/// Held across id allocation and transport send so wire order matches id order.
	ids: Mutex<CounterIdGen>,
	pending: Mutex<HashMap<MessageId, oneshot::Sender<In>>>,
	/// Inbound requests and events, in delivery order, for the dispatch task.
	inbound: mpsc::UnboundedSender<(MessageId, In)>,
	request_timeout: Option<Duration>,
	closed: CancellationToken,
}

impl<Out: Send + 'static, In: Send + 'static> Inner<Out, In> {
	fn post(&self, in_reply_to: Option<MessageId>, body: Out, waiter: Option<oneshot::Sender<In>>) -> Result<MessageId> {
		let mut ids = self.ids.lock();
		if self.closed.is_cancelled() {
			return Err(RpcError::Closed);
		}
		let message_id = ids.next();
		if let Some(waiter) = waiter {
			self.pending.lock().insert(message_id, waiter);
		}
		let envelope = Envelope {
			message_id,
			in_reply_to,
			body,
		};
		if let Err(e) = self.transport.send(envelope) {
			self.pending.lock().remove(&message_id);
			return Err(e);
		}
		Ok(message_id)
	}
}

/// One side of a bidirectional message channel.
///
/// Sends `Out` bodies and receives `In` bodies. Outbound requests wait in a
/// pending table until the peer's correlated reply is passed to
/// [`handle_message`](Self::handle_message); inbound requests and events are
/// answered by the channel's [`InboundHandler`]. Clones share state.
pub struct RpcChannel<Out: Send + 'static, In: Send + 'static> {
	inner: Arc<Inner<Out, In>>,
}

impl<Out: Send + 'static, In: Send + 'static> Clone for RpcChannel<Out, In> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<Out: Send + 'static, In: Send + 'static> RpcChannel<Out, In> {
	/// Creates a channel sending through `transport` and answering inbound
	/// messages with `handler`.
	pub fn new(transport: impl Transport<Out>, handler: impl InboundHandler<In, Out>) -> Self {
		Self::with_request_timeout(transport, handler, None)
	}

	/// Like [`new`](Self::new), with a reply deadline applied by
	/// [`request`](Self::request). `None` waits forever.
	///
	/// Inbound messages are dispatched from a task started here, so this must
	/// run within a tokio runtime or with the worker fallback available.
	pub fn with_request_timeout(
		transport: impl Transport<Out>,
		handler: impl InboundHandler<In, Out>,
		request_timeout: Option<Duration>,
	) -> Self {
		let (inbound, queue) = mpsc::unbounded_channel();
		let closed = CancellationToken::new();
		let inner = Arc::new(Inner {
			transport: Box::new(transport),
			ids: Mutex::new(CounterIdGen::new()),
			pending: Mutex::new(HashMap::new()),
			inbound,
			request_timeout,
			closed: closed.clone(),
		});
		hexite_worker::spawn(
			TaskClass::Interactive,
			dispatch_inbound(Arc::downgrade(&inner), handler, queue, closed),
		);
		Self { inner }
	}

	/// Sends a fire-and-forget message. No pending entry is created.
	pub fn send_event(&self, body: Out) -> Result<MessageId> {
		let message_id = self.inner.post(None, body, None)?;
		tracing::trace!(%message_id, "rpc.send_event");
		Ok(message_id)
	}

	/// Sends a request and returns a future for its correlated reply.
	///
	/// The request is transmitted before this returns. Dropping the future
	/// abandons the reply; a late reply is then dropped as unmatched.
	pub fn send_request(&self, body: Out) -> PendingReply<In> {
		let (tx, rx) = oneshot::channel();
		match self.inner.post(None, body, Some(tx)) {
			Ok(message_id) => {
				tracing::trace!(%message_id, "rpc.send_request");
				PendingReply {
					id: Some(message_id),
					state: Ok(rx),
				}
			}
			Err(e) => PendingReply {
				id: None,
				state: Err(Some(e)),
			},
		}
	}

	/// Sends a request and waits at most `timeout` for the reply.
	///
	/// On expiry the pending entry is removed and [`RpcError::Timeout`] is
	/// returned.
	pub async fn request_with_timeout(&self, body: Out, timeout: Duration) -> Result<In> {
		let pending = self.send_request(body);
		let Some(id) = pending.id() else {
			return pending.await;
		};
		match tokio::time::timeout(timeout, pending).await {
			Ok(reply) => reply,
			Err(_) => {
				self.inner.pending.lock().remove(&id);
				tracing::debug!(message_id = %id, ?timeout, "rpc.request_timeout");
				Err(RpcError::Timeout(timeout))
			}
		}
	}

	/// Sends a request and waits for its reply, bounded by the channel's
	/// request timeout when one is set.
	pub async fn request(&self, body: Out) -> Result<In> {
		match self.inner.request_timeout {
			Some(timeout) => self.request_with_timeout(body, timeout).await,
			None => self.send_request(body).await,
		}
	}

	/// Processes one envelope received from the peer.
	///
	/// Replies resolve the matching pending request; unknown or already
	/// resolved reply ids are dropped. Everything else is handed to the
	/// handler in delivery order. Handlers then run concurrently, so a slow
	/// one does not hold up later envelopes.
	pub fn handle_message(&self, envelope: Envelope<In>) {
		if self.inner.closed.is_cancelled() {
			tracing::trace!(message_id = %envelope.message_id, "rpc.drop_after_close");
			return;
		}
		match envelope.into_inbound() {
			Inbound::Reply { in_reply_to, body } => {
				let waiter = self.inner.pending.lock().remove(&in_reply_to);
				match waiter {
					Some(waiter) => {
						// The requester may have given up on the reply.
						let _: std::result::Result<_, _> = waiter.send(body);
					}
					None => tracing::trace!(%in_reply_to, "rpc.unmatched_reply"),
				}
			}
			Inbound::Message { message_id, body } => {
				if self.inner.inbound.send((message_id, body)).is_err() {
					tracing::trace!(%message_id, "rpc.dispatch_gone");
				}
			}
		}
	}

	/// Closes the channel.
	///
	/// Pending requests fail with [`RpcError::Closed`], in-flight handlers are
	/// cancelled without replying, and later sends fail. Idempotent.
	pub fn close(&self) {
		let _ids = self.inner.ids.lock();
		if self.inner.closed.is_cancelled() {
			return;
		}
		self.inner.closed.cancel();
		let rejected = std::mem::take(&mut *self.inner.pending.lock());
		tracing::debug!(rejected = rejected.len(), "rpc.close");
	}

	/// Returns true once [`close`](Self::close) has been called.
	pub fn is_closed(&self) -> bool {
		self.inner.closed.is_cancelled()
	}

	/// Completes when the channel is closed.
	pub async fn closed(&self) {
		self.inner.closed.cancelled().await;
	}

	/// Number of requests awaiting a reply.
	pub fn pending_len(&self) -> usize {
		self.inner.pending.lock().len()
	}
}

impl<Out: Send + 'static, In: Send + 'static> std::fmt::Debug for RpcChannel<Out, In> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RpcChannel")
			.field("next_id", &self.inner.ids.lock().0)
			.field("pending", &self.inner.pending.lock().len())
			.field("closed", &self.inner.closed.is_cancelled())
			.finish()
	}
}

/// Starts handlers in the order their messages were queued and drives them
/// together until the channel closes or is dropped. Closing cancels every
/// handler still running.
async fn dispatch_inbound<Out, In, H>(
	inner: Weak<Inner<Out, In>>,
	handler: H,
	mut queue: mpsc::UnboundedReceiver<(MessageId, In)>,
	closed: CancellationToken,
) where
	Out: Send + 'static,
	In: Send + 'static,
	H: InboundHandler<In, Out>,
{
	// FIFO first poll keeps handler invocation in queue order.
	let mut running = FuturesUnordered::new();
	loop {
		tokio::select! {
			biased;
			() = closed.cancelled() => break,
			next = queue.recv() => {
				let Some((message_id, body)) = next else {
					break;
				};
				running.push(answer(&inner, message_id, handler.handle(body)));
			}
			Some(()) = running.next(), if !running.is_empty() => {}
		}
	}
	tracing::trace!(abandoned = running.len(), "rpc.dispatch_stopped");
}

async fn answer<Out, In>(
	inner: &Weak<Inner<Out, In>>,
	message_id: MessageId,
	outcome: impl Future<Output = std::result::Result<Option<Out>, HandlerError>>,
) where
	Out: Send + 'static,
	In: Send + 'static,
{
	let outcome = outcome.await;
	let Some(inner) = inner.upgrade() else {
		return;
	};
	match outcome {
		Ok(Some(reply)) => {
			if let Err(e) = inner.post(Some(message_id), reply, None) {
				tracing::debug!(%message_id, error = %e, "rpc.reply_dropped");
			}
		}
		Ok(None) => {}
		Err(error) => tracing::warn!(%message_id, %error, "rpc.handler_failed"),
	}
}

/// Reply to a request sent with [`RpcChannel::send_request`].
#[must_use = "the request is sent regardless, but its reply is only observable through this future"]
#[derive(Debug)]
pub struct PendingReply<In> {
	id: Option<MessageId>,
	state: std::result::Result<oneshot::Receiver<In>, Option<RpcError>>,
}

impl<In> PendingReply<In> {
	/// Id assigned to the request, if it was sent.
	pub fn id(&self) -> Option<MessageId> {
		self.id
	}
}

impl<In> Future for PendingReply<In> {
	type Output = Result<In>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match &mut self.state {
			// A dropped sender means the channel closed before the reply came.
			Ok(rx) => Pin::new(rx).poll(cx).map(|reply| reply.map_err(|_| RpcError::Closed)),
			Err(e) => Poll::Ready(Err(e.take().unwrap_or(RpcError::Closed))),
		}
	}
}

#[cfg(test)]
mod tests;
