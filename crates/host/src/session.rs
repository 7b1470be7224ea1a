use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use hexite_access::{Callback, Subscription};
use hexite_rpc::{HandlerError, InboundHandler, RpcChannel, Transport};
use hexite_worker::TaskClass;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{Document, DocumentEvent, HostMessage, ViewMessage};

/// Host side of a view connection.
pub type ViewChannel = RpcChannel<HostMessage, ViewMessage>;

/// Answers view requests from a document.
#[derive(Debug, Clone)]
pub struct ViewHandler {
	document: Arc<Document>,
	max_read_len: usize,
}

impl ViewHandler {
	/// Serves `document`, clamping range requests to `max_read_len` bytes.
	pub fn new(document: Arc<Document>, max_read_len: usize) -> Self {
		Self { document, max_read_len }
	}
}

#[async_trait]
impl InboundHandler<ViewMessage, HostMessage> for ViewHandler {
	async fn handle(&self, body: ViewMessage) -> Result<Option<HostMessage>, HandlerError> {
		match body {
			ViewMessage::ReadyRequest => Ok(Some(HostMessage::ReadyResponse {
				initial_offset: self.document.base_address(),
				file_size: self.document.size().await?,
			})),
			ViewMessage::ReadRangeRequest { offset, bytes } => {
				let len = usize::try_from(bytes).unwrap_or(usize::MAX).min(self.max_read_len);
				let data = self.document.read_buffer(offset, len).await?;
				tracing::trace!(offset, requested = bytes, read = data.len(), "view.read_range");
				Ok(Some(HostMessage::ReadRangeResponse { data }))
			}
		}
	}
}

/// A document together with the views attached to it.
///
/// External changes to the resource revert the document, and every revert
/// tells each attached view to reload. Deleting the resource closes the
/// attached views. Disposing the session closes every view channel and
/// disposes the document.
pub struct DocumentSession {
	document: Arc<Document>,
	views: Arc<Mutex<Vec<ViewChannel>>>,
	watch: Mutex<Option<Subscription>>,
	stop: CancellationToken,
	max_read_len: usize,
	disposed: AtomicBool,
}

impl DocumentSession {
	/// Starts hosting `document`.
	///
	/// Must be called within a tokio runtime or with the worker fallback
	/// available, since reload forwarding runs on its own task.
	pub fn new(document: Document, max_read_len: usize) -> Self {
		let document = Arc::new(document);
		let views: Arc<Mutex<Vec<ViewChannel>>> = Arc::default();
		let stop = CancellationToken::new();

		hexite_worker::spawn(
			TaskClass::Background,
			forward_reloads(document.subscribe(), Arc::clone(&views), stop.clone()),
		);

		let on_change: Callback = {
			let document = Arc::clone(&document);
			Arc::new(move || document.revert())
		};
		let on_delete: Callback = {
			let document = Arc::clone(&document);
			Arc::new(move || document.mark_deleted())
		};
		let watch = match document.accessor().watch(on_change, on_delete) {
			Ok(subscription) => Some(subscription),
			Err(error) => {
				tracing::warn!(uri = %document.uri(), %error, "session.watch_failed");
				None
			}
		};

		Self {
			document,
			views,
			watch: Mutex::new(watch),
			stop,
			max_read_len,
			disposed: AtomicBool::new(false),
		}
	}

	pub fn document(&self) -> &Arc<Document> {
		&self.document
	}

	/// Handler for view channels created outside the session, such as by
	/// [`connect_stream`](hexite_rpc::connect_stream).
	pub fn handler(&self) -> ViewHandler {
		ViewHandler::new(Arc::clone(&self.document), self.max_read_len)
	}

	/// Creates a view channel sending through `transport` and attaches it.
	pub fn attach(&self, transport: impl Transport<HostMessage>) -> ViewChannel {
		let channel = RpcChannel::new(transport, self.handler());
		self.attach_view(channel.clone());
		channel
	}

	/// Attaches an existing view channel. A channel attached after disposal
	/// is closed immediately.
	pub fn attach_view(&self, channel: ViewChannel) {
		if self.disposed.load(Ordering::Acquire) {
			channel.close();
			return;
		}
		let mut views = self.views.lock();
		views.retain(|view| !view.is_closed());
		views.push(channel);
		tracing::debug!(uri = %self.document.uri(), views = views.len(), "session.attach");
	}

	/// Number of attached views that are still open.
	pub fn view_count(&self) -> usize {
		self.views.lock().iter().filter(|view| !view.is_closed()).count()
	}

	/// Stops watching, closes every view channel and disposes the document.
	/// Later calls do nothing.
	pub fn dispose(&self) {
		if self.disposed.swap(true, Ordering::AcqRel) {
			return;
		}
		if let Some(mut watch) = self.watch.lock().take() {
			watch.dispose();
		}
		self.stop.cancel();
		let views = std::mem::take(&mut *self.views.lock());
		for view in &views {
			view.close();
		}
		tracing::debug!(uri = %self.document.uri(), closed_views = views.len(), "session.dispose");
		self.document.dispose();
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::Acquire)
	}
}

impl Drop for DocumentSession {
	fn drop(&mut self) {
		self.dispose();
	}
}

impl std::fmt::Debug for DocumentSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DocumentSession")
			.field("document", &self.document)
			.field("views", &self.view_count())
			.field("disposed", &self.is_disposed())
			.finish()
	}
}

async fn forward_reloads(
	mut events: broadcast::Receiver<DocumentEvent>,
	views: Arc<Mutex<Vec<ViewChannel>>>,
	stop: CancellationToken,
) {
	loop {
		let event = tokio::select! {
			biased;
			() = stop.cancelled() => break,
			event = events.recv() => event,
		};
		match event {
			// Missed events still mean the views are stale.
			Ok(DocumentEvent::Reverted) | Err(broadcast::error::RecvError::Lagged(_)) => {
				let views = views.lock().clone();
				for view in views.iter().filter(|view| !view.is_closed()) {
					if let Err(error) = view.send_event(HostMessage::ReloadFromDisk) {
						tracing::debug!(%error, "session.reload_dropped");
					}
				}
			}
			// The views have nothing left to show.
			Ok(DocumentEvent::Deleted) => {
				let views = std::mem::take(&mut *views.lock());
				tracing::info!(closed_views = views.len(), "session.resource_deleted");
				for view in &views {
					view.close();
				}
			}
			Ok(DocumentEvent::Disposed) | Err(broadcast::error::RecvError::Closed) => break,
		}
	}
}
