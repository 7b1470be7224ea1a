use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};
use hexite_access::{AccessOptions, ByteRangeAccessor, OpenContext, open_accessor};
use tokio::sync::broadcast;
use url::Url;

use crate::{HostError, Result};

const EVENT_CAPACITY: usize = 16;

/// Lifecycle notifications published by a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentEvent {
	/// Cached data was dropped; views should reload.
	Reverted,
	/// The backing resource was deleted.
	Deleted,
	/// The document was disposed. Sent once, last.
	Disposed,
}

/// One open binary resource.
pub struct Document {
	accessor: Arc<dyn ByteRangeAccessor>,
	base_address: u64,
	events: broadcast::Sender<DocumentEvent>,
	disposed: AtomicBool,
}

impl Document {
	/// Opens the resource at `uri`.
	///
	/// The `baseAddress` query parameter, hex with a `0x` prefix or decimal,
	/// sets the address shown for offset 0.
	pub async fn open(uri: &Url, ctx: OpenContext, options: &AccessOptions) -> Result<Self> {
		let base_address = parse_base_address(uri)?;
		let accessor = open_accessor(uri, ctx, options).await?;
		tracing::debug!(uri = %uri, base_address, "document.open");
		Ok(Self::from_accessor(accessor, base_address))
	}

	/// Wraps an already opened accessor.
	pub fn from_accessor(accessor: Arc<dyn ByteRangeAccessor>, base_address: u64) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self {
			accessor,
			base_address,
			events,
			disposed: AtomicBool::new(false),
		}
	}

	pub fn uri(&self) -> &Url {
		self.accessor.uri()
	}

	pub fn base_address(&self) -> u64 {
		self.base_address
	}

	pub fn accessor(&self) -> &Arc<dyn ByteRangeAccessor> {
		&self.accessor
	}

	fn ensure_live(&self) -> Result<()> {
		if self.disposed.load(Ordering::Acquire) {
			return Err(HostError::Disposed);
		}
		Ok(())
	}

	/// Resource length, `None` when unbounded.
	pub async fn size(&self) -> Result<Option<u64>> {
		self.ensure_live()?;
		Ok(self.accessor.size().await?)
	}

	/// Reads up to `len` bytes at `offset`, without edits.
	///
	/// The result is truncated to the bytes actually read.
	pub async fn read_buffer(&self, offset: u64, len: usize) -> Result<Bytes> {
		self.ensure_live()?;
		let mut buf = BytesMut::zeroed(len);
		let read = self.accessor.read(offset, &mut buf).await?;
		buf.truncate(read);
		Ok(buf.freeze())
	}

	/// Drops cached contents and announces [`DocumentEvent::Reverted`].
	pub fn revert(&self) {
		if self.disposed.load(Ordering::Acquire) {
			return;
		}
		if let Some(invalidate) = self.accessor.as_invalidate() {
			invalidate.invalidate();
		}
		tracing::debug!(uri = %self.uri(), "document.revert");
		self.publish(DocumentEvent::Reverted);
	}

	pub(crate) fn mark_deleted(&self) {
		if !self.disposed.load(Ordering::Acquire) {
			tracing::info!(uri = %self.uri(), "document.deleted");
			self.publish(DocumentEvent::Deleted);
		}
	}

	/// Announces [`DocumentEvent::Disposed`] and releases the accessor.
	/// Later calls do nothing.
	pub fn dispose(&self) {
		if self.disposed.swap(true, Ordering::AcqRel) {
			return;
		}
		tracing::debug!(uri = %self.uri(), "document.dispose");
		self.publish(DocumentEvent::Disposed);
		if let Some(dispose) = self.accessor.as_dispose() {
			dispose.dispose();
		}
	}

	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::Acquire)
	}

	/// Subscribes to lifecycle events published from now on.
	pub fn subscribe(&self) -> broadcast::Receiver<DocumentEvent> {
		self.events.subscribe()
	}

	fn publish(&self, event: DocumentEvent) {
		// No subscribers is fine.
		let _ = self.events.send(event);
	}
}

impl std::fmt::Debug for Document {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Document")
			.field("uri", &self.uri().as_str())
			.field("base_address", &self.base_address)
			.field("disposed", &self.is_disposed())
			.finish()
	}
}

/// Reads the `baseAddress` query parameter of `uri`. Absent or empty means 0.
pub fn parse_base_address(uri: &Url) -> Result<u64> {
	let Some((_, raw)) = uri.query_pairs().find(|(key, _)| key == "baseAddress") else {
		return Ok(0);
	};
	let value = raw.trim().to_ascii_lowercase();
	if value.is_empty() {
		return Ok(0);
	}
	let parsed = match value.strip_prefix("0x") {
		Some(hex) => u64::from_str_radix(hex, 16),
		None => value.parse(),
	};
	parsed.map_err(|_| HostError::InvalidBaseAddress(raw.into_owned()))
}
