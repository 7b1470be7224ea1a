use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::{ByteRangeAccessor, Callback, Result, Subscription};

/// Source that serves arbitrary byte windows of a resource with no known end.
#[async_trait]
pub trait RangeSource: Send + Sync {
	/// Returns up to `len` bytes starting at `offset`. Fewer bytes mean the
	/// window ran past the available data.
	async fn read_range(&self, offset: u64, len: usize) -> io::Result<Bytes>;
}

#[async_trait]
impl<T: RangeSource + ?Sized> RangeSource for Arc<T> {
	async fn read_range(&self, offset: u64, len: usize) -> io::Result<Bytes> {
		(**self).read_range(offset, len).await
	}
}

/// Accessor for unbounded resources such as process memory.
///
/// Every read fetches exactly the requested window; nothing is cached.
#[derive(Debug)]
pub struct RangeAccessor<R> {
	uri: Url,
	source: R,
}

impl<R: RangeSource> RangeAccessor<R> {
	/// Creates an accessor identified by `uri` over `source`.
	pub fn new(uri: Url, source: R) -> Self {
		Self { uri, source }
	}
}

#[async_trait]
impl<R: RangeSource> ByteRangeAccessor for RangeAccessor<R> {
	fn uri(&self) -> &Url {
		&self.uri
	}

	fn supports_incremental_access(&self) -> bool {
		true
	}

	async fn size(&self) -> Result<Option<u64>> {
		Ok(None)
	}

	async fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
		let window = self.source.read_range(offset, buf.len()).await?;
		let n = window.len().min(buf.len());
		buf[..n].copy_from_slice(&window[..n]);
		Ok(n)
	}

	fn watch(&self, _on_change: Callback, _on_delete: Callback) -> Result<Subscription> {
		Ok(Subscription::inert())
	}
}
