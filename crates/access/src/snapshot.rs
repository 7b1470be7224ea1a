use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use url::Url;

use crate::{AccessError, ByteRangeAccessor, Callback, Dispose, Invalidate, Result, Subscription, watch_file};

/// Whole-resource fetch used by [`SnapshotAccessor`].
#[async_trait]
pub trait ContentSource: Send + Sync {
	/// Fetches the complete current contents.
	async fn fetch(&self) -> io::Result<Bytes>;

	/// Local file to watch for external changes, if there is one.
	fn watch_path(&self) -> Option<&Path> {
		None
	}
}

#[async_trait]
impl<T: ContentSource + ?Sized> ContentSource for Arc<T> {
	async fn fetch(&self) -> io::Result<Bytes> {
		(**self).fetch().await
	}

	fn watch_path(&self) -> Option<&Path> {
		(**self).watch_path()
	}
}

/// Reads a whole local file on every fetch.
#[derive(Debug, Clone)]
pub struct FsContents {
	path: PathBuf,
}

impl FsContents {
	/// Creates a source for the file at `path`.
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

#[async_trait]
impl ContentSource for FsContents {
	async fn fetch(&self) -> io::Result<Bytes> {
		tokio::fs::read(&self.path).await.map(Bytes::from)
	}

	fn watch_path(&self) -> Option<&Path> {
		Some(&self.path)
	}
}

/// Fixed in-memory contents, used for documents that were never saved.
#[derive(Debug, Clone, Default)]
pub struct MemoryContents(Bytes);

impl MemoryContents {
	/// Wraps `data`.
	pub fn new(data: impl Into<Bytes>) -> Self {
		Self(data.into())
	}
}

#[async_trait]
impl ContentSource for MemoryContents {
	async fn fetch(&self) -> io::Result<Bytes> {
		Ok(self.0.clone())
	}
}

#[derive(Default)]
struct Cache {
	generation: u64,
	contents: Option<Bytes>,
}

/// Accessor that loads the whole resource once and serves reads from memory.
///
/// The snapshot is fetched on the first read or size query and kept until
/// [`Invalidate::invalidate`] is called.
pub struct SnapshotAccessor<C> {
	uri: Url,
	source: C,
	cache: Mutex<Cache>,
	fetch_gate: tokio::sync::Mutex<()>,
	disposed: AtomicBool,
}

impl<C: ContentSource> SnapshotAccessor<C> {
	/// Creates an accessor identified by `uri` over `source`.
	pub fn new(uri: Url, source: C) -> Self {
		Self {
			uri,
			source,
			cache: Mutex::new(Cache::default()),
			fetch_gate: tokio::sync::Mutex::new(()),
			disposed: AtomicBool::new(false),
		}
	}

	fn cached(&self) -> Option<Bytes> {
		self.cache.lock().contents.clone()
	}

	async fn contents(&self) -> Result<Bytes> {
		if self.disposed.load(Ordering::Acquire) {
			return Err(AccessError::Disposed);
		}
		if let Some(contents) = self.cached() {
			return Ok(contents);
		}

		let _gate = self.fetch_gate.lock().await;
		// Another reader may have filled the cache while we waited.
		if let Some(contents) = self.cached() {
			return Ok(contents);
		}

		let generation = self.cache.lock().generation;
		let fetched = self.source.fetch().await?;
		let mut cache = self.cache.lock();
		// An invalidation during the fetch means this data may already be stale.
		if cache.generation == generation {
			cache.contents = Some(fetched.clone());
		}
		Ok(fetched)
	}
}

#[async_trait]
impl<C: ContentSource> ByteRangeAccessor for SnapshotAccessor<C> {
	fn uri(&self) -> &Url {
		&self.uri
	}

	async fn size(&self) -> Result<Option<u64>> {
		Ok(Some(self.contents().await?.len() as u64))
	}

	async fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
		let contents = self.contents().await?;
		let Ok(start) = usize::try_from(offset) else {
			return Ok(0);
		};
		if start >= contents.len() {
			return Ok(0);
		}
		let n = buf.len().min(contents.len() - start);
		buf[..n].copy_from_slice(&contents[start..start + n]);
		Ok(n)
	}

	fn watch(&self, on_change: Callback, on_delete: Callback) -> Result<Subscription> {
		match self.source.watch_path() {
			Some(path) => watch_file(path, on_change, on_delete),
			None => Ok(Subscription::inert()),
		}
	}

	fn as_invalidate(&self) -> Option<&dyn Invalidate> {
		Some(self)
	}

	fn as_dispose(&self) -> Option<&dyn Dispose> {
		Some(self)
	}
}

impl<C> Invalidate for SnapshotAccessor<C> {
	fn invalidate(&self) {
		let mut cache = self.cache.lock();
		cache.generation = cache.generation.wrapping_add(1);
		cache.contents = None;
	}
}

impl<C> Dispose for SnapshotAccessor<C> {
	fn dispose(&self) {
		self.disposed.store(true, Ordering::Release);
		self.cache.lock().contents = None;
	}
}

impl<C> std::fmt::Debug for SnapshotAccessor<C> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SnapshotAccessor")
			.field("uri", &self.uri.as_str())
			.field("cached", &self.cache.lock().contents.as_ref().map(Bytes::len))
			.field("disposed", &self.disposed.load(Ordering::Acquire))
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use super::*;

	/// Serves a new version of its contents on every fetch.
	#[derive(Default)]
	struct VersionedSource {
		fetches: AtomicUsize,
	}

	#[async_trait]
	impl ContentSource for VersionedSource {
		async fn fetch(&self) -> io::Result<Bytes> {
			let version = self.fetches.fetch_add(1, Ordering::SeqCst);
			Ok(Bytes::from(format!("v{version}:payload")))
		}
	}

	fn uri() -> Url {
		Url::parse("untitled:Untitled-1").expect("valid url")
	}

	#[tokio::test]
	async fn read_copies_available_bytes_only() -> Result<()> {
		let accessor = SnapshotAccessor::new(uri(), MemoryContents::new(&b"hello"[..]));
		let mut buf = [0u8; 4];

		assert_eq!(accessor.read(3, &mut buf).await?, 2);
		assert_eq!(&buf[..2], b"lo");
		assert_eq!(accessor.read(5, &mut buf).await?, 0);
		assert_eq!(accessor.read(u64::MAX, &mut buf).await?, 0);
		assert_eq!(accessor.size().await?, Some(5));
		Ok(())
	}

	#[tokio::test]
	async fn contents_are_fetched_once_until_invalidated() -> Result<()> {
		let accessor = SnapshotAccessor::new(uri(), VersionedSource::default());
		let mut buf = [0u8; 2];

		accessor.read(0, &mut buf).await?;
		assert_eq!(&buf, b"v0");
		accessor.read(0, &mut buf).await?;
		accessor.size().await?;
		assert_eq!(accessor.source.fetches.load(Ordering::SeqCst), 1);

		accessor.as_invalidate().expect("snapshot is invalidatable").invalidate();
		accessor.read(0, &mut buf).await?;
		assert_eq!(&buf, b"v1");
		assert_eq!(accessor.source.fetches.load(Ordering::SeqCst), 2);
		Ok(())
	}

	#[tokio::test]
	async fn concurrent_first_reads_share_one_fetch() -> Result<()> {
		let accessor = SnapshotAccessor::new(uri(), VersionedSource::default());
		let (mut a, mut b) = ([0u8; 2], [0u8; 2]);

		let (ra, rb) = tokio::join!(accessor.read(0, &mut a), accessor.read(0, &mut b));
		ra?;
		rb?;
		assert_eq!(a, b);
		assert_eq!(accessor.source.fetches.load(Ordering::SeqCst), 1);
		Ok(())
	}

	#[tokio::test]
	async fn missing_file_surfaces_on_first_access() {
		let dir = tempfile::tempdir().expect("tempdir");
		let uri = Url::from_file_path(dir.path().join("gone.bin")).expect("absolute path");
		let accessor = SnapshotAccessor::new(uri, FsContents::new(dir.path().join("gone.bin")));

		let err = accessor.size().await.expect_err("missing file");
		assert_eq!(err.io_kind(), Some(io::ErrorKind::NotFound));
	}

	#[tokio::test]
	async fn disposed_snapshot_rejects_reads() {
		let accessor = SnapshotAccessor::new(uri(), MemoryContents::new(&b"abc"[..]));
		accessor.dispose();
		accessor.dispose();

		let mut buf = [0u8; 1];
		assert!(accessor.read(0, &mut buf).await.expect_err("disposed").is_disposed());
	}
}
