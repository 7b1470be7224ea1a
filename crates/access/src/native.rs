use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use hexite_broker::{FsSource, HandleBroker, file_len, read_at};
use url::Url;

use crate::{ByteRangeAccessor, Callback, Dispose, Result, Subscription, watch_file};

/// Incremental accessor for local files.
///
/// Every size query and read is exactly one borrow on a [`HandleBroker`], so
/// concurrent reads queue behind each other on a single file handle that is
/// released after `idle_close` of inactivity.
#[derive(Debug)]
pub struct NativeAccessor {
	uri: Url,
	broker: HandleBroker<FsSource>,
}

impl NativeAccessor {
	/// Creates an accessor for the file at `path`, identified by `uri`.
	pub fn new(uri: Url, path: impl Into<PathBuf>, idle_close: Duration) -> Self {
		Self {
			uri,
			broker: HandleBroker::with_idle_close(FsSource, path, idle_close),
		}
	}

	/// Local path of the file.
	pub fn path(&self) -> &Path {
		self.broker.path()
	}

	/// Broker serializing access to the file handle.
	pub fn broker(&self) -> &HandleBroker<FsSource> {
		&self.broker
	}
}

#[async_trait]
impl ByteRangeAccessor for NativeAccessor {
	fn uri(&self) -> &Url {
		&self.uri
	}

	fn supports_incremental_access(&self) -> bool {
		true
	}

	async fn size(&self) -> Result<Option<u64>> {
		let len = self.broker.borrow(|file| async move { file_len(file).await }.boxed()).await?;
		Ok(Some(len))
	}

	async fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
		let len = buf.len();
		let chunk = self
			.broker
			.borrow(move |file| {
				async move {
					let mut chunk = vec![0u8; len];
					let n = read_at(file, offset, &mut chunk).await?;
					chunk.truncate(n);
					Ok(chunk)
				}
				.boxed()
			})
			.await?;
		buf[..chunk.len()].copy_from_slice(&chunk);
		Ok(chunk.len())
	}

	fn watch(&self, on_change: Callback, on_delete: Callback) -> Result<Subscription> {
		watch_file(self.path(), on_change, on_delete)
	}

	fn as_dispose(&self) -> Option<&dyn Dispose> {
		Some(self)
	}
}

impl Dispose for NativeAccessor {
	fn dispose(&self) {
		self.broker.dispose();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn accessor_for(path: &Path) -> NativeAccessor {
		let uri = Url::from_file_path(path).expect("absolute temp path");
		NativeAccessor::new(uri, path, Duration::from_secs(1))
	}

	#[tokio::test]
	async fn short_resource_yields_short_read() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let path = dir.path().join("two.bin");
		tokio::fs::write(&path, [0xAB, 0xCD]).await?;
		let accessor = accessor_for(&path);

		let mut buf = [0u8; 4];
		assert_eq!(accessor.read(0, &mut buf).await?, 2);
		assert_eq!(&buf[..2], &[0xAB, 0xCD]);
		assert_eq!(accessor.read(10, &mut buf).await?, 0);
		assert_eq!(accessor.size().await?, Some(2));
		assert_eq!(accessor.broker().stats().opens, 1);
		Ok(())
	}

	#[tokio::test]
	async fn reads_after_dispose_fail_with_disposed() -> Result<()> {
		let dir = tempfile::tempdir()?;
		let path = dir.path().join("data.bin");
		tokio::fs::write(&path, b"abcdef").await?;
		let accessor = accessor_for(&path);

		let mut buf = [0u8; 3];
		assert_eq!(accessor.read(3, &mut buf).await?, 3);
		assert_eq!(&buf, b"def");

		let dispose = accessor.as_dispose().expect("native accessor is disposable");
		dispose.dispose();
		dispose.dispose();

		let err = accessor.read(0, &mut buf).await.expect_err("disposed");
		assert!(err.is_disposed());
		Ok(())
	}
}
