use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::Path;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Opens and closes the handles a [`HandleBroker`](crate::HandleBroker) hands out.
pub trait HandleSource: Send + Sync + 'static {
	/// Handle type lent to borrowed operations.
	type Handle: Send + 'static;

	/// Opens the resource at `path`, creating it if missing, for read/write.
	fn open(&self, path: &Path) -> impl Future<Output = io::Result<Self::Handle>> + Send;

	/// Releases a handle previously returned by [`Self::open`].
	fn close(&self, handle: Self::Handle) -> impl Future<Output = io::Result<()>> + Send;
}

/// Native filesystem handles backed by [`tokio::fs::File`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl HandleSource for FsSource {
	type Handle = File;

	async fn open(&self, path: &Path) -> io::Result<File> {
		OpenOptions::new().read(true).write(true).create(true).truncate(false).open(path).await
	}

	async fn close(&self, mut handle: File) -> io::Result<()> {
		handle.flush().await
	}
}

/// Reads from `file` at `offset` until `buf` is full or end of file.
///
/// Returns the number of bytes written into `buf`; offsets past the end
/// yield 0.
pub async fn read_at(file: &mut File, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
	file.seek(SeekFrom::Start(offset)).await?;
	let mut filled = 0;
	while filled < buf.len() {
		match file.read(&mut buf[filled..]).await {
			Ok(0) => break,
			Ok(n) => filled += n,
			Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
			Err(e) => return Err(e),
		}
	}
	Ok(filled)
}

/// Returns the current length of `file`.
pub async fn file_len(file: &File) -> io::Result<u64> {
	Ok(file.metadata().await?.len())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn fs_source_creates_missing_file() -> io::Result<()> {
		let dir = tempfile::tempdir()?;
		let path = dir.path().join("fresh.bin");
		let file = FsSource.open(&path).await?;
		assert_eq!(file_len(&file).await?, 0);
		FsSource.close(file).await?;
		assert!(path.exists());
		Ok(())
	}

	#[tokio::test]
	async fn read_at_stops_at_end_of_file() -> io::Result<()> {
		let dir = tempfile::tempdir()?;
		let path = dir.path().join("data.bin");
		tokio::fs::write(&path, b"0123456789").await?;

		let mut file = FsSource.open(&path).await?;
		let mut buf = [0u8; 4];
		assert_eq!(read_at(&mut file, 8, &mut buf).await?, 2);
		assert_eq!(&buf[..2], b"89");
		assert_eq!(read_at(&mut file, 20, &mut buf).await?, 0);
		Ok(())
	}
}
