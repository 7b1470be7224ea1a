use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hexite_broker::DEFAULT_IDLE_CLOSE;
use url::Url;

use crate::{
	AccessError, ByteRangeAccessor, ContentSource, FsContents, MemoryContents, NativeAccessor, RangeAccessor, RangeSource,
	Result, SnapshotAccessor,
};

/// Tunables applied when opening accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessOptions {
	/// Idle period after which a native accessor releases its file handle.
	pub idle_close: Duration,
}

impl Default for AccessOptions {
	fn default() -> Self {
		Self {
			idle_close: DEFAULT_IDLE_CLOSE,
		}
	}
}

/// Host-provided data for resources that are not plain local files.
#[derive(Clone, Default)]
pub struct OpenContext {
	/// Contents of an unsaved document.
	pub untitled_data: Option<Bytes>,
	/// Whole-resource reader for non-file schemes.
	pub contents: Option<Arc<dyn ContentSource>>,
	/// Windowed reader for unbounded non-file schemes.
	pub ranges: Option<Arc<dyn RangeSource>>,
}

impl std::fmt::Debug for OpenContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("OpenContext")
			.field("untitled_data", &self.untitled_data.as_ref().map(Bytes::len))
			.field("contents", &self.contents.is_some())
			.field("ranges", &self.ranges.is_some())
			.finish()
	}
}

/// Picks and constructs the accessor that fits `uri`.
///
/// Regular local files get a [`NativeAccessor`]. Local paths that are not
/// regular files, or cannot be inspected, fall back to whole-file snapshots
/// whose errors surface on first access.
pub async fn open_accessor(uri: &Url, ctx: OpenContext, options: &AccessOptions) -> Result<Arc<dyn ByteRangeAccessor>> {
	let accessor: Arc<dyn ByteRangeAccessor> = match uri.scheme() {
		"untitled" => {
			let data = ctx.untitled_data.unwrap_or_default();
			Arc::new(SnapshotAccessor::new(uri.clone(), MemoryContents::new(data)))
		}
		"file" => {
			let path = uri.to_file_path().map_err(|()| AccessError::InvalidPath(uri.to_string()))?;
			match tokio::fs::metadata(&path).await {
				Ok(meta) if meta.is_file() => Arc::new(NativeAccessor::new(uri.clone(), path, options.idle_close)),
				_ => Arc::new(SnapshotAccessor::new(uri.clone(), FsContents::new(path))),
			}
		}
		scheme => match (ctx.contents, ctx.ranges) {
			(Some(contents), _) => Arc::new(SnapshotAccessor::new(uri.clone(), contents)),
			(None, Some(ranges)) => Arc::new(RangeAccessor::new(uri.clone(), ranges)),
			(None, None) => return Err(AccessError::UnsupportedScheme(scheme.to_owned())),
		},
	};
	tracing::debug!(
		uri = %uri,
		incremental = accessor.supports_incremental_access(),
		"access.open"
	);
	Ok(accessor)
}
