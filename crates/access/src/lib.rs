//! Byte-range read capability shared by every kind of hexite resource.
//!
//! Consumers only see [`ByteRangeAccessor`]. Local files are read through a
//! [`NativeAccessor`], which funnels every read through a
//! [`HandleBroker`](hexite_broker::HandleBroker) so at most one file handle is
//! open at a time. Resources that cannot be read incrementally are wrapped
//! in a [`SnapshotAccessor`], and sources that serve arbitrary windows with no
//! known length use a [`RangeAccessor`]. [`open_accessor`] picks the right one
//! for a locator.
//!
//! Optional behaviour lives in separate capability traits ([`Invalidate`],
//! [`Dispose`]) reached through the accessor's `as_*` hooks.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

mod error;
mod native;
mod open;
mod range;
mod snapshot;
mod watch;

pub use error::{AccessError, Result};
pub use native::NativeAccessor;
pub use open::{AccessOptions, OpenContext, open_accessor};
pub use range::{RangeAccessor, RangeSource};
pub use snapshot::{ContentSource, FsContents, MemoryContents, SnapshotAccessor};
pub use watch::{Subscription, watch_file};

/// Notification callback passed to [`ByteRangeAccessor::watch`].
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Uniform read access to a byte-addressable resource.
#[async_trait]
pub trait ByteRangeAccessor: Send + Sync {
	/// Locator of the underlying resource.
	fn uri(&self) -> &Url;

	/// Whether reads touch only the requested window rather than loading the
	/// whole resource. Hosts may warn before opening large resources when this
	/// is false.
	fn supports_incremental_access(&self) -> bool {
		false
	}

	/// Byte length of the resource, or `None` when it is unbounded.
	async fn size(&self) -> Result<Option<u64>>;

	/// Reads bytes starting at `offset` into `buf`.
	///
	/// Returns how many bytes were written. Reads extending past the end of
	/// the resource return a short count, possibly 0, rather than an error.
	async fn read(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

	/// Calls `on_change` when the resource changes externally and
	/// `on_delete` when it disappears, until the subscription is dropped.
	fn watch(&self, on_change: Callback, on_delete: Callback) -> Result<Subscription>;

	/// Cache invalidation capability, when the accessor caches anything.
	fn as_invalidate(&self) -> Option<&dyn Invalidate> {
		None
	}

	/// Resource release capability, when the accessor holds anything.
	fn as_dispose(&self) -> Option<&dyn Dispose> {
		None
	}
}

/// Accessors that can forget cached contents.
pub trait Invalidate {
	/// Drops cached data so the next read or size query fetches afresh.
	fn invalidate(&self);
}

/// Accessors that hold releasable resources.
pub trait Dispose {
	/// Releases held resources. Calling it again has no effect.
	fn dispose(&self);
}
