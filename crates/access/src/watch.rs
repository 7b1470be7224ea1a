use std::ffi::OsString;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};

use crate::{AccessError, Callback, Result};

/// Keeps a change notification registration alive.
///
/// Notifications stop when the subscription is disposed or dropped.
#[must_use = "dropping a subscription stops notifications"]
pub struct Subscription {
	on_dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
	/// Creates a subscription that runs `on_dispose` when released.
	pub fn new(on_dispose: impl FnOnce() + Send + 'static) -> Self {
		Self {
			on_dispose: Some(Box::new(on_dispose)),
		}
	}

	/// A subscription with nothing behind it.
	pub fn inert() -> Self {
		Self { on_dispose: None }
	}

	/// Stops notifications. Later calls do nothing.
	pub fn dispose(&mut self) {
		if let Some(on_dispose) = self.on_dispose.take() {
			on_dispose();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.dispose();
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription").field("active", &self.on_dispose.is_some()).finish()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileEvent {
	Change,
	Delete,
}

fn classify(kind: &EventKind) -> Option<FileEvent> {
	match kind {
		EventKind::Create(_) => Some(FileEvent::Change),
		EventKind::Modify(ModifyKind::Metadata(_)) => None,
		EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(FileEvent::Delete),
		EventKind::Modify(_) => Some(FileEvent::Change),
		EventKind::Remove(_) => Some(FileEvent::Delete),
		EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
	}
}

fn touches(event: &Event, name: &OsString) -> bool {
	event.paths.iter().any(|p| p.file_name() == Some(name.as_os_str()))
}

/// Watches a single file for external changes.
///
/// The parent directory is watched non-recursively so that editors which
/// replace the file on save are still observed. Creates and content
/// modifications call `on_change`; removals and renames away call
/// `on_delete`.
pub fn watch_file(path: &Path, on_change: Callback, on_delete: Callback) -> Result<Subscription> {
	let watch_error = |error| AccessError::Watch {
		path: path.to_path_buf(),
		error,
	};
	let name = path
		.file_name()
		.map(OsString::from)
		.ok_or_else(|| AccessError::InvalidPath(path.display().to_string()))?;
	let parent = match path.parent() {
		Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
		_ => PathBuf::from("."),
	};

	let target = path.to_path_buf();
	let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
		Ok(event) if touches(&event, &name) => match classify(&event.kind) {
			Some(FileEvent::Change) => {
				tracing::trace!(path = %target.display(), "watch.change");
				on_change();
			}
			Some(FileEvent::Delete) => {
				tracing::debug!(path = %target.display(), "watch.delete");
				on_delete();
			}
			None => {}
		},
		Ok(_) => {}
		Err(error) => tracing::warn!(path = %target.display(), %error, "watch.error"),
	})
	.map_err(watch_error)?;
	watcher.watch(&parent, RecursiveMode::NonRecursive).map_err(watch_error)?;

	Ok(Subscription::new(move || drop(watcher)))
}
