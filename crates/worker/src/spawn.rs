use std::future::Future;
use std::sync::LazyLock;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::TaskClass;

/// Runtime for work started from plain threads, such as file watcher
/// callbacks.
static FALLBACK: LazyLock<Runtime> = LazyLock::new(|| {
	Builder::new_multi_thread()
		.worker_threads(2)
		.thread_name("hexite-fallback")
		.enable_all()
		.build()
		.expect("hexite fallback runtime must start")
});

/// Spawns an async task on the current runtime, or on the shared fallback
/// runtime when called outside of one.
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	match Handle::try_current() {
		Ok(current) => {
			tracing::trace!(worker_class = class.as_str(), "worker.spawn");
			current.spawn(fut)
		}
		Err(_) => {
			tracing::trace!(worker_class = class.as_str(), "worker.spawn_fallback");
			FALLBACK.spawn(fut)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn spawn_inside_runtime_uses_current_handle() {
		let value = spawn(TaskClass::Interactive, async { 21 * 2 }).await.expect("task panicked");
		assert_eq!(value, 42);
	}

	#[test]
	fn spawn_outside_runtime_falls_back_to_global() {
		let handle = spawn(TaskClass::Background, async { "done" });
		let (tx, rx) = std::sync::mpsc::channel();
		spawn(TaskClass::Background, async move {
			let _ = tx.send(handle.await.ok());
		});
		assert_eq!(rx.recv().expect("fallback runtime dropped the task"), Some("done"));
	}
}
