//! Handle broker worker and its public front.
//!
//! All handle state lives on a single worker task. The front ([`HandleBroker`])
//! only enqueues commands, so the FIFO order of the command channel is the
//! execution order and no lock guards the handle.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use hexite_worker::TaskClass;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{BrokerError, Result};
use crate::source::HandleSource;

/// Quiet period after which an unused handle is closed.
pub const DEFAULT_IDLE_CLOSE: Duration = Duration::from_secs(1);

type Job<H> = Box<dyn for<'h> FnOnce(Result<&'h mut H>) -> BoxFuture<'h, ()> + Send>;

fn job<H, F>(f: F) -> Job<H>
where
	F: for<'h> FnOnce(Result<&'h mut H>) -> BoxFuture<'h, ()> + Send + 'static,
{
	Box::new(f)
}

enum Command<H> {
	Borrow(Job<H>),
	Close(oneshot::Sender<Result<()>>),
}

#[derive(Debug, Default)]
struct Counters {
	opens: AtomicU64,
	closes: AtomicU64,
	open: AtomicBool,
}

/// Point-in-time view of a broker's handle lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
	/// Successful handle opens since creation.
	pub opens: u64,
	/// Handle closes since creation (idle, explicit, or on dispose).
	pub closes: u64,
	/// Whether a handle is open right now.
	pub open: bool,
}

/// Serializes every operation against one lazily opened resource handle.
///
/// Operations submitted through [`borrow`](Self::borrow) run strictly in
/// submission order, each with exclusive access to the handle. The handle is
/// opened when the first operation needs it and closed after
/// `idle_close` without work. Dropping the broker disposes it.
pub struct HandleBroker<S: HandleSource> {
	path: PathBuf,
	tx: mpsc::UnboundedSender<Command<S::Handle>>,
	dispose: CancellationToken,
	counters: Arc<Counters>,
}

impl<S: HandleSource> HandleBroker<S> {
	/// Creates a broker for `path` using the default idle-close period.
	pub fn new(source: S, path: impl Into<PathBuf>) -> Self {
		Self::with_idle_close(source, path, DEFAULT_IDLE_CLOSE)
	}

	/// Creates a broker for `path` that closes its handle after `idle_close`
	/// without queued work.
	pub fn with_idle_close(source: S, path: impl Into<PathBuf>, idle_close: Duration) -> Self {
		let path = path.into();
		let (tx, rx) = mpsc::unbounded_channel();
		let dispose = CancellationToken::new();
		let counters = Arc::new(Counters::default());

		let worker = Worker {
			source,
			path: path.clone(),
			handle: None,
			idle_close,
			rx,
			dispose: dispose.clone(),
			counters: Arc::clone(&counters),
		};
		hexite_worker::spawn(TaskClass::Io, worker.run());

		Self {
			path,
			tx,
			dispose,
			counters,
		}
	}

	/// Path of the brokered resource.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Queues `op` for exclusive use of the handle.
	///
	/// The operation is enqueued before this returns; the returned future
	/// only waits for its outcome. It resolves with the operation's result,
	/// with [`BrokerError::Open`] if the handle could not be opened, or with
	/// [`BrokerError::Disposed`] if the broker is or becomes disposed before
	/// the operation completes.
	///
	/// The handle reference must not escape `op`.
	pub fn borrow<R, F>(&self, op: F) -> PendingBorrow<R>
	where
		R: Send + 'static,
		F: for<'h> FnOnce(&'h mut S::Handle) -> BoxFuture<'h, io::Result<R>> + Send + 'static,
	{
		if self.dispose.is_cancelled() {
			return PendingBorrow { rx: None };
		}

		let (reply_tx, reply_rx) = oneshot::channel();
		let command: Command<S::Handle> = Command::Borrow(job(move |handle| {
			async move {
				let result = match handle {
					Ok(handle) => op(handle).await.map_err(BrokerError::operation),
					Err(err) => Err(err),
				};
				let _ = reply_tx.send(result);
			}
			.boxed()
		}));

		match self.tx.send(command) {
			Ok(()) => PendingBorrow { rx: Some(reply_rx) },
			Err(_) => PendingBorrow { rx: None },
		}
	}

	/// Closes the handle if it is open, after all previously queued work.
	///
	/// The broker stays usable; the next borrow reopens the handle.
	pub async fn close(&self) -> Result<()> {
		let (ack_tx, ack_rx) = oneshot::channel();
		if self.dispose.is_cancelled() || self.tx.send(Command::Close(ack_tx)).is_err() {
			return Ok(());
		}
		ack_rx.await.unwrap_or(Ok(()))
	}

	/// Permanently disposes the broker.
	///
	/// Queued and in-flight operations resolve with
	/// [`BrokerError::Disposed`], later borrows are rejected without being
	/// queued, and the handle is released. Calling this more than once has no
	/// further effect.
	pub fn dispose(&self) {
		if !self.dispose.is_cancelled() {
			tracing::debug!(path = %self.path.display(), "broker.dispose");
		}
		self.dispose.cancel();
	}

	/// Returns true once [`dispose`](Self::dispose) has been called.
	pub fn is_disposed(&self) -> bool {
		self.dispose.is_cancelled()
	}

	/// Returns handle lifecycle counters.
	pub fn stats(&self) -> BrokerStats {
		BrokerStats {
			opens: self.counters.opens.load(Ordering::Acquire),
			closes: self.counters.closes.load(Ordering::Acquire),
			open: self.counters.open.load(Ordering::Acquire),
		}
	}
}

impl<S: HandleSource> Drop for HandleBroker<S> {
	fn drop(&mut self) {
		self.dispose.cancel();
	}
}

impl<S: HandleSource> std::fmt::Debug for HandleBroker<S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HandleBroker")
			.field("path", &self.path)
			.field("disposed", &self.is_disposed())
			.field("stats", &self.stats())
			.finish()
	}
}

/// Outcome of a queued [`HandleBroker::borrow`].
#[must_use = "the operation runs regardless, but its result is only observable through this future"]
#[derive(Debug)]
pub struct PendingBorrow<R> {
	rx: Option<oneshot::Receiver<Result<R>>>,
}

impl<R> Future for PendingBorrow<R> {
	type Output = Result<R>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match self.rx.as_mut() {
			None => Poll::Ready(Err(BrokerError::Disposed)),
			// A dropped sender means the job was discarded by disposal.
			Some(rx) => Pin::new(rx).poll(cx).map(|reply| reply.unwrap_or(Err(BrokerError::Disposed))),
		}
	}
}

struct Worker<S: HandleSource> {
	source: S,
	path: PathBuf,
	handle: Option<S::Handle>,
	idle_close: Duration,
	rx: mpsc::UnboundedReceiver<Command<S::Handle>>,
	dispose: CancellationToken,
	counters: Arc<Counters>,
}

impl<S: HandleSource> Worker<S> {
	async fn run(mut self) {
		loop {
			// The sleep is recreated every iteration, so any command re-arms
			// the idle window from scratch.
			let command = tokio::select! {
				biased;

				() = self.dispose.cancelled() => break,

				command = self.rx.recv() => match command {
					Some(command) => command,
					None => break,
				},

				() = tokio::time::sleep(self.idle_close), if self.handle.is_some() => {
					tracing::debug!(path = %self.path.display(), "broker.idle_close");
					if let Err(e) = self.close_handle().await {
						tracing::warn!(path = %self.path.display(), error = %e, "broker.close_failed");
					}
					continue;
				}
			};

			match command {
				Command::Borrow(job) => self.run_job(job).await,
				Command::Close(ack) => {
					let _ = ack.send(self.close_handle().await);
				}
			}
		}

		self.shutdown().await;
	}

	async fn run_job(&mut self, job: Job<S::Handle>) {
		if self.handle.is_none() {
			match self.source.open(&self.path).await {
				Ok(handle) => {
					self.handle = Some(handle);
					self.counters.opens.fetch_add(1, Ordering::AcqRel);
					self.counters.open.store(true, Ordering::Release);
					tracing::debug!(path = %self.path.display(), "broker.open");
				}
				Err(e) => {
					let err = BrokerError::open(&self.path, e);
					tracing::warn!(path = %self.path.display(), error = %err, "broker.open_failed");
					job(Err(err.clone())).await;
					self.reject_queued(&err).await;
					return;
				}
			}
		}

		let Some(handle) = self.handle.as_mut() else {
			return;
		};
		tokio::select! {
			biased;
			// Dropping the job drops its reply sender; the borrower sees Disposed.
			() = self.dispose.cancelled() => {}
			() = job(Ok(handle)) => {}
		}
	}

	/// Fails every command currently waiting in the queue with `err`.
	async fn reject_queued(&mut self, err: &BrokerError) {
		let mut rejected = 0usize;
		while let Ok(command) = self.rx.try_recv() {
			match command {
				Command::Borrow(job) => {
					job(Err(err.clone())).await;
					rejected += 1;
				}
				Command::Close(ack) => {
					let _ = ack.send(Ok(()));
				}
			}
		}
		if rejected > 0 {
			tracing::debug!(path = %self.path.display(), rejected, "broker.reject_queued");
		}
	}

	async fn close_handle(&mut self) -> Result<()> {
		let Some(handle) = self.handle.take() else {
			return Ok(());
		};
		self.counters.open.store(false, Ordering::Release);
		self.counters.closes.fetch_add(1, Ordering::AcqRel);
		self.source.close(handle).await.map_err(BrokerError::operation)
	}

	async fn shutdown(mut self) {
		self.rx.close();
		self.reject_queued(&BrokerError::Disposed).await;
		if let Err(e) = self.close_handle().await {
			tracing::warn!(path = %self.path.display(), error = %e, "broker.close_failed");
		}
	}
}
