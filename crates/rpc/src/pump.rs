//! Binds an [`RpcChannel`] to a framed byte stream.

use std::time::Duration;

use hexite_worker::TaskClass;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{DEFAULT_MAX_FRAME_LEN, Envelope, InboundHandler, Result, RpcChannel, read_frame, write_frame};

/// Stream transport tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
	/// Largest accepted frame payload in either direction.
	pub max_frame_len: usize,
	/// Reply deadline used by [`RpcChannel::request`]; `None` waits forever.
	pub request_timeout: Option<Duration>,
}

impl Default for StreamOptions {
	fn default() -> Self {
		Self {
			max_frame_len: DEFAULT_MAX_FRAME_LEN,
			request_timeout: None,
		}
	}
}

/// Connects a new channel to `reader`/`writer`.
///
/// The returned task reads frames into [`RpcChannel::handle_message`] and
/// writes outbound envelopes as frames. A clean end of input closes the
/// channel; a read or write failure closes it and is returned from the task.
/// Envelopes queued before the channel closed are still written.
pub fn connect_stream<Out, In, R, W, H>(
	reader: R,
	writer: W,
	handler: H,
	options: StreamOptions,
) -> (RpcChannel<Out, In>, JoinHandle<Result<()>>)
where
	Out: Serialize + Send + Sync + 'static,
	In: DeserializeOwned + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
	W: AsyncWrite + Unpin + Send + 'static,
	H: InboundHandler<In, Out>,
{
	let (tx, rx) = mpsc::unbounded_channel();
	let channel = RpcChannel::with_request_timeout(tx, handler, options.request_timeout);
	let task = hexite_worker::spawn(TaskClass::Io, pump(channel.clone(), reader, writer, rx, options));
	(channel, task)
}

async fn pump<Out, In, R, W>(
	channel: RpcChannel<Out, In>,
	mut reader: R,
	mut writer: W,
	mut outgoing: mpsc::UnboundedReceiver<Envelope<Out>>,
	options: StreamOptions,
) -> Result<()>
where
	Out: Serialize + Send + Sync + 'static,
	In: DeserializeOwned + Send + 'static,
	R: AsyncRead + Unpin,
	W: AsyncWrite + Unpin,
{
	let max = options.max_frame_len;

	let read_loop = async {
		let result = loop {
			let frame = tokio::select! {
				biased;
				() = channel.closed() => break Ok(()),
				frame = read_frame::<_, Envelope<In>>(&mut reader, max) => frame,
			};
			match frame {
				Ok(Some(envelope)) => channel.handle_message(envelope),
				Ok(None) => {
					tracing::debug!("rpc.eof");
					break Ok(());
				}
				Err(e) => break Err(e),
			}
		};
		channel.close();
		result
	};

	let write_loop = async {
		let result = async {
			loop {
				// Queued envelopes win over closure so replies sent just before
				// close still reach the peer.
				let envelope = tokio::select! {
					biased;
					envelope = outgoing.recv() => envelope,
					() = channel.closed() => None,
				};
				let Some(envelope) = envelope else {
					break;
				};
				write_frame(&mut writer, &envelope, max).await?;
				writer.flush().await?;
			}
			writer.shutdown().await?;
			Ok(())
		}
		.await;
		channel.close();
		result
	};

	let (read, write) = tokio::join!(read_loop, write_loop);
	if let Err(e) = &read {
		tracing::warn!(error = %e, "rpc.read_failed");
	}
	if let Err(e) = &write {
		tracing::warn!(error = %e, "rpc.write_failed");
	}
	read.and(write)
}
