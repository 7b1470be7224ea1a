use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use super::*;
use crate::{HandlerError, IgnoreInbound, handler_fn};

type Wire = mpsc::UnboundedReceiver<Envelope<String>>;

/// Records every inbound body, fails on "fail", stays silent on "event:*"
/// and echoes everything else.
struct Recorder {
	seen: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl InboundHandler<String, String> for Recorder {
	async fn handle(&self, body: String) -> std::result::Result<Option<String>, HandlerError> {
		let _ = self.seen.send(body.clone());
		if body == "fail" {
			return Err("handler exploded".into());
		}
		if body.starts_with("event:") {
			return Ok(None);
		}
		Ok(Some(format!("re:{body}")))
	}
}

fn recorded() -> (RpcChannel<String, String>, Wire, mpsc::UnboundedReceiver<String>) {
	let (wire_tx, wire) = mpsc::unbounded_channel();
	let (seen, seen_rx) = mpsc::unbounded_channel();
	(RpcChannel::new(wire_tx, Recorder { seen }), wire, seen_rx)
}

fn reply(message_id: u64, in_reply_to: u64, body: &str) -> Envelope<String> {
	Envelope {
		message_id: MessageId(message_id),
		in_reply_to: Some(MessageId(in_reply_to)),
		body: body.to_owned(),
	}
}

fn message(message_id: u64, body: &str) -> Envelope<String> {
	Envelope {
		message_id: MessageId(message_id),
		in_reply_to: None,
		body: body.to_owned(),
	}
}

async fn next(wire: &mut Wire) -> Envelope<String> {
	wire.recv().await.expect("channel transport is alive")
}

#[tokio::test]
async fn reply_resolves_matching_request_and_clears_entry() -> Result<()> {
	let (channel, mut wire, _seen) = recorded();

	let pending = channel.send_request("metadata".into());
	assert_eq!(pending.id(), Some(MessageId(0)));
	let sent = next(&mut wire).await;
	assert_eq!(sent, message(0, "metadata"));
	assert_eq!(channel.pending_len(), 1);

	channel.handle_message(reply(0, 0, "size=10"));
	assert_eq!(pending.await?, "size=10");
	assert_eq!(channel.pending_len(), 0);
	Ok(())
}

#[tokio::test]
async fn duplicate_and_stale_replies_are_dropped() -> Result<()> {
	let (channel, mut wire, _seen) = recorded();

	let first = channel.send_request("a".into());
	next(&mut wire).await;
	channel.handle_message(reply(0, 0, "first"));
	channel.handle_message(reply(1, 0, "duplicate"));
	assert_eq!(first.await?, "first");

	let second = channel.send_request("b".into());
	assert_eq!(next(&mut wire).await.message_id, MessageId(1));
	channel.handle_message(reply(2, 0, "stale"));
	channel.handle_message(reply(3, 42, "unknown"));
	assert_eq!(channel.pending_len(), 1);

	channel.handle_message(reply(4, 1, "second"));
	assert_eq!(second.await?, "second");
	Ok(())
}

#[tokio::test]
async fn events_never_allocate_pending_entries() -> Result<()> {
	let (channel, mut wire, _seen) = recorded();

	assert_eq!(channel.send_event("reload".into())?, MessageId(0));
	assert_eq!(channel.pending_len(), 0);
	assert_eq!(next(&mut wire).await, message(0, "reload"));
	Ok(())
}

#[tokio::test]
async fn interleaved_event_does_not_resolve_pending_request() -> Result<()> {
	let (channel, mut wire, mut seen) = recorded();

	let ready = channel.send_request("ReadyRequest".into());
	assert_eq!(next(&mut wire).await.message_id, MessageId(0));

	// Same numeric id as our outstanding request, but not a reply.
	channel.handle_message(message(0, "event:reload"));
	assert_eq!(seen.recv().await.as_deref(), Some("event:reload"));
	assert_eq!(channel.pending_len(), 1);

	channel.handle_message(reply(1, 0, "ReadyResponse"));
	assert_eq!(ready.await?, "ReadyResponse");
	Ok(())
}

#[tokio::test]
async fn requests_events_and_replies_share_one_id_sequence() -> Result<()> {
	let (channel, mut wire, _seen) = recorded();

	channel.send_event("hello".into())?;
	let _pending = channel.send_request("query".into());
	channel.handle_message(message(5, "ping"));

	assert_eq!(next(&mut wire).await.message_id, MessageId(0));
	assert_eq!(next(&mut wire).await.message_id, MessageId(1));
	assert_eq!(next(&mut wire).await, reply(2, 5, "re:ping"));
	Ok(())
}

#[tokio::test]
async fn failing_or_silent_handlers_send_nothing() {
	let (channel, mut wire, mut seen) = recorded();

	channel.handle_message(message(0, "fail"));
	channel.handle_message(message(1, "event:changed"));
	channel.handle_message(message(2, "ok"));

	for expected in ["fail", "event:changed", "ok"] {
		assert_eq!(seen.recv().await.as_deref(), Some(expected));
	}
	assert_eq!(next(&mut wire).await, reply(0, 2, "re:ok"));
	assert!(wire.try_recv().is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handlers_start_in_delivery_order_on_worker_threads() {
	let expected: Vec<String> = (0..8).map(|i| format!("event:{i}")).collect();
	for _ in 0..50 {
		let (channel, _wire, mut seen) = recorded();
		let bodies = expected.clone();
		// Deliver from a runtime task, where freshly spawned work is most
		// likely to be reordered.
		let channel = tokio::spawn(async move {
			for (id, body) in (0u64..).zip(&bodies) {
				channel.handle_message(message(id, body));
			}
			channel
		})
		.await
		.expect("delivery task panicked");

		let mut order = Vec::new();
		for _ in 0..expected.len() {
			order.push(seen.recv().await.expect("handler ran"));
		}
		assert_eq!(order, expected);
		drop(channel);
	}
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn request_applies_the_channel_timeout() {
	let (wire_tx, mut wire) = mpsc::unbounded_channel();
	let channel: RpcChannel<String, String> =
		RpcChannel::with_request_timeout(wire_tx, IgnoreInbound, Some(Duration::from_millis(30)));

	let err = channel.request("slow".into()).await.expect_err("no reply arrives");
	assert!(matches!(err, RpcError::Timeout(d) if d == Duration::from_millis(30)));
	assert_eq!(next(&mut wire).await, message(0, "slow"));
	assert_eq!(channel.pending_len(), 0);
}

#[tokio::test]
async fn close_rejects_pending_and_later_sends() {
	let (channel, _wire, _seen) = recorded();

	let pending = channel.send_request("never".into());
	channel.close();
	channel.close();

	assert!(matches!(pending.await, Err(RpcError::Closed)));
	assert!(matches!(channel.send_event("late".into()), Err(RpcError::Closed)));
	let rejected = channel.send_request("late".into());
	assert_eq!(rejected.id(), None);
	assert!(matches!(rejected.await, Err(RpcError::Closed)));
	assert!(channel.is_closed());
	assert_eq!(channel.pending_len(), 0);
}

#[tokio::test]
async fn close_cancels_in_flight_handlers() {
	let (wire_tx, mut wire) = mpsc::unbounded_channel();
	let release = Arc::new(Notify::new());
	let entered = Arc::new(Notify::new());
	let handler = {
		let release = Arc::clone(&release);
		let entered = Arc::clone(&entered);
		handler_fn(move |body: String| {
			let release = Arc::clone(&release);
			let entered = Arc::clone(&entered);
			async move {
				entered.notify_one();
				release.notified().await;
				Ok::<_, HandlerError>(Some(body))
			}
		})
	};
	let channel: RpcChannel<String, String> = RpcChannel::new(wire_tx, handler);

	channel.handle_message(message(0, "slow"));
	entered.notified().await;
	channel.close();
	release.notify_one();
	for _ in 0..4 {
		tokio::task::yield_now().await;
	}

	assert!(wire.try_recv().is_err());
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn timed_out_request_leaves_no_entry_behind() {
	let (channel, mut wire, _seen) = recorded();

	let err = channel
		.request_with_timeout("slow".into(), Duration::from_millis(50))
		.await
		.expect_err("no reply arrives");
	assert!(matches!(err, RpcError::Timeout(d) if d == Duration::from_millis(50)));
	assert_eq!(channel.pending_len(), 0);

	let sent = next(&mut wire).await;
	channel.handle_message(reply(0, sent.message_id.0, "too late"));
	assert_eq!(channel.pending_len(), 0);
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn request_with_timeout_returns_prompt_reply() -> Result<()> {
	let (channel, mut wire, _seen) = recorded();

	let answer = async {
		let sent = next(&mut wire).await;
		channel.handle_message(reply(0, sent.message_id.0, "fast"));
	};
	let (result, ()) = tokio::join!(channel.request_with_timeout("quick".into(), Duration::from_secs(1)), answer);
	assert_eq!(result?, "fast");
	Ok(())
}

#[tokio::test]
async fn two_channels_keep_independent_id_spaces() -> Result<()> {
	let (a_tx, mut a_wire) = mpsc::unbounded_channel();
	let (b_tx, mut b_wire) = mpsc::unbounded_channel();
	let (seen, _seen_rx) = mpsc::unbounded_channel();
	let a: RpcChannel<String, String> = RpcChannel::new(a_tx, IgnoreInbound);
	let b: RpcChannel<String, String> = RpcChannel::new(b_tx, Recorder { seen });

	let b_forward = b.clone();
	tokio::spawn(async move {
		while let Some(envelope) = a_wire.recv().await {
			b_forward.handle_message(envelope);
		}
	});
	let a_forward = a.clone();
	tokio::spawn(async move {
		while let Some(envelope) = b_wire.recv().await {
			a_forward.handle_message(envelope);
		}
	});

	b.send_event("event:hello".into())?;
	b.send_event("event:again".into())?;
	assert_eq!(a.send_request("first".into()).await?, "re:first");
	assert_eq!(a.send_request("second".into()).await?, "re:second");
	Ok(())
}
