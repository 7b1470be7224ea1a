//! Inbound message handlers.

use std::future::Future;

use async_trait::async_trait;

use crate::HandlerError;

/// Answers inbound requests and events.
///
/// `Ok(Some(reply))` is sent back correlated with the inbound message,
/// `Ok(None)` sends nothing (events), and an error is logged without a reply.
#[async_trait]
pub trait InboundHandler<In: Send + 'static, Out: Send + 'static>: Send + Sync + 'static {
	/// Handles one inbound body.
	async fn handle(&self, body: In) -> Result<Option<Out>, HandlerError>;
}

/// Handler backed by an async closure. See [`handler_fn`].
#[derive(Debug, Clone)]
pub struct FnHandler<F>(F);

/// Wraps an async closure as an [`InboundHandler`].
pub fn handler_fn<F>(f: F) -> FnHandler<F> {
	FnHandler(f)
}

#[async_trait]
impl<In, Out, F, Fut> InboundHandler<In, Out> for FnHandler<F>
where
	In: Send + 'static,
	Out: Send + 'static,
	F: Fn(In) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Result<Option<Out>, HandlerError>> + Send + 'static,
{
	async fn handle(&self, body: In) -> Result<Option<Out>, HandlerError> {
		(self.0)(body).await
	}
}

/// Handler that accepts everything and never replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreInbound;

#[async_trait]
impl<In: Send + 'static, Out: Send + 'static> InboundHandler<In, Out> for IgnoreInbound {
	async fn handle(&self, _body: In) -> Result<Option<Out>, HandlerError> {
		Ok(None)
	}
}
