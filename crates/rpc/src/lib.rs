//! Bidirectional request/reply and event messaging over a one-way transport.
//!
//! This crate provides protocol-agnostic primitives:
//! * [`Envelope`]: wire unit carrying a message id, an optional reply id and a body
//! * [`Transport`]: one-way `send(envelope)` primitive
//! * [`InboundHandler`]: answers inbound requests and events
//! * [`RpcChannel`]: correlates replies with requests through a pending table
//! * [`connect_stream`]: binds a channel to a framed byte stream

#![warn(missing_docs)]

pub mod channel;
pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod pump;
pub mod transport;

pub use channel::{PendingReply, RpcChannel};
pub use codec::{DEFAULT_MAX_FRAME_LEN, read_frame, write_frame};
pub use error::{HandlerError, Result, RpcError};
pub use handler::{FnHandler, IgnoreInbound, InboundHandler, handler_fn};
pub use protocol::{CounterIdGen, Envelope, Inbound, MessageId};
pub use pump::{StreamOptions, connect_stream};
pub use transport::Transport;
