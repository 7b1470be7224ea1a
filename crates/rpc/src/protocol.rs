//! Envelope format and message id allocation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-channel message identifier.
///
/// Ids are only meaningful to the side that issued them; the two directions
/// of a channel have independent id spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

/// Simple counter-based ID generator.
///
/// Requests, events and replies sent from one side all draw from the same
/// counter, so ids on the wire are strictly increasing.
#[derive(Debug, Default, Clone, Copy)]
pub struct CounterIdGen(pub u64);

impl CounterIdGen {
	/// Creates a new counter starting at 0.
	#[must_use]
	pub const fn new() -> Self {
		Self(0)
	}

	/// Generates the next unique ID and increments the counter.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&mut self) -> MessageId {
		let id = self.0;
		self.0 += 1;
		MessageId(id)
	}
}

/// Wire unit exchanged over a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
	/// Id assigned by the sending side.
	pub message_id: MessageId,
	/// Id of the request this envelope answers, for replies.
	pub in_reply_to: Option<MessageId>,
	/// Message payload.
	pub body: T,
}

impl<T> Envelope<T> {
	/// Classifies the envelope by whether it answers one of our requests.
	pub fn into_inbound(self) -> Inbound<T> {
		match self.in_reply_to {
			Some(in_reply_to) => Inbound::Reply {
				in_reply_to,
				body: self.body,
			},
			None => Inbound::Message {
				message_id: self.message_id,
				body: self.body,
			},
		}
	}
}

/// Classification of an inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound<T> {
	/// Answer to a request this side issued.
	Reply {
		/// The id this side assigned to the request.
		in_reply_to: MessageId,
		/// Reply payload.
		body: T,
	},
	/// Fresh request or event for the local handler.
	Message {
		/// The id the peer assigned.
		message_id: MessageId,
		/// Message payload.
		body: T,
	},
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn counter_starts_at_zero_and_increments() {
		let mut ids = CounterIdGen::new();
		assert_eq!(ids.next(), MessageId(0));
		assert_eq!(ids.next(), MessageId(1));
		assert_eq!(ids.0, 2);
	}

	#[test]
	fn reply_id_decides_classification() {
		let fresh = Envelope {
			message_id: MessageId(3),
			in_reply_to: None,
			body: "event",
		};
		assert_eq!(
			fresh.into_inbound(),
			Inbound::Message {
				message_id: MessageId(3),
				body: "event"
			}
		);

		let reply = Envelope {
			message_id: MessageId(3),
			in_reply_to: Some(MessageId(0)),
			body: "reply",
		};
		assert_eq!(
			reply.into_inbound(),
			Inbound::Reply {
				in_reply_to: MessageId(0),
				body: "reply"
			}
		);
	}
}
